pub mod batch;
pub mod copy;
pub mod delete;
pub mod error;
pub mod first_error;
pub mod iter;
pub mod scan;
