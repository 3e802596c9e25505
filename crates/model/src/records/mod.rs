pub mod batch;
pub mod key;
pub mod row;
pub mod write;
