pub mod get;
pub mod writer;
