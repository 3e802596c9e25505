pub mod count;
pub mod parallel;
