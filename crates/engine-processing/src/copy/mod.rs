pub mod pipeline;
pub mod policy;
pub mod report;
