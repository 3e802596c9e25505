pub mod client;
pub mod error;
pub mod telemetry;

pub use client::Client;
