#![allow(dead_code)]

pub mod integration;
pub mod utils;
