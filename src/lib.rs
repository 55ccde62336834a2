// src/lib.rs
pub mod api;
pub mod budget;
pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod report;
