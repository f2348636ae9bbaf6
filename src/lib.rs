pub mod collector;
pub mod concurrency;
pub mod config;
pub mod error;
mod macros;
pub mod pipeline;
pub mod stages;
