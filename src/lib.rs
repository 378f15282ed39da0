pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

// Pipeline instantiations
pub mod catalog;
pub mod rates;
