pub mod cli;
pub mod client;
pub mod config;
pub mod credentials;
pub mod logging;
pub mod pipeline;
pub mod sigv4;
pub mod types;
pub mod upload;
