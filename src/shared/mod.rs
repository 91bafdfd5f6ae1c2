pub mod config;
pub mod entities;
pub mod error;
pub mod logging;
pub mod ports;
pub mod utils;

pub use config::BridgeConfig;
