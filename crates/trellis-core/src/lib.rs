pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, GatewayConfig};
pub use error::{Result, TrellisError};
pub use types::*;
