//! Subject broker: connection admission, lifecycle and graceful shutdown.

pub mod client;
pub mod config;
pub mod lifecycle;
pub mod monitor;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod server;

pub use config::BrokerConfig;
pub use server::{Server, ServerError};
