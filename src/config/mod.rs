//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI overrides (main.rs)
//!     → BrokerConfig (validated, immutable)
//!     → owned by the Server context
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server is constructed
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AcceptConfig, AuthConfig, BrokerConfig, ClientConfig, ListenerConfig, MonitoringConfig,
    ObservabilityConfig,
};
pub use validation::{validate_config, ValidationError};
