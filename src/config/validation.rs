//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, backoff floor <= ceiling)
//! - Detect conflicting settings (password without user, port collisions)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BrokerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::BrokerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.max_payload must be greater than zero")]
    ZeroMaxPayload,

    #[error("accept.min_sleep_ms must be greater than zero")]
    ZeroAcceptFloor,

    #[error("accept.max_sleep_ms ({max}) is below accept.min_sleep_ms ({min})")]
    InvertedAcceptBounds { min: u64, max: u64 },

    #[error("auth.timeout_ms must be greater than zero")]
    ZeroAuthTimeout,

    #[error("auth.password is set without auth.username")]
    PasswordWithoutUser,

    #[error("client.ping_interval_secs must be greater than zero")]
    ZeroPingInterval,

    #[error("client.max_pings_out must be greater than zero")]
    ZeroMaxPingsOut,

    #[error("client.{0} must be greater than zero")]
    ZeroBufferSize(&'static str),

    #[error("monitoring.http_port {0} collides with the client port")]
    PortCollision(u16),
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &BrokerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.max_payload == 0 {
        errors.push(ValidationError::ZeroMaxPayload);
    }

    if config.accept.min_sleep_ms == 0 {
        errors.push(ValidationError::ZeroAcceptFloor);
    }
    if config.accept.max_sleep_ms < config.accept.min_sleep_ms {
        errors.push(ValidationError::InvertedAcceptBounds {
            min: config.accept.min_sleep_ms,
            max: config.accept.max_sleep_ms,
        });
    }

    if config.auth.timeout_ms == 0 {
        errors.push(ValidationError::ZeroAuthTimeout);
    }
    let has_user = config.auth.username.as_deref().is_some_and(|u| !u.is_empty());
    let has_pass = config.auth.password.as_deref().is_some_and(|p| !p.is_empty());
    if has_pass && !has_user {
        errors.push(ValidationError::PasswordWithoutUser);
    }

    if config.client.ping_interval_secs == 0 {
        errors.push(ValidationError::ZeroPingInterval);
    }
    if config.client.max_pings_out == 0 {
        errors.push(ValidationError::ZeroMaxPingsOut);
    }
    if config.client.read_buffer_size == 0 {
        errors.push(ValidationError::ZeroBufferSize("read_buffer_size"));
    }
    if config.client.write_buffer_size == 0 {
        errors.push(ValidationError::ZeroBufferSize("write_buffer_size"));
    }

    let http_port = config.monitoring.http_port;
    if config.monitoring.enabled && http_port != 0 && http_port == config.listener.port {
        errors.push(ValidationError::PortCollision(http_port));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
