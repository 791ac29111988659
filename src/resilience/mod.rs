//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! accept() error
//!     → net::is_temporary (classify)
//!     → backoff.rs (sleep floor, 2x floor, ... capped at ceiling)
//!     → retry accept
//! accept() success
//!     → backoff reset to floor
//! ```
//!
//! # Design Decisions
//! - No jitter: a single accept loop has nothing to desynchronise from
//! - Bounds come from config, never hard-coded in the loop

pub mod backoff;

pub use backoff::AcceptBackoff;
