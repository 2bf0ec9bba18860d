//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config.toml  ─┐
//!               ├→ loader.rs (parse & deserialize)
//! environment  ─┘
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → registry built once from `appservices`
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, ConfigError};
pub use schema::{AppServiceConfig, GatewayConfig, HttpConfig, ObservabilityConfig, SyncProxyConfig};
