//! Achievo Common Library
//!
//! Shared code for the Achievo services including:
//! - Achievement lifecycle engine, state machine and access policy
//! - Store contracts with PostgreSQL and in-memory implementations
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod lifecycle;
pub mod metrics;
pub mod store;

// Re-export commonly used types
pub use auth::{Actor, IdentityResolver, Role};
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use lifecycle::AchievementEngine;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
