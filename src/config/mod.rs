//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ExecutorConfig (validated, immutable)
//!     → split into SchedulerConfig / LedgerConfig / executor settings
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ExecutorConfig, LedgerConfig, NonceConfig, ObservabilityConfig, QueueConfig, SubmissionConfig,
};
pub use validation::{validate_config, ValidationError};
