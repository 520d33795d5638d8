//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     + carto.toml (optional)
//!     + CARTO_* env, legacy LOG_* / NODE_ENV env
//!     → loader.rs (figment merge & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CacheConfig, DatastoreConfig, DatastorePing, EnvironmentConfig, HealthConfig, ListenerConfig,
    LoggingConfig, RequestConfig, ServiceConfig, SinkSettings,
};
pub use validation::{validate_config, ValidationError};
