//! Configuration for the ZenKey scan station.
//!
//! Values are layered from built-in defaults, an optional `zenkey.toml`, and
//! the process environment (after `.env` has been loaded). The server applies
//! its command-line overrides on top of the resolved [`Config`].

pub mod constants;
pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, error::ConfigLoadError};
pub use models::{
    AuthConfig, Config, ConfigMetadata, CorsConfig, DeviceConfig,
    ScannerConfig, ServerConfig,
};
pub use validation::{ConfigWarning, ConfigWarnings};
