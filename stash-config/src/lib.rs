//! Shared configuration library for stash.
//!
//! Loads the service configuration from a TOML or JSON file, layers
//! environment overrides (including a `.env` file) on top, fills in defaults
//! and reports anything suspicious as warnings rather than failing.

pub mod loader;
pub mod models;
pub mod sources;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{Config, ConfigMetadata};
pub use sources::{EnvConfig, FileConfig};
pub use validation::{ConfigWarning, ConfigWarnings};
