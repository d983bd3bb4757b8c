//! Manifest handling.
//!
//! - Parsing `converge.yaml` with `.env` and environment overrides
//! - Validation of names, overrides and resource parameters
//! - Deterministic hashing of manifests and outcomes

mod hash;
mod manifest;
mod parser;
mod validator;

pub use hash::ConfigHasher;
pub use manifest::{BackendConfig, DesiredState, ManifestConfig, ProjectConfig, ResourceConfig};
pub use parser::{
    API_VERSION_ENV, ConfigParser, DEFAULT_CONFIG_FILES, EnvOverrides, SNAPSHOT_ENV, find_config_file,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
