//! Manifest parser.
//!
//! Loads a manifest from YAML, optionally after a `.env` file, and applies
//! environment overrides for the backend settings.

use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::manifest::ManifestConfig;

/// Environment variable overriding `backend.snapshot`.
pub const SNAPSHOT_ENV: &str = "CONVERGE_SNAPSHOT";

/// Environment variable overriding `backend.api_version`.
pub const API_VERSION_ENV: &str = "DOCKER_API_VERSION";

/// Parser for manifests.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Directory holding the `.env` file.
    base_path: Option<PathBuf>,
}

/// Backend settings taken from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// Snapshot path.
    pub snapshot: Option<String>,
    /// Backend API version.
    pub api_version: Option<String>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory searched for `.env`.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ManifestConfig> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ManifestConfig> {
        debug!("Parsing YAML manifest");

        let manifest: ManifestConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location: source.map(|p| p.display().to_string()),
        })?;

        debug!(
            "Parsed manifest for project {} with {} resources",
            manifest.project.name,
            manifest.resources.len()
        );
        Ok(manifest)
    }

    /// Loads a manifest and applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ManifestConfig> {
        let mut manifest = self.load_file(path)?;
        Self::apply_env_overrides(&mut manifest, &EnvOverrides::from_env());
        Ok(manifest)
    }

    /// Applies environment overrides to a manifest.
    pub fn apply_env_overrides(manifest: &mut ManifestConfig, overrides: &EnvOverrides) {
        if let Some(snapshot) = &overrides.snapshot {
            debug!("Overriding backend.snapshot from environment");
            manifest.backend.snapshot.clone_from(snapshot);
        }

        if let Some(version) = &overrides.api_version {
            debug!("Overriding backend.api_version from environment");
            manifest.backend.api_version = Some(version.clone());
        }
    }

    /// Loads the `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

impl EnvOverrides {
    /// Reads overrides from the process environment. Empty values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            snapshot: read(SNAPSHOT_ENV),
            api_version: read(API_VERSION_ENV),
        }
    }
}

/// Manifest file names searched for, in order.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "converge.yaml",
    "converge.yml",
    "docker-converge.yaml",
    "docker-converge.yml",
];

/// Finds a manifest in `start_dir` or one of its parents.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found manifest: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_manifest() {
        let yaml = r"
project:
  name: shop
";
        let manifest = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(manifest.project.name, "shop");
        assert!(manifest.resources.is_empty());
    }

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
project:
  name: shop
  environment: prod

backend:
  snapshot: state/prod.json

resources:
  - name: frontend
    type: network
    driver: bridge
  - name: web
    type: container
    image: nginx:1.25
    memory: 512M
    cpus: 1.5
    env:
      MODE: "production"
    networks: [frontend]
  - name: api
    type: service
    image: shop/api:2.0
    replicas: 3
"#;
        let manifest = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(manifest.project.environment, "prod");
        assert_eq!(manifest.resources.len(), 3);
        assert_eq!(manifest.resources[2].kind, ResourceKind::Service);
        assert_eq!(manifest.resources[1].params.len(), 5);
    }

    #[test]
    fn test_unknown_resource_type_is_parse_error() {
        let yaml = r"
project:
  name: shop
resources:
  - name: x
    type: pod
";
        let err = ConfigParser::new().parse_yaml(yaml, None).unwrap_err();
        assert!(err.to_string().starts_with("Configuration error: Failed to parse manifest: YAML parse error"));
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = ConfigParser::new()
            .parse_yaml("project:\n  name: shop\n", None)
            .unwrap();
        let overrides = EnvOverrides {
            snapshot: Some(String::from("/var/lib/converge.json")),
            api_version: Some(String::from("1.30")),
        };
        ConfigParser::apply_env_overrides(&mut manifest, &overrides);
        assert_eq!(manifest.backend.snapshot, "/var/lib/converge.json");
        assert_eq!(manifest.backend.api_version.as_deref(), Some("1.30"));
    }

    #[test]
    fn test_find_config_file_searches_parents() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("converge.yml"), "project:\n  name: x\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, temp.path().join("converge.yml"));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigParser::new().load_file("/nonexistent/converge.yaml").unwrap_err();
        assert!(matches!(err, crate::error::ConvergeError::Config(ConfigError::FileNotFound { .. })));
    }
}
