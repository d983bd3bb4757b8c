//! Manifest validation.
//!
//! Checks what can be checked without a backend: names, duplicates,
//! comparison overrides, and that every present resource normalizes against
//! its policy table.

use crate::error::{ConfigError, Result};
use crate::normalize::SpecNormalizer;
use std::collections::HashSet;
use tracing::debug;

use super::manifest::{ManifestConfig, ResourceConfig};

/// Validator for manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Normalizer used to check resource parameters.
    normalizer: SpecNormalizer,
}

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors.
    pub errors: Vec<ValidationError>,
    /// Non-fatal issues.
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// Path of the offending entry.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            normalizer: SpecNormalizer::new(),
        }
    }

    /// Validates a manifest, failing on the first error found.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the manifest has any error.
    pub fn validate(&self, manifest: &ManifestConfig) -> Result<ValidationResult> {
        let result = self.check(manifest);

        if let Some(first_error) = result.errors.first() {
            return Err(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }
            .into());
        }

        debug!("Manifest validation passed");
        Ok(result)
    }

    /// Collects every error and warning in a manifest.
    #[must_use]
    pub fn check(&self, manifest: &ManifestConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_project(manifest, &mut result);
        self.validate_resources(&manifest.resources, &mut result);

        result
    }

    fn validate_project(manifest: &ManifestConfig, result: &mut ValidationResult) {
        if manifest.project.name.trim().is_empty() {
            result.error("project.name", "Project name cannot be empty");
        }

        if let Err(e) = manifest.api_version() {
            result.error("backend.api_version", e.to_string());
        }

        if manifest.backend.snapshot.trim().is_empty() {
            result.error("backend.snapshot", "Snapshot path cannot be empty");
        }
    }

    fn validate_resources(&self, resources: &[ResourceConfig], result: &mut ValidationResult) {
        if resources.is_empty() {
            result.warnings.push(String::from("No resources defined in manifest"));
            return;
        }

        let mut seen = HashSet::new();

        for (i, resource) in resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");

            if !seen.insert(resource.id()) {
                result.error(
                    format!("{prefix}.name"),
                    ConfigError::DuplicateName {
                        resource_type: resource.kind.to_string(),
                        name: resource.name.clone(),
                    }
                    .to_string(),
                );
            }

            if !is_valid_name(&resource.name) {
                result.error(
                    format!("{prefix}.name"),
                    format!(
                        "Name '{}' is invalid. Must start with a letter or digit and contain only letters, digits, '_', '.' or '-'.",
                        resource.name
                    ),
                );
            }

            let table = match resource.policy_table() {
                Ok(table) => table,
                Err(e) => {
                    result.error(format!("{prefix}.comparisons"), e.to_string());
                    continue;
                }
            };

            if !resource.is_present() {
                if !resource.params.is_empty() {
                    result
                        .warnings
                        .push(format!("{prefix}: parameters of an absent resource are ignored"));
                }
                continue;
            }

            match self.normalizer.normalize(&resource.params, &table) {
                Ok(spec) => {
                    if spec
                        .get("image")
                        .and_then(|v| v.as_str())
                        .is_some_and(|image| image.ends_with(":latest"))
                    {
                        result.warnings.push(format!(
                            "{prefix}.image: Using the ':latest' tag makes drift detection unreliable"
                        ));
                    }
                }
                Err(e) => result.error(prefix, e.to_string()),
            }
        }
    }
}

/// Checks a name against Docker's object naming rule.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphanumeric() {
        return false;
    }

    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn check(yaml: &str) -> ValidationResult {
        let manifest = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        ConfigValidator::new().check(&manifest)
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("shop_web.1"));
        assert!(is_valid_name("9lives"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("-web"));
        assert!(!is_valid_name("web/1"));
        assert!(!is_valid_name("web app"));
    }

    #[test]
    fn test_valid_manifest_with_latest_warning() {
        let result = check(
            r"
project:
  name: shop
resources:
  - name: web
    type: container
    image: nginx
",
        );
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
        assert!(result.warnings[0].contains(":latest"));
    }

    #[test]
    fn test_duplicate_and_malformed_resources() {
        let result = check(
            r#"
project:
  name: shop
resources:
  - name: web
    type: container
    image: nginx:1.25
  - name: web
    type: container
    image: nginx:1.25
    ports: ["[::1:80:80"]
"#,
        );
        assert_eq!(result.error_count(), 2);
        assert_eq!(result.errors[0].to_string(), "resources[1].name: Duplicate container name: web");
        assert!(result.errors[1].message.contains("cannot find closing \"]\""));
    }

    #[test]
    fn test_same_name_different_kind_is_allowed() {
        let result = check(
            r"
project:
  name: shop
resources:
  - name: data
    type: volume
  - name: data
    type: network
",
        );
        assert!(result.is_valid());
    }

    #[test]
    fn test_invalid_override_and_version() {
        let result = check(
            r"
project:
  name: shop
backend:
  api_version: banana
resources:
  - name: web
    type: container
    image: nginx:1.25
    comparisons:
      force_kill: strict
",
        );
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["backend.api_version", "resources[0].comparisons"]);
    }

    #[test]
    fn test_validate_fails_on_first_error() {
        let manifest = ConfigParser::new()
            .parse_yaml("project:\n  name: ''\n", None)
            .unwrap();
        let err = ConfigValidator::new().validate(&manifest).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Manifest validation failed: Project name cannot be empty"
        );
    }
}
