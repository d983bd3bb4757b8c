//! Spec normalization.
//!
//! Raw documents arrive with heterogeneous spellings: shorthand port strings,
//! byte sizes with units, `key=value` lists, field aliases. The normalizer
//! turns both desired and observed documents into canonical [`Value`]s so the
//! comparator never sees a raw spelling. Every canonical value is itself
//! valid input and normalizes to itself.

mod ports;
mod structured;
mod units;

pub use units::UNLIMITED;

use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::error::{MalformedSpecError, Result};
use crate::model::{ObservedState, RawSpec, ResourceSpec, Value};
use crate::policy::{FieldKind, PolicyTable};

/// Result of normalizing a single value.
pub(crate) type Normalized<T> = std::result::Result<T, MalformedSpecError>;

/// Converts raw documents into canonical specs.
#[derive(Debug, Default)]
pub struct SpecNormalizer;

impl SpecNormalizer {
    /// Creates a new normalizer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Normalizes a desired document.
    ///
    /// Field names are resolved through aliases. A `null` value means the
    /// field is absent.
    ///
    /// # Errors
    ///
    /// Returns a malformed spec error for unknown fields, a field given twice
    /// (directly or through an alias), a missing required field, or a value
    /// that does not fit its field kind.
    pub fn normalize(&self, raw: &RawSpec, table: &PolicyTable) -> Result<ResourceSpec> {
        let mut spec = ResourceSpec::new(table.kind());
        let mut spelled: BTreeMap<&str, &str> = BTreeMap::new();

        for (name, json) in raw {
            let policy = table.lookup(name).ok_or_else(|| MalformedSpecError::UnknownField {
                field: name.clone(),
                resource_type: table.kind().to_string(),
            })?;

            if let Some(first) = spelled.insert(policy.name, name.as_str()) {
                return Err(MalformedSpecError::DuplicateField {
                    field: policy.name.to_string(),
                    first: first.to_string(),
                    second: name.clone(),
                }
                .into());
            }

            let value = self.normalize_field(policy.kind, policy.name, json)?;
            if value.is_null() {
                continue;
            }
            trace!("Normalized {}: {}", policy.name, value);
            spec.fields.insert(policy.name.to_string(), value);
        }

        for policy in table.fields().filter(|p| p.required) {
            if !spec.fields.contains_key(policy.name) {
                return Err(MalformedSpecError::MissingField {
                    field: policy.name.to_string(),
                    resource_type: table.kind().to_string(),
                }
                .into());
            }
        }

        debug!("Normalized {} desired fields for {}", spec.fields.len(), table.kind());
        Ok(spec)
    }

    /// Normalizes an observed document.
    ///
    /// Unlike [`Self::normalize`], fields the table does not know are
    /// skipped: a runtime reports far more than any policy compares.
    ///
    /// # Errors
    ///
    /// Returns a malformed spec error if a known field cannot be normalized.
    pub fn normalize_observed(&self, raw: &RawSpec, table: &PolicyTable) -> Result<ObservedState> {
        let mut fields = BTreeMap::new();
        for (name, json) in raw {
            let Some(policy) = table.lookup(name) else {
                trace!("Skipping unknown observed field {}", name);
                continue;
            };
            let value = self.normalize_field(policy.kind, policy.name, json)?;
            if !value.is_null() {
                fields.insert(policy.name.to_string(), value);
            }
        }
        Ok(ObservedState::new(fields))
    }

    /// Normalizes one raw value according to its field kind.
    ///
    /// # Errors
    ///
    /// Returns a malformed spec error if the value does not fit the kind.
    pub fn normalize_field(&self, kind: FieldKind, field: &str, json: &serde_json::Value) -> Result<Value> {
        Ok(normalize_value(kind, field, json)?)
    }
}

fn normalize_value(kind: FieldKind, field: &str, json: &serde_json::Value) -> Normalized<Value> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    match kind {
        FieldKind::Text => structured::scalar_text(field, json).map(Value::Str),
        FieldKind::Integer => structured::integer(field, json),
        FieldKind::Boolean => structured::boolean(field, json).map(Value::Bool),
        FieldKind::Choice(choices) => choice(field, json, choices),
        FieldKind::Image => structured::image(field, json),
        FieldKind::Bytes { unlimited } => units::bytes(field, json, unlimited),
        FieldKind::Cpus => units::cpus(field, json),
        FieldKind::Duration => units::duration(field, json),
        FieldKind::StringList => structured::string_list(field, json),
        FieldKind::Command => structured::command(field, json),
        FieldKind::StringMap => structured::string_map(field, json, false),
        FieldKind::Env => structured::string_map(field, json, true),
        FieldKind::Ports => ports::normalize(field, json),
        FieldKind::Mounts => structured::mounts(field, json),
        FieldKind::Networks => structured::networks(field, json),
        FieldKind::Secrets => structured::secrets(field, json),
        FieldKind::Healthcheck => structured::healthcheck(field, json),
        FieldKind::Any => Ok(Value::from_json(json)),
    }
}

fn choice(field: &str, json: &serde_json::Value, choices: &[&str]) -> Normalized<Value> {
    let text = structured::scalar_text(field, json)?.to_ascii_lowercase();
    if choices.contains(&text.as_str()) {
        Ok(Value::Str(text))
    } else {
        Err(MalformedSpecError::invalid(
            field,
            format!("one of {}", choices.join(", ")),
            json,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawSpec {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn test_alias_resolves_to_canonical_name() {
        let table = ResourceKind::Container.policy_table().unwrap();
        let spec = SpecNormalizer::new()
            .normalize(&raw(json!({"image": "nginx", "ports": ["80:80"]})), &table)
            .unwrap();
        assert!(spec.get("published_ports").is_some());
        assert!(spec.get("ports").is_none());
    }

    #[test]
    fn test_alias_duplicate_rejected() {
        let table = ResourceKind::Container.policy_table().unwrap();
        let err = SpecNormalizer::new()
            .normalize(
                &raw(json!({"image": "nginx", "ports": ["80:80"], "published_ports": ["81:81"]})),
                &table,
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed spec: published_ports: given more than once (as \"ports\" and \"published_ports\")"
        );
    }

    #[test]
    fn test_unknown_and_missing_fields() {
        let table = ResourceKind::Container.policy_table().unwrap();
        let normalizer = SpecNormalizer::new();

        let err = normalizer
            .normalize(&raw(json!({"image": "nginx", "gpus": 1})), &table)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed spec: gpus: unknown field for resource type container"
        );

        let err = normalizer.normalize(&raw(json!({"memory": "64M"})), &table).unwrap_err();
        assert_eq!(err.to_string(), "Malformed spec: image: required for resource type container");
    }

    #[test]
    fn test_null_means_absent() {
        let table = ResourceKind::Container.policy_table().unwrap();
        let spec = SpecNormalizer::new()
            .normalize(&raw(json!({"image": "nginx", "memory": null})), &table)
            .unwrap();
        assert!(spec.get("memory").is_none());
    }

    #[test]
    fn test_observed_ignores_unknown_fields() {
        let table = ResourceKind::Container.policy_table().unwrap();
        let observed = SpecNormalizer::new()
            .normalize_observed(&raw(json!({"memory": 67_108_864, "Id": "abc123"})), &table)
            .unwrap();
        assert_eq!(observed.get("memory"), Some(&Value::Int(67_108_864)));
        assert_eq!(observed.fields.len(), 1);
    }

    #[test]
    fn test_choice_is_case_insensitive() {
        let table = ResourceKind::Container.policy_table().unwrap();
        let spec = SpecNormalizer::new()
            .normalize(&raw(json!({"image": "nginx", "restart": "Always"})), &table)
            .unwrap();
        assert_eq!(spec.get("restart_policy"), Some(&Value::str("always")));
    }

    #[test]
    fn test_canonical_spec_is_a_fixed_point() {
        let table = ResourceKind::Container.policy_table().unwrap();
        let normalizer = SpecNormalizer::new();
        let spec = normalizer
            .normalize(
                &raw(json!({
                    "image": "nginx",
                    "ports": ["127.0.0.1:8080:80", "9010-9050:9010-9050/udp"],
                    "volumes": ["/srv:/srv:ro"],
                    "memory": "64M",
                    "memory_swap": "unlimited",
                    "cpus": 1.5,
                    "env": ["A=1"],
                    "networks": [{"name": "web", "aliases": ["b", "a"]}],
                    "healthcheck": {"test": "true", "interval": "30s"}
                })),
                &table,
            )
            .unwrap();
        let again = normalizer.normalize(&spec.to_raw(), &table).unwrap();
        assert_eq!(spec, again);
    }
}
