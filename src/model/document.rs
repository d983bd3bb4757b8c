//! Resource documents: desired specifications and observed states.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::value::Value;

/// A raw, unnormalized document as supplied by a manifest or an adapter.
pub type RawSpec = serde_json::Map<String, serde_json::Value>;

/// Kinds of resources the engine knows how to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A standalone container.
    Container,
    /// A swarm service.
    Service,
    /// A network.
    Network,
    /// A volume.
    Volume,
}

/// Identifies one resource on the backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
}

/// Canonical desired configuration of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSpec {
    /// Resource kind the fields were normalized for.
    pub kind: ResourceKind,
    /// Canonical field values, keyed by canonical field name.
    pub fields: BTreeMap<String, Value>,
}

/// Canonical observed state of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ObservedState {
    /// Canonical field values, keyed by canonical field name.
    pub fields: BTreeMap<String, Value>,
}

impl ResourceKind {
    /// All kinds, in display order.
    pub const ALL: [Self; 4] = [Self::Container, Self::Service, Self::Network, Self::Volume];

    /// Returns the lowercase name used in manifests and identifiers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Service => "service",
            Self::Network => "network",
            Self::Volume => "volume",
        }
    }

    /// Parses a kind from its lowercase name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl ResourceId {
    /// Creates a resource identifier.
    #[must_use]
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Returns the `kind/name` key used by snapshot storage.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl ResourceSpec {
    /// Creates an empty spec for a resource kind.
    #[must_use]
    pub const fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a copy of this spec without the given fields.
    #[must_use]
    pub fn without(&self, excluded: &[String]) -> Self {
        Self {
            kind: self.kind,
            fields: self
                .fields
                .iter()
                .filter(|(name, _)| !excluded.contains(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    /// Converts the canonical fields back to a raw document.
    #[must_use]
    pub fn to_raw(&self) -> RawSpec {
        self.fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

impl ObservedState {
    /// Creates an observed state from canonical fields.
    #[must_use]
    pub const fn new(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Converts the canonical fields back to a raw document.
    #[must_use]
    pub fn to_raw(&self) -> RawSpec {
        self.fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_key() {
        let id = ResourceId::new(ResourceKind::Service, "api");
        assert_eq!(id.key(), "service/api");
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(ResourceKind::from_name("Network"), Some(ResourceKind::Network));
        assert_eq!(ResourceKind::from_name("pod"), None);
    }

    #[test]
    fn test_spec_without() {
        let mut spec = ResourceSpec::new(ResourceKind::Container);
        spec.fields.insert(String::from("image"), Value::str("nginx:latest"));
        spec.fields.insert(String::from("init"), Value::Bool(true));

        let trimmed = spec.without(&[String::from("init")]);
        assert!(trimmed.get("init").is_none());
        assert!(trimmed.get("image").is_some());
    }
}
