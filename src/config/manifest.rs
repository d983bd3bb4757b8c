//! Manifest types.
//!
//! A manifest maps to `converge.yaml` and declares the desired state of every
//! resource. Resource parameters are kept raw; the normalizer gives them
//! meaning against the resource kind's policy table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{ApiVersion, RawSpec, ResourceId, ResourceKind};
use crate::policy::{ComparisonOverride, PolicyTable};

/// The root of a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestConfig {
    /// Project-level settings.
    pub project: ProjectConfig,
    /// Backend settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Resources to reconcile, in order.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// Project-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Project name.
    pub name: String,
    /// Environment (e.g. "dev", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Path to the snapshot file holding observed state.
    #[serde(default = "default_snapshot")]
    pub snapshot: String,
    /// API version to report instead of the snapshot's own.
    #[serde(default)]
    pub api_version: Option<String>,
}

/// One resource declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    /// Resource name, unique per kind.
    pub name: String,
    /// Resource kind.
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    /// Whether the resource should exist.
    #[serde(default)]
    pub state: DesiredState,
    /// Per-field comparison overrides; `*` applies to every field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub comparisons: BTreeMap<String, ComparisonOverride>,
    /// Raw resource parameters.
    #[serde(flatten)]
    pub params: RawSpec,
}

/// Desired existence of a resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// The resource should exist and match its parameters.
    #[default]
    Present,
    /// The resource should not exist.
    Absent,
}

fn default_environment() -> String {
    String::from("dev")
}

fn default_snapshot() -> String {
    String::from(".converge/snapshot.json")
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            snapshot: default_snapshot(),
            api_version: None,
        }
    }
}

impl ManifestConfig {
    /// Finds a resource declaration by identifier.
    #[must_use]
    pub fn resource(&self, id: &ResourceId) -> Option<&ResourceConfig> {
        self.resources
            .iter()
            .find(|r| r.kind == id.kind && r.name == id.name)
    }

    /// Parses the configured API version override.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the version cannot be parsed.
    pub fn api_version(&self) -> Result<Option<ApiVersion>> {
        self.backend
            .api_version
            .as_deref()
            .map(ApiVersion::parse)
            .transpose()
            .map_err(Into::into)
    }

    /// Counts resources of a kind.
    #[must_use]
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.resources.iter().filter(|r| r.kind == kind).count()
    }
}

impl ResourceConfig {
    /// Returns the resource identifier.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind, &self.name)
    }

    /// Builds the policy table for this resource, with overrides applied.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if an override is invalid.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        let table = self.kind.policy_table()?;
        if self.comparisons.is_empty() {
            return Ok(table);
        }
        table.with_overrides(&self.comparisons)
    }

    /// Returns true if the resource should exist.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.state == DesiredState::Present
    }
}
