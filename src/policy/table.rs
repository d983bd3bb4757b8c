//! Policy tables and their builder.
//!
//! A [`PolicyTable`] lists every field of one resource type in declaration
//! order. That order is the order of diff entries and of in-place
//! sub-operations, so it must be stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ConfigError, PolicyViolationError, Result};
use crate::model::ResourceKind;

use super::field::{ComparisonMode, FieldPolicy, MutabilityClass, UpdateOrder};

/// Ordered field policies for one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyTable {
    /// Resource type the table describes.
    kind: ResourceKind,
    /// Field policies in declaration order.
    fields: Vec<FieldPolicy>,
}

/// Builder for [`PolicyTable`].
#[derive(Debug)]
pub struct PolicyTableBuilder {
    /// Resource type being described.
    kind: ResourceKind,
    /// Fields declared so far.
    fields: Vec<FieldPolicy>,
}

/// A per-resource override of a field's comparison mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOverride {
    /// Restore the field's strict mode.
    Strict,
    /// Never compare the field.
    Ignore,
    /// Tolerate extra observed items.
    AllowMorePresent,
}

/// Planner view of a field: mutability plus what shapes its sub-operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldMutability {
    /// Mutability class.
    pub class: MutabilityClass,
    /// Comparison mode in effect.
    pub mode: ComparisonMode,
    /// Add/remove order.
    pub order: UpdateOrder,
}

/// Mutability lookup keyed by canonical field name.
pub type MutabilityTable = BTreeMap<String, FieldMutability>;

/// Key that applies an override to every field.
pub const WILDCARD: &str = "*";

impl PolicyTableBuilder {
    /// Starts a table for a resource type.
    #[must_use]
    pub const fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    /// Declares a field.
    #[must_use]
    pub fn field(mut self, policy: FieldPolicy) -> Self {
        self.fields.push(policy);
        self
    }

    /// Finishes the table.
    ///
    /// # Errors
    ///
    /// Returns a policy violation if a name or alias is declared twice.
    pub fn build(self) -> Result<PolicyTable> {
        let mut seen: Vec<&'static str> = Vec::new();
        for policy in &self.fields {
            for name in std::iter::once(policy.name).chain(policy.aliases.iter().copied()) {
                if seen.contains(&name) {
                    return Err(PolicyViolationError::DuplicateDeclaration {
                        field: name.to_string(),
                        resource_type: self.kind.to_string(),
                    }
                    .into());
                }
                seen.push(name);
            }
        }

        debug!("Built {} policy table with {} fields", self.kind, self.fields.len());
        Ok(PolicyTable {
            kind: self.kind,
            fields: self.fields,
        })
    }
}

impl PolicyTable {
    /// Starts a builder for a resource type.
    #[must_use]
    pub const fn builder(kind: ResourceKind) -> PolicyTableBuilder {
        PolicyTableBuilder::new(kind)
    }

    /// Returns the resource type.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Iterates field policies in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldPolicy> {
        self.fields.iter()
    }

    /// Returns the number of declared fields.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are declared.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up a field by canonical name or alias.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&FieldPolicy> {
        self.fields.iter().find(|p| p.answers_to(name))
    }

    /// Returns the planner view of every field.
    #[must_use]
    pub fn mutability_table(&self) -> MutabilityTable {
        self.fields
            .iter()
            .map(|p| {
                (
                    p.name.to_string(),
                    FieldMutability {
                        class: p.mutability,
                        mode: p.mode,
                        order: p.update_order,
                    },
                )
            })
            .collect()
    }

    /// Returns a copy of the table with comparison overrides applied.
    ///
    /// Keys are field names, aliases, or `*`. The wildcard is applied first
    /// and only accepts `strict` or `ignore`; it never touches fields that
    /// are not comparable. Explicit keys then override the wildcard.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown fields, for overrides on
    /// fields that are not comparable, and for `allow_more_present` on
    /// fields that are not lists or maps.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, ComparisonOverride>) -> Result<Self> {
        let mut table = self.clone();

        if let Some(wildcard) = overrides.get(WILDCARD) {
            if *wildcard == ComparisonOverride::AllowMorePresent {
                return Err(ConfigError::invalid_override(
                    WILDCARD,
                    "only strict or ignore may be applied to every field",
                )
                .into());
            }
            for policy in &mut table.fields {
                if policy.mutability != MutabilityClass::NotComparable {
                    apply_override(policy, *wildcard);
                }
            }
        }

        for (name, choice) in overrides {
            if name == WILDCARD {
                continue;
            }
            let Some(policy) = table.fields.iter_mut().find(|p| p.answers_to(name)) else {
                return Err(ConfigError::invalid_override(
                    name.as_str(),
                    format!("unknown field for resource type {}", self.kind),
                )
                .into());
            };
            if policy.mutability == MutabilityClass::NotComparable {
                return Err(ConfigError::invalid_override(name.as_str(), "field is not comparable").into());
            }
            if *choice == ComparisonOverride::AllowMorePresent && !policy.is_collection() {
                return Err(ConfigError::invalid_override(
                    name.as_str(),
                    "allow_more_present only applies to list and map fields",
                )
                .into());
            }
            debug!("Comparison override for {}: {:?}", policy.name, choice);
            apply_override(policy, *choice);
        }

        Ok(table)
    }
}

fn apply_override(policy: &mut FieldPolicy, choice: ComparisonOverride) {
    policy.mode = match choice {
        ComparisonOverride::Strict => policy.strict_mode,
        ComparisonOverride::Ignore => ComparisonMode::Ignore,
        ComparisonOverride::AllowMorePresent => ComparisonMode::AllowMorePresent,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FieldKind;

    fn sample_table() -> PolicyTable {
        PolicyTable::builder(ResourceKind::Container)
            .field(FieldPolicy::new("image", FieldKind::Image))
            .field(FieldPolicy::new("labels", FieldKind::StringMap).allow_more_present())
            .field(FieldPolicy::new("memory", FieldKind::Bytes { unlimited: false }).numeric().updatable())
            .field(FieldPolicy::new("published_ports", FieldKind::Ports).alias("ports").unordered())
            .field(FieldPolicy::new("force_kill", FieldKind::Boolean).not_comparable())
            .build()
            .unwrap()
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let result = PolicyTable::builder(ResourceKind::Container)
            .field(FieldPolicy::new("ports", FieldKind::Ports))
            .field(FieldPolicy::new("published_ports", FieldKind::Ports).alias("ports"))
            .build();
        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Policy violation: ports: declared more than once in the container policy table"
        );
    }

    #[test]
    fn test_lookup_by_alias() {
        let table = sample_table();
        assert_eq!(table.lookup("ports").map(|p| p.name), Some("published_ports"));
        assert!(table.lookup("nope").is_none());
    }

    #[test]
    fn test_strict_override_restores_exact() {
        let table = sample_table();
        let mut overrides = BTreeMap::new();
        overrides.insert(String::from("labels"), ComparisonOverride::Strict);

        let overridden = table.with_overrides(&overrides).unwrap();
        assert_eq!(overridden.lookup("labels").unwrap().mode, ComparisonMode::Exact);
    }

    #[test]
    fn test_wildcard_skips_not_comparable() {
        let table = sample_table();
        let mut overrides = BTreeMap::new();
        overrides.insert(String::from("*"), ComparisonOverride::Ignore);
        overrides.insert(String::from("image"), ComparisonOverride::Strict);

        let overridden = table.with_overrides(&overrides).unwrap();
        assert_eq!(overridden.lookup("image").unwrap().mode, ComparisonMode::Exact);
        assert_eq!(overridden.lookup("memory").unwrap().mode, ComparisonMode::Ignore);
        assert_eq!(
            overridden.lookup("force_kill").unwrap().mutability,
            MutabilityClass::NotComparable
        );
    }

    #[test]
    fn test_invalid_overrides() {
        let table = sample_table();

        let mut overrides = BTreeMap::new();
        overrides.insert(String::from("memory"), ComparisonOverride::AllowMorePresent);
        assert!(table.with_overrides(&overrides).is_err());

        let mut overrides = BTreeMap::new();
        overrides.insert(String::from("force_kill"), ComparisonOverride::Strict);
        assert!(table.with_overrides(&overrides).is_err());

        let mut overrides = BTreeMap::new();
        overrides.insert(String::from("*"), ComparisonOverride::AllowMorePresent);
        assert!(table.with_overrides(&overrides).is_err());
    }

    #[test]
    fn test_mutability_table_follows_declaration() {
        let table = sample_table();
        let mutability = table.mutability_table();
        assert_eq!(mutability.len(), table.len());
        assert_eq!(mutability["memory"].class, MutabilityClass::Updatable);
        assert_eq!(mutability["published_ports"].mode, ComparisonMode::UnorderedSet);
    }
}
