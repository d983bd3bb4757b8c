//! Resource differ.
//!
//! Walks a policy table in declaration order and compares the desired spec
//! against the observed state field by field. Only fields the desired spec
//! names take part, unless the policy says to always compare them; absence
//! never reads as "desired empty".

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{ObservedState, ResourceSpec, Value};
use crate::policy::{ComparisonMode, PolicyTable, Presence};

use super::compare::{FieldOutcome, ReconcileContext, compare};

/// One compared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    /// Canonical field name.
    pub field: String,
    /// Normalized observed value.
    pub before: Value,
    /// Normalized desired value.
    pub after: Value,
    /// Whether the values differ under the field's comparison mode.
    pub changed: bool,
}

/// Ordered comparison results for one resource.
///
/// Serialization emits changed entries only; unchanged entries stay
/// available to the planner through [`Diff::entries`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// All compared fields, in policy-table order.
    entries: Vec<DiffEntry>,
    /// Fields dropped because the backend is too old for them.
    gated: Vec<String>,
}

/// Computes diffs between desired specs and observed states.
#[derive(Debug, Default)]
pub struct ResourceDiffer;

impl Diff {
    /// Creates a diff from entries.
    #[must_use]
    pub const fn new(entries: Vec<DiffEntry>) -> Self {
        Self {
            entries,
            gated: Vec::new(),
        }
    }

    /// All compared fields, changed or not.
    #[must_use]
    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    /// Changed fields only.
    pub fn changed_entries(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| e.changed)
    }

    /// Returns true if any field changed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(|e| e.changed)
    }

    /// Fields excluded by version gating.
    #[must_use]
    pub fn gated_fields(&self) -> &[String] {
        &self.gated
    }
}

impl Serialize for Diff {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.changed_entries())
    }
}

impl ResourceDiffer {
    /// Creates a new differ.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Compares `desired` against `observed` under `table`.
    ///
    /// # Errors
    ///
    /// Returns a version-unsupported error if a desired field requires a
    /// newer backend.
    pub fn diff(
        &self,
        desired: &ResourceSpec,
        observed: &ObservedState,
        table: &PolicyTable,
        ctx: &ReconcileContext,
    ) -> Result<Diff> {
        let mut diff = Diff::default();

        for policy in table.fields() {
            if policy.mode == ComparisonMode::Ignore {
                continue;
            }

            let (after, explicit) = match (desired.get(policy.name), &policy.presence) {
                (Some(value), _) => (value.clone(), true),
                (None, Presence::Always(default)) => (default.clone(), false),
                (None, Presence::IfDesired) => continue,
            };

            // A default the user never asked for cannot make the backend too old.
            if !explicit && !policy.supported_on(&ctx.backend_version) {
                diff.gated.push(policy.name.to_string());
                continue;
            }

            let before = observed.get(policy.name).cloned().unwrap_or_default();
            match compare(&before, &after, policy, ctx)? {
                FieldOutcome::Gated => {
                    warn!(
                        "Ignoring {} for {}: backend API {} is too old",
                        policy.name,
                        table.kind(),
                        ctx.backend_version
                    );
                    diff.gated.push(policy.name.to_string());
                }
                FieldOutcome::Compared(comparison) => diff.entries.push(DiffEntry {
                    field: policy.name.to_string(),
                    before: comparison.before,
                    after: comparison.after,
                    changed: comparison.changed,
                }),
            }
        }

        debug!(
            "Compared {} fields of {}, {} changed",
            diff.entries.len(),
            table.kind(),
            diff.changed_entries().count()
        );
        Ok(diff)
    }

    /// Returns the spec the resource should end up with: the desired fields
    /// plus the defaults of always-compared fields, minus gated fields.
    #[must_use]
    pub fn effective_desired(&self, desired: &ResourceSpec, table: &PolicyTable, diff: &Diff) -> ResourceSpec {
        let mut effective = desired.without(diff.gated_fields());
        for policy in table.fields() {
            if let Presence::Always(default) = &policy.presence
                && !effective.fields.contains_key(policy.name)
                && !diff.gated.iter().any(|g| g == policy.name)
            {
                effective.fields.insert(policy.name.to_string(), default.clone());
            }
        }
        effective
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApiVersion, RawSpec, ResourceKind};
    use crate::normalize::SpecNormalizer;
    use crate::policy::{FieldKind, FieldPolicy};
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawSpec {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn table() -> PolicyTable {
        PolicyTable::builder(ResourceKind::Container)
            .field(FieldPolicy::new("image", FieldKind::Image))
            .field(FieldPolicy::new("labels", FieldKind::StringList).unordered())
            .field(FieldPolicy::new("memory", FieldKind::Bytes { unlimited: false }).numeric().updatable())
            .field(FieldPolicy::new("init", FieldKind::Boolean).since(ApiVersion::new(2, 6, 0)))
            .field(FieldPolicy::new("runtime", FieldKind::Text).always(Value::str("runc")))
            .build()
            .unwrap()
    }

    fn run(desired: serde_json::Value, observed: serde_json::Value, version: ApiVersion) -> Diff {
        let table = table();
        let normalizer = SpecNormalizer::new();
        let desired = normalizer.normalize(&raw(desired), &table).unwrap();
        let observed = normalizer.normalize_observed(&raw(observed), &table).unwrap();
        ResourceDiffer::new()
            .diff(&desired, &observed, &table, &ReconcileContext::new(version))
            .unwrap()
    }

    #[test]
    fn test_absence_is_no_opinion() {
        let diff = run(json!({}), json!({"memory": "64M", "runtime": "runc"}), ApiVersion::docker(1, 41));
        assert!(diff.entries().iter().all(|e| e.field == "runtime"));
        assert!(!diff.has_changes());
        assert_eq!(serde_json::to_string(&diff).unwrap(), "[]");
    }

    #[test]
    fn test_order_insensitive_labels() {
        let diff = run(
            json!({"labels": ["a", "b"]}),
            json!({"labels": ["b", "a"], "runtime": "runc"}),
            ApiVersion::docker(1, 41),
        );
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_version_gated_field_excluded() {
        let diff = run(
            json!({"init": true}),
            json!({"init": false, "runtime": "runc"}),
            ApiVersion::new(2, 4, 0),
        );
        assert!(diff.entries().iter().all(|e| e.field != "init"));
        assert_eq!(diff.gated_fields(), ["init"]);
    }

    #[test]
    fn test_always_compared_default() {
        let diff = run(json!({}), json!({"runtime": "nvidia"}), ApiVersion::docker(1, 41));
        let changed: Vec<&DiffEntry> = diff.changed_entries().collect();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].before, Value::str("nvidia"));
        assert_eq!(changed[0].after, Value::str("runc"));
    }

    #[test]
    fn test_entries_follow_declaration_order() {
        let diff = run(
            json!({"memory": "48M", "image": "nginx", "labels": ["x"]}),
            json!({}),
            ApiVersion::docker(1, 41),
        );
        let fields: Vec<&str> = diff.entries().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["image", "labels", "memory", "runtime"]);
        let rendered = serde_json::to_string(&diff).unwrap();
        assert!(rendered.starts_with(r#"[{"field":"image","before":null,"after":"nginx:latest","changed":true}"#));
    }

    #[test]
    fn test_effective_desired_adds_defaults() {
        let table = table();
        let desired = SpecNormalizer::new()
            .normalize(&raw(json!({"image": "nginx", "init": true})), &table)
            .unwrap();
        let ctx = ReconcileContext::new(ApiVersion::new(2, 4, 0));
        let differ = ResourceDiffer::new();
        let diff = differ.diff(&desired, &ObservedState::default(), &table, &ctx).unwrap();

        let effective = differ.effective_desired(&desired, &table, &diff);
        assert_eq!(effective.get("runtime"), Some(&Value::str("runc")));
        assert!(effective.get("init").is_none());
    }
}
