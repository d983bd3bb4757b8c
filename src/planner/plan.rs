//! Action planning and reconciliation plans.
//!
//! [`ActionPlanner`] turns a [`Diff`] into a single [`Action`]. A
//! [`ReconcilePlan`] collects the outcome of every resource in a manifest.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{PolicyViolationError, Result};
use crate::model::{ResourceId, ResourceSpec, Value};
use crate::policy::{ComparisonMode, FieldMutability, MutabilityClass, MutabilityTable, UpdateOrder};

use super::action::{Action, RecreateReason, SubOperation};
use super::diff::{Diff, DiffEntry};

/// Decides the action for a diff.
#[derive(Debug, Default)]
pub struct ActionPlanner;

/// Result of reconciling one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Resource that was reconciled.
    pub resource: ResourceId,
    /// Planned action.
    pub action: Action,
    /// Changed fields with normalized before/after values.
    pub diff: Diff,
    /// Whether applying the action would mutate the resource.
    pub changed: bool,
    /// Fields skipped because the backend is too old for them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gated_fields: Vec<String>,
    /// Effective desired spec handed to the adapter on apply.
    #[serde(skip)]
    pub desired: ResourceSpec,
}

/// Outcomes for every resource of a manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcilePlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Hash of the manifest the plan is based on.
    pub config_hash: String,
    /// One outcome per resource, in manifest order.
    pub outcomes: Vec<ReconcileOutcome>,
}

impl ActionPlanner {
    /// Creates a new planner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Plans the action for `diff`.
    ///
    /// Recreate wins over an in-place update, which wins over no-op. An
    /// in-place update lists sub-operations in diff order.
    ///
    /// # Errors
    ///
    /// Returns a policy violation if a changed field is not comparable or has
    /// no mutability entry. Both indicate a defective policy table.
    pub fn plan(&self, diff: &Diff, mutability: &MutabilityTable) -> Result<Action> {
        let mut changed: Vec<(&DiffEntry, FieldMutability)> = Vec::new();
        for entry in diff.changed_entries() {
            let field = mutability
                .get(&entry.field)
                .copied()
                .ok_or_else(|| PolicyViolationError::MissingMutability {
                    field: entry.field.clone(),
                })?;
            if field.class == MutabilityClass::NotComparable {
                return Err(PolicyViolationError::NotComparableChanged {
                    field: entry.field.clone(),
                    before: entry.before.to_string(),
                    after: entry.after.to_string(),
                }
                .into());
            }
            changed.push((entry, field));
        }

        if changed.is_empty() {
            return Ok(Action::NoOp);
        }

        let recreate: Vec<String> = changed
            .iter()
            .filter(|(_, m)| m.class == MutabilityClass::ForcesRecreation)
            .map(|(e, _)| e.field.clone())
            .collect();
        if !recreate.is_empty() {
            debug!("Recreate required by {}", recreate.join(", "));
            return Ok(Action::Recreate(RecreateReason { fields: recreate }));
        }

        let ops: Vec<SubOperation> = changed
            .iter()
            .flat_map(|(entry, field)| sub_operations(entry, *field))
            .collect();
        debug!("In-place update with {} sub-operations", ops.len());
        Ok(Action::UpdateInPlace(ops))
    }
}

/// Breaks one changed field into sub-operations.
///
/// Maps change key by key and set-like lists item by item; anything else is
/// replaced whole. Under `allow_more_present` nothing is ever removed.
fn sub_operations(entry: &DiffEntry, field: FieldMutability) -> Vec<SubOperation> {
    let keep_extras = field.mode == ComparisonMode::AllowMorePresent;
    let name = &entry.field;

    let (adds, removes) = match (&entry.before, &entry.after) {
        (before, Value::Map(after)) if before.is_null() || before.as_map().is_some() => {
            let empty = std::collections::BTreeMap::new();
            let before = before.as_map().unwrap_or(&empty);
            let adds: Vec<SubOperation> = after
                .iter()
                .filter(|(k, v)| before.get(*k) != Some(*v))
                .map(|(k, v)| SubOperation::SetEntry {
                    field: name.clone(),
                    key: k.clone(),
                    value: v.clone(),
                })
                .collect();
            let removes: Vec<SubOperation> = before
                .keys()
                .filter(|k| !after.contains_key(*k))
                .map(|k| SubOperation::RemoveEntry {
                    field: name.clone(),
                    key: k.clone(),
                })
                .collect();
            (adds, removes)
        }
        (before, after)
            if matches!(field.mode, ComparisonMode::UnorderedSet | ComparisonMode::AllowMorePresent) =>
        {
            let (Some(have), Some(want)) = (before.item_set(), after.item_set()) else {
                return vec![set(name, after)];
            };
            let adds: Vec<SubOperation> = want
                .difference(&have)
                .map(|item| SubOperation::Add {
                    field: name.clone(),
                    item: (*item).clone(),
                })
                .collect();
            let removes: Vec<SubOperation> = have
                .difference(&want)
                .map(|item| SubOperation::Remove {
                    field: name.clone(),
                    item: (*item).clone(),
                })
                .collect();
            (adds, removes)
        }
        (_, after) => return vec![set(name, after)],
    };

    let removes = if keep_extras { Vec::new() } else { removes };
    match field.order {
        UpdateOrder::AddThenRemove => adds.into_iter().chain(removes).collect(),
        UpdateOrder::RemoveThenAdd => removes.into_iter().chain(adds).collect(),
    }
}

fn set(field: &str, value: &Value) -> SubOperation {
    SubOperation::Set {
        field: field.to_string(),
        value: value.clone(),
    }
}

impl ReconcileOutcome {
    /// Returns true if the action is a no-op.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.action.is_noop()
    }
}

impl ReconcilePlan {
    /// Creates a plan from outcomes.
    #[must_use]
    pub fn new(config_hash: impl Into<String>, outcomes: Vec<ReconcileOutcome>) -> Self {
        Self {
            created_at: Utc::now(),
            config_hash: config_hash.into(),
            outcomes,
        }
    }

    /// Returns true if no resource needs an action.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.iter().all(ReconcileOutcome::is_noop)
    }

    /// Outcomes that need an action.
    pub fn pending(&self) -> impl Iterator<Item = &ReconcileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_noop())
    }

    /// Counts outcomes by action name (`create`, `update`, ...).
    #[must_use]
    pub fn count(&self, action: &str) -> usize {
        self.outcomes.iter().filter(|o| o.action.name() == action).count()
    }

    /// Names of the fields changed anywhere in the plan.
    #[must_use]
    pub fn changed_fields(&self) -> BTreeSet<&str> {
        self.outcomes
            .iter()
            .flat_map(|o| o.diff.changed_entries().map(|e| e.field.as_str()))
            .collect()
    }
}

impl std::fmt::Display for ReconcilePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required");
        }

        let pending: Vec<&ReconcileOutcome> = self.pending().collect();
        writeln!(f, "Reconcile Plan ({} actions):", pending.len())?;
        for (i, outcome) in pending.iter().enumerate() {
            writeln!(f, "  {i}. {} {}", outcome.action, outcome.resource)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use crate::policy::{FieldKind, FieldPolicy, PolicyTable};

    fn mutability() -> MutabilityTable {
        PolicyTable::builder(ResourceKind::Container)
            .field(FieldPolicy::new("image", FieldKind::Image))
            .field(FieldPolicy::new("memory", FieldKind::Bytes { unlimited: false }).numeric().updatable())
            .field(FieldPolicy::new("labels", FieldKind::StringMap).updatable())
            .field(
                FieldPolicy::new("networks", FieldKind::StringList)
                    .unordered()
                    .updatable()
                    .remove_first(),
            )
            .field(
                FieldPolicy::new("connected", FieldKind::StringList)
                    .allow_more_present()
                    .updatable(),
            )
            .field(FieldPolicy::new("force_kill", FieldKind::Boolean).not_comparable())
            .build()
            .unwrap()
            .mutability_table()
    }

    fn entry(field: &str, before: Value, after: Value) -> DiffEntry {
        DiffEntry {
            field: field.to_string(),
            changed: before != after,
            before,
            after,
        }
    }

    fn list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::str(*s)).collect())
    }

    #[test]
    fn test_no_changes_is_noop() {
        let diff = Diff::new(vec![entry("memory", Value::Int(1), Value::Int(1))]);
        assert_eq!(ActionPlanner::new().plan(&diff, &mutability()).unwrap(), Action::NoOp);
    }

    #[test]
    fn test_recreate_dominates_update() {
        let diff = Diff::new(vec![
            entry("image", Value::str("nginx:1.24"), Value::str("nginx:1.25")),
            entry("memory", Value::Int(1), Value::Int(2)),
        ]);
        let action = ActionPlanner::new().plan(&diff, &mutability()).unwrap();
        assert_eq!(
            action,
            Action::Recreate(RecreateReason {
                fields: vec![String::from("image")]
            })
        );
    }

    #[test]
    fn test_not_comparable_change_is_policy_violation() {
        let diff = Diff::new(vec![
            entry("image", Value::str("a"), Value::str("b")),
            entry("force_kill", Value::Bool(false), Value::Bool(true)),
        ]);
        let err = ActionPlanner::new().plan(&diff, &mutability()).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Policy violation: force_kill: classified not comparable but reported changed (false -> true)"
        );
    }

    #[test]
    fn test_missing_mutability_entry() {
        let diff = Diff::new(vec![entry("gpus", Value::Int(0), Value::Int(1))]);
        assert!(ActionPlanner::new().plan(&diff, &mutability()).is_err());
    }

    #[test]
    fn test_sub_operation_order() {
        let diff = Diff::new(vec![
            entry("memory", Value::Int(1), Value::Int(2)),
            entry("networks", list(&["a", "b"]), list(&["b", "c"])),
            entry(
                "labels",
                Value::entry("old", Value::str("1")),
                Value::entry("new", Value::str("2")),
            ),
        ]);
        let Action::UpdateInPlace(ops) = ActionPlanner::new().plan(&diff, &mutability()).unwrap() else {
            panic!("expected an in-place update");
        };
        let rendered: Vec<String> = ops.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "set memory = 2",
                "remove \"a\" from networks",
                "add \"c\" to networks",
                "set labels[new] = \"2\"",
                "remove labels[old]",
            ]
        );
    }

    #[test]
    fn test_allow_more_present_never_removes() {
        let diff = Diff::new(vec![entry("connected", list(&["x"]), list(&["y"]))]);
        let action = ActionPlanner::new().plan(&diff, &mutability()).unwrap();
        assert_eq!(
            action,
            Action::UpdateInPlace(vec![SubOperation::Add {
                field: String::from("connected"),
                item: Value::str("y"),
            }])
        );
    }
}
