//! Field comparator.
//!
//! Compares two normalized values under a field policy. The first value is
//! reported as `before` and the second as `after`; the differ passes the
//! observed value first, so `allow_more_present` reads "everything in
//! `after` is already in `before`".

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, VersionUnsupportedError};
use crate::model::{ApiVersion, Value};
use crate::normalize::SpecNormalizer;
use crate::policy::{ComparisonMode, FieldPolicy, VersionGate};

/// Facts about the backend that are threaded through one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileContext {
    /// API version reported by the backend.
    pub backend_version: ApiVersion,
}

/// Normalized values of one compared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    /// Whether the values differ under the field's comparison mode.
    pub changed: bool,
    /// Normalized first value.
    pub before: Value,
    /// Normalized second value.
    pub after: Value,
}

/// Outcome of comparing one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    /// The field was compared.
    Compared(Comparison),
    /// The backend is too old for the field; it takes no part in the diff.
    Gated,
}

impl ReconcileContext {
    /// Creates a context for a backend version.
    #[must_use]
    pub const fn new(backend_version: ApiVersion) -> Self {
        Self { backend_version }
    }
}

impl FieldOutcome {
    /// Returns true if the field was compared and found different.
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Compared(Comparison { changed: true, .. }))
    }
}

/// Compares two normalized values under `policy`.
///
/// # Errors
///
/// Returns [`VersionUnsupportedError`] if the field requires a newer backend.
pub fn compare(
    before: &Value,
    after: &Value,
    policy: &FieldPolicy,
    ctx: &ReconcileContext,
) -> Result<FieldOutcome> {
    if !policy.supported_on(&ctx.backend_version) {
        let required = policy
            .min_version
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        return match policy.version_gate {
            VersionGate::IgnoreBelow => {
                debug!(
                    "{}: gated, needs API {} and backend reports {}",
                    policy.name, required, ctx.backend_version
                );
                Ok(FieldOutcome::Gated)
            }
            VersionGate::Require => Err(VersionUnsupportedError {
                field: policy.name.to_string(),
                required,
                actual: ctx.backend_version.to_string(),
            }
            .into()),
        };
    }

    let changed = differs(before, after, policy.mode);
    debug!("{}: {} ({}) -> {}", policy.name, before, policy.mode, after);
    Ok(FieldOutcome::Compared(Comparison {
        changed,
        before: before.clone(),
        after: after.clone(),
    }))
}

/// Normalizes two raw values with the field's kind, then compares them.
///
/// # Errors
///
/// Returns a malformed spec error if either value cannot be normalized, or
/// [`VersionUnsupportedError`] as [`compare`] does.
pub fn compare_raw(
    before: &serde_json::Value,
    after: &serde_json::Value,
    policy: &FieldPolicy,
    ctx: &ReconcileContext,
) -> Result<FieldOutcome> {
    let normalizer = SpecNormalizer::new();
    let before = normalizer.normalize_field(policy.kind, policy.name, before)?;
    let after = normalizer.normalize_field(policy.kind, policy.name, after)?;
    compare(&before, &after, policy, ctx)
}

/// Returns true if the values differ under `mode`.
#[must_use]
pub fn differs(before: &Value, after: &Value, mode: ComparisonMode) -> bool {
    match mode {
        ComparisonMode::Ignore => false,
        ComparisonMode::Exact | ComparisonMode::NumericWithUnits => !equivalent(before, after),
        ComparisonMode::UnorderedSet => match (before.item_set(), after.item_set()) {
            (Some(b), Some(a)) => b != a,
            _ => !equivalent(before, after),
        },
        ComparisonMode::AllowMorePresent => !contains(before, after),
    }
}

/// Structural equality where an absent value equals an empty collection.
fn equivalent(a: &Value, b: &Value) -> bool {
    a == b || (a.is_empty_collection() && b.is_empty_collection())
}

/// Returns true if everything in `wanted` is present in `present`.
fn contains(present: &Value, wanted: &Value) -> bool {
    if wanted.is_empty_collection() {
        return true;
    }
    match (present, wanted) {
        (Value::Map(have), Value::Map(want)) => want.iter().all(|(k, v)| have.get(k) == Some(v)),
        _ => match (present.item_set(), wanted.item_set()) {
            (Some(have), Some(want)) => want.is_subset(&have),
            _ => equivalent(present, wanted),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FieldKind;
    use serde_json::json;

    fn ctx(version: ApiVersion) -> ReconcileContext {
        ReconcileContext::new(version)
    }

    fn compared(outcome: FieldOutcome) -> Comparison {
        match outcome {
            FieldOutcome::Compared(c) => c,
            FieldOutcome::Gated => panic!("field was gated"),
        }
    }

    #[test]
    fn test_units_are_normalized_before_comparing() {
        let memory = FieldPolicy::new("memory", FieldKind::Bytes { unlimited: false }).numeric();
        let ctx = ctx(ApiVersion::docker(1, 41));

        let same = compared(compare_raw(&json!("64M"), &json!("67108864"), &memory, &ctx).unwrap());
        assert!(!same.changed);

        let different = compared(compare_raw(&json!("64M"), &json!("48M"), &memory, &ctx).unwrap());
        assert!(different.changed);
        assert_eq!(different.before, Value::Int(67_108_864));
        assert_eq!(different.after, Value::Int(50_331_648));
    }

    #[test]
    fn test_set_mode_ignores_order() {
        let labels = FieldPolicy::new("constraints", FieldKind::StringList).unordered();
        let ctx = ctx(ApiVersion::docker(1, 41));
        let outcome = compare_raw(&json!(["a", "b"]), &json!(["b", "a", "a"]), &labels, &ctx).unwrap();
        assert!(!outcome.is_changed());

        let exact = FieldPolicy::new("command", FieldKind::StringList);
        let outcome = compare_raw(&json!(["a", "b"]), &json!(["b", "a"]), &exact, &ctx).unwrap();
        assert!(outcome.is_changed());
    }

    #[test]
    fn test_allow_more_present() {
        let networks = FieldPolicy::new("connected", FieldKind::StringList).allow_more_present();
        let ctx = ctx(ApiVersion::docker(1, 41));

        let extra = compare_raw(&json!(["a", "b", "c"]), &json!(["a"]), &networks, &ctx).unwrap();
        assert!(!extra.is_changed());
        let missing = compare_raw(&json!(["b"]), &json!(["a"]), &networks, &ctx).unwrap();
        assert!(missing.is_changed());

        let labels = FieldPolicy::new("labels", FieldKind::StringMap).allow_more_present();
        let extra = compare_raw(&json!({"a": "1", "b": "2"}), &json!({"a": "1"}), &labels, &ctx).unwrap();
        assert!(!extra.is_changed());
        let changed = compare_raw(&json!({"a": "2"}), &json!({"a": "1"}), &labels, &ctx).unwrap();
        assert!(changed.is_changed());
    }

    #[test]
    fn test_null_equals_empty_collection() {
        let env = FieldPolicy::new("env", FieldKind::Env);
        let ctx = ctx(ApiVersion::docker(1, 41));
        let outcome = compare(&Value::Null, &Value::Map(std::collections::BTreeMap::new()), &env, &ctx).unwrap();
        assert!(!outcome.is_changed());
    }

    #[test]
    fn test_version_gate_ignores_field() {
        let policy = FieldPolicy::new("init", FieldKind::Boolean).since(ApiVersion::new(2, 6, 0));
        let outcome = compare(
            &Value::Bool(false),
            &Value::Bool(true),
            &policy,
            &ctx(ApiVersion::new(2, 4, 0)),
        )
        .unwrap();
        assert_eq!(outcome, FieldOutcome::Gated);
    }

    #[test]
    fn test_version_requirement_fails() {
        let policy = FieldPolicy::new("cpus", FieldKind::Cpus).requires(ApiVersion::docker(1, 25));
        let err = compare(
            &Value::Null,
            &Value::str("1.5"),
            &policy,
            &ctx(ApiVersion::docker(1, 24)),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported by backend: cpus: requires API version 1.25 or later, backend reports 1.24"
        );
    }

    #[test]
    fn test_ignore_mode_never_changes() {
        let policy = FieldPolicy::new("runtime", FieldKind::Text).ignored();
        let outcome = compare(
            &Value::str("runc"),
            &Value::str("nvidia"),
            &policy,
            &ctx(ApiVersion::docker(1, 41)),
        )
        .unwrap();
        assert!(!outcome.is_changed());
    }
}
