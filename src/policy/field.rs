//! Per-field policy metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{ApiVersion, Value};

/// How a raw value is turned into a canonical [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Trimmed string; numbers and booleans are rendered as text.
    Text,
    /// Integer; numeric strings are parsed.
    Integer,
    /// Boolean; accepts `yes`/`no`, `on`/`off`, `true`/`false`, `1`/`0`.
    Boolean,
    /// One of a fixed set of lowercase words.
    Choice(&'static [&'static str]),
    /// Image reference; `:latest` is appended when no tag or digest is given.
    Image,
    /// Byte size with optional unit suffix (`64M`, `128MB`, `1.5g`).
    Bytes {
        /// Whether `unlimited` / `-1` is accepted as the sentinel `-1`.
        unlimited: bool,
    },
    /// CPU count as a canonical decimal string (`1.5`, `2`).
    Cpus,
    /// Duration with unit suffixes (`1m30s`, `500ms`) as nanoseconds.
    Duration,
    /// List of strings; a scalar becomes a one-element list.
    StringList,
    /// Command line; a string is split shell-style, honoring quotes.
    Command,
    /// String-to-string map; also accepts a list of `key=value` items.
    StringMap,
    /// Environment map; like [`FieldKind::StringMap`] but values are stringified.
    Env,
    /// Published port bindings.
    Ports,
    /// Volume and bind mounts.
    Mounts,
    /// Network attachments.
    Networks,
    /// Swarm secret or config references.
    Secrets,
    /// Container health check.
    Healthcheck,
    /// Structural conversion with no field-specific rules.
    Any,
}

/// How two normalized values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Structural equality.
    Exact,
    /// Lists compared as sets; order and duplicates do not matter.
    UnorderedSet,
    /// Unit-normalized numbers compared by value.
    NumericWithUnits,
    /// Everything desired must be observed; extra observed items are fine.
    AllowMorePresent,
    /// Never compared.
    Ignore,
}

/// Whether a change to a field can be applied to a live resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutabilityClass {
    /// Can be changed in place.
    Updatable,
    /// Changing it requires destroying and recreating the resource.
    ForcesRecreation,
    /// Not legitimately comparable; a change here is a policy defect.
    NotComparable,
}

/// When a field takes part in comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// Compared only if the desired spec names it.
    IfDesired,
    /// Always compared; an absent desired value means this default.
    Always(Value),
}

/// What happens when the backend is older than a field's minimum version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionGate {
    /// The field is dropped from comparison.
    IgnoreBelow,
    /// Reconciliation fails if the desired spec names the field.
    Require,
}

/// Order of additions and removals within one field's sub-operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOrder {
    /// Apply additions first, then removals.
    AddThenRemove,
    /// Apply removals first, then additions.
    RemoveThenAdd,
}

/// Policy for one field of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPolicy {
    /// Canonical field name.
    pub name: &'static str,
    /// Alternative spellings accepted in raw documents.
    pub aliases: Vec<&'static str>,
    /// Normalization rule.
    pub kind: FieldKind,
    /// Active comparison mode.
    pub mode: ComparisonMode,
    /// Mode restored by a `strict` override.
    pub strict_mode: ComparisonMode,
    /// Mutability class.
    pub mutability: MutabilityClass,
    /// When the field is compared.
    pub presence: Presence,
    /// Minimum backend version, if any.
    pub min_version: Option<ApiVersion>,
    /// Behavior below `min_version`.
    pub version_gate: VersionGate,
    /// Add/remove order for in-place sub-operations.
    pub update_order: UpdateOrder,
    /// Whether a desired spec must name the field.
    pub required: bool,
}

impl FieldPolicy {
    /// Creates an exact-compared, recreate-forcing field compared only if desired.
    #[must_use]
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            aliases: Vec::new(),
            kind,
            mode: ComparisonMode::Exact,
            strict_mode: ComparisonMode::Exact,
            mutability: MutabilityClass::ForcesRecreation,
            presence: Presence::IfDesired,
            min_version: None,
            version_gate: VersionGate::IgnoreBelow,
            update_order: UpdateOrder::AddThenRemove,
            required: false,
        }
    }

    /// Adds an alternative spelling.
    #[must_use]
    pub fn alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(alias);
        self
    }

    /// Compares as an unordered set.
    #[must_use]
    pub fn unordered(mut self) -> Self {
        self.mode = ComparisonMode::UnorderedSet;
        self.strict_mode = ComparisonMode::UnorderedSet;
        self
    }

    /// Compares unit-normalized numbers.
    #[must_use]
    pub fn numeric(mut self) -> Self {
        self.mode = ComparisonMode::NumericWithUnits;
        self.strict_mode = ComparisonMode::NumericWithUnits;
        self
    }

    /// Tolerates extra observed items; `strict` restores the previous mode.
    #[must_use]
    pub fn allow_more_present(mut self) -> Self {
        self.mode = ComparisonMode::AllowMorePresent;
        self
    }

    /// Never compares this field.
    #[must_use]
    pub fn ignored(mut self) -> Self {
        self.mode = ComparisonMode::Ignore;
        self
    }

    /// Marks the field as updatable in place.
    #[must_use]
    pub fn updatable(mut self) -> Self {
        self.mutability = MutabilityClass::Updatable;
        self
    }

    /// Marks the field as not comparable.
    #[must_use]
    pub fn not_comparable(mut self) -> Self {
        self.mutability = MutabilityClass::NotComparable;
        self.mode = ComparisonMode::Ignore;
        self.strict_mode = ComparisonMode::Ignore;
        self
    }

    /// Always compares the field, using `default` when the desired spec omits it.
    #[must_use]
    pub fn always(mut self, default: Value) -> Self {
        self.presence = Presence::Always(default);
        self
    }

    /// Drops the field from comparison on backends older than `version`.
    #[must_use]
    pub fn since(mut self, version: ApiVersion) -> Self {
        self.min_version = Some(version);
        self.version_gate = VersionGate::IgnoreBelow;
        self
    }

    /// Fails reconciliation on backends older than `version` when the field is desired.
    #[must_use]
    pub fn requires(mut self, version: ApiVersion) -> Self {
        self.min_version = Some(version);
        self.version_gate = VersionGate::Require;
        self
    }

    /// Applies removals before additions.
    #[must_use]
    pub fn remove_first(mut self) -> Self {
        self.update_order = UpdateOrder::RemoveThenAdd;
        self
    }

    /// Requires the field in every desired spec.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Returns true if `name` is this field's canonical name or an alias.
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }

    /// Returns true if the field holds a list or map and can tolerate extras.
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::StringList
                | FieldKind::StringMap
                | FieldKind::Env
                | FieldKind::Ports
                | FieldKind::Mounts
                | FieldKind::Networks
                | FieldKind::Secrets
        )
    }

    /// Returns true if this field is active on a backend of the given version.
    #[must_use]
    pub fn supported_on(&self, backend: &ApiVersion) -> bool {
        self.min_version
            .as_ref()
            .is_none_or(|minimum| backend.satisfies(minimum))
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exact => "exact",
            Self::UnorderedSet => "unordered set",
            Self::NumericWithUnits => "numeric",
            Self::AllowMorePresent => "allow more present",
            Self::Ignore => "ignore",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for MutabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Updatable => "updatable",
            Self::ForcesRecreation => "recreate",
            Self::NotComparable => "not comparable",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_more_present_keeps_strict_mode() {
        let policy = FieldPolicy::new("networks", FieldKind::Networks)
            .unordered()
            .allow_more_present();
        assert_eq!(policy.mode, ComparisonMode::AllowMorePresent);
        assert_eq!(policy.strict_mode, ComparisonMode::UnorderedSet);
    }

    #[test]
    fn test_not_comparable_is_ignored() {
        let policy = FieldPolicy::new("force_kill", FieldKind::Boolean).not_comparable();
        assert_eq!(policy.mode, ComparisonMode::Ignore);
        assert_eq!(policy.mutability, MutabilityClass::NotComparable);
    }

    #[test]
    fn test_supported_on() {
        let policy = FieldPolicy::new("init", FieldKind::Boolean).since(ApiVersion::docker(1, 25));
        assert!(policy.supported_on(&ApiVersion::docker(1, 41)));
        assert!(!policy.supported_on(&ApiVersion::docker(1, 24)));
    }
}
