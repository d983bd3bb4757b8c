//! Planned actions and their sub-operations.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::model::{ResourceSpec, Value};

/// What must happen to a resource to converge it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "details", rename_all = "snake_case")]
pub enum Action {
    /// Nothing to do.
    NoOp,
    /// The resource does not exist yet.
    Create,
    /// Apply these sub-operations to the live resource, in order.
    UpdateInPlace(Vec<SubOperation>),
    /// Destroy and recreate the resource; subsumes all pending changes.
    Recreate(RecreateReason),
    /// The resource should not exist.
    Remove,
}

/// One step of an in-place update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SubOperation {
    /// Replace the whole field value.
    Set {
        /// Field name.
        field: String,
        /// New value; `null` clears the field.
        value: Value,
    },
    /// Add an item to a list field.
    Add {
        /// Field name.
        field: String,
        /// Item to add.
        item: Value,
    },
    /// Remove an item from a list field.
    Remove {
        /// Field name.
        field: String,
        /// Item to remove.
        item: Value,
    },
    /// Set one key of a map field.
    SetEntry {
        /// Field name.
        field: String,
        /// Map key.
        key: String,
        /// New value for the key.
        value: Value,
    },
    /// Delete one key of a map field.
    RemoveEntry {
        /// Field name.
        field: String,
        /// Map key.
        key: String,
    },
}

/// Why a resource has to be recreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecreateReason {
    /// Changed fields that cannot be updated in place.
    pub fields: Vec<String>,
}

impl Action {
    /// Short name used in logs and tables.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NoOp => "noop",
            Self::Create => "create",
            Self::UpdateInPlace(_) => "update",
            Self::Recreate(_) => "recreate",
            Self::Remove => "remove",
        }
    }

    /// Returns true for [`Action::NoOp`].
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }

    /// Returns the fields a resource would hold after this action.
    ///
    /// `current` is the existing canonical state, if any; `desired` is the
    /// effective desired spec. `None` means the resource no longer exists.
    #[must_use]
    pub fn apply_to(
        &self,
        current: Option<&BTreeMap<String, Value>>,
        desired: &ResourceSpec,
    ) -> Option<BTreeMap<String, Value>> {
        match self {
            Self::NoOp => current.cloned(),
            Self::Create | Self::Recreate(_) => Some(desired.fields.clone()),
            Self::UpdateInPlace(ops) => {
                let mut fields = current.cloned().unwrap_or_default();
                for op in ops {
                    op.apply_to(&mut fields);
                }
                Some(fields)
            }
            Self::Remove => None,
        }
    }
}

impl SubOperation {
    /// Field the operation touches.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Set { field, .. }
            | Self::Add { field, .. }
            | Self::Remove { field, .. }
            | Self::SetEntry { field, .. }
            | Self::RemoveEntry { field, .. } => field,
        }
    }

    /// Applies the operation to canonical resource fields.
    pub fn apply_to(&self, fields: &mut BTreeMap<String, Value>) {
        match self {
            Self::Set { field, value } => {
                if value.is_null() {
                    fields.remove(field);
                } else {
                    fields.insert(field.clone(), value.clone());
                }
            }
            Self::Add { field, item } => {
                let slot = fields.entry(field.clone()).or_insert_with(|| Value::List(Vec::new()));
                match slot {
                    Value::List(items) => {
                        if !items.contains(item) {
                            items.push(item.clone());
                        }
                    }
                    other => *other = Value::List(vec![item.clone()]),
                }
            }
            Self::Remove { field, item } => {
                if let Some(Value::List(items)) = fields.get_mut(field) {
                    items.retain(|existing| existing != item);
                }
            }
            Self::SetEntry { field, key, value } => {
                let slot = fields.entry(field.clone()).or_insert_with(|| Value::Map(BTreeMap::new()));
                match slot {
                    Value::Map(entries) => {
                        entries.insert(key.clone(), value.clone());
                    }
                    other => *other = Value::entry(key.clone(), value.clone()),
                }
            }
            Self::RemoveEntry { field, key } => {
                if let Some(Value::Map(entries)) = fields.get_mut(field) {
                    entries.remove(key);
                }
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpdateInPlace(ops) => write!(f, "update ({} operations)", ops.len()),
            Self::Recreate(reason) => write!(f, "recreate ({reason})"),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl fmt::Display for SubOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { field, value } => write!(f, "set {field} = {value}"),
            Self::Add { field, item } => write!(f, "add {item} to {field}"),
            Self::Remove { field, item } => write!(f, "remove {item} from {field}"),
            Self::SetEntry { field, key, value } => write!(f, "set {field}[{key}] = {value}"),
            Self::RemoveEntry { field, key } => write!(f, "remove {field}[{key}]"),
        }
    }
}

impl fmt::Display for RecreateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cannot be changed in place", self.fields.join(", "))
    }
}
