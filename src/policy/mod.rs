//! Field policies and per-resource policy tables.
//!
//! A [`FieldPolicy`] tells the engine how to normalize one field, how to
//! compare it, whether a change can be applied in place, and which backend
//! version it needs. A [`PolicyTable`] collects them for one resource kind.

mod field;
mod table;

pub use field::{
    ComparisonMode, FieldKind, FieldPolicy, MutabilityClass, Presence, UpdateOrder, VersionGate,
};
pub use table::{
    ComparisonOverride, FieldMutability, MutabilityTable, PolicyTable, PolicyTableBuilder, WILDCARD,
};
