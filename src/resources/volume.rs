//! Volume fields.

use crate::error::Result;
use crate::model::{ResourceKind, Value};
use crate::policy::{FieldKind, FieldPolicy, PolicyTable};

/// Builds the volume policy table. Volumes are immutable.
pub fn policy_table() -> Result<PolicyTable> {
    PolicyTable::builder(ResourceKind::Volume)
        .field(FieldPolicy::new("driver", FieldKind::Text).always(Value::str("local")))
        .field(FieldPolicy::new("driver_options", FieldKind::StringMap).alias("driver_opts"))
        .field(FieldPolicy::new("labels", FieldKind::StringMap))
        .build()
}
