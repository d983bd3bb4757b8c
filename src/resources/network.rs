//! Network fields.

use crate::error::Result;
use crate::model::{ApiVersion, ResourceKind, Value};
use crate::policy::{FieldKind, FieldPolicy, PolicyTable};

/// Builds the network policy table.
///
/// Docker cannot reconfigure an existing network, so only the set of
/// connected containers is updatable.
pub fn policy_table() -> Result<PolicyTable> {
    PolicyTable::builder(ResourceKind::Network)
        .field(FieldPolicy::new("driver", FieldKind::Text).always(Value::str("bridge")))
        .field(FieldPolicy::new("driver_options", FieldKind::StringMap))
        .field(FieldPolicy::new("ipam_driver", FieldKind::Text))
        .field(FieldPolicy::new("ipam_config", FieldKind::Any).unordered())
        .field(FieldPolicy::new("internal", FieldKind::Boolean))
        .field(FieldPolicy::new("labels", FieldKind::StringMap))
        .field(FieldPolicy::new("enable_ipv6", FieldKind::Boolean))
        .field(FieldPolicy::new("attachable", FieldKind::Boolean).since(ApiVersion::docker(1, 26)))
        .field(FieldPolicy::new("scope", FieldKind::Text).since(ApiVersion::docker(1, 30)))
        .field(
            FieldPolicy::new("connected", FieldKind::StringList)
                .unordered()
                .allow_more_present()
                .updatable()
                .remove_first(),
        )
        .build()
}
