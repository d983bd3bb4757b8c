//! Swarm service fields.

use crate::error::Result;
use crate::model::{ApiVersion, ResourceKind, Value};
use crate::policy::{FieldKind, FieldPolicy, PolicyTable};

const SERVICE_MODES: &[&str] = &["replicated", "global"];
const UPDATE_ORDERS: &[&str] = &["stop-first", "start-first"];

/// Builds the swarm service policy table.
///
/// A service spec can be updated in place almost entirely; only the
/// scheduling mode requires removing and recreating the service.
pub fn policy_table() -> Result<PolicyTable> {
    PolicyTable::builder(ResourceKind::Service)
        .field(FieldPolicy::new("image", FieldKind::Image).required().updatable())
        .field(FieldPolicy::new("command", FieldKind::Command).updatable())
        .field(FieldPolicy::new("args", FieldKind::StringList).updatable())
        .field(FieldPolicy::new("env", FieldKind::Env).updatable())
        .field(
            FieldPolicy::new("mode", FieldKind::Choice(SERVICE_MODES))
                .always(Value::str("replicated")),
        )
        .field(FieldPolicy::new("replicas", FieldKind::Integer).updatable())
        .field(FieldPolicy::new("labels", FieldKind::StringMap).updatable())
        .field(FieldPolicy::new("container_labels", FieldKind::StringMap).updatable())
        .field(
            FieldPolicy::new("constraints", FieldKind::StringList)
                .alias("placement_constraints")
                .unordered()
                .updatable(),
        )
        .field(
            FieldPolicy::new("publish", FieldKind::Ports)
                .alias("ports")
                .unordered()
                .updatable(),
        )
        .field(
            FieldPolicy::new("networks", FieldKind::Networks)
                .unordered()
                .updatable()
                .remove_first(),
        )
        .field(
            FieldPolicy::new("mounts", FieldKind::Mounts)
                .unordered()
                .updatable(),
        )
        .field(
            FieldPolicy::new("secrets", FieldKind::Secrets)
                .unordered()
                .updatable()
                .requires(ApiVersion::docker(1, 25)),
        )
        .field(
            FieldPolicy::new("configs", FieldKind::Secrets)
                .unordered()
                .updatable()
                .requires(ApiVersion::docker(1, 30)),
        )
        .field(
            FieldPolicy::new("limit_memory", FieldKind::Bytes { unlimited: false })
                .numeric()
                .updatable(),
        )
        .field(
            FieldPolicy::new("reserve_memory", FieldKind::Bytes { unlimited: false })
                .numeric()
                .updatable(),
        )
        .field(FieldPolicy::new("limit_cpu", FieldKind::Cpus).numeric().updatable())
        .field(
            FieldPolicy::new("update_order", FieldKind::Choice(UPDATE_ORDERS))
                .updatable()
                .since(ApiVersion::docker(1, 29)),
        )
        .field(FieldPolicy::new("hostname", FieldKind::Text).updatable())
        .field(
            FieldPolicy::new("init", FieldKind::Boolean)
                .updatable()
                .since(ApiVersion::docker(1, 37)),
        )
        .field(FieldPolicy::new("healthcheck", FieldKind::Healthcheck).updatable())
        .build()
}
