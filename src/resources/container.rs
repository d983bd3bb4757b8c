//! Standalone container fields.

use crate::error::Result;
use crate::model::{ApiVersion, ResourceKind, Value};
use crate::policy::{FieldKind, FieldPolicy, PolicyTable};

/// Accepted restart policies.
const RESTART_POLICIES: &[&str] = &["no", "on-failure", "always", "unless-stopped"];

/// Builds the container policy table.
///
/// Resource limits and the restart policy can be changed on a running
/// container; everything else needs a new container.
pub fn policy_table() -> Result<PolicyTable> {
    PolicyTable::builder(ResourceKind::Container)
        .field(FieldPolicy::new("image", FieldKind::Image).required())
        .field(FieldPolicy::new("command", FieldKind::Command))
        .field(FieldPolicy::new("entrypoint", FieldKind::Command))
        .field(FieldPolicy::new("env", FieldKind::Env))
        .field(FieldPolicy::new("labels", FieldKind::StringMap).allow_more_present())
        .field(
            FieldPolicy::new("published_ports", FieldKind::Ports)
                .alias("ports")
                .unordered(),
        )
        .field(FieldPolicy::new("mounts", FieldKind::Mounts).alias("volumes").unordered())
        .field(
            FieldPolicy::new("networks", FieldKind::Networks)
                .unordered()
                .allow_more_present()
                .updatable()
                .remove_first(),
        )
        .field(
            FieldPolicy::new("memory", FieldKind::Bytes { unlimited: false })
                .alias("memory_limit")
                .numeric()
                .updatable(),
        )
        .field(
            FieldPolicy::new("memory_reservation", FieldKind::Bytes { unlimited: false })
                .numeric()
                .updatable(),
        )
        .field(
            FieldPolicy::new("memory_swap", FieldKind::Bytes { unlimited: true })
                .numeric()
                .updatable(),
        )
        .field(
            FieldPolicy::new("cpus", FieldKind::Cpus)
                .numeric()
                .updatable()
                .requires(ApiVersion::docker(1, 25)),
        )
        .field(FieldPolicy::new("cpu_shares", FieldKind::Integer).updatable())
        .field(FieldPolicy::new("pids_limit", FieldKind::Integer).updatable())
        .field(
            FieldPolicy::new("restart_policy", FieldKind::Choice(RESTART_POLICIES))
                .alias("restart")
                .updatable(),
        )
        .field(FieldPolicy::new("restart_retries", FieldKind::Integer).updatable())
        .field(FieldPolicy::new("healthcheck", FieldKind::Healthcheck))
        .field(FieldPolicy::new("hostname", FieldKind::Text))
        .field(FieldPolicy::new("user", FieldKind::Text))
        .field(FieldPolicy::new("working_dir", FieldKind::Text))
        .field(FieldPolicy::new("privileged", FieldKind::Boolean))
        .field(FieldPolicy::new("read_only", FieldKind::Boolean))
        .field(FieldPolicy::new("init", FieldKind::Boolean).since(ApiVersion::docker(1, 25)))
        .field(FieldPolicy::new("dns_servers", FieldKind::StringList))
        .field(
            FieldPolicy::new("capabilities", FieldKind::StringList)
                .alias("cap_add")
                .unordered(),
        )
        .field(
            FieldPolicy::new("storage_opts", FieldKind::StringMap)
                .since(ApiVersion::docker(1, 35)),
        )
        .field(FieldPolicy::new("runtime", FieldKind::Text).always(Value::str("runc")))
        .field(FieldPolicy::new("force_kill", FieldKind::Boolean).not_comparable())
        .build()
}
