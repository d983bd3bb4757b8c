//! Execution adapters.
//!
//! The engine never talks to a container runtime itself. It asks an
//! [`ExecutionAdapter`] for observed state and the backend version, and hands
//! it planned actions to carry out.

mod lock;
mod snapshot;

pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use snapshot::{HistoryEntry, SNAPSHOT_FORMAT, Snapshot, SnapshotAdapter};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::model::{ApiVersion, RawSpec, ResourceId, ResourceSpec};
use crate::planner::Action;

/// Result of applying one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Resource the action was applied to.
    pub resource: ResourceId,
    /// Name of the applied action.
    pub action: String,
    /// Number of sub-operations carried out.
    pub operations: usize,
    /// Optional detail from the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Collaborator that observes and mutates resources on a backend.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Fetches the raw observed state of a resource.
    ///
    /// Returns `None` if the resource does not exist.
    async fn fetch_state(&self, id: &ResourceId) -> Result<Option<RawSpec>>;

    /// Applies an action. `desired` is the effective desired spec.
    async fn apply_action(
        &self,
        id: &ResourceId,
        action: &Action,
        desired: &ResourceSpec,
    ) -> Result<ExecutionResult>;

    /// Returns the API version the backend speaks.
    async fn backend_version(&self) -> Result<ApiVersion>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl ExecutionAdapter for Box<dyn ExecutionAdapter> {
    async fn fetch_state(&self, id: &ResourceId) -> Result<Option<RawSpec>> {
        (**self).fetch_state(id).await
    }

    async fn apply_action(
        &self,
        id: &ResourceId,
        action: &Action,
        desired: &ResourceSpec,
    ) -> Result<ExecutionResult> {
        (**self).apply_action(id, action, desired).await
    }

    async fn backend_version(&self) -> Result<ApiVersion> {
        (**self).backend_version().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}

impl ExecutionResult {
    /// Creates a result for an applied action.
    #[must_use]
    pub fn new(resource: &ResourceId, action: &Action) -> Self {
        let operations = match action {
            Action::UpdateInPlace(ops) => ops.len(),
            Action::NoOp => 0,
            _ => 1,
        };
        Self {
            resource: resource.clone(),
            action: action.name().to_string(),
            operations,
            message: None,
        }
    }

    /// Attaches a detail message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
