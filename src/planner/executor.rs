//! Plan executor.
//!
//! Applies the pending outcomes of a [`ReconcilePlan`] one resource at a
//! time and verifies each applied resource with a fresh reconciliation.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::adapter::ExecutionAdapter;
use crate::config::{ConfigHasher, ManifestConfig};
use crate::error::{ConfigError, ConvergeError, Result};
use crate::model::ResourceId;
use crate::reconciler::Reconciler;

use super::plan::{ReconcileOutcome, ReconcilePlan};

const SKIPPED: &str = "Skipped after an earlier failure";

/// Executor for reconcile plans.
pub struct PlanExecutor<'a, A: ExecutionAdapter> {
    /// Reconciler used to apply and verify.
    reconciler: Reconciler<'a, A>,
    /// Manifest the plan was built from.
    manifest: &'a ManifestConfig,
    /// Whether to continue after a failed action.
    continue_on_error: bool,
}

/// Result of executing a single action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    /// Position of the outcome in the plan.
    pub index: usize,
    /// Resource the action targeted.
    pub resource: ResourceId,
    /// Action name.
    pub action: String,
    /// Whether the action succeeded.
    pub success: bool,
    /// Whether the resource converged after the action.
    pub converged: bool,
    /// Error message, if the action failed or was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of executing a whole plan.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// Individual action results.
    pub results: Vec<ActionResult>,
    /// Number of actions attempted.
    pub total_executed: usize,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of actions skipped after a failure.
    pub skipped: usize,
    /// Whether every action succeeded and converged.
    pub success: bool,
}

impl<'a, A: ExecutionAdapter> PlanExecutor<'a, A> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(adapter: &'a A, manifest: &'a ManifestConfig) -> Self {
        Self {
            reconciler: Reconciler::new(adapter),
            manifest,
            continue_on_error: false,
        }
    }

    /// Sets whether to continue after a failed action.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Executes a plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan was built from a different manifest, or
    /// if an action fails with a fatal error. Other action failures are
    /// recorded in the report.
    pub async fn execute(&self, plan: &ReconcilePlan) -> Result<ExecutionReport> {
        let manifest_hash = ConfigHasher::new().hash_manifest(self.manifest)?;
        if !ConfigHasher::hashes_match(&manifest_hash, &plan.config_hash) {
            return Err(ConfigError::ValidationError {
                message: String::from("Plan was created from a different manifest; plan again"),
                field: None,
            }
            .into());
        }

        let pending: Vec<(usize, &ReconcileOutcome)> = plan
            .outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| !o.is_noop())
            .collect();
        info!("Executing reconcile plan with {} actions", pending.len());

        let mut results = Vec::with_capacity(pending.len());
        let mut halted = false;

        for (index, outcome) in pending {
            if halted {
                warn!("Skipping {} for {}", outcome.action.name(), outcome.resource);
                results.push(ActionResult::new(index, outcome).failed(SKIPPED));
                continue;
            }

            let result = match self.execute_outcome(outcome).await {
                Ok(converged) => ActionResult {
                    success: true,
                    converged,
                    ..ActionResult::new(index, outcome)
                },
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Failed to apply {} to {}: {e}", outcome.action.name(), outcome.resource);
                    ActionResult::new(index, outcome).failed(e.to_string())
                }
            };

            if !result.success && !self.continue_on_error {
                halted = true;
            }
            results.push(result);
        }

        let skipped = results
            .iter()
            .filter(|r| r.error.as_deref() == Some(SKIPPED))
            .count();
        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful - skipped;

        Ok(ExecutionReport {
            total_executed: results.len() - skipped,
            successful,
            failed,
            skipped,
            success: failed == 0 && skipped == 0 && results.iter().all(|r| r.converged),
            results,
        })
    }

    async fn execute_outcome(&self, outcome: &ReconcileOutcome) -> Result<bool> {
        let resource = self.manifest.resource(&outcome.resource).ok_or_else(|| {
            ConvergeError::internal(format!("{} is not declared in the manifest", outcome.resource))
        })?;
        let table = resource.policy_table()?;
        let report = self.reconciler.apply(outcome, &table).await?;
        Ok(report.converged)
    }
}

impl ActionResult {
    fn new(index: usize, outcome: &ReconcileOutcome) -> Self {
        Self {
            index,
            resource: outcome.resource.clone(),
            action: outcome.action.name().to_string(),
            success: false,
            converged: false,
            error: None,
        }
    }

    fn failed(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

impl ExecutionReport {
    /// Returns true if all actions succeeded and converged.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.success
    }
}

impl std::fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.total_executed, self.successful, self.failed, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SnapshotAdapter;
    use crate::config::ConfigParser;
    use crate::model::{ResourceKind, ResourceSpec};
    use crate::planner::{Action, Diff};
    use serde_json::json;
    use tempfile::TempDir;

    const MANIFEST: &str = r"
project:
  name: shop
resources:
  - name: frontend
    type: network
  - name: web
    type: container
    image: nginx:1.25
    memory: 64M
  - name: cache
    type: volume
    state: absent
";

    fn setup() -> (SnapshotAdapter, ManifestConfig, TempDir) {
        let temp = TempDir::new().unwrap();
        let adapter = SnapshotAdapter::new(temp.path().join("snapshot.json"));
        let manifest = ConfigParser::new().parse_yaml(MANIFEST, None).unwrap();
        (adapter, manifest, temp)
    }

    /// An update against a resource the snapshot does not hold fails.
    fn broken_outcome(name: &str) -> ReconcileOutcome {
        ReconcileOutcome {
            resource: ResourceId::new(ResourceKind::Network, name),
            action: Action::UpdateInPlace(Vec::new()),
            diff: Diff::default(),
            changed: true,
            gated_fields: Vec::new(),
            desired: ResourceSpec::new(ResourceKind::Network),
        }
    }

    #[tokio::test]
    async fn test_execute_converges_manifest() {
        let (adapter, manifest, _temp) = setup();
        adapter
            .put_observed(&ResourceId::new(ResourceKind::Volume, "cache"), serde_json::Map::new())
            .await
            .unwrap();

        let plan = Reconciler::new(&adapter).plan_manifest(&manifest).await.unwrap();
        let report = PlanExecutor::new(&adapter, &manifest).execute(&plan).await.unwrap();

        assert!(report.all_successful());
        assert_eq!(report.to_string(), "Executed 3 actions: 3 successful, 0 failed, 0 skipped");

        let again = Reconciler::new(&adapter).plan_manifest(&manifest).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(again.config_hash, plan.config_hash);
    }

    #[tokio::test]
    async fn test_stale_plan_is_rejected() {
        let (adapter, manifest, _temp) = setup();
        let plan = Reconciler::new(&adapter).plan_manifest(&manifest).await.unwrap();

        let mut edited = manifest.clone();
        edited.resources[1].params.insert(String::from("memory"), json!("128M"));
        assert!(PlanExecutor::new(&adapter, &edited).execute(&plan).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_halts_without_continue_on_error() {
        let (adapter, manifest, _temp) = setup();
        let mut plan = Reconciler::new(&adapter).plan_manifest(&manifest).await.unwrap();
        plan.outcomes[0] = broken_outcome("frontend");

        let report = PlanExecutor::new(&adapter, &manifest).execute(&plan).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.results[1].error.as_deref(), Some(SKIPPED));
    }

    #[tokio::test]
    async fn test_continue_on_error() {
        let (adapter, manifest, _temp) = setup();
        let mut plan = Reconciler::new(&adapter).plan_manifest(&manifest).await.unwrap();
        plan.outcomes[0] = broken_outcome("frontend");

        let report = PlanExecutor::new(&adapter, &manifest)
            .with_continue_on_error(true)
            .execute(&plan)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.successful, 1);
        assert_eq!(report.skipped, 0);
        assert!(report.results[1].converged);
    }
}
