//! Reconciler.
//!
//! Ties the stages together for one resource: fetch the backend version and
//! observed state from the adapter, normalize both documents, diff them, and
//! plan an action. Planning never mutates anything; [`Reconciler::apply`]
//! hands an outcome to the adapter and re-reconciles to verify convergence.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapter::{ExecutionAdapter, ExecutionResult};
use crate::config::{ConfigHasher, ManifestConfig};
use crate::error::Result;
use crate::model::{ObservedState, RawSpec, ResourceId, ResourceSpec};
use crate::normalize::SpecNormalizer;
use crate::planner::{Action, ActionPlanner, Diff, ReconcileContext, ReconcileOutcome, ReconcilePlan, ResourceDiffer};
use crate::policy::PolicyTable;

/// Reconciles resources against one execution adapter.
pub struct Reconciler<'a, A: ExecutionAdapter> {
    /// Adapter used to observe and mutate resources.
    adapter: &'a A,
    /// Spec normalizer.
    normalizer: SpecNormalizer,
    /// Resource differ.
    differ: ResourceDiffer,
    /// Action planner.
    planner: ActionPlanner,
    /// Manifest and outcome hasher.
    hasher: ConfigHasher,
}

/// Result of applying one outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    /// What the adapter reported.
    pub execution: ExecutionResult,
    /// Action a fresh reconciliation plans after the apply.
    pub follow_up: Action,
    /// Whether the resource converged.
    pub converged: bool,
}

/// Report of drift detection.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Resources whose observed state differs from the manifest.
    pub drifted_resources: Vec<String>,
    /// Total number of resources in the manifest.
    pub total_resources: usize,
    /// Number of resources that exist on the backend.
    pub observed_count: usize,
}

impl<'a, A: ExecutionAdapter> Reconciler<'a, A> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(adapter: &'a A) -> Self {
        Self {
            adapter,
            normalizer: SpecNormalizer::new(),
            differ: ResourceDiffer::new(),
            planner: ActionPlanner::new(),
            hasher: ConfigHasher::new(),
        }
    }

    /// Reconciles one resource without applying anything.
    ///
    /// The backend version and observed state are each fetched exactly once
    /// and fully materialized before diffing.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error verbatim, or a normalization, version or
    /// policy error from planning.
    pub async fn reconcile(&self, id: &ResourceId, raw: &RawSpec, table: &PolicyTable) -> Result<ReconcileOutcome> {
        let version = self.adapter.backend_version().await?;
        let observed = self.adapter.fetch_state(id).await?;
        debug!(
            "Reconciling {id} against {} backend API {version} ({})",
            self.adapter.backend_type(),
            if observed.is_some() { "exists" } else { "missing" }
        );

        self.plan_resource(id, raw, observed.as_ref(), table, &ReconcileContext::new(version))
    }

    /// Plans the action for a resource from already fetched inputs.
    ///
    /// # Errors
    ///
    /// Returns a normalization, version or policy error.
    pub fn plan_resource(
        &self,
        id: &ResourceId,
        raw: &RawSpec,
        observed: Option<&RawSpec>,
        table: &PolicyTable,
        ctx: &ReconcileContext,
    ) -> Result<ReconcileOutcome> {
        let desired = self.normalizer.normalize(raw, table)?;
        self.plan_canonical(id, &desired, observed, table, ctx)
    }

    fn plan_canonical(
        &self,
        id: &ResourceId,
        desired: &ResourceSpec,
        observed: Option<&RawSpec>,
        table: &PolicyTable,
        ctx: &ReconcileContext,
    ) -> Result<ReconcileOutcome> {
        let (diff, action) = match observed {
            Some(raw) => {
                let observed = self.normalizer.normalize_observed(raw, table)?;
                let diff = self.differ.diff(desired, &observed, table, ctx)?;
                let action = self.planner.plan(&diff, &table.mutability_table())?;
                (diff, action)
            }
            None => {
                let diff = self.differ.diff(desired, &ObservedState::default(), table, ctx)?;
                (diff, Action::Create)
            }
        };

        let effective = self.differ.effective_desired(desired, table, &diff);
        Ok(outcome(id, action, diff, effective))
    }

    /// Reconciles a resource that should not exist.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error verbatim.
    pub async fn reconcile_absent(&self, id: &ResourceId) -> Result<ReconcileOutcome> {
        let observed = self.adapter.fetch_state(id).await?;
        let action = if observed.is_some() { Action::Remove } else { Action::NoOp };
        Ok(outcome(id, action, Diff::default(), ResourceSpec::new(id.kind)))
    }

    /// Reconciles every resource of a manifest, in manifest order.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub async fn plan_manifest(&self, manifest: &ManifestConfig) -> Result<ReconcilePlan> {
        info!(
            "Planning {}/{} ({} resources)",
            manifest.project.name,
            manifest.project.environment,
            manifest.resources.len()
        );

        let mut outcomes = Vec::with_capacity(manifest.resources.len());
        for resource in &manifest.resources {
            let id = resource.id();
            let outcome = if resource.is_present() {
                let table = resource.policy_table()?;
                self.reconcile(&id, &resource.params, &table).await?
            } else {
                self.reconcile_absent(&id).await?
            };
            debug!("{id}: {}", outcome.action);
            outcomes.push(outcome);
        }

        let plan = ReconcilePlan::new(self.hasher.hash_manifest(manifest)?, outcomes);
        info!(
            "Plan: {} create, {} update, {} recreate, {} remove",
            plan.count("create"),
            plan.count("update"),
            plan.count("recreate"),
            plan.count("remove")
        );
        Ok(plan)
    }

    /// Checks for drift without applying changes.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered while planning.
    pub async fn check_drift(&self, manifest: &ManifestConfig) -> Result<DriftReport> {
        info!(
            "Checking for drift in {}/{}",
            manifest.project.name, manifest.project.environment
        );

        let plan = self.plan_manifest(manifest).await?;
        let drifted_resources: Vec<String> = plan.pending().map(|o| o.resource.key()).collect();
        let observed_count = plan
            .outcomes
            .iter()
            .zip(&manifest.resources)
            .filter(|(o, r)| !matches!(o.action, Action::Create) && (r.is_present() || !o.is_noop()))
            .count();

        Ok(DriftReport {
            has_drift: !drifted_resources.is_empty(),
            drifted_resources,
            total_resources: manifest.resources.len(),
            observed_count,
        })
    }

    /// Applies an outcome and re-reconciles the resource.
    ///
    /// `table` must be the table the outcome was planned with.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error verbatim, or a planning error from the
    /// verification pass.
    pub async fn apply(&self, outcome: &ReconcileOutcome, table: &PolicyTable) -> Result<ApplyReport> {
        let id = &outcome.resource;
        if outcome.is_noop() {
            return Ok(ApplyReport {
                execution: ExecutionResult::new(id, &outcome.action),
                follow_up: Action::NoOp,
                converged: true,
            });
        }

        info!("Applying {} to {id}", outcome.action);
        let execution = self
            .adapter
            .apply_action(id, &outcome.action, &outcome.desired)
            .await?;

        let follow_up = if matches!(outcome.action, Action::Remove) {
            self.reconcile_absent(id).await?.action
        } else {
            let version = self.adapter.backend_version().await?;
            let observed = self.adapter.fetch_state(id).await?;
            self.plan_canonical(
                id,
                &outcome.desired,
                observed.as_ref(),
                table,
                &ReconcileContext::new(version),
            )?
            .action
        };

        let converged = follow_up.is_noop();
        if !converged {
            warn!("{id} did not converge: a fresh reconciliation plans {follow_up}");
        }

        Ok(ApplyReport {
            execution,
            follow_up,
            converged,
        })
    }
}

fn outcome(id: &ResourceId, action: Action, diff: Diff, desired: ResourceSpec) -> ReconcileOutcome {
    ReconcileOutcome {
        resource: id.clone(),
        changed: !action.is_noop(),
        gated_fields: diff.gated_fields().to_vec(),
        action,
        diff,
        desired,
    }
}

impl DriftReport {
    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_drift {
            writeln!(f, "Drift detected:")?;
            for resource in &self.drifted_resources {
                writeln!(f, "  - {resource}")?;
            }
        } else {
            write!(f, "No drift detected - state is converged")?;
        }
        Ok(())
    }
}
