//! Comparison, diffing and action planning.
//!
//! This module compares normalized desired and observed states field by
//! field, aggregates the results into a diff, turns the diff into a single
//! action, and executes manifest-wide plans.

mod action;
mod compare;
mod diff;
mod executor;
mod plan;

pub use action::{Action, RecreateReason, SubOperation};
pub use compare::{Comparison, FieldOutcome, ReconcileContext, compare, compare_raw, differs};
pub use diff::{Diff, DiffEntry, ResourceDiffer};
pub use executor::{ActionResult, ExecutionReport, PlanExecutor};
pub use plan::{ActionPlanner, ReconcileOutcome, ReconcilePlan};
