// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # docker-converge
//!
//! A declarative, idempotent desired-state diff and reconciliation engine for
//! Docker resources.
//!
//! ## Overview
//!
//! Given a desired resource spec and the observed state of the same resource,
//! the engine decides the minimal action that converges one onto the other:
//!
//! - Normalize both sides into canonical values (units, port shorthands,
//!   `key=value` lists, aliases)
//! - Compare field by field under per-field policies (exact, unordered set,
//!   numeric with units, allow more present, ignore)
//! - Plan a single action: no-op, create, update in place, recreate or remove
//! - Gate fields on the backend API version
//!
//! ## Architecture
//!
//! 1. **Desired State**: Declared in `converge.yaml`
//! 2. **Observed State**: Fetched through an [`adapter::ExecutionAdapter`]
//! 3. **Reconciler**: Normalizes, diffs and plans, then applies through the adapter
//!
//! ## Modules
//!
//! - [`model`]: Resource identities, canonical values and API versions
//! - [`policy`]: Per-field comparison and mutability policies
//! - [`resources`]: Policy tables for containers, services, networks and volumes
//! - [`normalize`]: Raw document normalization
//! - [`planner`]: Comparison, diffing, action planning and plan execution
//! - [`reconciler`]: Reconciliation engine
//! - [`adapter`]: Execution adapters and the snapshot backend
//! - [`config`]: Manifest parsing, validation and hashing
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: my-stack
//!
//! resources:
//!   - name: web
//!     type: container
//!     image: nginx:1.25
//!     memory: 256M
//!     published_ports:
//!       - "8080:80"
//!     comparisons:
//!       labels: strict
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod adapter;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod planner;
pub mod policy;
pub mod reconciler;
pub mod resources;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::{ExecutionAdapter, ExecutionResult, SnapshotAdapter};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, ManifestConfig};
pub use error::{ConvergeError, Result};
pub use model::{ApiVersion, ResourceId, ResourceKind, ResourceSpec, Value};
pub use normalize::SpecNormalizer;
pub use planner::{Action, Diff, PlanExecutor, ReconcileOutcome, ReconcilePlan, SubOperation};
pub use policy::{ComparisonMode, FieldPolicy, MutabilityClass, PolicyTable};
pub use reconciler::{ApplyReport, DriftReport, Reconciler};
