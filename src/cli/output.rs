//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::adapter::{LockInfo, Snapshot};
use crate::config::{ManifestConfig, ValidationResult};
use crate::planner::{Action, ExecutionReport, ReconcileOutcome, ReconcilePlan};
use crate::policy::{FieldPolicy, PolicyTable, Presence, VersionGate};
use crate::reconciler::DriftReport;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// Policy row for table display.
#[derive(Tabled)]
struct PolicyRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Aliases")]
    aliases: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Mutability")]
    mutability: String,
    #[tabled(rename = "Presence")]
    presence: String,
    #[tabled(rename = "Min API")]
    min_version: String,
}

/// Execution result row for table display.
#[derive(Tabled)]
struct ExecutionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Result")]
    result: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a reconcile plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &ReconcilePlan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    fn format_plan_text(plan: &ReconcilePlan, detailed: bool) -> String {
        if plan.is_empty() {
            return format!("{} No changes required - all resources have converged.\n", "✓".green());
        }

        let mut output = String::new();
        let _ = writeln!(output, "\nReconcile Plan");
        let _ = write!(output, "   Manifest hash: {}\n\n", short(&plan.config_hash));

        let rows: Vec<PlanActionRow> = plan
            .pending()
            .enumerate()
            .map(|(i, o)| PlanActionRow {
                index: i + 1,
                action: Self::format_action(&o.action),
                resource: o.resource.to_string(),
                details: Self::truncate(&Self::action_details(o), 50),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            for outcome in plan.pending() {
                Self::write_outcome_details(&mut output, outcome);
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to recreate, {} to remove\n",
            plan.count("create").to_string().green(),
            plan.count("update").to_string().yellow(),
            plan.count("recreate").to_string().yellow(),
            plan.count("remove").to_string().red()
        );

        output
    }

    fn write_outcome_details(output: &mut String, outcome: &ReconcileOutcome) {
        let _ = write!(output, "\n{} {}\n", Self::format_action(&outcome.action), outcome.resource);
        for entry in outcome.diff.changed_entries() {
            let _ = writeln!(output, "   {}: {} -> {}", entry.field, entry.before, entry.after);
        }
        if let Action::UpdateInPlace(ops) = &outcome.action {
            for op in ops {
                let _ = writeln!(output, "   * {op}");
            }
        }
        if !outcome.gated_fields.is_empty() {
            let _ = writeln!(
                output,
                "   {} ignored by this backend: {}",
                "⚠".yellow(),
                outcome.gated_fields.join(", ")
            );
        }
    }

    fn action_details(outcome: &ReconcileOutcome) -> String {
        match &outcome.action {
            Action::UpdateInPlace(ops) => ops
                .iter()
                .map(|op| op.field())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
                .join(", "),
            Action::Recreate(reason) => reason.to_string(),
            Action::Create => format!("{} fields", outcome.desired.fields.len()),
            Action::Remove | Action::NoOp => String::new(),
        }
    }

    /// Formats the result of executing a plan.
    #[must_use]
    pub fn format_execution(&self, report: &ExecutionReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let rows: Vec<ExecutionRow> = report
                    .results
                    .iter()
                    .map(|r| ExecutionRow {
                        index: r.index + 1,
                        action: r.action.clone(),
                        resource: r.resource.to_string(),
                        result: match (&r.error, r.converged) {
                            (Some(e), _) => format!("{} {}", "✗".red(), Self::truncate(e, 60)),
                            (None, true) => format!("{} converged", "✓".green()),
                            (None, false) => format!("{} not converged", "⚠".yellow()),
                        },
                    })
                    .collect();
                if !rows.is_empty() {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }
                let _ = writeln!(output, "\n{report}");
                output
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_converged() {
                    format!("{} No drift detected - state is converged.\n", "✓".green())
                } else {
                    let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                    for resource in &report.drifted_resources {
                        let _ = writeln!(output, "   - {resource}");
                    }
                    let _ = write!(
                        output,
                        "\n{}/{} resources have drifted ({} observed on the backend).\n",
                        report.drifted_resources.len(),
                        report.total_resources,
                        report.observed_count
                    );
                    output
                }
            }
        }
    }

    /// Formats a validation result with a manifest summary.
    #[must_use]
    pub fn format_validation(
        &self,
        manifest: &ManifestConfig,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                    "resources": manifest.resources.len(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Manifest is valid!", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Manifest has {} error(s):", "✗".red(), result.error_count());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                if show_warnings && result.warning_count() > 0 {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                let _ = writeln!(output, "\nManifest summary:");
                let _ = writeln!(output, "   Project: {}", manifest.project.name);
                let _ = writeln!(output, "   Environment: {}", manifest.project.environment);
                let _ = writeln!(output, "   Resources: {}", manifest.resources.len());
                let _ = writeln!(output, "   Snapshot: {}", manifest.backend.snapshot);
                output
            }
        }
    }

    /// Formats policy tables.
    #[must_use]
    pub fn format_policies(&self, tables: &[PolicyTable]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(tables).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                for table in tables {
                    let _ = write!(output, "\n{} ({} fields)\n", table.kind().to_string().bold(), table.len());
                    let rows: Vec<PolicyRow> = table.fields().map(Self::policy_row).collect();
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }
                output
            }
        }
    }

    fn policy_row(policy: &FieldPolicy) -> PolicyRow {
        PolicyRow {
            field: if policy.required {
                format!("{}*", policy.name)
            } else {
                policy.name.to_string()
            },
            aliases: policy.aliases.join(", "),
            mode: policy.mode.to_string(),
            mutability: policy.mutability.to_string(),
            presence: match &policy.presence {
                Presence::IfDesired => String::from("if desired"),
                Presence::Always(default) => format!("always ({default})"),
            },
            min_version: policy.min_version.as_ref().map_or_else(String::new, |v| {
                let gate = match policy.version_gate {
                    VersionGate::IgnoreBelow => "ignored below",
                    VersionGate::Require => "required",
                };
                format!("{v} ({gate})")
            }),
        }
    }

    /// Formats a snapshot and its lock.
    #[must_use]
    pub fn format_snapshot(&self, snapshot: &Snapshot, lock: Option<&LockInfo>) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "snapshot": snapshot, "lock": lock });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "\nSnapshot (format {})\n", snapshot.format);
                let _ = writeln!(output, "   API version: {}", snapshot.api_version);
                let _ = writeln!(output, "   Last updated: {}", snapshot.last_updated);
                let _ = writeln!(output, "   Resources: {}", snapshot.resources.len());
                for key in snapshot.resources.keys() {
                    let _ = writeln!(output, "     - {key}");
                }

                match lock {
                    Some(lock) if !lock.is_expired() => {
                        let _ = writeln!(
                            output,
                            "   Lock: held by {} ({}s remaining)",
                            lock.holder,
                            lock.remaining_secs()
                        );
                    }
                    _ => {
                        let _ = writeln!(output, "   Lock: none");
                    }
                }

                if !snapshot.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", snapshot.history.len());
                    for entry in snapshot.history.iter().rev().take(5) {
                        let _ = writeln!(
                            output,
                            "     {} - {} {}",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.action,
                            entry.resource
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats an acquired lock.
    #[must_use]
    pub fn format_lock(&self, lock: &LockInfo) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(lock).unwrap_or_default(),
            OutputFormat::Text => format!(
                "{} Snapshot locked: {} (holder {}, expires {})\n",
                "✓".green(),
                lock.lock_id,
                lock.holder,
                lock.expires_at.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }

    /// Formats an action with color.
    fn format_action(action: &Action) -> String {
        match action {
            Action::Create => "+create".green().to_string(),
            Action::UpdateInPlace(_) => "~update".yellow().to_string(),
            Action::Recreate(_) => "-/+recreate".yellow().to_string(),
            Action::Remove => "-remove".red().to_string(),
            Action::NoOp => "noop".dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}
