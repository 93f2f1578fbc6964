//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use std::path::Path;
use tabled::{Table, Tabled};

use crate::planner::{Plan, Step};
use crate::reconciler::{Outcome, Status};
use crate::state::ObservedState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Step row for table display.
#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Op")]
    op: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &Plan) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required - {} is in the desired state.\n",
                "✓".green(),
                plan.path.display()
            );
        }

        let mut output = String::new();
        let _ = write!(output, "\nPlan for {}\n\n", plan.path.display());
        output.push_str(&Self::steps_table(&plan.steps));
        output.push('\n');

        let destructive = plan.destructive_count();
        let _ = write!(
            output,
            "\nPlan: {} steps, {} destructive\n",
            plan.step_count(),
            if destructive > 0 {
                destructive.to_string().red()
            } else {
                destructive.to_string().green()
            }
        );

        output
    }

    /// Formats a reconcile outcome.
    #[must_use]
    pub fn format_outcome(&self, outcome: &Outcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!(
                    "{} {} ({}): {}\n",
                    Self::status_symbol(outcome.status),
                    Self::format_status(outcome.status),
                    outcome.code,
                    outcome.message
                );

                let logged = outcome
                    .metadata
                    .undo_data
                    .as_ref()
                    .map(|log| ("Undo", log))
                    .or_else(|| outcome.metadata.redo_data.as_ref().map(|log| ("Redo", log)));

                if let Some((label, log)) = logged {
                    if log.is_empty() {
                        let _ = writeln!(output, "\n{label} log is empty; nothing to reverse.");
                    } else {
                        let _ = writeln!(output, "\n{label} steps:");
                        output.push_str(&Self::steps_table(log.steps()));
                        output.push('\n');
                    }
                }

                output
            }
        }
    }

    /// Formats an observed state.
    #[must_use]
    pub fn format_observed(&self, path: &Path, observed: &ObservedState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&ObservedJson { path, observed })
                .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("\n{}\n\n", path.display().to_string().bold());
                let _ = writeln!(output, "   Type: {}", observed.node_type);
                let _ = writeln!(output, "   Exists: {}", observed.exists);
                if let Some(target) = &observed.symlink_target {
                    let _ = writeln!(output, "   Symlink to: {}", target.display());
                }
                if let Some(mode) = observed.mode {
                    let _ = writeln!(output, "   Mode: {mode:04o}");
                }
                if let (Some(uid), Some(gid)) = (observed.uid, observed.gid) {
                    let _ = writeln!(output, "   Owner: {uid}:{gid}");
                }
                output
            }
        }
    }

    /// Formats an error message.
    #[must_use]
    pub fn format_error(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "error", "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}\n", "✗".red()),
        }
    }

    fn steps_table(steps: &[Step]) -> String {
        let rows: Vec<StepRow> = steps
            .iter()
            .enumerate()
            .map(|(i, step)| StepRow {
                index: i + 1,
                op: Self::format_op(step),
                detail: step.to_string(),
            })
            .collect();
        Table::new(rows).to_string()
    }

    /// Formats a step name with color.
    fn format_op(step: &Step) -> String {
        match step {
            _ if step.is_destructive() => step.name().red().to_string(),
            Step::Create { .. } | Step::CreateSymlink { .. } | Step::Restore { .. } => {
                step.name().green().to_string()
            }
            _ => step.name().yellow().to_string(),
        }
    }

    /// Formats a status with color.
    fn format_status(status: Status) -> String {
        match status {
            Status::Done => "done".green().to_string(),
            Status::NoOp => "no-op".dimmed().to_string(),
            Status::DryRun => "dry-run".cyan().to_string(),
            Status::Rejected | Status::BadInput | Status::SystemError => {
                status.to_string().red().to_string()
            }
        }
    }

    fn status_symbol(status: Status) -> String {
        if status.is_success() {
            "✓".green().to_string()
        } else {
            "✗".red().to_string()
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson<'a> {
    path: &'a Path,
    created_at: String,
    step_count: usize,
    destructive: usize,
    steps: &'a [Step],
}

impl<'a> From<&'a Plan> for PlanJson<'a> {
    fn from(plan: &'a Plan) -> Self {
        Self {
            path: &plan.path,
            created_at: plan.created_at.to_rfc3339(),
            step_count: plan.step_count(),
            destructive: plan.destructive_count(),
            steps: &plan.steps,
        }
    }
}

#[derive(serde::Serialize)]
struct ObservedJson<'a> {
    path: &'a Path,
    #[serde(flatten)]
    observed: &'a ObservedState,
}
