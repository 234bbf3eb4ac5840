//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::api::{AppInstallation, Order, ServiceStatus, StackSnapshot};
use crate::config::ValidationResult;
use crate::planner::{ActionType, StackPlan};
use crate::reconciler::ReconcileOutcome;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Service row for table display.
#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Ports")]
    ports: String,
    #[tabled(rename = "ID")]
    id: String,
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
    #[tabled(rename = "Fields")]
    fields: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns the configured format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats a stack plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &StackPlan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &StackPlan, detailed: bool) -> String {
        if plan.is_empty() {
            return format!(
                "{} Stack {} is up to date.\n",
                "✓".green(),
                plan.stack_id
            );
        }

        let mut output = String::new();

        let _ = writeln!(output, "\nStack {} ({})", plan.stack_id, plan.ownership);
        let _ = write!(output, "   Desired hash: {}\n\n", short(&plan.desired_hash));

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                resource: a.resource_name.clone(),
                fields: Self::truncate(&a.fields.join(", "), 40),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            output.push_str("\nChanges:\n");
            for action in plan.actions.iter().filter(|a| !a.details.is_empty()) {
                let _ = writeln!(output, "   {}:", action.resource_name);
                for detail in &action.details {
                    let _ = writeln!(
                        output,
                        "     {}: {} -> {}",
                        detail.field,
                        detail.old_value.as_deref().unwrap_or("(none)").red(),
                        detail.new_value.as_deref().unwrap_or("(none)").green()
                    );
                }
            }
        }

        let creates =
            plan.count(ActionType::CreateService) + plan.count(ActionType::CreateVolume);
        let removes =
            plan.count(ActionType::RemoveService) + plan.count(ActionType::RemoveVolume);
        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to remove\n",
            creates.to_string().green(),
            plan.count(ActionType::UpdateService).to_string().yellow(),
            removes.to_string().red()
        );

        output
    }

    /// Formats the result of an apply.
    #[must_use]
    pub fn format_outcome(&self, outcome: &ReconcileOutcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
            OutputFormat::Text => {
                let elapsed = outcome.finished_at - outcome.started_at;
                let mut output = format!(
                    "{} Stack {} converged in {}s\n\n",
                    "✓".green(),
                    outcome.stack_id,
                    elapsed.num_seconds()
                );

                let _ = writeln!(output, "   Created: {}", list(&outcome.created));
                let _ = writeln!(output, "   Updated: {}", list(&outcome.updated));
                let _ = writeln!(output, "   Removed: {}", list(&outcome.removed));
                let _ = writeln!(output, "   Recreated: {}", list(&outcome.recreated));

                if !outcome.skipped_recreate.is_empty() {
                    let _ = write!(
                        output,
                        "\n{} Recreate required but disabled for: {}\n",
                        "⚠".yellow(),
                        outcome.skipped_recreate.join(", ")
                    );
                }

                output
            }
        }
    }

    /// Formats the managed part of a stack.
    #[must_use]
    pub fn format_status(&self, name: &str, snapshot: &StackSnapshot) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "name": name, "stack": snapshot });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_status_text(name, snapshot),
        }
    }

    /// Formats status as text.
    fn format_status_text(name: &str, snapshot: &StackSnapshot) -> String {
        let mut output = String::new();

        let _ = write!(output, "\nStack: {name} ({})\n\n", snapshot.id);

        if snapshot.services.is_empty() {
            output.push_str("   No managed services.\n");
            return output;
        }

        let rows: Vec<ServiceRow> = snapshot
            .services
            .iter()
            .map(|s| {
                let recreate = if s.requires_recreate { " (recreate)" } else { "" };
                ServiceRow {
                    name: s.service_name.clone(),
                    status: format!("{}{recreate}", Self::format_service_status(s.status)),
                    image: Self::truncate(&s.image, 30),
                    ports: s.ports.join(", "),
                    id: Self::truncate(&s.id, 12),
                }
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let running = snapshot.services.iter().filter(|s| s.is_running()).count();
        let total = snapshot.services.len();
        let health = if running == total {
            "running".green().to_string()
        } else if snapshot
            .services
            .iter()
            .any(|s| s.status == ServiceStatus::Error)
        {
            "failing".red().to_string()
        } else {
            "converging".yellow().to_string()
        };

        let _ = write!(output, "\nStatus: {health} ({running}/{total} running)\n");

        if !snapshot.volumes.is_empty() {
            let volumes: Vec<&str> = snapshot.volumes.iter().map(|v| v.name.as_str()).collect();
            let _ = writeln!(output, "Volumes: {}", volumes.join(", "));
        }

        output
    }

    /// Formats an application installation.
    #[must_use]
    pub fn format_app_installation(&self, installation: &AppInstallation) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(installation).unwrap_or_default(),
            OutputFormat::Text => format!(
                "{} App installation {} runs version {}\n",
                "✓".green(),
                installation.id,
                installation
                    .current_version
                    .as_deref()
                    .unwrap_or(&installation.desired_version)
            ),
        }
    }

    /// Formats an order.
    #[must_use]
    pub fn format_order(&self, order: &Order) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(order).unwrap_or_default(),
            OutputFormat::Text => {
                format!("{} Order {} is {}\n", "✓".green(), order.order_id, order.status)
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let errors: Vec<_> = result
                    .errors
                    .iter()
                    .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
                    .collect();
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": errors,
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid.\n", "✓".green())
                } else {
                    format!(
                        "{} Configuration has {} error(s):\n",
                        "✗".red(),
                        result.error_count()
                    )
                };

                for error in &result.errors {
                    let _ = writeln!(output, "   - {error}");
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output
            }
        }
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::CreateService => "+service".green().to_string(),
            ActionType::CreateVolume => "+volume".green().to_string(),
            ActionType::UpdateService => "~service".yellow().to_string(),
            ActionType::RemoveService => "-service".red().to_string(),
            ActionType::RemoveVolume => "-volume".red().to_string(),
        }
    }

    /// Formats a service status with color.
    fn format_service_status(status: ServiceStatus) -> String {
        match status {
            ServiceStatus::Running => "running".green().to_string(),
            ServiceStatus::Starting | ServiceStatus::Restarting => {
                status.to_string().yellow().to_string()
            }
            ServiceStatus::Stopped | ServiceStatus::Error => status.to_string().red().to_string(),
            ServiceStatus::Unknown => "unknown".dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

fn list(names: &[String]) -> String {
    if names.is_empty() {
        String::from("-")
    } else {
        names.join(", ")
    }
}
