//! Stack plan types and construction.
//!
//! This module turns a diff into the single partial update sent to the
//! control plane, and selects the services to recreate once the server has
//! answered that update.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::api::{StackPatch, StackSnapshot, VolumePatch};
use crate::config::{ConfigHasher, DesiredStack, StackOwnership};
use crate::error::{ReconcileError, Result};

use super::diff::{DiffDetail, DiffEngine, DiffType, ResourceKind};
use super::scope::ManagedScope;

/// A complete plan for one stack.
#[derive(Debug, Clone, Serialize)]
pub struct StackPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Target stack.
    pub stack_id: String,
    /// Ownership mode the plan was computed under.
    pub ownership: StackOwnership,
    /// Fingerprint of the desired stack.
    pub desired_hash: String,
    /// Planned actions, services before volumes.
    pub actions: Vec<PlannedAction>,
    /// The partial update implementing the actions.
    #[serde(skip)]
    pub patch: StackPatch,
}

/// A single planned action.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Logical service or volume name.
    pub resource_name: String,
    /// Changed fields, for updates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// Per-field values, for display.
    #[serde(skip)]
    pub details: Vec<DiffDetail>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Add a service.
    CreateService,
    /// Patch a service in place.
    UpdateService,
    /// Remove a service.
    RemoveService,
    /// Add a volume.
    CreateVolume,
    /// Remove a volume.
    RemoveVolume,
}

/// A service the server asked to recreate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecreateTarget {
    /// Logical service name.
    pub name: String,
    /// Server identifier.
    pub service_id: String,
}

/// Services to recreate and services whose recreate is suppressed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecreateSelection {
    /// Services to recreate, in name order.
    pub recreate: Vec<RecreateTarget>,
    /// Services that need a recreate but opted out of it.
    pub skipped: Vec<String>,
}

impl StackPlan {
    /// Plans the changes that bring a scoped snapshot to the desired stack.
    ///
    /// `observed` must already be filtered through `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::PartialFailure`] listing every container
    /// that could not be diffed.
    pub fn build(
        stack_id: &str,
        scope: &ManagedScope,
        desired: &DesiredStack,
        observed: &StackSnapshot,
    ) -> Result<Self> {
        let diff = DiffEngine::new().compute_diff(scope, desired, observed);
        if !diff.failures.is_empty() {
            return Err(ReconcileError::PartialFailure {
                failures: diff.failures,
            }
            .into());
        }

        let mut actions = Vec::new();
        let mut patch = StackPatch::default();

        for resource in diff.diffs {
            let action_type = match (resource.kind, resource.diff_type) {
                (_, DiffType::NoChange) => continue,
                (ResourceKind::Service, DiffType::Create) => ActionType::CreateService,
                (ResourceKind::Service, DiffType::Update) => ActionType::UpdateService,
                (ResourceKind::Service, DiffType::Remove) => ActionType::RemoveService,
                (ResourceKind::Volume, DiffType::Create) => ActionType::CreateVolume,
                (ResourceKind::Volume, DiffType::Remove) => ActionType::RemoveVolume,
                (ResourceKind::Volume, DiffType::Update) => continue,
            };

            let fields = match (&resource.patch, action_type) {
                (Some(service_patch), ActionType::UpdateService) => service_patch
                    .changed_fields()
                    .into_iter()
                    .map(String::from)
                    .collect(),
                _ => vec![],
            };

            match resource.kind {
                ResourceKind::Service => {
                    patch
                        .services
                        .insert(resource.name.clone(), resource.patch);
                }
                ResourceKind::Volume => {
                    let entry = (action_type == ActionType::CreateVolume).then_some(VolumePatch {});
                    patch.volumes.insert(resource.name.clone(), entry);
                }
            }

            actions.push(PlannedAction {
                action_type,
                resource_name: resource.name,
                fields,
                details: resource.details,
            });
        }

        let patch = scope.filter_patch(patch);
        debug!(
            "Planned {} action(s) for stack {} ({})",
            actions.len(),
            stack_id,
            scope.ownership()
        );

        Ok(Self {
            created_at: Utc::now(),
            stack_id: stack_id.to_string(),
            ownership: scope.ownership(),
            desired_hash: ConfigHasher::new().hash_desired(desired),
            actions,
            patch,
        })
    }

    /// Plans the removal of every managed service and volume.
    ///
    /// `observed` must already be filtered through `scope`, so a shared
    /// stack only loses the declared names.
    #[must_use]
    pub fn removal(stack_id: &str, scope: &ManagedScope, desired: &DesiredStack, observed: &StackSnapshot) -> Self {
        let mut actions = Vec::new();
        let mut patch = StackPatch::default();

        for service in &observed.services {
            patch.services.insert(service.service_name.clone(), None);
            actions.push(PlannedAction {
                action_type: ActionType::RemoveService,
                resource_name: service.service_name.clone(),
                fields: vec![],
                details: vec![],
            });
        }

        for volume in &observed.volumes {
            patch.volumes.insert(volume.name.clone(), None);
            actions.push(PlannedAction {
                action_type: ActionType::RemoveVolume,
                resource_name: volume.name.clone(),
                fields: vec![],
                details: vec![],
            });
        }

        Self {
            created_at: Utc::now(),
            stack_id: stack_id.to_string(),
            ownership: scope.ownership(),
            desired_hash: ConfigHasher::new().hash_desired(desired),
            actions,
            patch: scope.filter_patch(patch),
        }
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of actions of the given type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }

    /// Names of services touched by the given action type.
    #[must_use]
    pub fn names(&self, action_type: ActionType) -> Vec<String> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .map(|a| a.resource_name.clone())
            .collect()
    }
}

/// Selects the services to recreate after an update.
///
/// Only services the patch created or updated are considered. The
/// `requires_recreate` flag is taken from the server's answer as is; a
/// container that sets `no_recreate_on_change` is skipped.
///
/// # Errors
///
/// Returns [`ReconcileError::MissingServiceId`] if a service to recreate
/// has no server identifier.
pub fn recreate_targets(
    applied: &StackSnapshot,
    desired: &DesiredStack,
    patch: &StackPatch,
) -> Result<RecreateSelection> {
    let mut selection = RecreateSelection::default();

    for name in patch.upserted_services() {
        let Some(service) = applied.service(name) else {
            continue;
        };
        if !service.requires_recreate {
            continue;
        }

        let opted_out = desired
            .containers
            .get(name)
            .is_some_and(|spec| spec.no_recreate_on_change);
        if opted_out {
            selection.skipped.push(name.to_string());
            continue;
        }

        if service.id.is_empty() {
            return Err(ReconcileError::MissingServiceId {
                name: name.to_string(),
            }
            .into());
        }

        selection.recreate.push(RecreateTarget {
            name: name.to_string(),
            service_id: service.id.clone(),
        });
    }

    Ok(selection)
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::CreateService => format!("Create service '{}'", self.resource_name),
            ActionType::UpdateService => format!(
                "Update service '{}' ({})",
                self.resource_name,
                self.fields.join(", ")
            ),
            ActionType::RemoveService => format!("Remove service '{}'", self.resource_name),
            ActionType::CreateVolume => format!("Create volume '{}'", self.resource_name),
            ActionType::RemoveVolume => format!("Remove volume '{}'", self.resource_name),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CreateService | Self::CreateVolume => "create",
            Self::UpdateService => "update",
            Self::RemoveService | Self::RemoveVolume => "remove",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl std::fmt::Display for StackPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required for stack {}", self.stack_id);
        }

        writeln!(
            f,
            "Stack {} plan ({} actions, {}):",
            self.stack_id,
            self.actions.len(),
            self.ownership
        )?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }

        Ok(())
    }
}
