//! Reconciler for container stacks.
//!
//! This module drives one stack towards its declaration: it reads the
//! stack, scopes it to the managed names, sends a single partial update,
//! recreates the services the server asks to recreate, and waits until the
//! managed services run.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::api::{StackApi, StackSnapshot};
use crate::config::{DesiredStack, StackOwnership};
use crate::error::{ProviderError, ReconcileError, Result};
use crate::planner::{ActionType, ManagedScope, RecreateSelection, StackPlan, recreate_targets};
use crate::wait::{CallContext, PollOptions, wait_for_services_removed, wait_for_stack_ready};

/// Reconciler for one or more container stacks.
pub struct StackReconciler {
    /// Control plane stack API.
    api: Arc<dyn StackApi>,
    /// Options for readiness waits after an in-place update.
    readiness: PollOptions,
    /// Options for waits after a recreate or a removal.
    recreate: PollOptions,
}

/// Result of a reconciliation run.
#[derive(Debug, Serialize)]
pub struct ReconcileOutcome {
    /// Target stack.
    pub stack_id: String,
    /// Ownership mode used.
    pub ownership: StackOwnership,
    /// Fingerprint of the desired stack.
    pub desired_hash: String,
    /// Services created by this run.
    pub created: Vec<String>,
    /// Services patched in place by this run.
    pub updated: Vec<String>,
    /// Services removed by this run.
    pub removed: Vec<String>,
    /// Services recreated after the update.
    pub recreated: Vec<String>,
    /// Services that needed a recreate but opted out.
    pub skipped_recreate: Vec<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the managed services were observed running.
    pub finished_at: DateTime<Utc>,
    /// Converged state of the managed services and volumes.
    pub state: StackSnapshot,
}

impl StackReconciler {
    /// Creates a new reconciler. Waits use the call site defaults.
    #[must_use]
    pub fn new(api: Arc<dyn StackApi>) -> Self {
        Self {
            api,
            readiness: PollOptions::default(),
            recreate: PollOptions::default(),
        }
    }

    /// Sets the options for readiness waits after an in-place update.
    #[must_use]
    pub const fn with_readiness_options(mut self, options: PollOptions) -> Self {
        self.readiness = options;
        self
    }

    /// Sets the options for waits after a recreate or a removal.
    #[must_use]
    pub const fn with_recreate_options(mut self, options: PollOptions) -> Self {
        self.recreate = options;
        self
    }

    /// Reads the managed part of a stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack cannot be read.
    pub async fn read(
        &self,
        ctx: &CallContext,
        stack_id: &str,
        desired: &DesiredStack,
        ownership: StackOwnership,
    ) -> Result<StackSnapshot> {
        let scope = ManagedScope::new(ownership, desired);
        self.read_scoped(ctx, stack_id, &scope).await
    }

    /// Computes the plan for a stack without changing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack cannot be read, or
    /// [`ReconcileError::PartialFailure`] if containers fail to build.
    pub async fn plan(
        &self,
        ctx: &CallContext,
        stack_id: &str,
        desired: &DesiredStack,
        ownership: StackOwnership,
    ) -> Result<StackPlan> {
        let scope = ManagedScope::new(ownership, desired);
        let observed = self.read_scoped(ctx, stack_id, &scope).await?;
        StackPlan::build(stack_id, &scope, desired, &observed)
    }

    /// Brings a stack to its declaration and waits until it runs.
    ///
    /// Container build failures are collected and reported together before
    /// anything is sent. Once the update is sent, the first failing call
    /// stops the run; changes already accepted by the server stay in place.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::PartialFailure`],
    /// [`ReconcileError::ApplyFailed`], [`ReconcileError::RecreateFailed`],
    /// or a timeout-shaped error if `ctx` ends before convergence.
    pub async fn reconcile(
        &self,
        ctx: &CallContext,
        stack_id: &str,
        desired: &DesiredStack,
        ownership: StackOwnership,
    ) -> Result<ReconcileOutcome> {
        let started_at = Utc::now();
        info!("Reconciling stack {} ({})", stack_id, ownership);

        let scope = ManagedScope::new(ownership, desired);
        let observed = self.read_scoped(ctx, stack_id, &scope).await?;
        let plan = StackPlan::build(stack_id, &scope, desired, &observed)?;

        let selection = if plan.patch.is_empty() {
            info!("Stack {} is up to date", stack_id);
            RecreateSelection::default()
        } else {
            self.apply(ctx, &scope, &plan, desired).await?
        };

        for name in &selection.skipped {
            warn!(
                "Service {} needs a recreate for its changes to take effect, skipped by configuration",
                name
            );
        }

        for target in &selection.recreate {
            info!("Recreating service {} ({})", target.name, target.service_id);
            self.api
                .recreate_service(ctx, stack_id, &target.service_id)
                .await
                .map_err(|e| {
                    error!("Recreate of service {} failed: {}", target.name, e);
                    ProviderError::from(ReconcileError::RecreateFailed {
                        stack_id: stack_id.to_string(),
                        name: target.name.clone(),
                        source: Box::new(e),
                    })
                })?;
        }

        self.await_removals(ctx, stack_id, &plan).await?;

        let state = if scope.desired_services().is_empty() {
            debug!("Stack {} declares no containers, nothing to wait for", stack_id);
            self.read_scoped(ctx, stack_id, &scope).await?
        } else {
            let options = if selection.recreate.is_empty() {
                self.readiness
            } else {
                self.recreate
            };
            let converged = wait_for_stack_ready(
                ctx,
                Arc::clone(&self.api),
                stack_id,
                scope.desired_services().clone(),
                options,
            )
            .await?;
            scope.filter_snapshot(converged)
        };

        info!(
            "Stack {} converged: {} created, {} updated, {} recreated",
            stack_id,
            plan.count(ActionType::CreateService),
            plan.count(ActionType::UpdateService),
            selection.recreate.len()
        );

        Ok(ReconcileOutcome {
            stack_id: stack_id.to_string(),
            ownership,
            desired_hash: plan.desired_hash.clone(),
            created: plan.names(ActionType::CreateService),
            updated: plan.names(ActionType::UpdateService),
            removed: plan.names(ActionType::RemoveService),
            recreated: selection.recreate.into_iter().map(|t| t.name).collect(),
            skipped_recreate: selection.skipped,
            started_at,
            finished_at: Utc::now(),
            state,
        })
    }

    /// Removes the managed services and volumes of a stack and waits until
    /// the services are gone.
    ///
    /// Under shared ownership only the declared names are removed.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::ApplyFailed`] if the removal is rejected,
    /// or a timeout-shaped error if `ctx` ends first.
    pub async fn destroy(
        &self,
        ctx: &CallContext,
        stack_id: &str,
        desired: &DesiredStack,
        ownership: StackOwnership,
    ) -> Result<StackPlan> {
        info!("Removing managed entries from stack {} ({})", stack_id, ownership);

        let scope = ManagedScope::new(ownership, desired);
        let observed = self.read_scoped(ctx, stack_id, &scope).await?;
        let plan = StackPlan::removal(stack_id, &scope, desired, &observed);

        if plan.patch.is_empty() {
            info!("Stack {} has nothing to remove", stack_id);
            return Ok(plan);
        }

        self.send_patch(ctx, stack_id, &plan).await?;
        self.await_removals(ctx, stack_id, &plan).await?;

        info!("Stack {}: removed {} entries", stack_id, plan.action_count());
        Ok(plan)
    }

    /// Sends the plan's update and selects the services to recreate.
    async fn apply(
        &self,
        ctx: &CallContext,
        scope: &ManagedScope,
        plan: &StackPlan,
        desired: &DesiredStack,
    ) -> Result<RecreateSelection> {
        info!(
            "Applying {} change(s) to stack {}",
            plan.action_count(),
            plan.stack_id
        );
        for action in &plan.actions {
            debug!("  {}", action);
        }

        let applied = self.send_patch(ctx, &plan.stack_id, plan).await?;
        let applied = scope.filter_snapshot(applied);

        recreate_targets(&applied, desired, &plan.patch)
    }

    /// Waits until the services the plan removes have left the stack.
    async fn await_removals(
        &self,
        ctx: &CallContext,
        stack_id: &str,
        plan: &StackPlan,
    ) -> Result<()> {
        let names: BTreeSet<String> = plan.patch.removed_services().map(String::from).collect();
        if names.is_empty() {
            return Ok(());
        }

        debug!("Waiting for {} removed service(s) to leave stack {}", names.len(), stack_id);
        wait_for_services_removed(ctx, Arc::clone(&self.api), stack_id, names, self.recreate)
            .await
            .map(|_| ())
    }

    /// Issues the single update call for a plan.
    async fn send_patch(
        &self,
        ctx: &CallContext,
        stack_id: &str,
        plan: &StackPlan,
    ) -> Result<StackSnapshot> {
        self.api
            .update_stack(ctx, stack_id, &plan.patch)
            .await
            .map_err(|e| {
                error!("Update of stack {} failed: {}", stack_id, e);
                ReconcileError::ApplyFailed {
                    stack_id: stack_id.to_string(),
                    source: Box::new(e),
                }
                .into()
            })
    }

    async fn read_scoped(
        &self,
        ctx: &CallContext,
        stack_id: &str,
        scope: &ManagedScope,
    ) -> Result<StackSnapshot> {
        let stack = self.api.get_stack(ctx, stack_id).await?;
        debug!(
            "Stack {}: {} service(s), {} volume(s) observed",
            stack_id,
            stack.services.len(),
            stack.volumes.len()
        );
        Ok(scope.filter_snapshot(stack))
    }
}

impl std::fmt::Debug for StackReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackReconciler")
            .field("readiness", &self.readiness)
            .field("recreate", &self.recreate)
            .finish_non_exhaustive()
    }
}
