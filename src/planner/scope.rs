//! Ownership scope of a stack.
//!
//! Under shared ownership other actors may own services and volumes in the
//! same remote stack. [`ManagedScope`] is the single filter applied at every
//! read and write boundary, so the diff logic only ever sees managed names.

use std::collections::BTreeSet;
use tracing::debug;

use crate::api::{StackPatch, StackSnapshot};
use crate::config::{DesiredStack, StackOwnership};

/// The set of remote names a reconciliation is allowed to see and touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedScope {
    ownership: StackOwnership,
    services: BTreeSet<String>,
    volumes: BTreeSet<String>,
}

impl ManagedScope {
    /// Builds the scope for a desired stack.
    #[must_use]
    pub fn new(ownership: StackOwnership, desired: &DesiredStack) -> Self {
        Self {
            ownership,
            services: desired.container_names(),
            volumes: desired.volume_names(),
        }
    }

    /// Returns the ownership mode.
    #[must_use]
    pub const fn ownership(&self) -> StackOwnership {
        self.ownership
    }

    /// Returns the desired service names.
    #[must_use]
    pub const fn desired_services(&self) -> &BTreeSet<String> {
        &self.services
    }

    /// Returns true if a service with this name may be read or changed.
    #[must_use]
    pub fn owns_service(&self, name: &str) -> bool {
        match self.ownership {
            StackOwnership::Exclusive => true,
            StackOwnership::SharedDefault => self.services.contains(name),
        }
    }

    /// Returns true if a volume with this name may be read or changed.
    #[must_use]
    pub fn owns_volume(&self, name: &str) -> bool {
        match self.ownership {
            StackOwnership::Exclusive => true,
            StackOwnership::SharedDefault => self.volumes.contains(name),
        }
    }

    /// Drops every service and volume outside the scope from a snapshot.
    #[must_use]
    pub fn filter_snapshot(&self, mut stack: StackSnapshot) -> StackSnapshot {
        let before = (stack.services.len(), stack.volumes.len());

        stack.services.retain(|s| self.owns_service(&s.service_name));
        stack.volumes.retain(|v| self.owns_volume(&v.name));

        let hidden_services = before.0 - stack.services.len();
        let hidden_volumes = before.1 - stack.volumes.len();
        if hidden_services > 0 || hidden_volumes > 0 {
            debug!(
                "Stack {}: ignoring {} foreign service(s) and {} foreign volume(s)",
                stack.id, hidden_services, hidden_volumes
            );
        }

        stack
    }

    /// Drops every entry outside the scope from a patch.
    #[must_use]
    pub fn filter_patch(&self, mut patch: StackPatch) -> StackPatch {
        patch.services.retain(|name, _| self.owns_service(name));
        patch.volumes.retain(|name, _| self.owns_volume(name));
        patch
    }
}
