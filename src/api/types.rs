//! Control plane API types and data structures.
//!
//! These types mirror the JSON exchanged with the control plane. Observed
//! types are read-only snapshots; every reconciliation pass fetches fresh ones.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A container stack as reported by the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackSnapshot {
    /// Stack identifier.
    pub id: String,
    /// Services currently declared in the stack.
    #[serde(default)]
    pub services: Vec<ObservedService>,
    /// Volumes currently declared in the stack.
    #[serde(default)]
    pub volumes: Vec<ObservedVolume>,
}

/// A service within a stack, as deployed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObservedService {
    /// Server-assigned identifier.
    pub id: String,
    /// Logical service name (the desired container key).
    pub service_name: String,
    /// Deployed image reference.
    #[serde(default)]
    pub image: String,
    /// Deployed command.
    #[serde(default)]
    pub command: Vec<String>,
    /// Deployed entrypoint.
    #[serde(default)]
    pub entrypoint: Vec<String>,
    /// Deployed environment.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Deployed port mappings.
    #[serde(default)]
    pub ports: Vec<String>,
    /// Deployed volume mounts.
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Service description.
    #[serde(default)]
    pub description: String,
    /// Current runtime status.
    #[serde(default)]
    pub status: ServiceStatus,
    /// Whether the declared changes only take effect after a recreate.
    /// Computed by the server.
    #[serde(default)]
    pub requires_recreate: bool,
}

/// A volume within a stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObservedVolume {
    /// Volume name.
    pub name: String,
}

/// Service runtime status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Service is running.
    Running,
    /// Service is being created or started.
    Starting,
    /// Service is restarting.
    Restarting,
    /// Service is stopped.
    Stopped,
    /// Service failed.
    Error,
    /// Unknown status.
    #[default]
    #[serde(other)]
    Unknown,
}

/// A partial update of a stack.
///
/// Services and volumes absent from the maps are left untouched; a `None`
/// entry removes the named service or volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackPatch {
    /// Service changes keyed by logical name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, Option<ServicePatch>>,
    /// Volume changes keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, Option<VolumePatch>>,
}

/// Changed fields of a single service. Unset fields are not sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePatch {
    /// New image reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// New command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// New entrypoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    /// New environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<BTreeMap<String, String>>,
    /// New port mappings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
    /// New volume mounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<String>>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Declaration of a volume. Volumes carry no attributes beyond their name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumePatch {}

/// An application installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppInstallation {
    /// Installation identifier.
    pub id: String,
    /// Version the installation should run.
    pub desired_version: String,
    /// Version the installation currently runs, once known.
    #[serde(default)]
    pub current_version: Option<String>,
}

/// A request to place an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Kind of order (for example `projectHosting`).
    pub order_type: String,
    /// Order-specific payload.
    #[serde(default)]
    pub order_data: serde_json::Value,
}

/// Receipt returned when an order is placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    /// Identifier of the new order.
    pub order_id: String,
}

/// An order and its fulfilment status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order identifier.
    pub order_id: String,
    /// Fulfilment status.
    #[serde(default)]
    pub status: OrderStatus,
}

/// Order fulfilment status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted, not yet processed.
    #[default]
    Pending,
    /// Being fulfilled.
    Processing,
    /// Fulfilled.
    Executed,
    /// Rejected by the control plane.
    Rejected,
    /// Cancelled before fulfilment.
    Cancelled,
}

impl StackSnapshot {
    /// Finds a service by logical name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ObservedService> {
        self.services.iter().find(|s| s.service_name == name)
    }

    /// Returns true if a volume with the given name exists.
    #[must_use]
    pub fn has_volume(&self, name: &str) -> bool {
        self.volumes.iter().any(|v| v.name == name)
    }
}

impl ObservedService {
    /// Returns true if this service is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.status, ServiceStatus::Running)
    }
}

impl StackPatch {
    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.volumes.is_empty()
    }

    /// Names of services this patch creates or updates.
    pub fn upserted_services(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .filter(|(_, patch)| patch.is_some())
            .map(|(name, _)| name.as_str())
    }

    /// Names of services this patch removes.
    pub fn removed_services(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .filter(|(_, patch)| patch.is_none())
            .map(|(name, _)| name.as_str())
    }
}

impl ServicePatch {
    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.image.is_none()
            && self.command.is_none()
            && self.entrypoint.is_none()
            && self.environment.is_none()
            && self.ports.is_none()
            && self.volumes.is_none()
            && self.description.is_none()
    }

    /// Names of the fields this patch sets, in declaration order.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.image.is_some() {
            fields.push("image");
        }
        if self.command.is_some() {
            fields.push("command");
        }
        if self.entrypoint.is_some() {
            fields.push("entrypoint");
        }
        if self.environment.is_some() {
            fields.push("environment");
        }
        if self.ports.is_some() {
            fields.push("ports");
        }
        if self.volumes.is_some() {
            fields.push("volumes");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        fields
    }
}

impl OrderStatus {
    /// Returns true once the order can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Rejected | Self::Cancelled)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Starting => "starting",
            Self::Restarting => "restarting",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_serializes_only_changed_fields() {
        let mut patch = StackPatch::default();
        patch.services.insert(
            String::from("web"),
            Some(ServicePatch {
                environment: Some(BTreeMap::from([(
                    String::from("MODE"),
                    String::from("prod"),
                )])),
                ..ServicePatch::default()
            }),
        );
        patch.services.insert(String::from("old"), None);

        let json = serde_json::to_value(&patch).expect("serialize patch");

        assert_eq!(
            json,
            serde_json::json!({
                "services": {
                    "old": null,
                    "web": { "environment": { "MODE": "prod" } }
                }
            })
        );
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let service: ObservedService = serde_json::from_value(serde_json::json!({
            "id": "svc-1",
            "serviceName": "web",
            "status": "hibernating",
            "requiresRecreate": true
        }))
        .expect("deserialize service");

        assert_eq!(service.status, ServiceStatus::Unknown);
        assert!(service.requires_recreate);
        assert!(service.environment.is_empty());
    }

    #[test]
    fn test_patch_name_iterators() {
        let mut patch = StackPatch::default();
        patch
            .services
            .insert(String::from("a"), Some(ServicePatch::default()));
        patch.services.insert(String::from("b"), None);

        assert_eq!(patch.upserted_services().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(patch.removed_services().collect::<Vec<_>>(), vec!["b"]);
        assert!(!patch.is_empty());
    }
}
