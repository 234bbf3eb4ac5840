//! Control plane API integration module.
//!
//! The provider core consumes the control plane only through the traits in
//! this module: typed reads that are safe to repeat, and typed mutating calls
//! that are issued at most once per logical step. [`ControlPlaneClient`] is
//! the HTTP implementation used by the binary.

mod client;
mod types;

use async_trait::async_trait;

use crate::error::Result;
use crate::wait::CallContext;

pub use client::{ControlPlaneClient, DEFAULT_API_URL};
pub use types::{
    AppInstallation, ObservedService, ObservedVolume, Order, OrderReceipt, OrderRequest,
    OrderStatus, ServicePatch, ServiceStatus, StackPatch, StackSnapshot, VolumePatch,
};

/// Container stack operations.
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Reads the full stack. Safe to repeat.
    async fn get_stack(&self, ctx: &CallContext, stack_id: &str) -> Result<StackSnapshot>;

    /// Applies a partial update and returns the stack as the server sees it
    /// afterwards, including per-service recreate requirements.
    async fn update_stack(
        &self,
        ctx: &CallContext,
        stack_id: &str,
        patch: &StackPatch,
    ) -> Result<StackSnapshot>;

    /// Recreates a single service by its server identifier.
    async fn recreate_service(
        &self,
        ctx: &CallContext,
        stack_id: &str,
        service_id: &str,
    ) -> Result<()>;
}

/// Application installation operations.
#[async_trait]
pub trait AppInstallationApi: Send + Sync {
    /// Reads an installation. Safe to repeat.
    async fn get_app_installation(
        &self,
        ctx: &CallContext,
        installation_id: &str,
    ) -> Result<AppInstallation>;

    /// Requests that an installation move to the given version.
    async fn request_app_version(
        &self,
        ctx: &CallContext,
        installation_id: &str,
        version: &str,
    ) -> Result<()>;
}

/// Order operations.
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// Places a new order.
    async fn create_order(&self, ctx: &CallContext, request: &OrderRequest) -> Result<OrderReceipt>;

    /// Reads an order. Safe to repeat.
    async fn get_order(&self, ctx: &CallContext, order_id: &str) -> Result<Order>;
}
