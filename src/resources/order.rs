//! Orders placed with the control plane.

use std::sync::Arc;

use tracing::info;

use crate::api::{Order, OrderApi, OrderRequest};
use crate::config::PollingConfig;
use crate::error::Result;
use crate::wait::{CallContext, PollOptions, wait_for_order};

/// Places orders and waits for their fulfilment.
pub struct OrderResource {
    api: Arc<dyn OrderApi>,
    options: PollOptions,
}

impl OrderResource {
    /// Creates a new resource. Waits use [`PollOptions::SLOW`] unless
    /// overridden.
    #[must_use]
    pub fn new(api: Arc<dyn OrderApi>) -> Self {
        Self {
            api,
            options: PollOptions::default(),
        }
    }

    /// Creates a resource whose waits use the `polling.order` entry.
    #[must_use]
    pub fn from_config(api: Arc<dyn OrderApi>, polling: &PollingConfig) -> Self {
        Self::new(api).with_options(polling.order_options())
    }

    /// Sets the wait options.
    #[must_use]
    pub const fn with_options(mut self, options: PollOptions) -> Self {
        self.options = options;
        self
    }

    /// Places an order and waits until it is executed.
    ///
    /// The order is created exactly once; only the status read is repeated.
    ///
    /// # Errors
    ///
    /// Returns the creation error as is,
    /// [`crate::error::ReconcileError::OrderFailed`] if the order is
    /// rejected or cancelled, or a timeout-shaped error if `ctx` ends first.
    pub async fn place(&self, ctx: &CallContext, request: &OrderRequest) -> Result<Order> {
        let receipt = self.api.create_order(ctx, request).await?;
        info!("Placed {} order {}", request.order_type, receipt.order_id);

        wait_for_order(ctx, Arc::clone(&self.api), &receipt.order_id, self.options).await
    }

    /// Reads an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the order cannot be read.
    pub async fn read(&self, ctx: &CallContext, order_id: &str) -> Result<Order> {
        self.api.get_order(ctx, order_id).await
    }
}

impl std::fmt::Debug for OrderResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderResource")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{OrderReceipt, OrderStatus};
    use crate::config::PollSettings;
    use crate::error::{ApiError, ProviderError, ReconcileError};
    use std::time::Duration;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Orders {}

        #[async_trait]
        impl OrderApi for Orders {
            async fn create_order(
                &self,
                ctx: &CallContext,
                request: &OrderRequest,
            ) -> Result<OrderReceipt>;

            async fn get_order(&self, ctx: &CallContext, order_id: &str) -> Result<Order>;
        }
    }

    fn request() -> OrderRequest {
        OrderRequest {
            order_type: String::from("projectHosting"),
            order_data: serde_json::json!({ "name": "shop" }),
        }
    }

    fn receipt() -> OrderReceipt {
        OrderReceipt {
            order_id: String::from("o-7"),
        }
    }

    #[test]
    fn test_from_config_falls_back_to_default_entry() {
        let polling = PollingConfig {
            default: PollSettings {
                initial_delay_ms: 2_000,
                max_delay_ms: 60_000,
                backoff_factor: 2.0,
            },
            ..PollingConfig::default()
        };

        let resource = OrderResource::from_config(Arc::new(MockOrders::new()), &polling);

        assert_eq!(resource.options.initial_delay, Duration::from_secs(2));
        assert_eq!(resource.options.max_delay, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_waits_through_read_after_write_lag() {
        let mut orders = MockOrders::new();
        orders
            .expect_create_order()
            .times(1)
            .returning(|_, _| Ok(receipt()));

        let mut reads = 0;
        orders.expect_get_order().times(3).returning(move |_, id| {
            reads += 1;
            match reads {
                1 => Err(ApiError::not_found(format!("order {id}")).into()),
                2 => Ok(Order {
                    order_id: id.to_string(),
                    status: OrderStatus::Processing,
                }),
                _ => Ok(Order {
                    order_id: id.to_string(),
                    status: OrderStatus::Executed,
                }),
            }
        });

        let order = OrderResource::new(Arc::new(orders))
            .place(&CallContext::background(), &request())
            .await
            .expect("order should be executed");

        assert_eq!(order.order_id, "o-7");
        assert_eq!(order.status, OrderStatus::Executed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_order_is_fatal() {
        let mut orders = MockOrders::new();
        orders
            .expect_create_order()
            .times(1)
            .returning(|_, _| Ok(receipt()));
        orders.expect_get_order().times(1).returning(|_, id| {
            Ok(Order {
                order_id: id.to_string(),
                status: OrderStatus::Cancelled,
            })
        });

        let err = OrderResource::new(Arc::new(orders))
            .place(&CallContext::background(), &request())
            .await
            .expect_err("cancelled order");

        assert!(matches!(
            err,
            ProviderError::Reconcile(ReconcileError::OrderFailed { ref status, .. }) if status == "cancelled"
        ));
    }

    #[test]
    fn test_failed_creation_never_polls() {
        let mut orders = MockOrders::new();
        orders
            .expect_create_order()
            .times(1)
            .returning(|_, _| Err(ApiError::api_error(402, "payment required").into()));
        orders.expect_get_order().never();

        let resource = OrderResource::new(Arc::new(orders));
        let result = tokio_test::block_on(resource.place(&CallContext::background(), &request()));

        tokio_test::assert_err!(result);
    }
}
