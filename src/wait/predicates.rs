//! Readiness predicates for individual resource kinds.
//!
//! Each wait wraps a read in a [`Poller`] and turns "not converged yet" into
//! a retryable [`ApiError::NotReady`]. Real failures pass through untouched.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use crate::api::{
    AppInstallation, AppInstallationApi, Order, OrderApi, OrderStatus, StackApi, StackSnapshot,
};
use crate::error::{ApiError, ProviderError, ReconcileError, Result};

use super::backoff::PollOptions;
use super::context::CallContext;
use super::poller::Poller;

/// Checks whether an installation runs the version it should run.
///
/// # Errors
///
/// Returns [`ApiError::NotReady`] while the current version is unknown or
/// differs from `desired_version`.
pub fn app_version_ready(installation: &AppInstallation, desired_version: &str) -> Result<()> {
    match installation.current_version.as_deref() {
        Some(current) if current == desired_version => Ok(()),
        Some(current) => Err(ApiError::not_ready(
            format!("app installation {}", installation.id),
            format!("running {current}, want {desired_version}"),
        )
        .into()),
        None => Err(ApiError::not_ready(
            format!("app installation {}", installation.id),
            "current version not reported yet",
        )
        .into()),
    }
}

/// Checks whether every targeted service of a stack is running.
///
/// With `names` empty every observed service is targeted. A targeted name
/// that is not observed at all counts as not ready: the apply has not landed.
///
/// # Errors
///
/// Returns [`ApiError::NotReady`] listing every pending service.
pub fn stack_ready(stack: &StackSnapshot, names: &BTreeSet<String>) -> Result<()> {
    let mut pending = Vec::new();

    if names.is_empty() {
        for service in &stack.services {
            if !service.is_running() {
                pending.push(format!("{} is {}", service.service_name, service.status));
            }
        }
    } else {
        for name in names {
            match stack.service(name) {
                Some(service) if service.is_running() => {}
                Some(service) => pending.push(format!("{name} is {}", service.status)),
                None => pending.push(format!("{name} is not deployed yet")),
            }
        }
    }

    if pending.is_empty() {
        Ok(())
    } else {
        Err(ApiError::not_ready(format!("stack {}", stack.id), pending.join(", ")).into())
    }
}

/// Checks whether every named service is gone from a stack.
///
/// # Errors
///
/// Returns [`ApiError::NotReady`] listing the services still present.
pub fn services_removed(stack: &StackSnapshot, names: &BTreeSet<String>) -> Result<()> {
    let remaining: Vec<&str> = stack
        .services
        .iter()
        .filter(|s| names.contains(&s.service_name))
        .map(|s| s.service_name.as_str())
        .collect();

    if remaining.is_empty() {
        Ok(())
    } else {
        Err(ApiError::not_ready(
            format!("stack {}", stack.id),
            format!("still removing {}", remaining.join(", ")),
        )
        .into())
    }
}

/// Checks whether an order has been fulfilled.
///
/// # Errors
///
/// Returns [`ApiError::NotReady`] while the order is still open, and a fatal
/// [`ReconcileError::OrderFailed`] once it ended in any other terminal status.
pub fn order_fulfilled(order: &Order) -> Result<()> {
    match order.status {
        OrderStatus::Executed => Ok(()),
        OrderStatus::Rejected | OrderStatus::Cancelled => Err(ReconcileError::OrderFailed {
            order_id: order.order_id.clone(),
            status: order.status.to_string(),
        }
        .into()),
        OrderStatus::Pending | OrderStatus::Processing => Err(ApiError::not_ready(
            format!("order {}", order.order_id),
            order.status.to_string(),
        )
        .into()),
    }
}

/// Waits until an app installation runs `desired_version`.
///
/// Zero-valued options default to [`PollOptions::FAST`].
///
/// # Errors
///
/// Returns the first fatal read error or a timeout-shaped error if `ctx`
/// finishes first.
pub async fn wait_for_app_version(
    ctx: &CallContext,
    api: Arc<dyn AppInstallationApi>,
    installation_id: &str,
    desired_version: &str,
    options: PollOptions,
) -> Result<AppInstallation> {
    let poller = Poller::new(format!("app installation {installation_id}"))
        .with_defaults(PollOptions::FAST);

    let installation = poller
        .poll(
            ctx,
            options,
            move |ctx: CallContext, (id, version): (String, String)| {
                let api = Arc::clone(&api);
                async move {
                    let installation = api.get_app_installation(&ctx, &id).await?;
                    app_version_ready(&installation, &version)?;
                    Ok::<_, ProviderError>(installation)
                }
            },
            (installation_id.to_string(), desired_version.to_string()),
        )
        .await?;

    info!("App installation {installation_id} runs version {desired_version}");
    Ok(installation)
}

/// Waits until the targeted services of a stack are running.
///
/// `names` restricts the check to those services; an empty set targets every
/// observed service. Zero-valued options default to [`PollOptions::READINESS`].
///
/// # Errors
///
/// Returns the first fatal read error or a timeout-shaped error if `ctx`
/// finishes first.
pub async fn wait_for_stack_ready(
    ctx: &CallContext,
    api: Arc<dyn StackApi>,
    stack_id: &str,
    names: BTreeSet<String>,
    options: PollOptions,
) -> Result<StackSnapshot> {
    let poller = Poller::new(format!("stack {stack_id} readiness"))
        .with_defaults(PollOptions::READINESS);
    let target = names.len();

    let stack = poller
        .poll(
            ctx,
            options,
            move |ctx: CallContext, (id, names): (String, BTreeSet<String>)| {
                let api = Arc::clone(&api);
                async move {
                    let stack = api.get_stack(&ctx, &id).await?;
                    stack_ready(&stack, &names)?;
                    Ok::<_, ProviderError>(stack)
                }
            },
            (stack_id.to_string(), names),
        )
        .await?;

    if target == 0 {
        info!("Stack {stack_id}: all {} services running", stack.services.len());
    } else {
        info!("Stack {stack_id}: {target} managed services running");
    }
    Ok(stack)
}

/// Waits until the named services have left a stack.
///
/// Zero-valued options default to [`PollOptions::SLOW`].
///
/// # Errors
///
/// Returns the first fatal read error or a timeout-shaped error if `ctx`
/// finishes first.
pub async fn wait_for_services_removed(
    ctx: &CallContext,
    api: Arc<dyn StackApi>,
    stack_id: &str,
    names: BTreeSet<String>,
    options: PollOptions,
) -> Result<StackSnapshot> {
    let poller =
        Poller::new(format!("stack {stack_id} removal")).with_defaults(PollOptions::SLOW);
    let count = names.len();

    let stack = poller
        .poll(
            ctx,
            options,
            move |ctx: CallContext, (id, names): (String, BTreeSet<String>)| {
                let api = Arc::clone(&api);
                async move {
                    let stack = api.get_stack(&ctx, &id).await?;
                    services_removed(&stack, &names)?;
                    Ok::<_, ProviderError>(stack)
                }
            },
            (stack_id.to_string(), names),
        )
        .await?;

    info!("Stack {stack_id}: {count} service(s) removed");
    Ok(stack)
}

/// Waits until an order has been fulfilled.
///
/// Zero-valued options default to [`PollOptions::SLOW`].
///
/// # Errors
///
/// Returns [`ReconcileError::OrderFailed`] if the order is rejected or
/// cancelled, the first fatal read error, or a timeout-shaped error if `ctx`
/// finishes first.
pub async fn wait_for_order(
    ctx: &CallContext,
    api: Arc<dyn OrderApi>,
    order_id: &str,
    options: PollOptions,
) -> Result<Order> {
    let poller = Poller::new(format!("order {order_id}")).with_defaults(PollOptions::SLOW);

    let order = poller
        .poll(
            ctx,
            options,
            move |ctx: CallContext, id: String| {
                let api = Arc::clone(&api);
                async move {
                    let order = api.get_order(&ctx, &id).await?;
                    order_fulfilled(&order)?;
                    Ok::<_, ProviderError>(order)
                }
            },
            order_id.to_string(),
        )
        .await?;

    info!("Order {order_id} executed");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ObservedService, OrderReceipt, OrderRequest, ServiceStatus};
    use async_trait::async_trait;
    use mockall::mock;
    use std::time::Duration;

    mock! {
        pub Apps {}

        #[async_trait]
        impl AppInstallationApi for Apps {
            async fn get_app_installation(
                &self,
                ctx: &CallContext,
                installation_id: &str,
            ) -> Result<AppInstallation>;

            async fn request_app_version(
                &self,
                ctx: &CallContext,
                installation_id: &str,
                version: &str,
            ) -> Result<()>;
        }
    }

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

    fn service(name: &str, status: ServiceStatus) -> ObservedService {
        ObservedService {
            id: format!("svc-{name}"),
            service_name: name.to_string(),
            status,
            ..ObservedService::default()
        }
    }

    fn stack(services: Vec<ObservedService>) -> StackSnapshot {
        StackSnapshot {
            id: String::from("s-1"),
            services,
            volumes: vec![],
        }
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_app_version_predicate() {
        let mut installation = AppInstallation {
            id: String::from("a-1"),
            desired_version: String::from("2.0"),
            current_version: None,
        };
        assert!(app_version_ready(&installation, "2.0").is_err_and(|e| e.is_retryable()));

        installation.current_version = Some(String::from("1.0"));
        assert!(app_version_ready(&installation, "2.0").is_err_and(|e| e.is_retryable()));

        installation.current_version = Some(String::from("2.0"));
        assert!(app_version_ready(&installation, "2.0").is_ok());
    }

    #[test]
    fn test_stack_predicate_with_empty_filter_checks_all() {
        let snapshot = stack(vec![
            service("web", ServiceStatus::Running),
            service("sidecar", ServiceStatus::Starting),
        ]);

        let err = stack_ready(&snapshot, &BTreeSet::new()).expect_err("sidecar pending");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("sidecar is starting"));
    }

    #[test]
    fn test_stack_predicate_ignores_services_outside_filter() {
        let snapshot = stack(vec![
            service("web", ServiceStatus::Running),
            service("sidecar", ServiceStatus::Error),
        ]);

        assert!(stack_ready(&snapshot, &names(&["web"])).is_ok());
    }

    #[test]
    fn test_stack_predicate_waits_for_missing_service() {
        let snapshot = stack(vec![service("web", ServiceStatus::Running)]);

        let err = stack_ready(&snapshot, &names(&["web", "worker"])).expect_err("worker missing");
        assert!(err.to_string().contains("worker is not deployed yet"));
    }

    #[test]
    fn test_removed_predicate_ignores_other_services() {
        let snapshot = stack(vec![
            service("web", ServiceStatus::Stopped),
            service("sidecar", ServiceStatus::Running),
        ]);

        let err = services_removed(&snapshot, &names(&["web"])).expect_err("web still present");
        assert!(err.to_string().contains("still removing web"));
        assert!(services_removed(&snapshot, &names(&["worker"])).is_ok());
    }

    #[test]
    fn test_order_predicate() {
        let mut order = Order {
            order_id: String::from("o-1"),
            status: OrderStatus::Processing,
        };
        assert!(order_fulfilled(&order).is_err_and(|e| e.is_retryable()));

        order.status = OrderStatus::Rejected;
        let err = order_fulfilled(&order).expect_err("rejected order");
        assert!(!err.is_retryable());
        assert!(!err.is_cancelled());

        order.status = OrderStatus::Executed;
        assert!(order_fulfilled(&order).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_app_version_converges() {
        let mut apps = MockApps::new();
        let mut calls = 0;
        apps.expect_get_app_installation()
            .times(3)
            .returning(move |_, id| {
                calls += 1;
                if calls == 1 {
                    return Err(ApiError::not_found(format!("app installation {id}")).into());
                }
                Ok(AppInstallation {
                    id: id.to_string(),
                    desired_version: String::from("2.0"),
                    current_version: Some(String::from(if calls < 3 { "1.0" } else { "2.0" })),
                })
            });

        let installation = wait_for_app_version(
            &CallContext::background(),
            Arc::new(apps),
            "a-1",
            "2.0",
            PollOptions::default(),
        )
        .await
        .expect("installation should converge");

        assert_eq!(installation.current_version.as_deref(), Some("2.0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_order_fails_fast_on_rejection() {
        let mut orders = MockOrders::new();
        let mut calls = 0;
        orders.expect_get_order().times(2).returning(move |_, id| {
            calls += 1;
            Ok(Order {
                order_id: id.to_string(),
                status: if calls == 1 {
                    OrderStatus::Pending
                } else {
                    OrderStatus::Rejected
                },
            })
        });

        let err = wait_for_order(
            &CallContext::background(),
            Arc::new(orders),
            "o-1",
            PollOptions::default(),
        )
        .await
        .expect_err("rejected order is fatal");

        assert!(matches!(
            err,
            ProviderError::Reconcile(ReconcileError::OrderFailed { ref status, .. }) if status == "rejected"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_order_times_out_as_cancelled() {
        let mut orders = MockOrders::new();
        orders.expect_get_order().returning(|_, id| {
            Ok(Order {
                order_id: id.to_string(),
                status: OrderStatus::Processing,
            })
        });

        let ctx = CallContext::background().with_timeout(Duration::from_secs(5));
        let err = wait_for_order(&ctx, Arc::new(orders), "o-1", PollOptions::default())
            .await
            .expect_err("order never completes");

        assert!(err.is_cancelled());
        assert!(err.to_string().contains("order o-1"));
    }
}
