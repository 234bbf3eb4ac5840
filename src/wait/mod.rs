//! Convergence waits.
//!
//! This module turns "issue a remote command, then poll until a predicate
//! holds" into a bounded, cancellable operation:
//! - [`classify`] sorts errors into retryable, cancelled and fatal
//! - [`BackoffPolicy`] produces the delays between attempts
//! - [`CallContext`] carries the caller's deadline and cancellation
//! - [`Poller`] drives the attempts
//! - the `wait_for_*` functions encode per-resource readiness

mod backoff;
mod classify;
mod context;
mod poller;
mod predicates;

pub use backoff::{BackoffPolicy, PollOptions};
pub use classify::{ErrorClass, classify};
pub use context::{CallContext, CancelHandle, DoneReason};
pub use poller::{Poller, poll};
pub use predicates::{
    app_version_ready, order_fulfilled, services_removed, stack_ready, wait_for_app_version,
    wait_for_order, wait_for_services_removed, wait_for_stack_ready,
};
