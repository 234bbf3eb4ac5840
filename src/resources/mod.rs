//! Resource operations built on the convergence waits.
//!
//! Each resource issues its mutating call once, then hands the safe-to-repeat
//! read to a [`crate::wait::Poller`] until the resource has converged.

mod app;
mod order;

pub use app::AppInstallationResource;
pub use order::OrderResource;
