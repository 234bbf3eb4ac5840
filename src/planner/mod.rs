//! Planning module for stack reconciliation.
//!
//! This module holds the synchronous half of stack reconciliation: scoping
//! observed state to the managed names, comparing it with the declaration,
//! and turning the result into one partial update plus recreate targets.

mod diff;
mod plan;
mod scope;

pub use diff::{DiffDetail, DiffEngine, DiffResult, DiffType, ResourceDiff, ResourceKind, normalize_image};
pub use plan::{ActionType, PlannedAction, RecreateSelection, RecreateTarget, StackPlan, recreate_targets};
pub use scope::ManagedScope;
