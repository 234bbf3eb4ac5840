// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Hostplane Provider
//!
//! The convergence core of an infrastructure-as-code provider for a hosting
//! control plane whose API performs work asynchronously and only offers
//! eventually-consistent reads.
//!
//! ## Overview
//!
//! Every lifecycle operation follows the same shape: issue a mutating call
//! once, then poll a safe-to-repeat read until a readiness predicate holds.
//! The crate provides:
//!
//! - A generic, cancellable [`wait::Poller`] with exponential backoff
//! - An error classifier deciding which failures are worth another attempt
//! - Readiness predicates for stacks, app installations and orders
//! - A [`reconciler::StackReconciler`] that manages a subset of a shared
//!   container stack without touching services owned by anyone else
//!
//! ## Architecture
//!
//! 1. **Desired State**: declared in `hostplane.yaml`
//! 2. **Observed State**: read from the control plane and scoped to the
//!    names this configuration owns
//! 3. **Plan**: one partial update containing only differing fields
//! 4. **Convergence**: apply, recreate where the server demands it, then
//!    poll until every managed service runs
//!
//! ## Modules
//!
//! - [`api`]: Control plane traits, wire types and HTTP client
//! - [`config`]: Configuration parsing and validation
//! - [`wait`]: Backoff, error classification, cancellation and polling
//! - [`planner`]: Scoping, diff computation and stack plans
//! - [`reconciler`]: Stack reconciliation engine
//! - [`resources`]: App installation and order operations
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! api:
//!   base_url: https://api.hostplane.example/v2
//!   token_env: HOSTPLANE_API_TOKEN
//!
//! stacks:
//!   - name: shop
//!     stack_id: st-123
//!     ownership: shared
//!     containers:
//!       web:
//!         image: nginx:1.27
//!         ports: ["80/tcp"]
//!         mounts: ["data:/var/www:ro"]
//!     volumes:
//!       data: {}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod reconciler;
pub mod resources;
pub mod wait;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::{ControlPlaneClient, StackSnapshot};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, ProviderConfig};
pub use error::{ProviderError, Result};
pub use planner::{DiffEngine, ManagedScope, StackPlan};
pub use reconciler::{ReconcileOutcome, StackReconciler};
pub use resources::{AppInstallationResource, OrderResource};
pub use wait::{CallContext, ErrorClass, PollOptions, Poller, classify};
