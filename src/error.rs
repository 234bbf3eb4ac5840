//! Error types for the hostplane provider core.
//!
//! This module provides the error hierarchy shared by every layer of the
//! provider: configuration, the control plane API vocabulary, convergence
//! waits, and stack reconciliation.

use std::path::PathBuf;
use thiserror::Error;

use crate::wait::{ErrorClass, classify};

/// The main error type for the hostplane provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Control plane API errors.
    #[error("Control plane API error: {0}")]
    Api(#[from] ApiError),

    /// Convergence wait errors.
    #[error("{0}")]
    Wait(#[from] WaitError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// No stack with the requested name is declared.
    #[error("Stack not declared in configuration: {name}")]
    UnknownStack {
        /// The requested stack name.
        name: String,
    },
}

/// Control plane API errors.
///
/// The first three variants form the "not yet" vocabulary that fetch
/// functions surface while the remote system is still converging.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The resource exists but has not reached the awaited state yet.
    #[error("{resource} is not ready: {reason}")]
    NotReady {
        /// The resource being awaited.
        resource: String,
        /// What is still missing.
        reason: String,
    },

    /// The resource could not be found.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// The missing resource.
        resource: String,
    },

    /// Access to the resource was denied.
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Message returned by the API.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Rate limited.
    #[error("API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error communicating with the control plane: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from the control plane: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Errors produced while waiting for convergence.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The caller cancelled the operation.
    #[error("{operation} was cancelled after {attempts} attempts")]
    Cancelled {
        /// The awaited operation.
        operation: String,
        /// Number of fetch attempts issued.
        attempts: u32,
    },

    /// The caller's deadline passed before convergence.
    #[error("Timed out waiting for {operation} after {attempts} attempts{}", .last_error.as_ref().map(|e| format!(" (last: {e})")).unwrap_or_default())]
    DeadlineExceeded {
        /// The awaited operation.
        operation: String,
        /// Number of fetch attempts issued.
        attempts: u32,
        /// The last "not ready" reason observed, if any.
        last_error: Option<String>,
    },

    /// The background fetch loop stopped without reporting an outcome.
    #[error("Poll worker for {operation} stopped unexpectedly")]
    WorkerStopped {
        /// The awaited operation.
        operation: String,
    },
}

/// A build failure for a single container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFailure {
    /// Logical container name.
    pub name: String,
    /// Why the container could not be diffed or built.
    pub reason: String,
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// One or more containers failed to diff or build.
    #[error("{} container(s) failed validation: {}", .failures.len(), format_failures(.failures))]
    PartialFailure {
        /// Every per-container failure, in name order.
        failures: Vec<ContainerFailure>,
    },

    /// The stack apply call failed.
    #[error("Failed to apply changes to stack {stack_id}: {source}")]
    ApplyFailed {
        /// Target stack.
        stack_id: String,
        /// Underlying error.
        #[source]
        source: Box<ProviderError>,
    },

    /// A service recreate call failed.
    #[error("Failed to recreate service '{name}' in stack {stack_id}: {source}")]
    RecreateFailed {
        /// Target stack.
        stack_id: String,
        /// Logical service name.
        name: String,
        /// Underlying error.
        #[source]
        source: Box<ProviderError>,
    },

    /// The server reported a service without an identifier.
    #[error("Service '{name}' has no server identifier")]
    MissingServiceId {
        /// Logical service name.
        name: String,
    },

    /// An order reached a terminal status other than success.
    #[error("Order {order_id} ended with status {status}")]
    OrderFailed {
        /// The order identifier.
        order_id: String,
        /// The terminal status.
        status: String,
    },
}

fn format_failures(failures: &[ContainerFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.name, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the convergence class of this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        classify(self)
    }

    /// Returns true if this error means "not ready yet".
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Returns true if the caller's context ended this operation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.class() == ErrorClass::Cancelled
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl ApiError {
    /// Creates a "not ready" error for the given resource.
    #[must_use]
    pub fn not_ready(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotReady {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_failure_lists_every_container() {
        let err = ReconcileError::PartialFailure {
            failures: vec![
                ContainerFailure {
                    name: String::from("api"),
                    reason: String::from("image must not be empty"),
                },
                ContainerFailure {
                    name: String::from("worker"),
                    reason: String::from("invalid port 'abc'"),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.starts_with("2 container(s)"));
        assert!(message.contains("api: image must not be empty"));
        assert!(message.contains("worker: invalid port 'abc'"));
    }

    #[test]
    fn test_deadline_message_includes_last_error() {
        let err = WaitError::DeadlineExceeded {
            operation: String::from("stack readiness"),
            attempts: 4,
            last_error: Some(String::from("web is starting")),
        };

        assert_eq!(
            err.to_string(),
            "Timed out waiting for stack readiness after 4 attempts (last: web is starting)"
        );
    }

    #[test]
    fn test_apply_failure_keeps_original_message() {
        let err = ProviderError::from(ReconcileError::ApplyFailed {
            stack_id: String::from("s-1"),
            source: Box::new(ApiError::api_error(500, "boom").into()),
        });

        assert!(err.to_string().contains("API request failed: 500 - boom"));
    }
}
