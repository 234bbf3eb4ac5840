//! Error classification for convergence waits.

use crate::error::{ApiError, ProviderError, WaitError};

/// How a wait loop must react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Not converged yet: wait and try again.
    Retryable,
    /// The caller's deadline or cancellation fired: stop immediately.
    Cancelled,
    /// A real failure: stop and surface it unchanged.
    Fatal,
}

/// Classifies an error for the wait loop.
///
/// Not-found and permission-denied are retryable because waits only ever run
/// right after a mutation, while the control plane's reads may still lag
/// behind its writes.
#[must_use]
pub const fn classify(err: &ProviderError) -> ErrorClass {
    match err {
        ProviderError::Api(
            ApiError::NotReady { .. } | ApiError::NotFound { .. } | ApiError::PermissionDenied { .. },
        ) => ErrorClass::Retryable,
        ProviderError::Wait(WaitError::Cancelled { .. } | WaitError::DeadlineExceeded { .. }) => {
            ErrorClass::Cancelled
        }
        _ => ErrorClass::Fatal,
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Retryable => "retryable",
            Self::Cancelled => "cancelled",
            Self::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;

    #[test]
    fn test_not_yet_vocabulary_is_retryable() {
        let errors: Vec<ProviderError> = vec![
            ApiError::not_ready("stack s-1", "web is starting").into(),
            ApiError::not_found("app-installation a-1").into(),
            ApiError::PermissionDenied {
                message: String::from("forbidden"),
            }
            .into(),
        ];

        for err in &errors {
            assert_eq!(classify(err), ErrorClass::Retryable, "{err}");
        }
    }

    #[test]
    fn test_context_errors_are_cancelled() {
        let deadline: ProviderError = WaitError::DeadlineExceeded {
            operation: String::from("order"),
            attempts: 3,
            last_error: None,
        }
        .into();
        let cancelled: ProviderError = WaitError::Cancelled {
            operation: String::from("order"),
            attempts: 1,
        }
        .into();

        assert_eq!(classify(&deadline), ErrorClass::Cancelled);
        assert_eq!(classify(&cancelled), ErrorClass::Cancelled);
        assert!(deadline.is_cancelled());
    }

    #[test]
    fn test_everything_else_is_fatal() {
        let errors: Vec<ProviderError> = vec![
            ApiError::api_error(500, "internal").into(),
            ApiError::RateLimited {
                retry_after_secs: 10,
            }
            .into(),
            ApiError::network("connection reset").into(),
            ReconcileError::OrderFailed {
                order_id: String::from("o-1"),
                status: String::from("rejected"),
            }
            .into(),
            ProviderError::internal("boom"),
        ];

        for err in &errors {
            assert_eq!(classify(err), ErrorClass::Fatal, "{err}");
            assert!(!err.is_retryable());
        }
    }
}
