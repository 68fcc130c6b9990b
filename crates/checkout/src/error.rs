//! Unified error handling for the checkout workflow.
//!
//! Every failure path returns control to the caller with an actionable
//! message and unmodified prior state; nothing in this crate is fatal to
//! the process. Persistence failures never surface here at all - they are
//! swallowed and logged inside the snapshot store.

use pomelo_core::CheckoutStep;
use thiserror::Error;

use crate::api::transport::TransportError;

/// Errors surfaced by the checkout workflow engine.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A step precondition is not met; caught locally before any network call.
    #[error("{0}")]
    Validation(String),

    /// The backend rejected the request. The message is the server-provided
    /// `detail`/`title`, surfaced verbatim so the user can act on it.
    #[error("server error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The access token could not be refreshed, or the retried request was
    /// rejected again. The identity provider's UI should prompt re-login.
    #[error("authentication required")]
    AuthRequired,

    /// Forward navigation to a step that has not been unlocked yet.
    #[error("complete previous steps first ({requested} is beyond {furthest})")]
    StepLocked {
        requested: CheckoutStep,
        furthest: CheckoutStep,
    },

    /// The session already placed its order or was abandoned.
    #[error("checkout session is finished")]
    SessionFinished,

    /// The response was syntactically valid but missing an expected resource.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),

    /// The HTTP layer failed before a response was received.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The response body was not a valid JSON:API document.
    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type alias for `CheckoutError`.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CheckoutError::Validation("select a billing address first".to_string());
        assert_eq!(err.to_string(), "select a billing address first");

        let err = CheckoutError::Api {
            status: 400,
            message: "Shipping address is invalid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "server error (400): Shipping address is invalid"
        );
    }

    #[test]
    fn test_step_locked_display() {
        let err = CheckoutError::StepLocked {
            requested: CheckoutStep::Payment,
            furthest: CheckoutStep::Shipping,
        };
        assert_eq!(
            err.to_string(),
            "complete previous steps first (payment is beyond shipping)"
        );
    }
}
