//! Error taxonomy and HTTP status mapping for the router service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use paylane_evm::EvmError;
use paylane_store::StoreError;

/// Errors surfaced by the router's HTTP endpoints.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Missing, unknown, or unapproved API key.
    #[error("unauthorized")]
    Unauthorized,

    /// No active subscription links the user to the agent.
    #[error("an active subscription is required for this agent")]
    SubscriptionRequired,

    /// Unknown agent id.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// The user has no active permits at all.
    #[error("no valid permits on file")]
    NoValidPermits,

    /// Active permits exist but none covers the call price.
    #[error("no permit has sufficient remaining balance")]
    InsufficientPermitBalance,

    /// On-chain balance does not cover the call.
    #[error("insufficient on-chain balance")]
    InsufficientBalance,

    /// Vault-to-admin allowance is short or expired.
    #[error("insufficient or expired allowance")]
    InsufficientAllowance,

    /// The selected permit cannot fund the agent's payout route.
    #[error("unsupported route: {0}")]
    UnsupportedRoute(String),

    /// Permit nonce no longer matches the chain.
    #[error("permit is stale: {0}")]
    PermitStale(String),

    /// Malformed request input.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Per-user request budget exhausted.
    #[error("rate limited")]
    RateLimited,

    /// The publisher call failed or settlement broke after it succeeded.
    #[error("api call failed: {0}")]
    ApiCallFailed(String),

    /// The publisher did not answer within the forward timeout.
    #[error("publisher timed out")]
    PublisherTimeout,

    /// Startup or steady-state configuration problem.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Machine-readable error code included in response bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::SubscriptionRequired => "SubscriptionRequired",
            Self::AgentNotFound(_) => "AgentNotFound",
            Self::NoValidPermits => "NoValidPermits",
            Self::InsufficientPermitBalance => "InsufficientPermitBalance",
            Self::InsufficientBalance => "InsufficientBalance",
            Self::InsufficientAllowance => "InsufficientAllowance",
            Self::UnsupportedRoute(_) => "UnsupportedRoute",
            Self::PermitStale(_) => "PermitStale",
            Self::InvalidParameters(_) => "InvalidParameters",
            Self::RateLimited => "RateLimited",
            Self::ApiCallFailed(_) => "ApiCallFailed",
            Self::PublisherTimeout => "PublisherTimeout",
            Self::Configuration(_) => "ConfigurationError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::SubscriptionRequired => StatusCode::FORBIDDEN,
            Self::AgentNotFound(_) => StatusCode::NOT_FOUND,
            Self::NoValidPermits
            | Self::InsufficientPermitBalance
            | Self::InsufficientBalance
            | Self::InsufficientAllowance => StatusCode::PAYMENT_REQUIRED,
            Self::UnsupportedRoute(_) | Self::InvalidParameters(_) => StatusCode::BAD_REQUEST,
            Self::PermitStale(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ApiCallFailed(_) => StatusCode::BAD_GATEWAY,
            Self::PublisherTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Configuration(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EvmError> for RouterError {
    fn from(err: EvmError) -> Self {
        match err {
            EvmError::InsufficientBalance { .. } => Self::InsufficientBalance,
            EvmError::InsufficientAllowance | EvmError::InsufficientTokenAllowance => {
                Self::InsufficientAllowance
            }
            EvmError::PermitStale { .. } => Self::PermitStale(err.to_string()),
            EvmError::UnsupportedRoute { .. } => Self::UnsupportedRoute(err.to_string()),
            EvmError::AttestationFailed(_)
            | EvmError::AttestationTimeout
            | EvmError::ReceiptTimeout
            | EvmError::TransactionReverted(_)
            | EvmError::MessageEventMissing(_) => Self::ApiCallFailed(err.to_string()),
            EvmError::UnsupportedChain(_) | EvmError::TokenNotDeployed { .. } => {
                Self::Configuration(err.to_string())
            }
            EvmError::Validation(_) | EvmError::Rpc(_) | EvmError::Store(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<StoreError> for RouterError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RouterError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            RouterError::SubscriptionRequired.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            RouterError::AgentNotFound("a".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RouterError::InsufficientBalance.status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            RouterError::PermitStale("n".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RouterError::UnsupportedRoute("r".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RouterError::ApiCallFailed("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RouterError::PublisherTimeout.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(RouterError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_evm_error_conversion() {
        let err: RouterError = EvmError::InsufficientBalance {
            balance: alloy_primitives::U256::ZERO,
            required: alloy_primitives::U256::from(1u64),
        }
        .into();
        assert_eq!(err.code(), "InsufficientBalance");

        let err: RouterError = EvmError::PermitStale {
            on_chain: 1,
            permit: 0,
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err: RouterError = EvmError::AttestationTimeout.into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
