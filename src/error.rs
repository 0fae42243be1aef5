//! Error handling for the gateway core
//!
//! Every failure crossing a component boundary maps to exactly one variant
//! of [`GatewayError`]; provider strategies never surface free-form errors.
//! The retry driver consumes the classification via [`GatewayError::retry_class`].

use std::time::Duration;

use thiserror::Error;

use crate::types::{Capability, ProviderId};

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Closed error taxonomy for the request core
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed inputs, capability/temperature/token-ceiling violation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Requested model absent from the catalog
    #[error("model not found in catalog: {model}")]
    ModelNotFound { model: String },

    /// No credential configured for the targeted provider
    #[error("missing credentials for {provider}: set {env_var}")]
    AuthMissing {
        provider: ProviderId,
        env_var: &'static str,
    },

    /// The vendor rejected the configured credential
    #[error("authentication rejected by {provider}: {message}")]
    AuthRejected {
        provider: ProviderId,
        message: String,
    },

    /// Vendor backpressure; retry after the honored delay
    #[error("rate limited by {provider}")]
    RateLimited {
        provider: ProviderId,
        retry_after: Option<Duration>,
    },

    /// Connection-level failure (reset, DNS, interrupted body)
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// Vendor returned a 5xx
    #[error("upstream server error from {provider} ({status}): {message}")]
    UpstreamServerError {
        provider: ProviderId,
        status: u16,
        message: String,
    },

    /// Prompt plus requested output exceed the model's context window
    #[error(
        "context overflow for {model}: {prompt_tokens} prompt + {output_tokens} output tokens exceed window of {context_window}"
    )]
    ContextOverflow {
        model: String,
        prompt_tokens: u32,
        output_tokens: u32,
        context_window: u32,
    },

    /// Request requires a capability the model does not declare
    #[error("model {model} does not support {capability}")]
    CapabilityMismatch {
        model: String,
        capability: Capability,
    },

    /// Session budget would be violated
    #[error(
        "session {session_id} budget exhausted: spent ${total_cost:.6} of ${budget_limit:.6} limit"
    )]
    BudgetExhausted {
        session_id: String,
        total_cost: f64,
        budget_limit: f64,
    },

    /// Caller-initiated cancellation
    #[error("request cancelled")]
    Cancelled,

    /// Policy-initiated cancellation
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Vendor returned unparseable content or malformed usage
    #[error("protocol error from {provider}: {message}")]
    ProviderProtocolError {
        provider: ProviderId,
        message: String,
    },

    /// Catalog entry is missing a field the operation requires
    #[error("catalog entry for {model} is missing {field}")]
    CatalogIncomplete { model: String, field: &'static str },

    /// Router filtering left zero candidates
    #[error("no eligible model satisfies the request and constraints")]
    NoEligibleModel,

    /// Configuration or catalog-load failure
    #[error("configuration error: {0}")]
    Config(String),
}

/// How the retry driver treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Back off and retry the same candidate
    Retryable,
    /// Skip to the next candidate in the chain
    FatalForModel,
    /// Stop the walk and surface the error
    FatalForRequest,
}

impl GatewayError {
    /// Classification consumed by the retry driver's fallback walk.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            GatewayError::RateLimited { .. }
            | GatewayError::TransientNetwork(_)
            | GatewayError::UpstreamServerError { .. } => RetryClass::Retryable,

            GatewayError::ModelNotFound { .. }
            | GatewayError::AuthMissing { .. }
            | GatewayError::AuthRejected { .. }
            | GatewayError::ContextOverflow { .. }
            | GatewayError::CapabilityMismatch { .. }
            | GatewayError::CatalogIncomplete { .. } => RetryClass::FatalForModel,

            GatewayError::InvalidRequest(_)
            | GatewayError::BudgetExhausted { .. }
            | GatewayError::Cancelled
            | GatewayError::Timeout(_)
            | GatewayError::ProviderProtocolError { .. }
            | GatewayError::NoEligibleModel
            | GatewayError::Config(_) => RetryClass::FatalForRequest,
        }
    }

    /// Delay the vendor asked us to honor, if any.
    pub fn honored_delay(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_class() == RetryClass::Retryable
    }
}
