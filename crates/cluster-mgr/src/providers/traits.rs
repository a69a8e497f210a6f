//! Transport trait and error types shared by every RunPod component.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use thiserror::Error;

use crate::pod::PodHandle;

/// Errors raised while moving a request to the provider and back.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-2xx status.
    #[error("API error: {status} - {body}")]
    Status { status: u16, body: String },

    /// Provider answered 2xx but the body was not JSON.
    #[error("Response body is not JSON: {source} (body: {body})")]
    InvalidBody {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

/// Errors surfaced by the catalog, fleet view and lifecycle controller.
#[derive(Error, Debug)]
pub enum PodError {
    /// The call never produced a usable response.
    #[error("{operation} failed in transport: {source}")]
    TransportFailure {
        operation: String,
        #[source]
        source: TransportError,
    },

    /// The response parsed but did not have the shape the operation expects.
    #[error("Provider rejected {operation}: {detail} (payload: {payload})")]
    ProviderRejected {
        operation: String,
        detail: String,
        payload: String,
    },

    /// The provider has no record of the pod.
    #[error("Pod {handle} not found during {operation}")]
    NotFound { handle: PodHandle, operation: String },

    /// A bounded wait ran out of time.
    #[error("{operation} for pod {handle} timed out after {waited_secs} seconds")]
    Timeout {
        handle: PodHandle,
        operation: String,
        waited_secs: u64,
    },

    /// The provider explicitly reported the pod as dead.
    #[error("Pod {handle} failed: {reason}")]
    Failed { handle: PodHandle, reason: String },

    /// The caller cancelled a wait at a poll boundary.
    #[error("{operation} for pod {handle} was cancelled")]
    Cancelled { handle: PodHandle, operation: String },

    /// Invalid configuration or request parameters.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PodError {
    /// Whether a polling loop may absorb this error and try again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransportFailure { .. })
    }

    pub(crate) fn rejected(
        operation: impl Into<String>,
        detail: impl Into<String>,
        payload: &Value,
    ) -> Self {
        Self::ProviderRejected {
            operation: operation.into(),
            detail: detail.into(),
            payload: payload.to_string(),
        }
    }
}

/// Carries one named GraphQL operation to the provider.
///
/// Implementations attach the credential to every call and must surface
/// non-2xx responses as [`TransportError::Status`] with the raw body, never
/// as data.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `document` as `operation_name` with `variables`, returning the
    /// full JSON response body (`data` and `errors` included).
    async fn send(
        &self,
        operation_name: &str,
        document: &str,
        variables: Value,
    ) -> Result<Value, TransportError>;
}
