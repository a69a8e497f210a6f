//! RunPod GraphQL transport and typed response decoding.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::models::GraphQlEnvelope;
use super::operations::Operation;
use crate::providers::traits::{PodError, Transport, TransportError};

/// RunPod GraphQL endpoint.
pub const API_BASE_URL: &str = "https://api.runpod.io/graphql";

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP transport for the RunPod GraphQL API.
#[derive(Clone)]
pub struct RunPod {
    /// HTTP client.
    client: Client,
    /// API key for authentication.
    api_key: String,
    /// GraphQL endpoint URL.
    endpoint: String,
}

impl RunPod {
    /// Create a transport against the public RunPod endpoint.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(api_key: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_endpoint(
            api_key,
            API_BASE_URL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a transport against `endpoint` with a per-request `timeout`.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn with_endpoint(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        })
    }

    /// Endpoint this transport posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for RunPod {
    async fn send(
        &self,
        operation_name: &str,
        document: &str,
        variables: Value,
    ) -> Result<Value, TransportError> {
        debug!(url = %self.endpoint, operation = %operation_name, "GraphQL request");

        let body = json!({
            "operationName": operation_name,
            "query": document,
            "variables": variables,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %text, "Failed to parse response");
            TransportError::InvalidBody {
                source: e,
                body: text,
            }
        })
    }
}

/// Serialize `{ "input": ... }` variables for an operation.
pub(crate) fn input_variables<T: Serialize>(
    operation: &Operation,
    input: T,
) -> Result<Value, PodError> {
    serde_json::to_value(super::models::InputVariables { input }).map_err(|e| {
        PodError::Config(format!("failed to encode {} variables: {e}", operation.name))
    })
}

/// Send `operation` and decode its `data` into `D`.
///
/// Any mismatch between the response and `D` is reported as
/// [`PodError::ProviderRejected`] carrying the raw payload.
pub(crate) async fn execute<D: DeserializeOwned>(
    transport: &dyn Transport,
    operation: &Operation,
    variables: Value,
) -> Result<D, PodError> {
    let body = transport
        .send(operation.name, operation.document, variables)
        .await
        .map_err(|source| PodError::TransportFailure {
            operation: operation.name.to_string(),
            source,
        })?;

    decode(operation, body)
}

/// Decode a GraphQL response body for `operation`.
pub(crate) fn decode<D: DeserializeOwned>(
    operation: &Operation,
    body: Value,
) -> Result<D, PodError> {
    let envelope: GraphQlEnvelope = serde_json::from_value(body.clone())
        .map_err(|e| PodError::rejected(operation.name, e.to_string(), &body))?;

    let messages = envelope
        .errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    let data = match envelope.data {
        Some(Value::Null) | None => {
            let detail = if messages.is_empty() {
                "response has no data".to_string()
            } else {
                messages
            };
            return Err(PodError::rejected(operation.name, detail, &body));
        }
        Some(data) => data,
    };

    if !messages.is_empty() {
        warn!(operation = %operation.name, errors = %messages, "GraphQL errors alongside data");
    }

    serde_json::from_value(data).map_err(|e| {
        let detail = if messages.is_empty() {
            e.to_string()
        } else {
            format!("{e}; errors: {messages}")
        };
        PodError::rejected(operation.name, detail, &body)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::runpod::models::{PodStopData, PodTerminateData};
    use crate::providers::runpod::operations::{STOP_POD, TERMINATE_POD};

    #[test]
    fn test_decode_missing_key_is_rejected() {
        let err = decode::<PodTerminateData>(&TERMINATE_POD, json!({ "data": {} })).unwrap_err();
        match err {
            PodError::ProviderRejected {
                operation, payload, ..
            } => {
                assert_eq!(operation, "TerminatePod");
                assert_eq!(payload, r#"{"data":{}}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_errors_without_data_carry_messages() {
        let body = json!({
            "errors": [{ "message": "Something went wrong. Please try again later" }],
            "data": null
        });
        let err = decode::<PodStopData>(&STOP_POD, body).unwrap_err();
        assert!(err.to_string().contains("Something went wrong"));
    }

    #[test]
    fn test_decode_typed_data() {
        let data: PodStopData = decode(
            &STOP_POD,
            json!({ "data": { "podStop": { "id": "pod-1", "desiredStatus": "EXITED" } } }),
        )
        .unwrap();
        assert_eq!(data.pod_stop.id, "pod-1");
    }
}
