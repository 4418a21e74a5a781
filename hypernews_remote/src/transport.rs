//! Single-endpoint GraphQL transport with credential attachment and
//! idempotency-gated retry.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use crate::retry::retry_with_backoff;

/// Default attempt budget, inclusive of the first attempt.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Retry-safety of one logical operation.
///
/// `Unsafe` operations (create-conversation, continue-chat) have no
/// dedup key at the protocol layer; a blind retry could duplicate an
/// agent turn, so they get exactly one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Safe,
    Unsafe,
}

/// One GraphQL call: a document, its variables, and its retry-safety.
#[derive(Debug, Clone)]
pub struct GraphqlRequest {
    pub document: &'static str,
    pub variables: Value,
    pub idempotency: Idempotency,
}

impl GraphqlRequest {
    #[must_use]
    pub fn new(document: &'static str, idempotency: Idempotency) -> Self {
        Self {
            document,
            variables: json!({}),
            idempotency,
        }
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }
}

/// Failures below the adapter layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection, timeout, or body-read failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx HTTP status.
    #[error("server responded with status {0}")]
    Status(u16),

    /// 2xx response whose body is not a GraphQL result.
    #[error("malformed response body: {0}")]
    Malformed(String),

    /// GraphQL-level errors returned by the service.
    #[error("graphql error: {}", messages.join("; "))]
    Graphql { messages: Vec<String> },

    /// The bounded retry budget is spent; wraps the final underlying
    /// error verbatim.
    #[error("transport exhausted after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Retry-eligible error classes: network failures, timeouts, and
    /// 5xx-equivalent statuses.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status(status) => *status >= 500,
            _ => false,
        }
    }
}

/// Posts `{query, variables}` documents to one endpoint, attaching the
/// bearer credential only when one is configured.
pub struct GraphqlTransport {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
    max_attempts: usize,
    base_delay: Duration,
}

impl GraphqlTransport {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_token: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// An empty token means unauthenticated local development and is
    /// treated the same as no token at all.
    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.api_token = (!token.is_empty()).then_some(token);
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Attempt budget for one request, after idempotency gating.
    #[must_use]
    pub const fn effective_attempts(&self, idempotency: Idempotency) -> usize {
        match idempotency {
            Idempotency::Safe => self.max_attempts,
            Idempotency::Unsafe => 1,
        }
    }

    /// Sends one logical operation and returns the GraphQL `data`
    /// object. Transient failures are retried within the budget; a spent
    /// budget surfaces as [`TransportError::Exhausted`].
    pub async fn send(&self, request: &GraphqlRequest) -> Result<Value, TransportError> {
        let attempts = self.effective_attempts(request.idempotency);
        debug!(
            endpoint = %self.endpoint,
            attempts,
            "sending graphql request"
        );

        retry_with_backoff(
            || self.try_send(request),
            attempts,
            self.base_delay,
            TransportError::is_transient,
        )
        .await
        .map_err(|last| {
            if last.is_transient() {
                TransportError::Exhausted {
                    attempts,
                    last: Box::new(last),
                }
            } else {
                last
            }
        })
    }

    async fn try_send(&self, request: &GraphqlRequest) -> Result<Value, TransportError> {
        let mut call = self.client.post(&self.endpoint).json(&json!({
            "query": request.document,
            "variables": request.variables,
        }));
        if let Some(token) = &self.api_token {
            call = call.bearer_auth(token);
        }

        let response = call.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .map(ToString::to_string)
                    .collect();
                return Err(TransportError::Graphql { messages });
            }
        }

        match body.get("data") {
            Some(data) if !data.is_null() => Ok(data.clone()),
            _ => Err(TransportError::Malformed(
                "response carries no data field".to_string(),
            )),
        }
    }
}
