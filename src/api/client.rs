//! Document registration client.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{DocgateError, Result};
use crate::ratelimit::{GateSnapshot, Replenisher, WindowGate};

use super::classify::classify_authentication;
use super::credentials::SharedToken;
use super::document::{AuthRequest, AuthResponse, Document};
use super::pipeline::{SubmissionPipeline, SubmissionReceipt, SubmissionRequest, SubmitOptions};
use super::serializer::{JsonSerializer, Serializer};
use super::transport::{HttpRequest, ReqwestTransport, Transport};

/// Client for the document registration service.
///
/// Every caller of one client contends for the same gate, so the configured
/// limit holds across all tasks using it. The background replenisher lives
/// as long as the client; call [`shutdown`](Self::shutdown) to stop it and
/// wait for it to exit.
pub struct DocumentClient<T = ReqwestTransport, S = JsonSerializer> {
    config: ClientConfig,
    pipeline: SubmissionPipeline<T, S>,
    replenisher: Replenisher,
    token: SharedToken,
}

impl<T, S> std::fmt::Debug for DocumentClient<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentClient")
            .field("config", &self.config)
            .field("replenisher", &self.replenisher)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl DocumentClient<ReqwestTransport, JsonSerializer> {
    /// Create a client with the production HTTP transport and JSON payloads.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.api.request_timeout())?;
        Self::new(config, transport, JsonSerializer)
    }
}

impl<T, S> DocumentClient<T, S>
where
    T: Transport,
    S: Serializer,
{
    /// Create a client over the given collaborators and start replenishing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ClientConfig, transport: T, serializer: S) -> Result<Self> {
        config.validate()?;

        let settings = &config.rate_limit;
        let gate = Arc::new(WindowGate::with_policy(
            settings.requests_per_unit,
            settings.window(),
            settings.release_policy,
        )?);

        info!(
            capacity = gate.capacity(),
            window = ?gate.window(),
            policy = ?gate.policy(),
            "Document client initialized"
        );

        let replenisher = Replenisher::spawn(Arc::clone(&gate), gate.window());
        let token = SharedToken::new();
        let pipeline =
            SubmissionPipeline::new(gate, Arc::new(transport), serializer, Arc::new(token.clone()));

        Ok(Self {
            config,
            pipeline,
            replenisher,
            token,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The shared admission gate.
    pub fn gate(&self) -> &Arc<WindowGate> {
        self.pipeline.gate()
    }

    /// Current gate state.
    pub fn gate_snapshot(&self) -> GateSnapshot {
        self.pipeline.gate().snapshot()
    }

    /// The background replenisher.
    pub fn replenisher(&self) -> &Replenisher {
        &self.replenisher
    }

    /// Token store read by every submission.
    pub fn credentials(&self) -> &SharedToken {
        &self.token
    }

    /// Use `token` for subsequent submissions.
    pub fn set_auth_token(&self, token: impl Into<String>) {
        self.token.set(token);
        debug!("Bearer token updated");
    }

    /// Exchange `username` and `password` for a bearer token and store it.
    ///
    /// Authentication does not go through the gate.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        let auth_url = self
            .config
            .api
            .auth_url
            .as_deref()
            .ok_or_else(|| DocgateError::Config("api.auth_url is not configured".to_string()))?;

        let serializer = self.pipeline.serializer();
        let body = serializer.serialize(&AuthRequest { username, password })?;
        let request = HttpRequest::post(auth_url)
            .header("Content-Type", serializer.content_type())
            .body(body);

        info!(url = %auth_url, username = %username, "Authenticating");

        let outcome = self.pipeline.transport().send(request).await;
        let response = match classify_authentication(outcome) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Authentication failed");
                return Err(e);
            }
        };

        let AuthResponse { token } = serializer.deserialize(&response.body)?;
        if token.is_empty() {
            return Err(DocgateError::AuthenticationFailed {
                status: Some(response.status),
                body: "response carried an empty token".to_string(),
            });
        }

        self.token.set(token);
        info!("Authenticated");
        Ok(())
    }

    /// Submit `document` to the configured endpoint.
    ///
    /// Waits for a slot up to the configured `max_wait_ms`, or indefinitely
    /// when unset.
    pub async fn create_document(
        &self,
        document: &Document,
        signature: &str,
    ) -> Result<SubmissionReceipt> {
        let options = SubmitOptions {
            max_wait: self.config.rate_limit.max_wait(),
        };
        self.submit_with(document, signature, &options, std::future::pending::<()>())
            .await
    }

    /// Submit any payload to the configured endpoint with explicit options
    /// and a cancellation signal for the wait.
    pub async fn submit_with<P, F>(
        &self,
        payload: &P,
        signature: &str,
        options: &SubmitOptions,
        cancel: F,
    ) -> Result<SubmissionReceipt>
    where
        P: Serialize + ?Sized,
        F: Future,
    {
        let request = SubmissionRequest {
            url: &self.config.api.create_document_url,
            payload,
            signature,
        };
        self.pipeline.submit_until(&request, options, cancel).await
    }

    /// Stop the replenisher and wait for it to exit.
    pub async fn shutdown(self) {
        info!("Shutting down document client");
        self.replenisher.shutdown().await;
    }
}
