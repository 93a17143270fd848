//! One rate-limited submission, end to end.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn, Instrument};
use uuid::Uuid;

use crate::error::{DocgateError, Result};
use crate::ratelimit::{GateError, SlotPermit, WindowGate};

use super::classify::classify_submission;
use super::credentials::CredentialSource;
use super::serializer::{JsonSerializer, Serializer};
use super::transport::{HttpRequest, HttpResponse, Transport};

/// A payload to submit, with its detached signature.
#[derive(Debug)]
pub struct SubmissionRequest<'a, P: ?Sized> {
    /// Endpoint receiving the payload
    pub url: &'a str,
    /// Document to encode into the request body
    pub payload: &'a P,
    /// Value for the `Signature` header
    pub signature: &'a str,
}

/// Per-call submission settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Longest time to wait for a slot; `None` waits indefinitely
    pub max_wait: Option<Duration>,
}

impl SubmitOptions {
    /// Wait at most `max_wait` for a slot.
    pub fn with_max_wait(max_wait: Duration) -> Self {
        Self {
            max_wait: Some(max_wait),
        }
    }
}

/// A submission the service accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Identifier attached to this submission's log events
    pub submission_id: Uuid,
    /// Success status returned by the service
    pub status: u16,
    /// Response body
    pub body: String,
}

/// Acquires a slot, performs the exchange, and always gives the slot back.
pub struct SubmissionPipeline<T, S = JsonSerializer> {
    gate: Arc<WindowGate>,
    transport: Arc<T>,
    serializer: S,
    credentials: Arc<dyn CredentialSource>,
}

impl<T, S> std::fmt::Debug for SubmissionPipeline<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionPipeline")
            .field("gate", &self.gate.snapshot())
            .finish_non_exhaustive()
    }
}

impl<T, S> SubmissionPipeline<T, S>
where
    T: Transport,
    S: Serializer,
{
    /// Create a pipeline over the given collaborators.
    pub fn new(
        gate: Arc<WindowGate>,
        transport: Arc<T>,
        serializer: S,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            gate,
            transport,
            serializer,
            credentials,
        }
    }

    /// The gate this pipeline admits through.
    pub fn gate(&self) -> &Arc<WindowGate> {
        &self.gate
    }

    /// The payload serializer.
    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// The transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Submit `request`, waiting for a slot as long as `options` allows.
    pub async fn submit<P>(
        &self,
        request: &SubmissionRequest<'_, P>,
        options: &SubmitOptions,
    ) -> Result<SubmissionReceipt>
    where
        P: Serialize + ?Sized,
    {
        self.submit_until(request, options, std::future::pending::<()>())
            .await
    }

    /// Submit `request`, giving up the wait for a slot when `cancel` resolves.
    ///
    /// Cancellation only affects the wait. Once a slot is held the exchange
    /// runs to completion unless the returned future itself is dropped.
    pub async fn submit_until<P, F>(
        &self,
        request: &SubmissionRequest<'_, P>,
        options: &SubmitOptions,
        cancel: F,
    ) -> Result<SubmissionReceipt>
    where
        P: Serialize + ?Sized,
        F: Future,
    {
        let submission_id = Uuid::new_v4();
        let span = tracing::debug_span!("submission", id = %submission_id, url = %request.url);

        self.run(submission_id, request, options, cancel)
            .instrument(span)
            .await
    }

    async fn run<P, F>(
        &self,
        submission_id: Uuid,
        request: &SubmissionRequest<'_, P>,
        options: &SubmitOptions,
        cancel: F,
    ) -> Result<SubmissionReceipt>
    where
        P: Serialize + ?Sized,
        F: Future,
    {
        // Without a token the exchange cannot succeed, so do not spend a slot.
        if self.credentials.token().is_none() {
            return Err(missing_token());
        }

        let permit = self.admit(options, cancel).await?;
        trace!(epoch = permit.epoch(), "Admitted");

        let outcome = self.exchange(request).await;
        permit.release();

        match outcome {
            Ok(response) => {
                info!(status = response.status, "Submission accepted");
                Ok(SubmissionReceipt {
                    submission_id,
                    status: response.status,
                    body: response.body,
                })
            }
            Err(e) => {
                warn!(error = %e, "Submission failed");
                Err(e)
            }
        }
    }

    async fn admit<F>(&self, options: &SubmitOptions, cancel: F) -> Result<SlotPermit<'_>>
    where
        F: Future,
    {
        let permit = match options.max_wait {
            Some(max_wait) => {
                match tokio::time::timeout(max_wait, self.gate.acquire_until(cancel)).await {
                    Ok(acquired) => acquired?,
                    Err(_) => {
                        debug!(max_wait = ?max_wait, "Timed out waiting for a slot");
                        return Err(GateError::Timeout(max_wait).into());
                    }
                }
            }
            None => self.gate.acquire_until(cancel).await?,
        };
        Ok(permit)
    }

    async fn exchange<P>(&self, request: &SubmissionRequest<'_, P>) -> Result<HttpResponse>
    where
        P: Serialize + ?Sized,
    {
        // Re-read after the wait; the token may have been refreshed meanwhile.
        let token = self.credentials.token().ok_or_else(missing_token)?;
        let body = self.serializer.serialize(request.payload)?;

        let http_request = HttpRequest::post(request.url)
            .header("Content-Type", self.serializer.content_type())
            .header("Signature", request.signature)
            .header("Authorization", format!("Bearer {}", token))
            .body(body);

        debug!(
            method = %http_request.method,
            headers = ?redacted_headers(&http_request),
            body_bytes = http_request.body.len(),
            "Sending submission"
        );
        trace!(body = %http_request.body, "Submission body");

        let outcome = self.transport.send(http_request).await;
        if let Ok(response) = &outcome {
            debug!(status = response.status, "Received response");
            trace!(body = %response.body, "Response body");
        }

        classify_submission(outcome)
    }
}

fn missing_token() -> DocgateError {
    DocgateError::AuthenticationFailed {
        status: None,
        body: "no bearer token available".to_string(),
    }
}

fn redacted_headers(request: &HttpRequest) -> Vec<(&str, &str)> {
    request
        .headers
        .iter()
        .map(|(name, value)| {
            if name.eq_ignore_ascii_case("authorization") {
                (name.as_str(), "Bearer <redacted>")
            } else {
                (name.as_str(), value.as_str())
            }
        })
        .collect()
}
