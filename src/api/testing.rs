//! Scripted transport for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

use super::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Replays queued outcomes and records every request it sees.
///
/// When built with [`ScriptedTransport::held`], each `send` parks until the
/// test calls [`finish`](ScriptedTransport::finish).
#[derive(Debug)]
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
    entered: AtomicUsize,
    hold: Option<Semaphore>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            entered: AtomicUsize::new(0),
            hold: None,
        }
    }

    pub fn held() -> Self {
        Self {
            hold: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn respond(self, status: u16, body: &str) -> Self {
        self.outcomes
            .lock()
            .push_back(Ok(HttpResponse::new(status, body)));
        self
    }

    pub fn fail(self, error: TransportError) -> Self {
        self.outcomes.lock().push_back(Err(error));
        self
    }

    /// Let `count` parked sends complete.
    pub fn finish(&self, count: usize) {
        if let Some(hold) = &self.hold {
            hold.add_permits(count);
        }
    }

    /// Number of sends that reached the transport.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);

        if let Some(hold) = &self.hold {
            if let Ok(permit) = hold.acquire().await {
                permit.forget();
            }
        }

        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(200, "{}")))
    }
}
