//! Outcome classification.
//!
//! Turns raw exchange outcomes into the crate's error taxonomy. Everything
//! here is pure: the same input always produces the same classification, and
//! the status, body and underlying cause are carried into the error.

use crate::error::DocgateError;
use crate::ratelimit::GateError;

use super::transport::{HttpResponse, TransportError};

/// Classify a submission outcome. Any 2xx status is a success.
pub fn classify_submission(
    outcome: Result<HttpResponse, TransportError>,
) -> Result<HttpResponse, DocgateError> {
    let response = outcome.map_err(DocgateError::Transport)?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(DocgateError::Rejected {
            status: response.status,
            body: response.body,
        })
    }
}

/// Classify an authentication outcome. Only status 200 is accepted.
pub fn classify_authentication(
    outcome: Result<HttpResponse, TransportError>,
) -> Result<HttpResponse, DocgateError> {
    let response = outcome.map_err(DocgateError::Transport)?;
    if response.status == 200 {
        Ok(response)
    } else {
        Err(DocgateError::AuthenticationFailed {
            status: Some(response.status),
            body: response.body,
        })
    }
}

impl From<GateError> for DocgateError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Cancelled => DocgateError::RateLimitCancelled,
            GateError::Timeout(waited) => DocgateError::RateLimitTimeout { waited },
            GateError::ZeroCapacity | GateError::ZeroWindow => DocgateError::Config(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TransportErrorKind;
    use std::time::Duration;

    #[test]
    fn test_success_range_passes_through() {
        let response = classify_submission(Ok(HttpResponse::new(200, "{}"))).unwrap();
        assert_eq!(response.status, 200);

        let response = classify_submission(Ok(HttpResponse::new(202, "queued"))).unwrap();
        assert_eq!(response.body, "queued");
    }

    #[test]
    fn test_non_success_is_rejected_with_context() {
        let err = classify_submission(Ok(HttpResponse::new(500, "boom"))).unwrap_err();
        match err {
            DocgateError::Rejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_classification_is_stable() {
        for _ in 0..3 {
            let err = classify_submission(Ok(HttpResponse::new(404, "missing"))).unwrap_err();
            assert!(matches!(err, DocgateError::Rejected { status: 404, .. }));
        }
    }

    #[test]
    fn test_transport_fault_keeps_cause() {
        let fault = TransportError::with_source(
            TransportErrorKind::Connect,
            "refused",
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        );
        let err = classify_submission(Err(fault)).unwrap_err();
        match err {
            DocgateError::Transport(inner) => {
                assert_eq!(inner.kind(), TransportErrorKind::Connect);
                assert!(std::error::Error::source(&inner).is_some());
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_authentication_requires_200() {
        assert!(classify_authentication(Ok(HttpResponse::new(200, "{}"))).is_ok());

        let err = classify_authentication(Ok(HttpResponse::new(201, "created"))).unwrap_err();
        assert!(matches!(
            err,
            DocgateError::AuthenticationFailed {
                status: Some(201),
                ..
            }
        ));
    }

    #[test]
    fn test_gate_errors_map_to_rate_limit_kinds() {
        assert!(matches!(
            DocgateError::from(GateError::Cancelled),
            DocgateError::RateLimitCancelled
        ));
        assert!(matches!(
            DocgateError::from(GateError::Timeout(Duration::from_millis(5))),
            DocgateError::RateLimitTimeout { waited } if waited == Duration::from_millis(5)
        ));
        assert!(matches!(
            DocgateError::from(GateError::ZeroCapacity),
            DocgateError::Config(_)
        ));
    }
}
