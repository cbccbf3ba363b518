//! Status-bearing publishes with trace-context propagation.

use async_nats::header::HeaderMap;
use bytes::Bytes;
use opentelemetry::propagation::Injector;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::client::{FlushClient, PublishClient};

/// Header carrying the HTTP-style status code of a notification.
pub const STATUS_CODE_HEADER: &str = "StatusCode";

struct HeaderMapCarrier<'a>(&'a mut HeaderMap);

impl Injector for HeaderMapCarrier<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key, value.as_str());
    }
}

pub fn headers_with_trace_context() -> HeaderMap {
    let mut headers = HeaderMap::new();
    let cx = Span::current().context();
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&cx, &mut HeaderMapCarrier(&mut headers));
    });
    headers
}

#[derive(Debug)]
pub enum StatusPublishError {
    Publish { subject: String, error: String },
    Flush { subject: String, error: String },
}

impl std::fmt::Display for StatusPublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Publish { subject, error } => {
                write!(f, "Failed to publish to '{}': {}", subject, error)
            }
            Self::Flush { subject, error } => {
                write!(f, "Failed to flush after publishing to '{}': {}", subject, error)
            }
        }
    }
}

impl std::error::Error for StatusPublishError {}

/// Publish `payload` with a `StatusCode` header, then flush so the
/// notification reaches the server before the caller moves on.
pub async fn publish_with_status<N: PublishClient + FlushClient>(
    client: &N,
    subject: &str,
    status_code: u16,
    payload: Bytes,
) -> Result<(), StatusPublishError> {
    let mut headers = headers_with_trace_context();
    headers.insert(STATUS_CODE_HEADER, status_code.to_string().as_str());

    client
        .publish_with_headers(subject.to_string(), headers, payload)
        .await
        .map_err(|e| StatusPublishError::Publish {
            subject: subject.to_string(),
            error: e.to_string(),
        })?;

    client.flush().await.map_err(|e| StatusPublishError::Flush {
        subject: subject.to_string(),
        error: e.to_string(),
    })
}
