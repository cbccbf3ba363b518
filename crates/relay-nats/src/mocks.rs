//! Test doubles for code that publishes notifications or consumes
//! acknowledgeable messages. Enabled with the `test-support` feature.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_nats::subject::ToSubject;
use bytes::Bytes;

use crate::client::{AckMessage, FlushClient, PublishClient};
use crate::messaging::STATUS_CODE_HEADER;

#[derive(Debug, Clone)]
pub struct MockError(pub String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockError {}

/// A message captured by [`MockNatsClient`].
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub status_code: Option<String>,
    pub payload: Bytes,
}

/// Records every publish; can be told to fail the next `n` publishes.
#[derive(Debug, Clone, Default)]
pub struct MockNatsClient {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    publish_failures: Arc<AtomicUsize>,
    flushes: Arc<AtomicUsize>,
}

impl MockNatsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_publish(&self) {
        self.fail_publish_count(1);
    }

    pub fn fail_publish_count(&self, n: usize) {
        self.publish_failures.store(n, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_subjects(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .map(|m| m.subject)
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl PublishClient for MockNatsClient {
    type PublishError = MockError;

    async fn publish_with_headers<S: ToSubject + Send>(
        &self,
        subject: S,
        headers: async_nats::HeaderMap,
        payload: Bytes,
    ) -> Result<(), MockError> {
        let remaining = self.publish_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.publish_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(MockError("mock: publish failed".to_string()));
        }
        self.published.lock().unwrap().push(PublishedMessage {
            subject: subject.to_subject().to_string(),
            status_code: headers
                .get(STATUS_CODE_HEADER)
                .map(|v| v.as_str().to_string()),
            payload,
        });
        Ok(())
    }
}

impl FlushClient for MockNatsClient {
    type FlushError = MockError;

    async fn flush(&self) -> Result<(), MockError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An [`AckMessage`] that counts how often it was acknowledged.
///
/// Clones share the counter, so keep one clone in the test to inspect
/// after the original has been consumed.
#[derive(Debug, Clone)]
pub struct MockMessage {
    subject: String,
    payload: Bytes,
    acks: Arc<AtomicUsize>,
    fail_ack: bool,
}

impl MockMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            acks: Arc::new(AtomicUsize::new(0)),
            fail_ack: false,
        }
    }

    /// The ack is still counted, but reported as failed.
    pub fn failing_ack(mut self) -> Self {
        self.fail_ack = true;
        self
    }

    pub fn ack_count(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }
}

impl AckMessage for MockMessage {
    type AckError = MockError;

    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(self) -> Result<(), MockError> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        if self.fail_ack {
            Err(MockError("mock: ack failed".to_string()))
        } else {
            Ok(())
        }
    }
}
