use std::error::Error;
use std::fmt::Display;
use std::future::Future;

use async_nats::subject::ToSubject;
use async_nats::{Client as NatsAsyncClient, HeaderMap};
use bytes::Bytes;

pub trait PublishClient: Send + Sync + Clone + 'static {
    type PublishError: Error + Send + Sync;

    fn publish_with_headers<S: ToSubject + Send>(
        &self,
        subject: S,
        headers: HeaderMap,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), Self::PublishError>> + Send;
}

pub trait FlushClient: Send + Sync + Clone + 'static {
    type FlushError: Error + Send + Sync;

    fn flush(&self) -> impl Future<Output = Result<(), Self::FlushError>> + Send;
}

/// A delivered message that must be acknowledged exactly once.
///
/// `ack` takes `self` by value so a message cannot be acknowledged twice.
pub trait AckMessage: Send + 'static {
    type AckError: Display + Send;

    fn subject(&self) -> &str;

    fn payload(&self) -> &[u8];

    fn ack(self) -> impl Future<Output = Result<(), Self::AckError>> + Send;
}

impl PublishClient for NatsAsyncClient {
    type PublishError = async_nats::client::PublishError;

    async fn publish_with_headers<S: ToSubject + Send>(
        &self,
        subject: S,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<(), Self::PublishError> {
        self.publish_with_headers(subject, headers, payload).await
    }
}

impl FlushClient for NatsAsyncClient {
    type FlushError = async_nats::client::FlushError;

    async fn flush(&self) -> Result<(), Self::FlushError> {
        self.flush().await
    }
}

impl AckMessage for async_nats::jetstream::Message {
    type AckError = async_nats::Error;

    fn subject(&self) -> &str {
        self.message.subject.as_str()
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    async fn ack(self) -> Result<(), Self::AckError> {
        async_nats::jetstream::Message::ack(&self).await
    }
}
