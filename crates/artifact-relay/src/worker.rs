//! JetStream pull-consumer worker.
//!
//! Each running instance:
//! 1. Binds a durable pull consumer on the request stream, filtered to the
//!    upload and token subjects.
//! 2. Spawns one task per delivered message, which runs
//!    [`Dispatcher::dispatch`] and acks the message when it is done.
//! 3. Stops when the message stream ends or the shutdown future resolves.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream;
use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy};
use futures_util::StreamExt;
use relay_blob::{CreateContainer, DownloadBlob, GetDelegationKey, SignContainerToken};
use relay_nats::{FlushClient, PublishClient};
use relay_std::GetUtcNow;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::router::Dispatcher;
use crate::subjects;

/// Redeliveries only happen when a worker dies mid-message.
const MAX_DELIVER: i64 = 3;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub stream_name: String,
    pub consumer_name: String,
    pub filter_subjects: Vec<String>,
    pub ack_wait: Duration,
}

impl WorkerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stream_name: config.stream_name().to_string(),
            consumer_name: config.consumer_name().to_string(),
            filter_subjects: subjects::inbound_filters(config.prefix()),
            ack_wait: config.ack_wait(),
        }
    }
}

#[derive(Debug)]
pub enum WorkerError {
    JetStream(String),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::JetStream(e) => write!(f, "JetStream error: {}", e),
        }
    }
}

impl std::error::Error for WorkerError {}

/// Run the relay worker loop until the stream ends or `shutdown` resolves.
///
/// Messages already dispatched keep running on their own tasks; anything
/// left unacked is redelivered after `ack_wait`.
pub async fn run<B, N, C, S>(
    jetstream: &jetstream::Context,
    dispatcher: Arc<Dispatcher<B, N, C>>,
    options: WorkerOptions,
    shutdown: S,
) -> Result<(), WorkerError>
where
    B: DownloadBlob + CreateContainer + GetDelegationKey + SignContainerToken,
    N: PublishClient + FlushClient,
    C: GetUtcNow + Send + Sync + 'static,
    S: Future<Output = ()>,
{
    let stream = jetstream
        .get_stream(&options.stream_name)
        .await
        .map_err(|e| WorkerError::JetStream(e.to_string()))?;

    let consumer: jetstream::consumer::Consumer<pull::Config> = stream
        .get_or_create_consumer(
            &options.consumer_name,
            pull::Config {
                durable_name: Some(options.consumer_name.clone()),
                ack_policy: AckPolicy::Explicit,
                deliver_policy: DeliverPolicy::All,
                ack_wait: options.ack_wait,
                max_deliver: MAX_DELIVER,
                filter_subjects: options.filter_subjects.clone(),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| WorkerError::JetStream(e.to_string()))?;

    let mut messages = consumer
        .messages()
        .await
        .map_err(|e| WorkerError::JetStream(e.to_string()))?;

    info!(
        consumer = %options.consumer_name,
        filters = ?options.filter_subjects,
        "Worker started, pulling messages"
    );

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, worker stopping");
                break;
            }
            next = messages.next() => {
                let msg = match next {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        error!(error = %e, "Error receiving JetStream message");
                        continue;
                    }
                    None => {
                        info!("Message stream ended, worker stopping");
                        break;
                    }
                };

                debug!(subject = %msg.message.subject, "Received JetStream message");
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let disposition = dispatcher.dispatch(msg).await;
                    debug!(?disposition, "Message dispatched");
                });
            }
        }
    }

    Ok(())
}
