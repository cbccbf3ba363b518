//! Artifact relay worker binary.
//!
//! Pulls relay and token requests from JetStream, streams artifacts from
//! blob storage into the deployments API, and publishes status
//! notifications over Core NATS.
//!
//! # Environment variables
//!
//! | Variable                      | Default          | Description                                   |
//! |-------------------------------|------------------|-----------------------------------------------|
//! | `NATS_URL`                    | localhost:4222   | NATS server address(es)                       |
//! | `RELAY_PREFIX`                | `relay`          | NATS subject prefix                           |
//! | `RELAY_STREAM_NAME`           | `RELAY_REQUESTS` | JetStream stream                              |
//! | `RELAY_CONSUMER_NAME`         | `artifact_relay` | Durable JetStream consumer name               |
//! | `RELAY_HANDLER_TIMEOUT_SECS`  | `600`            | Per-message deadline                          |
//! | `RELAY_CONDUIT_CHUNKS`        | `16`             | Chunks buffered between download and upload   |
//! | `RELAY_CONDUIT_CHUNK_BYTES`   | `65536`          | Maximum chunk size                            |
//! | `RELAY_DOWNSTREAM_BASE_URL`   | unset            | Replaces `https://{domain}` for uploads       |
//! | `BLOB_STORAGE_URL`            | required         | Blob account URL                              |
//! | `AZURE_STORAGE_BEARER_TOKEN`  | unset            | Static AAD token instead of managed identity  |
//! | `AZURE_CLIENT_ID`             | unset            | User-assigned managed identity                |
//! | `RUST_LOG`                    | `info`           | Log filter (tracing-subscriber)               |

use std::sync::Arc;
use std::time::Duration;

use artifact_relay::signal::wait_for_shutdown;
use artifact_relay::worker::{self, WorkerOptions};
use artifact_relay::{Config, Dispatcher, stream, subjects};
use relay_blob::{AzureBlobClient, AzureBlobConfig};
use relay_nats::connect;
use relay_std::{SystemClock, SystemEnv};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env(&SystemEnv).expect("Invalid configuration");

    tracing::info!(servers = ?config.nats().servers, "Connecting to NATS");
    let nats = connect(config.nats(), Duration::from_secs(10))
        .await
        .expect("Failed to connect to NATS");
    let jetstream = async_nats::jetstream::new(nats.clone());

    stream::ensure_stream(
        &jetstream,
        config.stream_name(),
        subjects::inbound_filters(config.prefix()),
    )
    .await
    .expect("Failed to ensure JetStream stream");

    let blob_config = AzureBlobConfig::from_account_url(
        config.blob_storage_url(),
        config.azure_credential().clone(),
    )
    .expect("Invalid BLOB_STORAGE_URL");
    tracing::info!(account = %blob_config.account_name(), "Blob storage configured");

    // No overall timeout: uploads are bounded by the handler deadline.
    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client");

    let blob = AzureBlobClient::new(blob_config, http_client.clone());
    let dispatcher = Arc::new(Dispatcher::from_config(
        &config,
        blob,
        nats.clone(),
        http_client,
        SystemClock,
    ));

    let shutdown = async {
        let signal = wait_for_shutdown().await;
        tracing::info!(signal = signal.name(), "Shutdown signal received");
    };

    tracing::info!(
        prefix = %config.prefix(),
        timeout = ?config.handler_timeout(),
        "Artifact relay starting"
    );

    worker::run(
        &jetstream,
        dispatcher,
        WorkerOptions::from_config(&config),
        shutdown,
    )
    .await
    .expect("Worker exited with error");

    if let Err(e) = nats.drain().await {
        tracing::warn!(error = %e, "Failed to drain NATS connection");
    }
}
