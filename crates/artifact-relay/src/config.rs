use std::time::Duration;

use relay_blob::AzureCredential;
use relay_nats::NatsConfig;
use relay_std::env::ReadEnv;
use thiserror::Error;

use crate::conduit::{ConduitConfig, DEFAULT_MAX_BUFFERED_CHUNKS, DEFAULT_MAX_CHUNK_BYTES};

const DEFAULT_PREFIX: &str = "relay";
const DEFAULT_STREAM_NAME: &str = "RELAY_REQUESTS";
const DEFAULT_CONSUMER_NAME: &str = "artifact_relay";
const DEFAULT_HANDLER_TIMEOUT_SECS: u64 = 10 * 60;
/// Added to the handler timeout so JetStream does not redeliver a message
/// that is still being handled.
const ACK_WAIT_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Configuration for the artifact relay worker.
///
/// Resolved from environment variables:
/// - `RELAY_PREFIX`: NATS subject prefix (default: `relay`)
/// - `RELAY_STREAM_NAME`: JetStream stream name (default: `RELAY_REQUESTS`)
/// - `RELAY_CONSUMER_NAME`: durable consumer name (default: `artifact_relay`)
/// - `RELAY_HANDLER_TIMEOUT_SECS`: per-message deadline (default: 600)
/// - `RELAY_CONDUIT_CHUNKS` / `RELAY_CONDUIT_CHUNK_BYTES`: conduit bound (default: 16 × 65536)
/// - `RELAY_DOWNSTREAM_BASE_URL`: replaces `https://{domain}` for uploads (unset by default)
/// - `BLOB_STORAGE_URL`: blob account URL (required)
/// - `AZURE_STORAGE_BEARER_TOKEN`: static AAD token; managed identity is used when unset
/// - `AZURE_CLIENT_ID`: user-assigned managed identity
/// - Standard `NATS_*` variables for NATS connection (see `relay-nats`)
///
/// Unparseable or zero numeric values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    prefix: String,
    stream_name: String,
    consumer_name: String,
    handler_timeout: Duration,
    conduit: ConduitConfig,
    downstream_base_url: Option<String>,
    blob_storage_url: String,
    azure_credential: AzureCredential,
    nats: NatsConfig,
}

fn positive<E: ReadEnv, T: std::str::FromStr + PartialOrd + Default>(
    env: &E,
    key: &str,
    default: T,
) -> T {
    env.var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}

fn non_empty<E: ReadEnv>(env: &E, key: &str) -> Option<String> {
    env.var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env<E: ReadEnv>(env: &E) -> Result<Self, ConfigError> {
        let blob_storage_url =
            non_empty(env, "BLOB_STORAGE_URL").ok_or(ConfigError::Missing("BLOB_STORAGE_URL"))?;

        let azure_credential = match non_empty(env, "AZURE_STORAGE_BEARER_TOKEN") {
            Some(token) => AzureCredential::bearer(token),
            None => AzureCredential::managed_identity(non_empty(env, "AZURE_CLIENT_ID")),
        };

        Ok(Self {
            prefix: non_empty(env, "RELAY_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            stream_name: non_empty(env, "RELAY_STREAM_NAME")
                .unwrap_or_else(|| DEFAULT_STREAM_NAME.to_string()),
            consumer_name: non_empty(env, "RELAY_CONSUMER_NAME")
                .unwrap_or_else(|| DEFAULT_CONSUMER_NAME.to_string()),
            handler_timeout: Duration::from_secs(positive(
                env,
                "RELAY_HANDLER_TIMEOUT_SECS",
                DEFAULT_HANDLER_TIMEOUT_SECS,
            )),
            conduit: ConduitConfig {
                max_buffered_chunks: positive(env, "RELAY_CONDUIT_CHUNKS", DEFAULT_MAX_BUFFERED_CHUNKS),
                max_chunk_bytes: positive(env, "RELAY_CONDUIT_CHUNK_BYTES", DEFAULT_MAX_CHUNK_BYTES),
            },
            downstream_base_url: non_empty(env, "RELAY_DOWNSTREAM_BASE_URL"),
            blob_storage_url,
            azure_credential,
            nats: NatsConfig::from_env(env),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_conduit(mut self, conduit: ConduitConfig) -> Self {
        self.conduit = conduit;
        self
    }

    pub fn with_downstream_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.downstream_base_url = Some(base_url.into());
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    pub fn handler_timeout(&self) -> Duration {
        self.handler_timeout
    }

    /// How long JetStream waits for an ack before redelivering.
    pub fn ack_wait(&self) -> Duration {
        self.handler_timeout + ACK_WAIT_MARGIN
    }

    pub fn conduit(&self) -> ConduitConfig {
        self.conduit
    }

    pub fn downstream_base_url(&self) -> Option<&str> {
        self.downstream_base_url.as_deref()
    }

    pub fn blob_storage_url(&self) -> &str {
        &self.blob_storage_url
    }

    pub fn azure_credential(&self) -> &AzureCredential {
        &self.azure_credential
    }

    pub fn nats(&self) -> &NatsConfig {
        &self.nats
    }
}
