//! JetStream stream provisioning for relay requests.

use async_nats::jetstream::stream::{RetentionPolicy, StorageType};
use async_nats::jetstream::{self, context::CreateStreamError, stream::Config as StreamConfig};

/// Ensure the request stream exists and captures `subjects`.
///
/// Idempotent. Work-queue retention removes each request once it is acked,
/// and file storage keeps pending requests across server restarts.
pub async fn ensure_stream(
    jetstream: &jetstream::Context,
    name: &str,
    subjects: Vec<String>,
) -> Result<jetstream::stream::Stream, CreateStreamError> {
    let config = StreamConfig {
        name: name.to_string(),
        subjects,
        retention: RetentionPolicy::WorkQueue,
        storage: StorageType::File,
        ..Default::default()
    };

    jetstream.get_or_create_stream(config).await
}
