//! Streaming relay: blob download → multipart body → deployments API.
//!
//! The multipart producer runs on its own task and feeds a bounded conduit;
//! the HTTP client reads the conduit as a streaming request body. Neither
//! side ever holds the full artifact. Dropping the [`RelayPipeline::relay`]
//! future (deadline expiry) aborts the producer and cancels the request.

use futures_util::StreamExt;
use relay_blob::{ByteStream, DownloadBlob};
use relay_nats::{FlushClient, PublishClient};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Client as HttpClient, StatusCode};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::conduit::{ConduitConfig, ConduitReader, ConduitWriter, conduit};
use crate::error::{Error, Result};
use crate::messages::{RelayRequest, UploadStatus};
use crate::multipart::{MultipartEncoder, write_artifact_form};
use crate::notify::Notifier;

pub const ARTIFACTS_PATH: &str = "/api/management/v1/deployments/artifacts";

/// Summary of a successful relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    pub status: UploadStatus,
    pub status_code: u16,
    /// Bytes written into the request body, multipart framing included.
    pub bytes_streamed: u64,
    /// Times the producer waited on a full conduit.
    pub producer_stalls: u64,
}

#[derive(Clone)]
pub struct RelayPipeline<B, N> {
    blob: B,
    notifier: Notifier<N>,
    http: HttpClient,
    conduit: ConduitConfig,
    base_url_override: Option<String>,
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<B, N> RelayPipeline<B, N>
where
    B: DownloadBlob,
    N: PublishClient + FlushClient,
{
    pub fn new(blob: B, notifier: Notifier<N>, http: HttpClient) -> Self {
        Self {
            blob,
            notifier,
            http,
            conduit: ConduitConfig::default(),
            base_url_override: None,
        }
    }

    pub fn with_conduit(mut self, conduit: ConduitConfig) -> Self {
        self.conduit = conduit;
        self
    }

    /// Send uploads to `base_url` instead of `https://{domain}`.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url_override = base_url;
        self
    }

    pub fn upload_url(&self, target_domain: &str) -> String {
        match &self.base_url_override {
            Some(base) => format!("{}{ARTIFACTS_PATH}", base.trim_end_matches('/')),
            None => format!("https://{target_domain}{ARTIFACTS_PATH}"),
        }
    }

    #[instrument(
        name = "relay.artifact",
        skip(self, request),
        fields(
            request_id = %request.request_id,
            container = %request.source_container,
            blob = %request.source_object_key
        )
    )]
    pub async fn relay(&self, request: &RelayRequest) -> Result<RelayOutcome> {
        self.notifier.upload_started(&request.request_id).await;

        let content = self
            .blob
            .download_stream(&request.source_container, &request.source_object_key)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to open blob download");
                Error::UpstreamUnavailable(e.to_string())
            })?;

        let (writer, reader) = conduit(self.conduit);
        let stats = writer.stats();
        let encoder = MultipartEncoder::new();
        let content_type = encoder.content_type();
        let _producer = AbortOnDrop(tokio::spawn(produce(
            encoder,
            request.source_container.clone(),
            content,
            writer,
        )));

        match self.upload(request, &content_type, reader).await {
            Ok(status_code) => {
                self.notifier
                    .upload_finished(&request.request_id, status_code)
                    .await;
                let outcome = RelayOutcome {
                    status: UploadStatus::Finished,
                    status_code,
                    bytes_streamed: stats.bytes_written(),
                    producer_stalls: stats.stalls(),
                };
                info!(
                    bytes = outcome.bytes_streamed,
                    stalls = outcome.producer_stalls,
                    "Artifact relayed"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "Artifact upload failed");
                self.notifier
                    .upload_failed(&request.request_id, e.status_code())
                    .await;
                Err(e)
            }
        }
    }

    async fn upload(
        &self,
        request: &RelayRequest,
        content_type: &str,
        body: ConduitReader,
    ) -> Result<u16> {
        let url = self.upload_url(&request.target_domain);
        debug!(url = %url, "Posting artifact");

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, content_type)
            .bearer_auth(&request.auth_token)
            .body(Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| Error::DownstreamUnavailable(e.to_string()))?;

        let status = response.status();
        let drained = drain(response).await;
        debug!(status = status.as_u16(), body_bytes = drained, "Deployments API responded");

        if status != StatusCode::CREATED {
            return Err(Error::DownstreamRejected {
                status: status.as_u16(),
            });
        }
        Ok(status.as_u16())
    }
}

/// Read the response body to completion without keeping it. Returns how
/// many bytes arrived before the body ended or failed.
async fn drain(response: reqwest::Response) -> u64 {
    let mut body = response.bytes_stream();
    let mut total = 0u64;
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => total += chunk.len() as u64,
            Err(e) => {
                debug!(error = %e, "Failed to read response body");
                break;
            }
        }
    }
    total
}

async fn produce(
    mut encoder: MultipartEncoder,
    filename: String,
    content: ByteStream,
    mut writer: ConduitWriter,
) {
    match write_artifact_form(&mut encoder, &filename, content, &mut writer).await {
        Ok(copied) => debug!(bytes = copied, "Artifact body complete"),
        Err(e) => {
            warn!(error = %e, "Artifact body aborted");
            writer.abort(e).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use relay_blob::MemoryBlobStore;
    use relay_nats::MockNatsClient;

    use super::*;

    fn request(domain: &str) -> RelayRequest {
        RelayRequest {
            request_id: "r1".into(),
            auth_token: "t".into(),
            target_domain: domain.into(),
            source_container: "c1".into(),
            source_object_key: "b1".into(),
        }
    }

    fn pipeline(
        blob: MemoryBlobStore,
        nats: &MockNatsClient,
        server: &MockServer,
    ) -> RelayPipeline<MemoryBlobStore, MockNatsClient> {
        RelayPipeline::new(blob, Notifier::new(nats.clone(), "relay"), HttpClient::new())
            .with_base_url(Some(server.base_url()))
    }

    fn statuses(nats: &MockNatsClient) -> Vec<(String, String, String)> {
        nats.published()
            .into_iter()
            .map(|m| {
                let json: serde_json::Value = serde_json::from_slice(&m.payload).unwrap();
                (
                    m.subject,
                    json["uploadStatus"].as_str().unwrap().to_string(),
                    m.status_code.unwrap_or_default(),
                )
            })
            .collect()
    }

    #[test]
    fn upload_url_targets_domain() {
        let nats = MockNatsClient::new();
        let pipeline = RelayPipeline::new(
            MemoryBlobStore::new(),
            Notifier::new(nats, "relay"),
            HttpClient::new(),
        );

        assert_eq!(
            pipeline.upload_url("d.example.com"),
            "https://d.example.com/api/management/v1/deployments/artifacts"
        );
    }

    #[tokio::test]
    async fn created_finishes_with_201() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(ARTIFACTS_PATH)
                    .header("authorization", "Bearer t")
                    .header_exists("content-type")
                    .body_contains("name=\"description\"")
                    .body_contains("Artifact description")
                    .body_contains("name=\"artifact\"; filename=\"c1\"");
                then.status(201).body("{}");
            })
            .await;
        let blob = MemoryBlobStore::new().with_blob("c1", "b1", vec![9u8; 100]);
        let nats = MockNatsClient::new();

        let outcome = pipeline(blob, &nats, &server)
            .relay(&request("d.example.com"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(outcome.status, UploadStatus::Finished);
        assert_eq!(outcome.status_code, 201);
        assert!(outcome.bytes_streamed > 100);
        assert_eq!(
            statuses(&nats),
            vec![
                (
                    "relay.uploadResponse.r1".to_string(),
                    "In Progress".to_string(),
                    "200".to_string()
                ),
                (
                    "relay.uploadTargetResponse.r1".to_string(),
                    "Finished".to_string(),
                    "201".to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn server_error_fails_after_one_attempt() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(ARTIFACTS_PATH);
                then.status(500).body("boom");
            })
            .await;
        let blob = MemoryBlobStore::new().with_blob("c1", "b1", vec![1u8; 100]);
        let nats = MockNatsClient::new();

        let err = pipeline(blob, &nats, &server)
            .relay(&request("d"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DownstreamRejected { status: 500 }));
        assert_eq!(mock.hits_async().await, 1);
        let last = statuses(&nats).pop().unwrap();
        assert_eq!(last.0, "relay.uploadTargetResponse.r1");
        assert_eq!(last.1, "Failed");
        assert_eq!(last.2, "500");
    }

    #[tokio::test]
    async fn ok_is_not_created() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ARTIFACTS_PATH);
                then.status(200);
            })
            .await;
        let blob = MemoryBlobStore::new().with_blob("c1", "b1", vec![1u8; 10]);
        let nats = MockNatsClient::new();

        let err = pipeline(blob, &nats, &server)
            .relay(&request("d"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DownstreamRejected { status: 200 }));
    }

    #[tokio::test]
    async fn download_failure_stops_after_in_progress() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(ARTIFACTS_PATH);
                then.status(201);
            })
            .await;
        let nats = MockNatsClient::new();

        let err = pipeline(MemoryBlobStore::new(), &nats, &server)
            .relay(&request("d"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UpstreamUnavailable(_)));
        assert_eq!(mock.hits_async().await, 0);
        assert_eq!(nats.published_subjects(), vec!["relay.uploadResponse.r1"]);
    }

    #[tokio::test]
    async fn broken_source_fails_the_upload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ARTIFACTS_PATH);
                then.status(201);
            })
            .await;
        let blob = MemoryBlobStore::new()
            .with_blob("c1", "b1", vec![1u8; 4096])
            .with_chunk_size(512)
            .break_stream_after(2);
        let nats = MockNatsClient::new();

        let err = pipeline(blob, &nats, &server)
            .relay(&request("d"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DownstreamUnavailable(_)));
        let last = statuses(&nats).pop().unwrap();
        assert_eq!(last.1, "Failed");
        assert_eq!(last.2, "502");
    }

    #[tokio::test]
    async fn unreachable_downstream_is_bad_gateway() {
        let blob = MemoryBlobStore::new().with_blob("c1", "b1", vec![1u8; 10]);
        let nats = MockNatsClient::new();
        let pipeline = RelayPipeline::new(blob, Notifier::new(nats.clone(), "relay"), HttpClient::new())
            .with_base_url(Some("http://127.0.0.1:1".to_string()));

        let err = pipeline.relay(&request("d")).await.unwrap_err();

        assert!(matches!(err, Error::DownstreamUnavailable(_)));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn object_larger_than_conduit_stalls_producer() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ARTIFACTS_PATH);
                then.status(201);
            })
            .await;
        let blob = MemoryBlobStore::new()
            .with_blob("c1", "b1", vec![3u8; 256 * 1024])
            .with_chunk_size(4096);
        let nats = MockNatsClient::new();
        let pipeline = pipeline(blob, &nats, &server).with_conduit(ConduitConfig {
            max_buffered_chunks: 2,
            max_chunk_bytes: 1024,
        });

        let outcome = pipeline.relay(&request("d")).await.unwrap();

        assert!(outcome.producer_stalls > 0);
        assert!(outcome.bytes_streamed > 256 * 1024);
    }

    #[tokio::test]
    async fn publish_failures_do_not_fail_the_relay() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ARTIFACTS_PATH);
                then.status(201);
            })
            .await;
        let blob = MemoryBlobStore::new().with_blob("c1", "b1", vec![1u8; 10]);
        let nats = MockNatsClient::new();
        nats.fail_publish_count(2);

        let outcome = pipeline(blob, &nats, &server).relay(&request("d")).await;

        assert!(outcome.is_ok());
        assert!(nats.published().is_empty());
    }

    #[tokio::test]
    async fn response_body_is_drained_without_buffering() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ARTIFACTS_PATH);
                then.status(201).body(vec![b'x'; 300_000]);
            })
            .await;

        let response = HttpClient::new()
            .post(format!("{}{ARTIFACTS_PATH}", server.base_url()))
            .send()
            .await
            .unwrap();

        assert_eq!(drain(response).await, 300_000);
    }
}
