use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::credential::{AzureCredential, BearerSource};
use crate::sas::{SAS_VERSION, SasError, sign_container_sas};
use crate::traits::{CreateContainer, DownloadBlob, GetDelegationKey, SignContainerToken};
use crate::types::{
    ByteStream, ContainerCreation, ContainerPermissions, DelegationKey, ValidityWindow,
};

const API_VERSION: &str = SAS_VERSION;
const CONTAINER_ALREADY_EXISTS: &str = "ContainerAlreadyExists";

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AzureBlobConfig {
    account_url: Url,
    account_name: String,
    credential: AzureCredential,
}

impl AzureBlobConfig {
    /// The account name is taken from the first host label
    /// (`myaccount.blob.core.windows.net` → `myaccount`).
    pub fn from_account_url(
        account_url: &str,
        credential: AzureCredential,
    ) -> Result<Self, AzureBlobError> {
        let account_url = Url::parse(account_url)
            .map_err(|e| AzureBlobError::InvalidUrl(format!("{account_url}: {e}")))?;
        if account_url.cannot_be_a_base() {
            return Err(AzureBlobError::InvalidUrl(account_url.to_string()));
        }
        let account_name = account_url
            .host_str()
            .and_then(|host| host.split('.').next())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AzureBlobError::InvalidUrl(account_url.to_string()))?
            .to_string();

        Ok(Self {
            account_url,
            account_name,
            credential,
        })
    }

    /// Override the derived account name, for emulators and proxies whose
    /// host does not carry it.
    pub fn with_account_name(mut self, name: impl Into<String>) -> Self {
        self.account_name = name.into();
        self
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }
}

// ── Error ─────────────────────────────────────────────────────────────────────

/// Errors produced by [`AzureBlobClient`].
#[derive(Debug)]
pub enum AzureBlobError {
    /// An HTTP transport error.
    Http(reqwest::Error),
    /// The service answered with a non-success status.
    Api { status: u16, code: Option<String> },
    /// No bearer token could be obtained.
    Credential(String),
    /// Could not deserialize a service response.
    Deserialize(String),
    InvalidUrl(String),
    Signing(SasError),
}

impl std::fmt::Display for AzureBlobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Api { status, code } => match code {
                Some(code) => write!(f, "blob service error ({status}): {code}"),
                None => write!(f, "blob service error ({status})"),
            },
            Self::Credential(msg) => write!(f, "credential error: {msg}"),
            Self::Deserialize(msg) => write!(f, "deserialization error: {msg}"),
            Self::InvalidUrl(url) => write!(f, "invalid blob storage URL: {url}"),
            Self::Signing(e) => write!(f, "SAS signing failed: {e}"),
        }
    }
}

impl std::error::Error for AzureBlobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            Self::Signing(e) => Some(e),
            _ => None,
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Blob REST client authenticated with an AAD bearer token. Cheap to clone.
#[derive(Clone)]
pub struct AzureBlobClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    config: AzureBlobConfig,
    bearer: BearerSource,
}

impl AzureBlobClient {
    pub fn new(config: AzureBlobConfig, http: Client) -> Self {
        let bearer = BearerSource::new(config.credential.clone());
        Self {
            inner: Arc::new(Inner {
                http,
                config,
                bearer,
            }),
        }
    }

    fn url_for(&self, segments: &[&str]) -> Result<Url, AzureBlobError> {
        let mut url = self.inner.config.account_url.clone();
        url.path_segments_mut()
            .map_err(|()| AzureBlobError::InvalidUrl(self.inner.config.account_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn authorized(
        &self,
        method: reqwest::Method,
        url: Url,
    ) -> Result<reqwest::RequestBuilder, AzureBlobError> {
        let token = self.inner.bearer.token(&self.inner.http).await?;
        Ok(self
            .inner
            .http
            .request(method, url)
            .bearer_auth(token)
            .header("x-ms-version", API_VERSION)
            .header(
                "x-ms-date",
                Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            ))
    }
}

fn api_error(resp: &Response) -> AzureBlobError {
    AzureBlobError::Api {
        status: resp.status().as_u16(),
        code: error_code(resp),
    }
}

fn error_code(resp: &Response) -> Option<String> {
    resp.headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

impl DownloadBlob for AzureBlobClient {
    type Error = AzureBlobError;

    #[instrument(skip(self), err)]
    async fn download_stream(&self, container: &str, blob: &str) -> Result<ByteStream, Self::Error> {
        let mut segments = vec![container];
        segments.extend(blob.split('/'));
        let url = self.url_for(&segments)?;

        let resp = self
            .authorized(reqwest::Method::GET, url)
            .await?
            .send()
            .await
            .map_err(AzureBlobError::Http)?;

        if !resp.status().is_success() {
            return Err(api_error(&resp));
        }
        debug!(content_length = ?resp.content_length(), "Blob download opened");

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed())
    }
}

impl CreateContainer for AzureBlobClient {
    type Error = AzureBlobError;

    #[instrument(skip(self), err)]
    async fn create_container_if_absent(&self, name: &str) -> Result<ContainerCreation, Self::Error> {
        let mut url = self.url_for(&[name])?;
        url.query_pairs_mut().append_pair("restype", "container");

        let resp = self
            .authorized(reqwest::Method::PUT, url)
            .await?
            .header("content-length", "0")
            .send()
            .await
            .map_err(AzureBlobError::Http)?;

        match resp.status() {
            StatusCode::CREATED => Ok(ContainerCreation::Created),
            StatusCode::CONFLICT
                if error_code(&resp).as_deref() == Some(CONTAINER_ALREADY_EXISTS) =>
            {
                Ok(ContainerCreation::AlreadyExists)
            }
            _ => Err(api_error(&resp)),
        }
    }
}

impl GetDelegationKey for AzureBlobClient {
    type Error = AzureBlobError;

    #[instrument(skip(self, window), err)]
    async fn user_delegation_key(&self, window: &ValidityWindow) -> Result<DelegationKey, Self::Error> {
        let mut url = self.url_for(&[""])?;
        url.query_pairs_mut()
            .append_pair("restype", "service")
            .append_pair("comp", "userdelegationkey");

        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8"?><KeyInfo><Start>{}</Start><Expiry>{}</Expiry></KeyInfo>"#,
            window.start_str(),
            window.expiry_str()
        );

        let resp = self
            .authorized(reqwest::Method::POST, url)
            .await?
            .header("content-type", "application/xml")
            .body(body)
            .send()
            .await
            .map_err(AzureBlobError::Http)?;

        if !resp.status().is_success() {
            return Err(api_error(&resp));
        }

        let xml = resp.text().await.map_err(AzureBlobError::Http)?;
        quick_xml::de::from_str(&xml).map_err(|e| AzureBlobError::Deserialize(e.to_string()))
    }
}

impl SignContainerToken for AzureBlobClient {
    type Error = AzureBlobError;

    fn container_url(&self, container: &str) -> String {
        match self.url_for(&[container]) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{}/{container}",
                self.inner.config.account_url.as_str().trim_end_matches('/')
            ),
        }
    }

    fn sign_container_token(
        &self,
        key: &DelegationKey,
        container: &str,
        permissions: ContainerPermissions,
        window: &ValidityWindow,
    ) -> Result<String, Self::Error> {
        sign_container_sas(
            &self.inner.config.account_name,
            container,
            key,
            permissions,
            window,
        )
        .map_err(AzureBlobError::Signing)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::{Duration, TimeZone};
    use futures_util::TryStreamExt;
    use httpmock::prelude::*;

    use super::*;

    fn client(server: &MockServer) -> AzureBlobClient {
        let config = AzureBlobConfig::from_account_url(
            &server.base_url(),
            AzureCredential::bearer("aad-token"),
        )
        .unwrap()
        .with_account_name("devaccount");
        AzureBlobClient::new(config, Client::new())
    }

    fn window() -> ValidityWindow {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ValidityWindow::around(now, Duration::seconds(10), Duration::hours(48))
    }

    // ── Pure (no HTTP) ────────────────────────────────────────────────────────

    #[test]
    fn account_name_from_host() {
        let config = AzureBlobConfig::from_account_url(
            "https://myaccount.blob.core.windows.net/",
            AzureCredential::bearer("t"),
        )
        .unwrap();
        assert_eq!(config.account_name(), "myaccount");
    }

    #[test]
    fn rejects_unparseable_url() {
        let err = AzureBlobConfig::from_account_url("not a url", AzureCredential::bearer("t"))
            .unwrap_err();
        assert!(matches!(err, AzureBlobError::InvalidUrl(_)));
    }

    #[test]
    fn container_url_appends_name() {
        let config = AzureBlobConfig::from_account_url(
            "https://myaccount.blob.core.windows.net/",
            AzureCredential::bearer("t"),
        )
        .unwrap();
        let client = AzureBlobClient::new(config, Client::new());

        assert_eq!(
            client.container_url("c2"),
            "https://myaccount.blob.core.windows.net/c2"
        );
    }

    // ── httpmock tests ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn download_streams_blob_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/artifacts/releases/app.mender")
                    .header("authorization", "Bearer aad-token")
                    .header("x-ms-version", API_VERSION);
                then.status(200).body(vec![7u8; 4096]);
            })
            .await;

        let stream = client(&server)
            .download_stream("artifacts", "releases/app.mender")
            .await
            .unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();

        assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), 4096);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn download_missing_blob_is_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/artifacts/missing");
                then.status(404).header("x-ms-error-code", "BlobNotFound");
            })
            .await;

        let result = client(&server).download_stream("artifacts", "missing").await;

        match result {
            Err(AzureBlobError::Api { status, code }) => {
                assert_eq!(status, 404);
                assert_eq!(code.as_deref(), Some("BlobNotFound"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn create_container_reports_created() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/c2")
                    .query_param("restype", "container");
                then.status(201);
            })
            .await;

        let created = client(&server).create_container_if_absent("c2").await.unwrap();

        assert_eq!(created, ContainerCreation::Created);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn existing_container_is_not_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/c2");
                then.status(409)
                    .header("x-ms-error-code", CONTAINER_ALREADY_EXISTS);
            })
            .await;

        let created = client(&server).create_container_if_absent("c2").await.unwrap();

        assert_eq!(created, ContainerCreation::AlreadyExists);
    }

    #[tokio::test]
    async fn other_conflicts_fail_container_creation() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/c2");
                then.status(409)
                    .header("x-ms-error-code", "ContainerBeingDeleted");
            })
            .await;

        let err = client(&server)
            .create_container_if_absent("c2")
            .await
            .unwrap_err();

        assert!(matches!(err, AzureBlobError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn delegation_key_request_and_parse() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .query_param("restype", "service")
                    .query_param("comp", "userdelegationkey")
                    .body_contains("<Start>2024-05-01T11:59:50Z</Start>")
                    .body_contains("<Expiry>2024-05-03T12:00:00Z</Expiry>");
                then.status(200)
                    .header("content-type", "application/xml")
                    .body(
                        r#"<?xml version="1.0" encoding="utf-8"?>
<UserDelegationKey>
  <SignedOid>oid-1</SignedOid>
  <SignedTid>tid-1</SignedTid>
  <SignedStart>2024-05-01T11:59:50Z</SignedStart>
  <SignedExpiry>2024-05-03T12:00:00Z</SignedExpiry>
  <SignedService>b</SignedService>
  <SignedVersion>2021-08-06</SignedVersion>
  <Value>a2V5LWJ5dGVz</Value>
</UserDelegationKey>"#,
                    );
            })
            .await;

        let key = client(&server).user_delegation_key(&window()).await.unwrap();

        assert_eq!(key.signed_oid, "oid-1");
        assert_eq!(key.signed_service, "b");
        assert_eq!(key.value, "a2V5LWJ5dGVz");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delegation_key_denied_is_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(403)
                    .header("x-ms-error-code", "AuthorizationPermissionMismatch");
            })
            .await;

        let err = client(&server).user_delegation_key(&window()).await.unwrap_err();

        assert!(matches!(err, AzureBlobError::Api { status: 403, .. }));
    }

    #[test]
    fn signs_with_configured_account_name() {
        let config = AzureBlobConfig::from_account_url(
            "https://myaccount.blob.core.windows.net/",
            AzureCredential::bearer("t"),
        )
        .unwrap();
        let client = AzureBlobClient::new(config, Client::new());
        let key = DelegationKey {
            signed_oid: "oid".into(),
            signed_tid: "tid".into(),
            signed_start: "s".into(),
            signed_expiry: "e".into(),
            signed_service: "b".into(),
            signed_version: SAS_VERSION.into(),
            value: "a2V5LWJ5dGVz".into(),
        };

        let direct = sign_container_sas(
            "myaccount",
            "c2",
            &key,
            ContainerPermissions::create_only(),
            &window(),
        )
        .unwrap();
        let via_client = client
            .sign_container_token(&key, "c2", ContainerPermissions::create_only(), &window())
            .unwrap();

        assert_eq!(direct, via_client);
    }
}
