use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::azure::AzureBlobError;

pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const STORAGE_RESOURCE: &str = "https://storage.azure.com/";
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Source of the AAD bearer token presented to the Blob service.
#[derive(Clone)]
pub enum AzureCredential {
    /// A pre-issued token, used as-is.
    Static(String),
    /// Tokens from the instance metadata endpoint, optionally for a
    /// user-assigned identity.
    ManagedIdentity {
        client_id: Option<String>,
        endpoint: String,
    },
}

impl std::fmt::Debug for AzureCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Static(<redacted>)"),
            Self::ManagedIdentity {
                client_id,
                endpoint,
            } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .field("endpoint", endpoint)
                .finish(),
        }
    }
}

impl AzureCredential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    pub fn managed_identity(client_id: Option<String>) -> Self {
        Self::ManagedIdentity {
            client_id,
            endpoint: IMDS_TOKEN_ENDPOINT.to_string(),
        }
    }

    /// Point a managed identity at a different token endpoint. No effect on
    /// static credentials.
    pub fn with_endpoint(self, endpoint: impl Into<String>) -> Self {
        match self {
            Self::ManagedIdentity { client_id, .. } => Self::ManagedIdentity {
                client_id,
                endpoint: endpoint.into(),
            },
            other => other,
        }
    }
}

struct CachedToken {
    token: String,
    refresh_at: DateTime<Utc>,
}

/// Hands out bearer tokens, refreshing managed-identity tokens five minutes
/// before they expire.
pub(crate) struct BearerSource {
    credential: AzureCredential,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct ImdsToken {
    access_token: String,
    expires_on: Value,
}

impl BearerSource {
    pub(crate) fn new(credential: AzureCredential) -> Self {
        Self {
            credential,
            cached: Mutex::new(None),
        }
    }

    pub(crate) async fn token(&self, http: &Client) -> Result<String, AzureBlobError> {
        let (client_id, endpoint) = match &self.credential {
            AzureCredential::Static(token) => return Ok(token.clone()),
            AzureCredential::ManagedIdentity {
                client_id,
                endpoint,
            } => (client_id.as_deref(), endpoint.as_str()),
        };

        // Held across the fetch so concurrent callers share one refresh.
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref().filter(|e| Utc::now() < e.refresh_at) {
            return Ok(entry.token.clone());
        }

        let fresh = fetch_imds_token(http, endpoint, client_id).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

async fn fetch_imds_token(
    http: &Client,
    endpoint: &str,
    client_id: Option<&str>,
) -> Result<CachedToken, AzureBlobError> {
    let mut query = vec![
        ("api-version", IMDS_API_VERSION),
        ("resource", STORAGE_RESOURCE),
    ];
    if let Some(id) = client_id {
        query.push(("client_id", id));
    }

    let resp = http
        .get(endpoint)
        .header("Metadata", "true")
        .query(&query)
        .send()
        .await
        .map_err(AzureBlobError::Http)?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        return Err(AzureBlobError::Credential(format!(
            "managed identity endpoint returned {status}"
        )));
    }

    let body: ImdsToken = resp
        .json()
        .await
        .map_err(|e| AzureBlobError::Deserialize(e.to_string()))?;
    let expires_on = parse_expires_on(&body.expires_on).ok_or_else(|| {
        AzureBlobError::Deserialize(format!("unusable expires_on: {}", body.expires_on))
    })?;

    debug!(expires_on = %expires_on, "Fetched managed identity token");
    Ok(CachedToken {
        token: body.access_token,
        refresh_at: expires_on - Duration::minutes(REFRESH_MARGIN_MINUTES),
    })
}

/// IMDS reports `expires_on` as epoch seconds, as a string or a number.
fn parse_expires_on(value: &Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        Value::String(s) => s.parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}
