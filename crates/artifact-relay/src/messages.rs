//! Wire messages: inbound request payloads and outbound notifications.
//!
//! Decoding is all-or-nothing. A payload that is not valid JSON, lacks a
//! required field, leaves one empty, or carries an unusable `requestId`
//! produces a [`DecodeError`] and nothing else happens for that message.

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing or empty field `{0}`")]
    MissingField(&'static str),

    #[error("invalid requestId {id:?}: {reason}")]
    InvalidRequestId { id: String, reason: &'static str },
}

/// Reject ids that would make `<prefix>.<kind>.<id>` an invalid publish
/// subject. Dotted ids are fine; they just span several tokens.
pub fn validate_request_id(id: &str) -> Result<(), DecodeError> {
    let reason = if id.is_empty() {
        Some("empty")
    } else if id.chars().any(char::is_whitespace) {
        Some("contains whitespace")
    } else if id.contains(['*', '>']) {
        Some("contains a wildcard")
    } else if id.split('.').any(str::is_empty) {
        Some("contains an empty subject token")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(DecodeError::InvalidRequestId {
            id: id.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn required(value: String, field: &'static str) -> Result<String, DecodeError> {
    if value.is_empty() {
        Err(DecodeError::MissingField(field))
    } else {
        Ok(value)
    }
}

// ── Relay request ─────────────────────────────────────────────────────────────

/// One artifact to move from the blob store into the deployments API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub request_id: String,
    /// Bearer credential for the deployments API.
    pub auth_token: String,
    /// Host of the deployments API.
    pub target_domain: String,
    pub source_container: String,
    pub source_object_key: String,
}

#[derive(Deserialize)]
struct RelayEnvelope {
    #[serde(default)]
    request_data: RequestData,
    #[serde(rename = "Artifact", default)]
    artifact: ArtifactRef,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestData {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    domain: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactRef {
    #[serde(default)]
    container_name: String,
    #[serde(default)]
    blob_name: String,
}

impl RelayRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let envelope: RelayEnvelope = serde_json::from_slice(payload)?;
        let request_id = required(envelope.request_data.request_id, "request_data.requestId")?;
        validate_request_id(&request_id)?;

        Ok(Self {
            request_id,
            auth_token: required(envelope.request_data.token, "request_data.token")?,
            target_domain: required(envelope.request_data.domain, "request_data.domain")?,
            source_container: required(envelope.artifact.container_name, "Artifact.containerName")?,
            source_object_key: required(envelope.artifact.blob_name, "Artifact.blobName")?,
        })
    }
}

// ── Token request ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub request_id: String,
    pub container_name: String,
    /// Advisory only; the token is scoped to the whole container.
    pub object_key_hint: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenEnvelope {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    container_name: String,
    #[serde(default)]
    blob_name: Option<String>,
}

impl TokenRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let envelope: TokenEnvelope = serde_json::from_slice(payload)?;
        let request_id = required(envelope.request_id, "requestId")?;
        validate_request_id(&request_id)?;

        Ok(Self {
            request_id,
            container_name: required(envelope.container_name, "containerName")?,
            object_key_hint: envelope.blob_name.filter(|hint| !hint.is_empty()),
        })
    }
}

// ── Outbound ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    InProgress,
    Finished,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "In Progress",
            Self::Finished => "Finished",
            Self::Failed => "Failed",
        }
    }
}

/// Progress of one relay, published and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNotification {
    pub request_id: String,
    pub status: UploadStatus,
    /// Travels in the `StatusCode` header, not the body.
    pub status_code: u16,
}

impl StatusNotification {
    pub fn new(request_id: impl Into<String>, status: UploadStatus, status_code: u16) -> Self {
        Self {
            request_id: request_id.into(),
            status,
            status_code,
        }
    }

    pub fn encode(&self) -> Bytes {
        serde_json::json!({
            "requestId": self.request_id,
            "uploadStatus": self.status.as_str(),
        })
        .to_string()
        .into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub container_name: String,
    /// Full signed container URL.
    pub token: String,
}

impl TokenResponse {
    pub fn encode(&self) -> Bytes {
        serde_json::json!({
            "containerName": self.container_name,
            "token": self.token,
        })
        .to_string()
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELAY: &str = r#"{"request_data":{"requestId":"r1","token":"t","domain":"d.example.com"},"Artifact":{"containerName":"c1","blobName":"b1"}}"#;

    #[test]
    fn relay_request_decodes_every_field() {
        let request = RelayRequest::decode(RELAY.as_bytes()).unwrap();

        assert_eq!(
            request,
            RelayRequest {
                request_id: "r1".into(),
                auth_token: "t".into(),
                target_domain: "d.example.com".into(),
                source_container: "c1".into(),
                source_object_key: "b1".into(),
            }
        );
    }

    #[test]
    fn relay_request_ignores_unknown_fields() {
        let payload = r#"{"request_data":{"requestId":"r1","token":"t","domain":"d","extra":1},"Artifact":{"containerName":"c","blobName":"b"},"v":2}"#;
        assert!(RelayRequest::decode(payload.as_bytes()).is_ok());
    }

    #[test]
    fn invalid_json_is_rejected() {
        let err = RelayRequest::decode(b"{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn missing_artifact_names_the_field() {
        let payload = r#"{"request_data":{"requestId":"r1","token":"t","domain":"d"}}"#;

        let err = RelayRequest::decode(payload.as_bytes()).unwrap_err();

        assert!(matches!(err, DecodeError::MissingField("Artifact.containerName")));
    }

    #[test]
    fn empty_token_is_rejected() {
        let payload = r#"{"request_data":{"requestId":"r1","token":"","domain":"d"},"Artifact":{"containerName":"c","blobName":"b"}}"#;

        let err = RelayRequest::decode(payload.as_bytes()).unwrap_err();

        assert!(matches!(err, DecodeError::MissingField("request_data.token")));
    }

    #[test]
    fn dotted_request_id_is_accepted() {
        let payload = r#"{"request_data":{"requestId":"job.1","token":"t","domain":"d"},"Artifact":{"containerName":"c","blobName":"b"}}"#;

        let request = RelayRequest::decode(payload.as_bytes()).unwrap();

        assert_eq!(request.request_id, "job.1");
    }

    #[test]
    fn request_id_with_wildcard_is_rejected() {
        let payload = r#"{"request_data":{"requestId":"job.*","token":"t","domain":"d"},"Artifact":{"containerName":"c","blobName":"b"}}"#;

        let err = RelayRequest::decode(payload.as_bytes()).unwrap_err();

        assert!(matches!(err, DecodeError::InvalidRequestId { .. }));
    }

    #[test]
    fn request_id_rules() {
        assert!(validate_request_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_request_id("job.1").is_ok());
        assert!(validate_request_id(&"x".repeat(1024)).is_ok());
        assert!(validate_request_id("").is_err());
        assert!(validate_request_id("has space").is_err());
        assert!(validate_request_id("wild*").is_err());
        assert!(validate_request_id("tail>").is_err());
        assert!(validate_request_id("job..1").is_err());
        assert!(validate_request_id(".job").is_err());
        assert!(validate_request_id("job.").is_err());
    }

    #[test]
    fn token_request_keeps_hint() {
        let request =
            TokenRequest::decode(br#"{"requestId":"r2","containerName":"c2","blobName":"ignored"}"#)
                .unwrap();

        assert_eq!(request.request_id, "r2");
        assert_eq!(request.container_name, "c2");
        assert_eq!(request.object_key_hint.as_deref(), Some("ignored"));
    }

    #[test]
    fn token_request_hint_is_optional() {
        let request = TokenRequest::decode(br#"{"requestId":"r2","containerName":"c2"}"#).unwrap();
        assert_eq!(request.object_key_hint, None);
    }

    #[test]
    fn token_request_requires_container() {
        let err = TokenRequest::decode(br#"{"requestId":"r2","containerName":""}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("containerName")));
    }

    #[test]
    fn status_notification_wire_shape() {
        let body = StatusNotification::new("r1", UploadStatus::InProgress, 200).encode();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"requestId": "r1", "uploadStatus": "In Progress"})
        );
    }

    #[test]
    fn token_response_wire_shape() {
        let response = TokenResponse {
            container_name: "c2".into(),
            token: "https://acct.blob.core.windows.net/c2?sv=x".into(),
        };
        let json: serde_json::Value = serde_json::from_slice(&response.encode()).unwrap();

        assert_eq!(json["containerName"], "c2");
        assert_eq!(json["token"], "https://acct.blob.core.windows.net/c2?sv=x");
    }
}
