//! NATS subject helpers for the artifact relay.
//!
//! Inbound: `{prefix}.upload.>` and `{prefix}.generateToken.>`.
//! Outbound: `{prefix}.{uploadResponse|uploadTargetResponse|tokenResponse}.{requestId}`.

const UPLOAD: &str = "upload";
const GENERATE_TOKEN: &str = "generateToken";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Relay,
    Token,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relay => "relay",
            Self::Token => "token",
        }
    }
}

pub fn upload_filter(prefix: &str) -> String {
    format!("{prefix}.{UPLOAD}.>")
}

pub fn generate_token_filter(prefix: &str) -> String {
    format!("{prefix}.{GENERATE_TOKEN}.>")
}

/// Consumer and stream filters for both request kinds.
pub fn inbound_filters(prefix: &str) -> Vec<String> {
    vec![upload_filter(prefix), generate_token_filter(prefix)]
}

pub fn upload_response(prefix: &str, request_id: &str) -> String {
    format!("{prefix}.uploadResponse.{request_id}")
}

pub fn upload_target_response(prefix: &str, request_id: &str) -> String {
    format!("{prefix}.uploadTargetResponse.{request_id}")
}

pub fn token_response(prefix: &str, request_id: &str) -> String {
    format!("{prefix}.tokenResponse.{request_id}")
}

/// Route by the token after the prefix. At least one further non-empty
/// token is required, mirroring the `>` wildcard of the inbound filters.
pub fn classify(prefix: &str, subject: &str) -> Option<RequestKind> {
    let rest = subject.strip_prefix(prefix)?.strip_prefix('.')?;
    let (kind, tail) = rest.split_once('.')?;
    if tail.is_empty() || tail.split('.').any(str::is_empty) {
        return None;
    }
    match kind {
        UPLOAD => Some(RequestKind::Relay),
        GENERATE_TOKEN => Some(RequestKind::Token),
        _ => None,
    }
}
