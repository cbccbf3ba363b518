use std::fmt;
use std::io;

use bytes::Bytes;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use futures_util::stream::BoxStream;
use serde::Deserialize;

/// Incremental blob content. Errors surface mid-stream as `io::Error`.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// SAS timestamps are second precision, UTC, `Z` suffixed.
pub const SAS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Result of an idempotent container create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerCreation {
    Created,
    AlreadyExists,
}

/// Start and expiry of a delegation key or SAS token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    pub start: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

impl ValidityWindow {
    /// `[now - skew, now + lifetime]`, truncated to whole seconds.
    pub fn around(now: DateTime<Utc>, skew: Duration, lifetime: Duration) -> Self {
        let now = now.trunc_subsecs(0);
        Self {
            start: now - skew,
            expiry: now + lifetime,
        }
    }

    pub fn start_str(&self) -> String {
        self.start.format(SAS_TIME_FORMAT).to_string()
    }

    pub fn expiry_str(&self) -> String {
        self.expiry.format(SAS_TIME_FORMAT).to_string()
    }
}

/// User delegation key as returned by `Get User Delegation Key`.
///
/// `value` is the base64-encoded signing key; the other fields are echoed
/// into every SAS signed with it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DelegationKey {
    pub signed_oid: String,
    pub signed_tid: String,
    pub signed_start: String,
    pub signed_expiry: String,
    pub signed_service: String,
    pub signed_version: String,
    pub value: String,
}

impl fmt::Debug for DelegationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegationKey")
            .field("signed_oid", &self.signed_oid)
            .field("signed_tid", &self.signed_tid)
            .field("signed_start", &self.signed_start)
            .field("signed_expiry", &self.signed_expiry)
            .field("signed_service", &self.signed_service)
            .field("signed_version", &self.signed_version)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Container SAS permissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerPermissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
}

impl ContainerPermissions {
    /// Create new blobs only: no read, add, write, delete or list.
    pub fn create_only() -> Self {
        Self {
            create: true,
            ..Self::default()
        }
    }
}

impl fmt::Display for ContainerPermissions {
    /// Canonical `racwdl` order required by the SAS `sp` field.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
            (self.list, 'l'),
        ];
        for (enabled, c) in flags {
            if enabled {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}
