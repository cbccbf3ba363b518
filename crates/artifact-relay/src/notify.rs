//! Best-effort status notifications.
//!
//! A failed publish is logged and swallowed: notifications never change the
//! outcome of the operation that emits them.

use relay_nats::messaging::publish_with_status;
use relay_nats::{FlushClient, PublishClient};
use tracing::{debug, warn};

use crate::messages::{StatusNotification, TokenResponse, UploadStatus};
use crate::subjects;

#[derive(Clone)]
pub struct Notifier<N> {
    client: N,
    prefix: String,
}

impl<N: PublishClient + FlushClient> Notifier<N> {
    pub fn new(client: N, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    /// `In Progress` on `uploadResponse.<id>`.
    pub async fn upload_started(&self, request_id: &str) {
        let notification = StatusNotification::new(request_id, UploadStatus::InProgress, 200);
        self.send(
            subjects::upload_response(&self.prefix, request_id),
            &notification,
        )
        .await;
    }

    /// `Finished` on `uploadTargetResponse.<id>`.
    pub async fn upload_finished(&self, request_id: &str, status_code: u16) {
        let notification = StatusNotification::new(request_id, UploadStatus::Finished, status_code);
        self.send(
            subjects::upload_target_response(&self.prefix, request_id),
            &notification,
        )
        .await;
    }

    /// `Failed` on `uploadTargetResponse.<id>`.
    pub async fn upload_failed(&self, request_id: &str, status_code: u16) {
        let notification = StatusNotification::new(request_id, UploadStatus::Failed, status_code);
        self.send(
            subjects::upload_target_response(&self.prefix, request_id),
            &notification,
        )
        .await;
    }

    pub async fn token_issued(&self, request_id: &str, response: &TokenResponse) {
        let subject = subjects::token_response(&self.prefix, request_id);
        self.publish(&subject, 200, response.encode()).await;
    }

    async fn send(&self, subject: String, notification: &StatusNotification) {
        self.publish(&subject, notification.status_code, notification.encode())
            .await;
    }

    async fn publish(&self, subject: &str, status_code: u16, payload: bytes::Bytes) {
        match publish_with_status(&self.client, subject, status_code, payload).await {
            Ok(()) => debug!(subject, status = status_code, "Notification published"),
            Err(e) => warn!(subject, error = %e, "Failed to publish notification"),
        }
    }
}
