//! Subject-based dispatch with a per-message deadline and a single ack.
//!
//! ```text
//! Received → Routed → Handled | HandlerFailed | TimedOut → Acknowledged
//! Received → Unrouted → Acknowledged
//! ```
//!
//! Handler failures are logged, never retried: every message is acked
//! exactly once, after its handler returns, fails, or runs out of time.

use std::time::Duration;

use relay_blob::{CreateContainer, DownloadBlob, GetDelegationKey, SignContainerToken};
use relay_nats::{AckMessage, FlushClient, PublishClient};
use relay_std::GetUtcNow;
use reqwest::Client as HttpClient;
use tracing::{debug, error, info, warn};

use crate::conduit::ConduitConfig;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::messages::{RelayRequest, TokenRequest};
use crate::notify::Notifier;
use crate::relay::RelayPipeline;
use crate::subjects::{self, RequestKind};
use crate::token::TokenIssuer;

pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Which path a message took through [`Dispatcher::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Handled(RequestKind),
    HandlerFailed(RequestKind),
    TimedOut(RequestKind),
    Unrouted,
}

pub struct Dispatcher<B, N, C> {
    prefix: String,
    timeout: Duration,
    relay: RelayPipeline<B, N>,
    tokens: TokenIssuer<B, C>,
    notifier: Notifier<N>,
}

impl<B, N, C> Dispatcher<B, N, C>
where
    B: DownloadBlob + CreateContainer + GetDelegationKey + SignContainerToken,
    N: PublishClient + FlushClient,
    C: GetUtcNow + Send + Sync + 'static,
{
    pub fn new(prefix: impl Into<String>, blob: B, nats: N, http: HttpClient, clock: C) -> Self {
        let prefix = prefix.into();
        let notifier = Notifier::new(nats, prefix.clone());
        Self {
            timeout: DEFAULT_HANDLER_TIMEOUT,
            relay: RelayPipeline::new(blob.clone(), notifier.clone(), http),
            tokens: TokenIssuer::new(blob, clock),
            notifier,
            prefix,
        }
    }

    pub fn from_config(config: &Config, blob: B, nats: N, http: HttpClient, clock: C) -> Self {
        Self::new(config.prefix(), blob, nats, http, clock)
            .with_timeout(config.handler_timeout())
            .with_conduit(config.conduit())
            .with_base_url(config.downstream_base_url().map(String::from))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_conduit(mut self, conduit: ConduitConfig) -> Self {
        self.relay = self.relay.with_conduit(conduit);
        self
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.relay = self.relay.with_base_url(base_url);
        self
    }

    pub async fn dispatch<M: AckMessage>(&self, message: M) -> Disposition {
        let disposition = match subjects::classify(&self.prefix, message.subject()) {
            None => {
                debug!(subject = %message.subject(), "No handler for subject; dropping");
                Disposition::Unrouted
            }
            Some(kind) => self.run_with_deadline(kind, message.subject(), message.payload()).await,
        };

        if let Err(e) = message.ack().await {
            warn!(error = %e, "Failed to ack JetStream message");
        }
        disposition
    }

    async fn run_with_deadline(&self, kind: RequestKind, subject: &str, payload: &[u8]) -> Disposition {
        match self.handle(kind, payload).await {
            Ok(()) => Disposition::Handled(kind),
            Err(e @ Error::Timeout(_)) => {
                error!(subject, kind = kind.as_str(), error = %e, "Handler deadline exceeded");
                Disposition::TimedOut(kind)
            }
            Err(e) => {
                error!(subject, kind = kind.as_str(), status = e.status_code(), error = %e, "Handler failed");
                Disposition::HandlerFailed(kind)
            }
        }
    }

    /// Decoding happens before the deadline starts, so an expired relay can
    /// still be reported against its requestId.
    async fn handle(&self, kind: RequestKind, payload: &[u8]) -> Result<()> {
        match kind {
            RequestKind::Relay => {
                let request = RelayRequest::decode(payload)?;
                match tokio::time::timeout(self.timeout, self.relay.relay(&request)).await {
                    Ok(outcome) => {
                        outcome?;
                    }
                    Err(_) => {
                        let e = Error::Timeout(self.timeout);
                        self.notifier
                            .upload_failed(&request.request_id, e.status_code())
                            .await;
                        return Err(e);
                    }
                }
            }
            RequestKind::Token => {
                let request = TokenRequest::decode(payload)?;
                let issued = tokio::time::timeout(self.timeout, self.tokens.issue(&request))
                    .await
                    .map_err(|_| Error::Timeout(self.timeout))??;
                self.notifier
                    .token_issued(&request.request_id, &issued.response())
                    .await;
                info!(request_id = %request.request_id, "Token response published");
            }
        }
        Ok(())
    }
}
