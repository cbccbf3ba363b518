//! Container upload tokens: create-only user-delegation SAS URLs.

use chrono::Duration;
use relay_blob::{
    ContainerCreation, ContainerPermissions, CreateContainer, GetDelegationKey,
    SignContainerToken, ValidityWindow,
};
use relay_std::GetUtcNow;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::messages::{TokenRequest, TokenResponse};

/// Backdating of the window start, for clock drift between hosts.
pub const CLOCK_SKEW: Duration = Duration::seconds(10);
pub const TOKEN_LIFETIME: Duration = Duration::hours(48);

/// A freshly signed container URL. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub container_name: String,
    /// `{container_url}?{sas query}`.
    pub token: String,
    pub window: ValidityWindow,
}

impl IssuedToken {
    pub fn response(&self) -> TokenResponse {
        TokenResponse {
            container_name: self.container_name.clone(),
            token: self.token.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TokenIssuer<B, C> {
    blob: B,
    clock: C,
}

impl<B, C> TokenIssuer<B, C>
where
    B: CreateContainer + GetDelegationKey + SignContainerToken,
    C: GetUtcNow + Send + Sync,
{
    pub fn new(blob: B, clock: C) -> Self {
        Self { blob, clock }
    }

    #[instrument(
        name = "token.issue",
        skip(self, request),
        fields(request_id = %request.request_id, container = %request.container_name)
    )]
    pub async fn issue(&self, request: &TokenRequest) -> Result<IssuedToken> {
        let container = request.container_name.as_str();

        match self.blob.create_container_if_absent(container).await {
            Ok(ContainerCreation::Created) => info!("Container created"),
            Ok(ContainerCreation::AlreadyExists) => debug!("Container already exists"),
            Err(e) => {
                warn!(error = %e, "Container creation failed");
                return Err(Error::ContainerCreation(e.to_string()));
            }
        }

        let window = ValidityWindow::around(self.clock.now_utc(), CLOCK_SKEW, TOKEN_LIFETIME);

        let key = self.blob.user_delegation_key(&window).await.map_err(|e| {
            warn!(error = %e, "Delegation key request failed");
            Error::DelegationKey(e.to_string())
        })?;

        let sas = self
            .blob
            .sign_container_token(&key, container, ContainerPermissions::create_only(), &window)
            .map_err(|e| {
                warn!(error = %e, "Token signing failed");
                Error::Signing(e.to_string())
            })?;

        info!(expiry = %window.expiry_str(), "Upload token issued");
        Ok(IssuedToken {
            container_name: container.to_string(),
            token: format!("{}?{sas}", self.blob.container_url(container)),
            window,
        })
    }
}
