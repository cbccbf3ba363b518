//! One trait per blob-store operation, so each consumer depends only on
//! what it calls and tests can replace a single step.

use std::error::Error;
use std::future::Future;

use crate::types::{ByteStream, ContainerCreation, ContainerPermissions, DelegationKey, ValidityWindow};

pub trait DownloadBlob: Send + Sync + Clone + 'static {
    type Error: Error + Send + Sync + 'static;

    /// Open a streamed download. Returns once the response headers are in;
    /// content arrives through the stream.
    fn download_stream(
        &self,
        container: &str,
        blob: &str,
    ) -> impl Future<Output = Result<ByteStream, Self::Error>> + Send;
}

pub trait CreateContainer: Send + Sync + Clone + 'static {
    type Error: Error + Send + Sync + 'static;

    /// Idempotent: an existing container is reported, not treated as failure.
    fn create_container_if_absent(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<ContainerCreation, Self::Error>> + Send;
}

pub trait GetDelegationKey: Send + Sync + Clone + 'static {
    type Error: Error + Send + Sync + 'static;

    fn user_delegation_key(
        &self,
        window: &ValidityWindow,
    ) -> impl Future<Output = Result<DelegationKey, Self::Error>> + Send;
}

pub trait SignContainerToken: Send + Sync + Clone + 'static {
    type Error: Error + Send + Sync + 'static;

    /// Absolute URL of the container, without query.
    fn container_url(&self, container: &str) -> String;

    /// URL-encoded SAS query string (no leading `?`).
    fn sign_container_token(
        &self,
        key: &DelegationKey,
        container: &str,
        permissions: ContainerPermissions,
        window: &ValidityWindow,
    ) -> Result<String, Self::Error>;
}
