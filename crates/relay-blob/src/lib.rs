//! Blob-store collaborator for the artifact relay.
//!
//! The relay depends only on the per-operation traits in [`traits`]; the
//! production implementation is [`AzureBlobClient`], which talks to the Azure
//! Blob REST API with an AAD bearer token, and [`MemoryBlobStore`] backs tests.
//!
//! ```rust,no_run
//! use relay_blob::{AzureBlobClient, AzureBlobConfig, AzureCredential, CreateContainer};
//!
//! # async fn run() -> Result<(), relay_blob::AzureBlobError> {
//! let config = AzureBlobConfig::from_account_url(
//!     "https://myaccount.blob.core.windows.net/",
//!     AzureCredential::managed_identity(None),
//! )?;
//! let client = AzureBlobClient::new(config, reqwest::Client::new());
//! client.create_container_if_absent("artifacts").await?;
//! # Ok(())
//! # }
//! ```

pub mod azure;
pub mod credential;
pub mod sas;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use azure::{AzureBlobClient, AzureBlobConfig, AzureBlobError};
pub use credential::AzureCredential;
pub use sas::{SasError, sign_container_sas};
pub use traits::{CreateContainer, DownloadBlob, GetDelegationKey, SignContainerToken};
pub use types::{ByteStream, ContainerCreation, ContainerPermissions, DelegationKey, ValidityWindow};

#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemoryBlobError, MemoryBlobStore};
