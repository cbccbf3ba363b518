//! Message-driven artifact relay.
//!
//! # Architecture
//!
//! ```text
//! JetStream "RELAY_REQUESTS"
//!     {prefix}.upload.>          {prefix}.generateToken.>
//!               ↓                          ↓
//!          [worker: one task per message, Dispatcher::dispatch]
//!               ↓ decode, route, 10 min deadline, single ack
//!   ┌───────────┴───────────┐
//!   RelayPipeline           TokenIssuer
//!   blob download           ensure container
//!     → bounded conduit     → user delegation key
//!     → multipart POST      → create-only container SAS
//!   ↓                       ↓
//!   {prefix}.uploadResponse.{id}        "In Progress"
//!   {prefix}.uploadTargetResponse.{id}  "Finished" | "Failed"
//!   {prefix}.tokenResponse.{id}         {containerName, token}
//! ```

pub mod conduit;
pub mod config;
pub mod error;
pub mod messages;
pub mod multipart;
pub mod notify;
pub mod relay;
pub mod router;
pub mod signal;
pub mod stream;
pub mod subjects;
pub mod token;
pub mod worker;

pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use router::{Disposition, Dispatcher};
