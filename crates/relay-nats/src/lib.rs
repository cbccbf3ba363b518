//! # relay-nats
//!
//! NATS plumbing for the artifact relay:
//! - connection config resolved from the environment, with reconnect handling
//! - per-operation client traits so handlers can be tested without a server
//! - the [`AckMessage`] seam over JetStream deliveries
//! - status-bearing publish helpers that propagate trace context
//! - mocks (with the `test-support` feature)
//!
//! ```rust,no_run
//! use relay_nats::{NatsConfig, connect};
//! use relay_std::SystemEnv;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = NatsConfig::from_env(&SystemEnv);
//!     let client = connect(&config, Duration::from_secs(10)).await.unwrap();
//! }
//! ```

pub mod auth;
pub mod client;
pub mod connect;
pub mod messaging;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use auth::{NatsAuth, NatsConfig};
pub use client::{AckMessage, FlushClient, PublishClient};
pub use connect::{ConnectError, connect};
pub use messaging::{STATUS_CODE_HEADER, headers_with_trace_context, publish_with_status};

#[cfg(any(test, feature = "test-support"))]
pub use mocks::{MockMessage, MockNatsClient, PublishedMessage};
