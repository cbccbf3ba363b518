//! Zero-cost abstractions over `std` for the artifact relay.
//!
//! | Concern | Trait | Production | Test |
//! |---------|-------|------------|------|
//! | Env vars | [`ReadEnv`] | [`SystemEnv`] | `InMemoryEnv`* |
//! | Wall clock | [`GetUtcNow`] | [`SystemClock`] | `MockClock`* |
//!
//! *Available with `#[cfg(test)]` or the `"test-support"` feature.
//!
//! `InMemoryEnv` is `RefCell`-backed and therefore not `Sync`; `MockClock`
//! shares its state behind `Arc<Mutex<…>>` and can be cloned into tasks.

pub mod env;
pub mod time;

pub use env::{ReadEnv, SystemEnv};
pub use time::{GetUtcNow, SystemClock};
