//! Environment variable access.
//!
//! ```
//! use relay_std::env::{ReadEnv, SystemEnv};
//!
//! fn blob_url<E: ReadEnv>(env: &E) -> String {
//!     env.var("BLOB_STORAGE_URL")
//!         .unwrap_or_else(|_| "https://localhost".to_string())
//! }
//!
//! let url = blob_url(&SystemEnv);
//! ```

mod in_memory;
mod read_env;
mod system;

#[cfg(any(test, feature = "test-support"))]
pub use in_memory::InMemoryEnv;
pub use read_env::ReadEnv;
pub use system::SystemEnv;
