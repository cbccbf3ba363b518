//! Wall-clock access.
//!
//! SAS validity windows are absolute UTC timestamps, so this seam returns
//! `chrono::DateTime<Utc>` rather than a monotonic instant.
//!
//! ```
//! use relay_std::time::{GetUtcNow, SystemClock};
//!
//! fn stamp<C: GetUtcNow>(clock: &C) -> String {
//!     clock.now_utc().to_rfc3339()
//! }
//!
//! let _ = stamp(&SystemClock);
//! ```

mod get_utc_now;
mod mock;
mod system;

pub use get_utc_now::GetUtcNow;
#[cfg(any(test, feature = "test-support"))]
pub use mock::MockClock;
pub use system::SystemClock;
