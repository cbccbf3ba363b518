use chrono::{DateTime, Utc};

use super::GetUtcNow;

/// Zero-sized type that delegates to `chrono::Utc::now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl GetUtcNow for SystemClock {
    #[inline]
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
