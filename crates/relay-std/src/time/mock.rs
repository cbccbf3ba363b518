#[cfg(any(test, feature = "test-support"))]
use std::sync::{Arc, Mutex};

#[cfg(any(test, feature = "test-support"))]
use chrono::{DateTime, Duration, Utc};

#[cfg(any(test, feature = "test-support"))]
use super::GetUtcNow;

/// Time only moves when you call [`advance`](MockClock::advance) or
/// [`set`](MockClock::set). Clones share the same current time.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl MockClock {
    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap();
        *current += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.current.lock().unwrap() = to;
    }
}

#[cfg(any(test, feature = "test-support"))]
impl GetUtcNow for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn starts_at_given_time() {
        let clock = MockClock::at(epoch());
        assert_eq!(clock.now_utc(), epoch());
    }

    #[test]
    fn advance_moves_forward() {
        let clock = MockClock::at(epoch());
        clock.advance(Duration::hours(48));

        assert_eq!(clock.now_utc(), epoch() + Duration::hours(48));
    }

    #[test]
    fn clones_share_state() {
        let clock = MockClock::at(epoch());
        let clone = clock.clone();

        clone.set(epoch() + Duration::seconds(10));

        assert_eq!(clock.now_utc(), epoch() + Duration::seconds(10));
    }
}
