use chrono::{DateTime, Utc};

pub trait GetUtcNow {
    fn now_utc(&self) -> DateTime<Utc>;
}
