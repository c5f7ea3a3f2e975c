use chrono::{DateTime, Utc};

/// Represents an entity responsible for providing dates across application. Session start and end
/// times are always taken from here, so tests can move time by hand.
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;
}

pub struct DefaultClock;

impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
