use chrono::{DateTime, Utc};
use plugstrap_core::Clock;
use uuid::Uuid;

/// Wall clock with random v4 run ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn run_id(&self) -> Uuid {
        Uuid::new_v4()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
