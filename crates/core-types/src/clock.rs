use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// An injectable time source.
///
/// Lease expiry and retry backoff are pure functions of "now", so every
/// component that reasons about time takes a `Clock` instead of calling
/// `Utc::now()` directly. Production code uses `SystemClock`; tests drive a
/// `ManualClock` to make expiry deterministic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A hand-driven clock for deterministic tests.
///
/// Clones share the same underlying instant, so a clock handed to a worker
/// can be advanced from the test body.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
