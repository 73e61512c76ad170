//! Time source abstraction.

use chrono::{DateTime, Utc};

/// Source of the current instant.
///
/// Production code uses [`SystemClock`]; tests drive a manual clock so that
/// due-ness and auto-resume boundaries can be hit exactly.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
