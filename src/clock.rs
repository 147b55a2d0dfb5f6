use std::{fmt::Debug, time::SystemTime};

/// Source of the current time.
///
/// Channels schedule flushes and retries against this clock, which lets hosts drive the pipeline
/// from their own event loop and tests run it without sleeping.
pub trait Clock: Debug + Send + Sync {
    /// Current time.
    fn now(&self) -> SystemTime;
}

/// [`Clock`] backed by [`SystemTime::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
