use std::time::Duration;
use tokio::time::Instant;

/// Fires once a burst of hits has been quiet for `delay`
#[derive(Debug)]
pub struct Debounce {
    delay: Duration,
    due: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self { delay, due: None }
    }

    pub fn hit(&mut self, now: Instant) {
        self.due = Some(now + self.delay);
    }

    pub fn due(&self) -> Option<Instant> {
        self.due
    }

    pub fn fire(&mut self) {
        self.due = None;
    }
}

/// Lets one hit through per `interval`, with a trailing run for hits in between
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_run: Option<Instant>,
    trailing: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            trailing: None,
        }
    }

    /// Returns `true` if the caller should run now
    pub fn hit(&mut self, now: Instant) -> bool {
        match self.last_run {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.trailing = Some(last + self.interval);
                false
            }
            _ => {
                self.last_run = Some(now);
                self.trailing = None;
                true
            }
        }
    }

    pub fn due(&self) -> Option<Instant> {
        self.trailing
    }

    pub fn fire(&mut self, now: Instant) {
        self.trailing = None;
        self.last_run = Some(now);
    }

    pub fn reset(&mut self) {
        self.trailing = None;
        self.last_run = None;
    }
}

/// Sleep until `deadline`, or forever when there is none
pub async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
