use chrono::{Local, Utc};

/// Time source injected into the store and coordinator so id assignment,
/// cleanup cutoffs, and the flush timer are deterministic under test.
pub(crate) trait Clock {
    /// Current time as epoch milliseconds.
    fn now_ms(&self) -> i64;

    /// Current local date formatted for display.
    fn today(&self) -> String {
        Local::now().format("%Y-%m-%d").to_string()
    }
}

/// Formats epoch milliseconds as an ISO-8601 UTC instant for export and
/// metadata stamps.
pub(crate) fn iso_date(now_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(now_ms)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_default()
}

/// Wall-clock time.
pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Fixed, manually advanced time for tests.
#[cfg(test)]
pub(crate) struct FixedClock(pub std::cell::Cell<i64>);

#[cfg(test)]
impl FixedClock {
    pub(crate) fn new(now_ms: i64) -> Self {
        Self(std::cell::Cell::new(now_ms))
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0.get()
    }

    fn today(&self) -> String {
        "2024-01-15".into()
    }
}
