//! Session-relative time keeping.
//!
//! Peripherals in this crate do not embed timestamps in their notifications,
//! so samples are stamped with the time elapsed since the session's first
//! decoded sample. The anchor is captured lazily so that subscribe latency
//! and the device's own start-up delay do not show up as a leading gap.

use std::time::{Duration, Instant};

/// Time zero of one recording session.
///
/// One clock is owned by each [`crate::session::Session`] and shared by all
/// of its channels. [`SessionClock::reset`] is called on every session start.
#[derive(Debug, Default, Clone)]
pub struct SessionClock {
    anchor: Option<Instant>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self { anchor: None }
    }

    /// Time elapsed between the anchor and `now`, anchoring on first use.
    ///
    /// A `now` earlier than the anchor (late delivery of an event captured
    /// before the first decoded one) saturates to zero.
    pub fn elapsed(&mut self, now: Instant) -> Duration {
        let anchor = *self.anchor.get_or_insert(now);
        now.saturating_duration_since(anchor)
    }

    pub fn anchor(&self) -> Option<Instant> {
        self.anchor
    }

    /// Forget the anchor; the next call to [`SessionClock::elapsed`] re-anchors.
    pub fn reset(&mut self) {
        self.anchor = None;
    }
}

/// Render an offset as `hh:mm:ss:cc` (cc = hundredths of a second).
pub fn format_clock(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    let cc = elapsed.subsec_millis() / 10;
    format!("{h:02}:{m:02}:{s:02}:{cc:02}")
}

/// Render an offset as `ss.cc` with the whole seconds unbounded.
pub fn format_seconds(elapsed: Duration) -> String {
    let cc = elapsed.subsec_millis() / 10;
    format!("{:02}.{cc:02}", elapsed.as_secs())
}
