//! One recording session: the profile decoder, its clock and its counters.
//!
//! A [`Session`] is created fresh on every `start()` so that baselines, last
//! pace values and median windows never leak from one recording into the
//! next. It stays readable after `stop()` until the next start or reset.

use std::time::Instant;

use log::debug;
use serde::Serialize;

use crate::buffer::Channel;
use crate::config::SessionConfig;
use crate::error::DecodeError;
use crate::profiles::{Profile, ProfileDecoder};
use crate::timestamp::SessionClock;
use crate::types::{NotificationEvent, Sample};

/// Counters and scalar readings of a session, for status lines and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub profile: String,
    pub peripheral_id: String,
    /// Notifications handed to the decoder.
    pub notifications: u64,
    /// Notifications the decoder rejected as malformed.
    pub rejected: u64,
    /// Profile-specific loss estimate (ADC only).
    pub loss: Option<f64>,
    pub readings: Vec<(String, String)>,
    /// Channel name and number of samples currently held.
    pub channels: Vec<(String, usize)>,
}

pub struct Session {
    profile: Profile,
    peripheral_id: String,
    config: SessionConfig,
    decoder: Box<dyn ProfileDecoder>,
    clock: SessionClock,
    notifications: u64,
    rejected: u64,
    last_error: Option<DecodeError>,
}

impl Session {
    pub fn new(profile: Profile, peripheral_id: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            profile,
            peripheral_id: peripheral_id.into(),
            decoder: profile.decoder(&config),
            config,
            clock: SessionClock::new(),
            notifications: 0,
            rejected: 0,
            last_error: None,
        }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn peripheral_id(&self) -> &str {
        &self.peripheral_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn decoder(&self) -> &dyn ProfileDecoder {
        self.decoder.as_ref()
    }

    /// Feed one notification to the decoder.
    ///
    /// Events from other peripherals are ignored. A rejected payload is
    /// counted and logged at `debug` level; the error is returned for callers
    /// that want it, but the session stays usable.
    pub fn ingest(&mut self, event: &NotificationEvent, now: Instant) -> Result<(), DecodeError> {
        if event.peripheral_id != self.peripheral_id {
            return Ok(());
        }
        self.notifications += 1;
        let result = self.decoder.decode(event, &mut self.clock, now);
        if let Err(e) = &result {
            self.rejected += 1;
            debug!(
                "{}: rejected {} bytes from {}: {e}",
                self.profile,
                event.payload.len(),
                event.characteristic
            );
            self.last_error = Some(e.clone());
        }
        result
    }

    pub fn notifications(&self) -> u64 {
        self.notifications
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn last_error(&self) -> Option<&DecodeError> {
        self.last_error.as_ref()
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.decoder.channel(name)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.decoder
            .channels()
            .into_iter()
            .map(|c| c.name().to_owned())
            .collect()
    }

    pub fn snapshot(&self, name: &str) -> Option<Vec<Sample>> {
        self.channel(name).map(Channel::snapshot)
    }

    pub fn export(&self) -> String {
        self.decoder.export()
    }

    pub fn arm_baseline(&mut self) -> bool {
        self.decoder.arm_baseline()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            profile: self.profile.name().to_owned(),
            peripheral_id: self.peripheral_id.clone(),
            notifications: self.notifications,
            rejected: self.rejected,
            loss: self.decoder.loss(),
            readings: self
                .decoder
                .readings()
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
            channels: self
                .decoder
                .channels()
                .into_iter()
                .map(|c| (c.name().to_owned(), c.len()))
                .collect(),
        }
    }

    /// Clear every channel, the clock and the counters.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.clock.reset();
        self.notifications = 0;
        self.rejected = 0;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::*;

    fn adc_event(peripheral: &str, payload: &[u8]) -> NotificationEvent {
        NotificationEvent::new(peripheral, ADC_SERVICE, ADC_DATA_CHARACTERISTIC, payload.to_vec())
    }

    #[test]
    fn counts_notifications_and_rejects() {
        let mut s = Session::new(Profile::Adc, "dev", SessionConfig::default());
        let now = Instant::now();
        s.ingest(&adc_event("dev", &[0; 8]), now).unwrap();
        assert!(s.ingest(&adc_event("dev", &[1]), now).is_err());

        assert_eq!(s.notifications(), 2);
        assert_eq!(s.rejected(), 1);
        assert!(matches!(s.last_error(), Some(DecodeError::Truncated { .. })));
        assert_eq!(s.snapshot("adc").unwrap().len(), 4);
    }

    #[test]
    fn other_peripherals_are_ignored() {
        let mut s = Session::new(Profile::Adc, "dev", SessionConfig::default());
        s.ingest(&adc_event("other", &[0; 8]), Instant::now()).unwrap();
        assert_eq!(s.notifications(), 0);
        assert!(s.snapshot("adc").unwrap().is_empty());
    }

    #[test]
    fn summary_reports_loss_and_channels() {
        let mut s = Session::new(Profile::Adc, "dev", SessionConfig::default());
        s.ingest(&adc_event("dev", &[0; 8]), Instant::now()).unwrap();
        let summary = s.summary();
        assert_eq!(summary.profile, "adc");
        assert_eq!(summary.loss, Some(0.0));
        assert_eq!(summary.channels, vec![("adc".to_owned(), 4)]);
        assert!(serde_json::to_string(&summary).unwrap().contains("\"loss\":0.0"));
    }

    #[test]
    fn reset_clears_everything() {
        let mut s = Session::new(Profile::Adc, "dev", SessionConfig::default());
        s.ingest(&adc_event("dev", &[0; 8]), Instant::now()).unwrap();
        s.reset();
        assert_eq!(s.notifications(), 0);
        assert!(s.snapshot("adc").unwrap().is_empty());
        assert!(s.snapshot("nope").is_none());
    }

    #[test]
    fn baseline_only_on_ecg_patch() {
        let mut adc = Session::new(Profile::Adc, "dev", SessionConfig::default());
        assert!(!adc.arm_baseline());
        let mut patch = Session::new(Profile::EcgPatch, "dev", SessionConfig::default());
        assert!(patch.arm_baseline());
    }
}
