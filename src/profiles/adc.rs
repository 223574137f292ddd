//! Data acquisition (ADC) streaming.
//!
//! Each notification is read twice: as signed 16-bit little-endian samples
//! for display, and as 32-bit words rendered in hex for the raw log.

use std::time::Instant;

use super::ProfileDecoder;
use crate::buffer::Channel;
use crate::codec::{decode_field, hex_word_le, FieldSpec};
use crate::config::SessionConfig;
use crate::error::DecodeError;
use crate::protocol::*;
use crate::timestamp::SessionClock;
use crate::types::NotificationEvent;

pub const CH_SAMPLES: &str = "adc";

const SAMPLE: FieldSpec = FieldSpec::new(0, 2).signed();

pub struct AdcDecoder {
    display: Channel,
    raw_words: Vec<String>,
    notification_count: u64,
    notification_len: usize,
}

impl AdcDecoder {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            display: Channel::new(CH_SAMPLES, config.adc_display_capacity),
            raw_words: Vec::new(),
            notification_count: 0,
            notification_len: 0,
        }
    }

    pub fn notification_count(&self) -> u64 {
        self.notification_count
    }

    /// Byte length of the most recent accepted notification.
    pub fn notification_len(&self) -> usize {
        self.notification_len
    }

    pub fn raw_words(&self) -> &[String] {
        &self.raw_words
    }
}

/// `count * len / 4 - decoded`. Fractional when the last notification
/// length is not a whole number of words, negative when more words were
/// decoded than that length implies.
pub fn loss(notification_count: u64, notification_len: usize, decoded_words: usize) -> f64 {
    notification_count as f64 * notification_len as f64 / ADC_WORD_LEN as f64 - decoded_words as f64
}

impl ProfileDecoder for AdcDecoder {
    fn decode(
        &mut self,
        event: &NotificationEvent,
        clock: &mut SessionClock,
        now: Instant,
    ) -> Result<(), DecodeError> {
        if event.characteristic != ADC_DATA_CHARACTERISTIC {
            return Ok(());
        }
        let data = &event.payload;
        if data.len() < 2 {
            return Err(DecodeError::Truncated {
                needed: 2,
                actual: data.len(),
            });
        }

        let samples = (0..data.len() / 2)
            .map(|i| decode_field(data, &SAMPLE.at(i * 2)))
            .collect::<Result<Vec<_>, _>>()?;

        self.notification_count += 1;
        self.notification_len = data.len();

        let elapsed = clock.elapsed(now);
        for value in samples {
            self.display.push(value, elapsed);
        }
        for word in data.chunks_exact(ADC_WORD_LEN) {
            let word: [u8; 4] = [word[0], word[1], word[2], word[3]];
            self.raw_words.push(hex_word_le(&word));
        }
        Ok(())
    }

    fn channels(&self) -> Vec<&Channel> {
        vec![&self.display]
    }

    fn readings(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Notification length", self.notification_len.to_string()),
            ("Notifications received", self.notification_count.to_string()),
            ("Words saved", self.raw_words.len().to_string()),
        ]
    }

    fn loss(&self) -> Option<f64> {
        Some(loss(self.notification_count, self.notification_len, self.raw_words.len()))
    }

    /// One hex word per line.
    fn export(&self) -> String {
        self.raw_words.join("\n")
    }

    fn reset(&mut self) {
        self.display.reset();
        self.raw_words.clear();
        self.notification_count = 0;
        self.notification_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(payload: &[u8]) -> NotificationEvent {
        NotificationEvent::new("p", ADC_SERVICE, ADC_DATA_CHARACTERISTIC, payload.to_vec())
    }

    #[test]
    fn loss_formula() {
        assert_eq!(loss(10, 8, 18), 2.0);
        assert_eq!(loss(0, 0, 0), 0.0);
        assert_eq!(loss(1, 6, 3), -1.5);
    }

    #[test]
    fn decodes_display_and_hex() {
        let mut dec = AdcDecoder::new(&SessionConfig::default());
        let mut clock = SessionClock::new();
        dec.decode(
            &event(&[0x01, 0x00, 0xFF, 0xFF, 0x10, 0x20, 0x30, 0x40, 0xAA, 0xBB]),
            &mut clock,
            Instant::now(),
        )
        .unwrap();

        let values: Vec<f64> = dec.display.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, -1.0, 8208.0, 16432.0, -17494.0]);
        assert_eq!(dec.raw_words(), &["0xffff0001", "0x40302010"]);
        assert_eq!(dec.notification_len(), 10);
        assert_eq!(dec.export(), "0xffff0001\n0x40302010");
    }

    #[test]
    fn counts_feed_loss() {
        let mut dec = AdcDecoder::new(&SessionConfig::default());
        let mut clock = SessionClock::new();
        let now = Instant::now();
        for _ in 0..3 {
            dec.decode(&event(&[0; 8]), &mut clock, now).unwrap();
        }
        assert_eq!(dec.notification_count(), 3);
        assert_eq!(dec.loss(), Some(0.0));
    }

    #[test]
    fn short_payload_is_rejected() {
        let mut dec = AdcDecoder::new(&SessionConfig::default());
        let mut clock = SessionClock::new();
        assert!(dec.decode(&event(&[0x01]), &mut clock, Instant::now()).is_err());
        assert_eq!(dec.notification_count(), 0);
        assert!(dec.display.is_empty());
    }

    #[test]
    fn display_is_bounded() {
        let cfg = SessionConfig {
            adc_display_capacity: 3,
            ..SessionConfig::default()
        };
        let mut dec = AdcDecoder::new(&cfg);
        let mut clock = SessionClock::new();
        dec.decode(&event(&[0; 12]), &mut clock, Instant::now()).unwrap();
        assert_eq!(dec.display.len(), 3);
        assert_eq!(dec.raw_words().len(), 3);
    }
}
