//! ECG Patch: single-lead ECG with pace tags and I/Q respiration.
//!
//! A frame is 54 big-endian 32-bit words. Words 16/17, 34/35 and 52/53 are
//! respiration I/Q pairs; every other word is an ECG sample whose low bit is
//! the pace tag.

use std::time::Instant;

use log::debug;

use super::{ProfileDecoder, Respiration};
use crate::buffer::Channel;
use crate::codec::{decode_field, expect_len, read_uint, Endian, FieldSpec};
use crate::config::SessionConfig;
use crate::error::DecodeError;
use crate::export::{ExportFormatter, Table};
use crate::protocol::*;
use crate::timestamp::SessionClock;
use crate::types::NotificationEvent;

pub const CH_ECG: &str = "patch_ecg";
pub const CH_PACE: &str = "patch_pace";
pub const CH_RESPIRATION: &str = "respiration";
pub const CH_RESPIRATION_FILTERED: &str = "respiration_filtered";

const WORD: FieldSpec = FieldSpec::new(0, ECG_WORD_LEN)
    .big_endian()
    .inverted(ECG_SAMPLE_BITS)
    .scaled(PATCH_SCALE);

pub struct EcgPatchDecoder {
    ecg: Channel,
    pace: Channel,
    resp: Respiration,
    baseline: f64,
    baseline_armed: bool,
    arm_on_reset: bool,
}

impl EcgPatchDecoder {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            ecg: Channel::new(CH_ECG, config.points_to_display),
            pace: Channel::new(CH_PACE, config.points_to_display),
            resp: Respiration::new(CH_RESPIRATION, config),
            baseline: 0.0,
            baseline_armed: config.capture_baseline,
            arm_on_reset: config.capture_baseline,
        }
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// Respiration magnitude relative to `baseline`, the value in effect when
    /// the frame arrived. A capture made here applies from the next frame.
    fn respiration(&mut self, i: f64, q: f64, baseline: f64) -> f64 {
        let magnitude = (i * i + q * q).sqrt();
        if self.baseline_armed {
            self.baseline = magnitude;
            self.baseline_armed = false;
            debug!("respiration baseline captured: {magnitude}");
        }
        magnitude - baseline
    }
}

impl ProfileDecoder for EcgPatchDecoder {
    fn decode(
        &mut self,
        event: &NotificationEvent,
        clock: &mut SessionClock,
        now: Instant,
    ) -> Result<(), DecodeError> {
        if event.characteristic != ECG_PATCH_CHARACTERISTIC {
            return Ok(());
        }
        let data = &event.payload;
        expect_len(data, ECG_PATCH_FRAME_LEN)?;

        // Decode the whole frame before touching any channel.
        let mut words = [(0u32, 0f64); ECG_WORDS_PER_FRAME];
        for (slot, word) in words.iter_mut().enumerate() {
            let offset = slot * ECG_WORD_LEN;
            *word = (
                read_uint(data, offset, ECG_WORD_LEN, Endian::Big)?,
                decode_field(data, &WORD.at(offset))?,
            );
        }

        let elapsed = clock.elapsed(now);
        let baseline = self.baseline;
        let mut in_phase = 0.0;
        for (slot, &(raw, value)) in words.iter().enumerate() {
            if PATCH_RESP_I_SLOTS.contains(&slot) {
                in_phase = value;
            } else if PATCH_RESP_Q_SLOTS.contains(&slot) {
                let resp = self.respiration(in_phase, value, baseline);
                self.resp.push(resp, elapsed);
            } else {
                self.ecg.push(value / PATCH_ECG_DIVISOR, elapsed);
                self.pace.push((raw % 2) as f64 + PATCH_PACE_OFFSET, elapsed);
            }
        }
        Ok(())
    }

    fn channels(&self) -> Vec<&Channel> {
        vec![&self.ecg, &self.pace, &self.resp.raw, &self.resp.filtered]
    }

    fn readings(&self) -> Vec<(&'static str, String)> {
        vec![("Respiration baseline", self.baseline.to_string())]
    }

    fn arm_baseline(&mut self) -> bool {
        self.baseline_armed = true;
        true
    }

    fn export(&self) -> String {
        let mut ecg = Table::new(&["Time", "Formatted Time", "Patch ECG", "Patch Pace"]);
        for (e, p) in self.ecg.iter().zip(self.pace.iter()) {
            ecg.push_row(vec![
                e.time_column(),
                e.timestamp_label.clone(),
                e.value.to_string(),
                p.value.to_string(),
            ]);
        }
        let mut tables = vec![ecg, Table::from_samples("Respiration", &self.resp.raw.snapshot())];
        if self.resp.filter_applied() {
            tables.push(Table::from_samples(
                "Filtered Respiration",
                &self.resp.filtered.snapshot(),
            ));
        }
        ExportFormatter::default().format(&tables)
    }

    fn reset(&mut self) {
        self.ecg.reset();
        self.pace.reset();
        self.resp.reset();
        self.baseline = 0.0;
        self.baseline_armed = self.arm_on_reset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(words: &[(usize, u32)]) -> Vec<u8> {
        let mut data = vec![0u8; ECG_PATCH_FRAME_LEN];
        for &(slot, word) in words {
            data[slot * 4..slot * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        data
    }

    fn event(payload: Vec<u8>) -> NotificationEvent {
        NotificationEvent::new("p", ECG_SERVICE, ECG_PATCH_CHARACTERISTIC, payload)
    }

    fn config() -> SessionConfig {
        SessionConfig {
            apply_resp_filter: false,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn demultiplexes_one_frame() {
        let mut dec = EcgPatchDecoder::new(&config());
        let mut clock = SessionClock::new();
        let data = frame(&[(0, 0x000003), (1, 0xFFFFFE), (16, 3), (17, 4)]);
        dec.decode(&event(data), &mut clock, Instant::now()).unwrap();

        assert_eq!(dec.ecg.len(), 48);
        assert_eq!(dec.pace.len(), 48);
        assert_eq!(dec.resp.raw.len(), 3);

        let ecg = dec.ecg.snapshot();
        assert_eq!(ecg[0].value, 3.0 * PATCH_SCALE / 10.0);
        assert_eq!(ecg[1].value, (16777215.0 - 16777214.0) * -PATCH_SCALE / 10.0);

        let pace = dec.pace.snapshot();
        assert!((pace[0].value - 1.074).abs() < 1e-12);
        assert_eq!(pace[1].value, PATCH_PACE_OFFSET);

        let resp = dec.resp.raw.snapshot();
        let expected = ((3.0 * PATCH_SCALE).powi(2) + (4.0 * PATCH_SCALE).powi(2)).sqrt();
        assert!((resp[0].value - expected).abs() < 1e-12);
        assert_eq!(resp[1].value, 0.0);
    }

    #[test]
    fn rejects_wrong_length_without_side_effects() {
        let mut dec = EcgPatchDecoder::new(&config());
        let mut clock = SessionClock::new();
        let err = dec
            .decode(&event(vec![0; 215]), &mut clock, Instant::now())
            .unwrap_err();
        assert_eq!(err, DecodeError::UnexpectedLength { expected: 216, actual: 215 });
        assert!(dec.ecg.is_empty());
        assert!(clock.anchor().is_none());
    }

    #[test]
    fn ignores_other_characteristics() {
        let mut dec = EcgPatchDecoder::new(&config());
        let mut clock = SessionClock::new();
        let ev = NotificationEvent::new("p", ECG_SERVICE, ECG_HOLTER_CHARACTERISTIC, vec![0; 216]);
        dec.decode(&ev, &mut clock, Instant::now()).unwrap();
        assert!(dec.ecg.is_empty());
    }

    #[test]
    fn baseline_applies_from_next_frame() {
        let mut dec = EcgPatchDecoder::new(&config());
        let mut clock = SessionClock::new();
        let t0 = Instant::now();
        assert!(dec.arm_baseline());

        dec.decode(&event(frame(&[(16, 3), (17, 4)])), &mut clock, t0).unwrap();
        let captured = dec.baseline();
        assert!((captured - 5.0 * PATCH_SCALE).abs() < 1e-12);

        dec.decode(
            &event(frame(&[(16, 6), (17, 8)])),
            &mut clock,
            t0 + Duration::from_millis(20),
        )
        .unwrap();
        let resp = dec.resp.raw.snapshot();
        // The capturing frame is still reported against the old baseline.
        assert!((resp[0].value - 5.0 * PATCH_SCALE).abs() < 1e-12);
        assert_eq!(resp[1].value, 0.0);
        assert!((resp[3].value - 5.0 * PATCH_SCALE).abs() < 1e-12);
        assert!((resp[4].value + 5.0 * PATCH_SCALE).abs() < 1e-12);
        assert!((dec.baseline() - captured).abs() < 1e-12);
        assert_eq!(resp[3].timestamp_label, "00:00:00:02");
    }

    #[test]
    fn reset_clears_baseline() {
        let mut dec = EcgPatchDecoder::new(&config());
        let mut clock = SessionClock::new();
        dec.arm_baseline();
        dec.decode(&event(frame(&[(16, 3), (17, 4)])), &mut clock, Instant::now())
            .unwrap();
        dec.reset();
        assert_eq!(dec.baseline(), 0.0);
        assert!(dec.channels().iter().all(|c| c.is_empty()));
    }

    #[test]
    fn export_layout() {
        let mut dec = EcgPatchDecoder::new(&SessionConfig::default());
        let mut clock = SessionClock::new();
        dec.decode(&event(frame(&[])), &mut clock, Instant::now()).unwrap();
        let csv = dec.export();
        let mut lines = csv.split("\r\n");
        assert_eq!(
            lines.next().unwrap(),
            "Time,Formatted Time,Patch ECG,Patch Pace,,,,Time,Formatted Time,Respiration,,,,Time,Formatted Time,Filtered Respiration"
        );
        assert_eq!(lines.filter(|l| !l.is_empty()).count(), 48);
    }
}
