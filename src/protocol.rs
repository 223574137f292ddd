//! GATT UUIDs, frame lengths, scale constants and control-command bytes for
//! every supported device profile.
//!
//! Vendor UUIDs live in the TI namespace `f000XXXX-0451-4000-b000-000000000000`;
//! 16-bit identifiers are expanded over the Bluetooth SIG base UUID.

use uuid::Uuid;

/// Expand a 16-bit assigned number over the Bluetooth SIG base UUID.
pub const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_00805f9b34fb)
}

/// Expand a 16-bit identifier into the TI vendor namespace.
pub const fn ti_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((0xf000_0000u128 | short as u128) << 96) | 0x0000_0000_0451_4000_b000_000000000000)
}

// ── ECG ──────────────────────────────────────────────────────────────────────

pub const ECG_SERVICE: Uuid = ti_uuid(0xbb00);
pub const ECG_PATCH_CHARACTERISTIC: Uuid = ti_uuid(0xbb01);
pub const ECG_HOLTER_CHARACTERISTIC: Uuid = ti_uuid(0xbb02);

/// 54 big-endian 32-bit words.
pub const ECG_PATCH_FRAME_LEN: usize = 216;
/// 54 words plus a trailing indicator byte.
pub const ECG_HOLTER_FRAME_LEN: usize = 217;
pub const ECG_WORD_LEN: usize = 4;
pub const ECG_WORDS_PER_FRAME: usize = 54;

/// Sign threshold of the 24-bit inverted encoding.
pub const ECG_SAMPLE_BITS: u32 = 24;

/// Patch front-end gain in volts per LSB.
pub const PATCH_SCALE: f64 = 1.1 * 0.0004786;
/// ECG slots are plotted at a tenth of the front-end scale.
pub const PATCH_ECG_DIVISOR: f64 = 10.0;
/// Offset added to the pace parity bit so the tag sits above the trace.
pub const PATCH_PACE_OFFSET: f64 = 0.074;

/// Word slots carrying the in-phase respiration component.
pub const PATCH_RESP_I_SLOTS: [usize; 3] = [16, 34, 52];
/// Word slots carrying the quadrature respiration component.
pub const PATCH_RESP_Q_SLOTS: [usize; 3] = [17, 35, 53];

pub const HOLTER_SCALE: f64 = -0.000000313;
pub const HOLTER_MILLI: f64 = 1000.0;
/// Words per repeating group: ch1, ch2, ch3, ch4, pace word, PCG.
pub const HOLTER_GROUP_LEN: usize = 6;
pub const HOLTER_PACE_FIELD: usize = 4;
pub const HOLTER_PCG_FIELD: usize = 5;
pub const HOLTER_PACE_WIDTH_SCALE: f64 = 28.73;
pub const HOLTER_PACE_AMP_SCALE: f64 = 0.021536;
pub const HOLTER_POLARITY_BIT: u8 = 128;

// ── Data acquisition (ADC) ───────────────────────────────────────────────────

pub const ADC_SERVICE: Uuid = ti_uuid(0xdd00);
/// Start/stop flag: `[1]` starts streaming, `[0]` stops it.
pub const ADC_CONTROL_CHARACTERISTIC: Uuid = ti_uuid(0xdd01);
pub const ADC_DATA_CHARACTERISTIC: Uuid = ti_uuid(0xdd02);

/// Bytes per exported raw word.
pub const ADC_WORD_LEN: usize = 4;

// ── Range test ───────────────────────────────────────────────────────────────

pub const RANGE_SERVICE: Uuid = sig_uuid(0xf400);
pub const RANGE_PACKETS_RECEIVED: Uuid = sig_uuid(0xf402);
pub const RANGE_CRC_OK: Uuid = sig_uuid(0xf403);
pub const RANGE_SYNC_OK: Uuid = sig_uuid(0xf404);
pub const RANGE_TIMESTAMP: Uuid = sig_uuid(0xf405);
pub const RANGE_AVG_RSSI: Uuid = sig_uuid(0xf406);
pub const RANGE_MIN_RSSI: Uuid = sig_uuid(0xf407);
pub const RANGE_MAX_RSSI: Uuid = sig_uuid(0xf408);
pub const RANGE_START_TEST: Uuid = sig_uuid(0xf409);
pub const RANGE_CURRENT_RSSI: Uuid = sig_uuid(0xf40a);
pub const RANGE_SITE_SURVEY: Uuid = sig_uuid(0xf40b);

/// Characteristics the range test subscribes to, counters first.
pub const RANGE_NOTIFY_CHARACTERISTICS: [Uuid; 8] = [
    RANGE_PACKETS_RECEIVED,
    RANGE_CRC_OK,
    RANGE_SYNC_OK,
    RANGE_TIMESTAMP,
    RANGE_AVG_RSSI,
    RANGE_MIN_RSSI,
    RANGE_MAX_RSSI,
    RANGE_CURRENT_RSSI,
];

// ── Health thermometer ───────────────────────────────────────────────────────

pub const THERMOMETER_SERVICE: Uuid = sig_uuid(0x1809);
pub const TEMPERATURE_MEASUREMENT: Uuid = sig_uuid(0x2a1c);

pub const THERMO_FLAG_FAHRENHEIT: u8 = 0x01;
pub const THERMO_FLAG_TIMESTAMP: u8 = 0x02;
pub const THERMO_FLAG_TYPE: u8 = 0x04;

/// Body locations indexed by the temperature-type byte. Out-of-range values
/// fall back to index 0.
pub const TEMPERATURE_TYPES: [&str; 10] = [
    "Reserved",
    "Armpit",
    "Body (general)",
    "Ear (usually earlobe)",
    "Finger",
    "Gastrointestinal Tract",
    "Mouth",
    "Rectum",
    "Toe",
    "Tympanum (ear drum)",
];

// ── Battery ──────────────────────────────────────────────────────────────────

pub const BATTERY_SERVICE: Uuid = sig_uuid(0x180f);
/// One byte, percent.
pub const BATTERY_LEVEL: Uuid = sig_uuid(0x2a19);
pub const BATTERY_FRAME_LEN: usize = 1;

// ── SensorTag ────────────────────────────────────────────────────────────────

pub const IR_TEMPERATURE_SERVICE: Uuid = ti_uuid(0xaa00);
pub const IR_TEMPERATURE_DATA: Uuid = ti_uuid(0xaa01);
pub const IR_TEMPERATURE_CONFIG: Uuid = ti_uuid(0xaa02);

pub const HUMIDITY_SERVICE: Uuid = ti_uuid(0xaa20);
pub const HUMIDITY_DATA: Uuid = ti_uuid(0xaa21);
pub const HUMIDITY_CONFIG: Uuid = ti_uuid(0xaa22);

pub const BAROMETER_SERVICE: Uuid = ti_uuid(0xaa40);
pub const BAROMETER_DATA: Uuid = ti_uuid(0xaa41);
pub const BAROMETER_CONFIG: Uuid = ti_uuid(0xaa42);

pub const OPTICAL_SERVICE: Uuid = ti_uuid(0xaa70);
pub const OPTICAL_DATA: Uuid = ti_uuid(0xaa71);
pub const OPTICAL_CONFIG: Uuid = ti_uuid(0xaa72);

pub const MOVEMENT_SERVICE: Uuid = ti_uuid(0xaa80);
pub const MOVEMENT_DATA: Uuid = ti_uuid(0xaa81);
pub const MOVEMENT_CONFIG: Uuid = ti_uuid(0xaa82);

pub const SIMPLE_KEYS_SERVICE: Uuid = sig_uuid(0xffe0);
pub const SIMPLE_KEYS_DATA: Uuid = sig_uuid(0xffe1);

pub const OPTICAL_FRAME_LEN: usize = 2;
pub const HUMIDITY_FRAME_LEN: usize = 4;
pub const BAROMETER_FRAME_LEN: usize = 6;
pub const IR_TEMPERATURE_FRAME_LEN: usize = 4;
pub const MOVEMENT_FRAME_LEN: usize = 18;
pub const SIMPLE_KEYS_FRAME_LEN: usize = 1;

/// Degrees per second per LSB.
pub const GYRO_DIVISOR: f64 = 65536.0 / 500.0;
/// g per LSB at the ±2 g range.
pub const ACC_DIVISOR: f64 = 32768.0 / 2.0;

// ── Control commands ─────────────────────────────────────────────────────────

pub const CMD_START: [u8; 1] = [0x01];
pub const CMD_STOP: [u8; 1] = [0x00];
pub const SENSOR_ENABLE: [u8; 1] = [0x01];
pub const SENSOR_DISABLE: [u8; 1] = [0x00];
/// Movement config enables every axis of all three sensors.
pub const MOVEMENT_ENABLE: [u8; 2] = [0xff, 0xff];
pub const MOVEMENT_DISABLE: [u8; 2] = [0x00, 0x00];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_expansion() {
        assert_eq!(
            ECG_PATCH_CHARACTERISTIC.to_string(),
            "f000bb01-0451-4000-b000-000000000000"
        );
        assert_eq!(
            TEMPERATURE_MEASUREMENT.to_string(),
            "00002a1c-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(RANGE_SERVICE.to_string(), "0000f400-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn battery_uuids() {
        assert_eq!(BATTERY_LEVEL.to_string(), "00002a19-0000-1000-8000-00805f9b34fb");
        assert_eq!(BATTERY_SERVICE.to_string(), "0000180f-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn frame_geometry() {
        assert_eq!(ECG_WORDS_PER_FRAME * ECG_WORD_LEN, ECG_PATCH_FRAME_LEN);
        assert_eq!(ECG_PATCH_FRAME_LEN + 1, ECG_HOLTER_FRAME_LEN);
        assert_eq!(ECG_WORDS_PER_FRAME % HOLTER_GROUP_LEN, 0);
    }
}
