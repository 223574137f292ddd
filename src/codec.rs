//! Field-level decoding of raw notification payloads.
//!
//! Every profile describes its wire fields with a [`FieldSpec`] and reads them
//! through [`decode_field`]. The functions here are pure and never allocate
//! except for [`hex_word_le`].
//!
//! # Sign handling
//!
//! | [`Signedness`] | Interpretation of `raw` |
//! |---|---|
//! | `Unsigned` | `raw * scale` |
//! | `TwosComplement` | standard two's complement over the field width, then `* scale` |
//! | `Inverted { bits }` | `raw > 2^(bits-1)` ⇒ `(2^bits - 1 - raw) * -scale`, else `raw * scale` |
//!
//! `Inverted` is the encoding used by the ECG front-ends. It subtracts from
//! `2^bits - 1` rather than `2^bits`, so it is *not* two's complement and is
//! kept exactly as the devices define it. `bits` may be smaller than the field
//! width (the ECG words are 32-bit fields carrying 24-bit samples); bits above
//! `bits` are not masked off.

use crate::error::DecodeError;

/// Byte order of a multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// How the raw integer of a field maps onto a signed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    Unsigned,
    TwosComplement,
    Inverted { bits: u32 },
}

/// Location and interpretation of one numeric field inside a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub offset: usize,
    pub width: usize,
    pub signedness: Signedness,
    pub endian: Endian,
    pub scale: f64,
}

impl FieldSpec {
    /// An unsigned little-endian field with unit scale.
    pub const fn new(offset: usize, width: usize) -> Self {
        Self {
            offset,
            width,
            signedness: Signedness::Unsigned,
            endian: Endian::Little,
            scale: 1.0,
        }
    }

    pub const fn big_endian(mut self) -> Self {
        self.endian = Endian::Big;
        self
    }

    pub const fn signed(mut self) -> Self {
        self.signedness = Signedness::TwosComplement;
        self
    }

    /// Use the inverted encoding with the sign threshold at `2^(bits-1)`.
    pub const fn inverted(mut self, bits: u32) -> Self {
        self.signedness = Signedness::Inverted { bits };
        self
    }

    pub const fn scaled(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// The same field moved to another offset.
    pub const fn at(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Read an unsigned integer of `width` bytes (1–4) at `offset`.
pub fn read_uint(data: &[u8], offset: usize, width: usize, endian: Endian) -> Result<u32, DecodeError> {
    if !(1..=4).contains(&width) {
        return Err(DecodeError::UnsupportedWidth(width));
    }
    let bytes = offset
        .checked_add(width)
        .and_then(|end| data.get(offset..end))
        .ok_or(DecodeError::Truncated {
            needed: offset.saturating_add(width),
            actual: data.len(),
        })?;

    let fold = |acc: u32, &b: &u8| (acc << 8) | b as u32;
    Ok(match endian {
        Endian::Big => bytes.iter().fold(0, fold),
        Endian::Little => bytes.iter().rev().fold(0, fold),
    })
}

/// Apply the inverted sign rule to `raw` (see the module docs).
pub fn inverted_value(raw: u32, bits: u32, scale: f64) -> f64 {
    let threshold = 1u64 << (bits - 1);
    let full_scale = (1u64 << bits) - 1;
    if raw as u64 > threshold {
        (full_scale as f64 - raw as f64) * -scale
    } else {
        raw as f64 * scale
    }
}

/// Decode `field` from `data` as `raw * scale` under the field's sign rule.
pub fn decode_field(data: &[u8], field: &FieldSpec) -> Result<f64, DecodeError> {
    let raw = read_uint(data, field.offset, field.width, field.endian)?;
    Ok(match field.signedness {
        Signedness::Unsigned => raw as f64 * field.scale,
        Signedness::TwosComplement => {
            let shift = 32 - 8 * field.width as u32;
            (((raw << shift) as i32) >> shift) as f64 * field.scale
        }
        Signedness::Inverted { bits } => inverted_value(raw, bits, field.scale),
    })
}

/// Render a 4-byte little-endian word as `0x` + 8 lowercase hex digits,
/// most significant byte first.
pub fn hex_word_le(word: &[u8; 4]) -> String {
    format!("0x{:02x}{:02x}{:02x}{:02x}", word[3], word[2], word[1], word[0])
}

/// Fail unless `data` is exactly `expected` bytes long.
pub fn expect_len(data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() == expected {
        Ok(())
    } else {
        Err(DecodeError::UnexpectedLength {
            expected,
            actual: data.len(),
        })
    }
}
