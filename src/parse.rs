//! Binary decoders for ThinkGear packet payloads.
//!
//! All public functions in this module are pure (no I/O, no allocation beyond
//! the returned collections) and are safe to call from any thread.
//!
//! # Payload layout
//!
//! A checksum-valid payload is a run of data rows:
//!
//! ```text
//! [0x55 …]  extended-code markers (zero or more, level = count)
//! code      one byte
//! value     code < 0x80 : one byte
//!           code ≥ 0x80 : length byte, then `length` bytes
//! ```
//!
//! | Code | Row | Value |
//! |---|---|---|
//! | `0x02` | [`DataRow::PoorSignal`] | `u8` |
//! | `0x04` | [`DataRow::Attention`] | `u8` |
//! | `0x05` | [`DataRow::Meditation`] | `u8` |
//! | `0x16` | [`DataRow::BlinkStrength`] | `u8` |
//! | `0x80` | [`DataRow::RawWave`] | `i16` BE (length 2) |
//! | `0x83` | [`DataRow::EegPower`] | 8 × `u24` BE (length 24) |
//!
//! Multi-byte rows are always skipped by their announced length, even when
//! it differs from the expected one, so a malformed row never shifts the
//! rows behind it.  Such rows are dropped and logged.
//!
//! No code level is defined by the protocol yet, so the marker count is only
//! logged; an `0x55 0x55 0x04 …` row decodes exactly like `0x04 …`.

use log::{debug, trace};

use crate::error::PayloadError;
use crate::protocol::{code, EEG_POWER_LEN, EXCODE, RAW_WAVE_LEN};
use crate::types::{DataRow, EegPower};

// ── EEG power ────────────────────────────────────────────────────────────────

/// Decode a 24-bit unsigned big-endian array (3 bytes per value).
///
/// Returns one `u32` per complete 3-byte group; partial trailing bytes are ignored.
pub fn decode_unsigned_24bit(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(3)
        .map(|c| ((c[0] as u32) << 16) | ((c[1] as u32) << 8) | (c[2] as u32))
        .collect()
}

/// Decode the value of an EEG power row into its eight bands.
///
/// Missing bands (value shorter than 24 bytes) are left at zero.
pub fn decode_eeg_power(value: &[u8]) -> EegPower {
    let mut bands = [0u32; 8];
    for (slot, v) in bands.iter_mut().zip(decode_unsigned_24bit(value)) {
        *slot = v;
    }
    EegPower::from_array(bands)
}

// ── Payload ──────────────────────────────────────────────────────────────────

/// Parse a whole payload into data rows.
///
/// Either every row parses and the full list is returned, or the payload is
/// rejected as a unit; callers never see a partial list.
///
/// # Errors
///
/// * [`PayloadError::UnknownCode`]: a code outside the table above.  The
///   value shape is unknown, so nothing after it can be trusted.
/// * [`PayloadError::Truncated`]: a row runs past the end of the payload.
pub fn parse_payload(payload: &[u8]) -> Result<Vec<DataRow>, PayloadError> {
    let mut rows = Vec::new();
    let mut idx = 0;

    while idx < payload.len() {
        let mut level = 0usize;
        while idx < payload.len() && payload[idx] == EXCODE {
            level += 1;
            idx += 1;
        }

        let offset = idx;
        let Some(&code) = payload.get(idx) else {
            return Err(PayloadError::Truncated {
                code: EXCODE,
                offset: idx,
                needed: 1,
                available: 0,
            });
        };
        idx += 1;

        if level > 0 {
            trace!("row 0x{code:02x} at offset {offset} has extended-code level {level}");
        }

        match code {
            code::POOR_SIGNAL | code::ATTENTION | code::MEDITATION | code::BLINK_STRENGTH => {
                let &value = payload.get(idx).ok_or(PayloadError::Truncated {
                    code,
                    offset,
                    needed: 1,
                    available: 0,
                })?;
                idx += 1;
                rows.push(match code {
                    code::POOR_SIGNAL => DataRow::PoorSignal(value),
                    code::ATTENTION => DataRow::Attention(value),
                    code::MEDITATION => DataRow::Meditation(value),
                    _ => DataRow::BlinkStrength(value),
                });
            }

            code::RAW_WAVE | code::ASIC_EEG_POWER => {
                let &len = payload.get(idx).ok_or(PayloadError::Truncated {
                    code,
                    offset,
                    needed: 1,
                    available: 0,
                })?;
                idx += 1;
                let len = len as usize;
                let available = payload.len() - idx;
                if len > available {
                    return Err(PayloadError::Truncated {
                        code,
                        offset,
                        needed: len,
                        available,
                    });
                }
                let value = &payload[idx..idx + len];
                idx += len;

                match (code, len) {
                    (code::RAW_WAVE, RAW_WAVE_LEN) => {
                        rows.push(DataRow::RawWave(i16::from_be_bytes([value[0], value[1]])));
                    }
                    (code::ASIC_EEG_POWER, EEG_POWER_LEN) => {
                        rows.push(DataRow::EegPower(decode_eeg_power(value)));
                    }
                    _ => debug!(
                        "skipping row 0x{code:02x} at offset {offset}: unexpected length {len}"
                    ),
                }
            }

            _ => return Err(PayloadError::UnknownCode { code, offset }),
        }
    }

    Ok(rows)
}
