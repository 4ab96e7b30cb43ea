//! Framing constants, data-row codes, and wire-format helpers for the
//! ThinkGear serial protocol.
//!
//! Every packet on the wire looks like this:
//!
//! ```text
//! 0xAA 0xAA <length> <payload[length]> <checksum>
//! ```
//!
//! * `length` counts payload bytes only (0–169).  A length byte of `0xAA`
//!   is a placeholder and must be read again.
//! * `checksum` is the one's complement of the low 8 bits of the payload sum.
//!
//! The payload is a run of data rows.  Each row is zero or more `0x55`
//! extended-code bytes, a code byte, and a value whose shape depends on the
//! code (see [`code`]).

use crate::types::{DataRow, EegPower};

// ── Framing ──────────────────────────────────────────────────────────────────

/// Synchronisation byte.  Two in a row start every packet.
pub const SYNC: u8 = 0xAA;

/// Extended-code marker.  Any number may precede a code byte.
pub const EXCODE: u8 = 0x55;

/// Largest payload length a packet header may announce.
///
/// `170` (`0xAA`) collides with [`SYNC`] and is therefore never a length.
pub const MAX_PAYLOAD_LEN: usize = 169;

/// Payload length of the headset's once-per-second "full data" packet.
///
/// The headset sends poor-signal, band powers, attention and meditation
/// together in exactly this many bytes.  The decoder flushes its signal
/// accumulator whenever a payload of this length has been applied.
pub const FULL_PACKET_LEN: usize = 32;

/// Default number of raw samples collected into one [`crate::types::RawBatch`].
///
/// At [`RAW_SAMPLE_RATE`] this is one second of waveform.
pub const DEFAULT_RAW_BATCH_CAPACITY: usize = 512;

/// Largest band power an EEG power row can carry (24-bit unsigned).
pub const MAX_BAND_POWER: u32 = 0x00FF_FFFF;

/// Largest raw batch a reader accepts: one minute of waveform.
pub const MAX_RAW_BATCH_CAPACITY: usize = 60 * DEFAULT_RAW_BATCH_CAPACITY;

/// Raw waveform sample rate of MindWave-class headsets in Hz.
pub const RAW_SAMPLE_RATE: f64 = 512.0;

/// Serial baud rate used by MindWave Mobile headsets and the RF dongle.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

// ── Data-row codes ───────────────────────────────────────────────────────────

/// Codes of the data rows understood by the decoder.
///
/// | Code | Row | Value |
/// |---|---|---|
/// | `0x02` | poor signal | 1 byte, 0 = best, 200 = off-head |
/// | `0x04` | attention | 1 byte, 0–100 (0 = undetermined) |
/// | `0x05` | meditation | 1 byte, 0–100 (0 = undetermined) |
/// | `0x16` | blink strength | 1 byte, 1–255 |
/// | `0x80` | raw wave | length byte (2) + `i16` big-endian |
/// | `0x83` | ASIC EEG power | length byte (24) + 8 × `u24` big-endian |
pub mod code {
    pub const POOR_SIGNAL: u8 = 0x02;
    pub const ATTENTION: u8 = 0x04;
    pub const MEDITATION: u8 = 0x05;
    pub const BLINK_STRENGTH: u8 = 0x16;
    pub const RAW_WAVE: u8 = 0x80;
    pub const ASIC_EEG_POWER: u8 = 0x83;
}

/// Value length announced by a raw-wave row.
pub const RAW_WAVE_LEN: usize = 2;

/// Value length announced by an EEG power row (8 bands × 3 bytes).
pub const EEG_POWER_LEN: usize = 24;

/// Band names in the order they appear inside an EEG power row.
pub const EEG_BAND_NAMES: [&str; 8] = [
    "delta",
    "theta",
    "low-alpha",
    "high-alpha",
    "low-beta",
    "high-beta",
    "low-gamma",
    "mid-gamma",
];

// ── Checksum ─────────────────────────────────────────────────────────────────

/// Compute the packet checksum of `payload`.
///
/// ```
/// # use thinkgear_rs::protocol::checksum;
/// // 0x04 + 0x32 = 0x36, !0x36 = 0xC9
/// assert_eq!(checksum(&[0x04, 0x32]), 0xC9);
/// ```
pub fn checksum(payload: &[u8]) -> u8 {
    !payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

// ── Encoders ─────────────────────────────────────────────────────────────────

/// Wrap `payload` in a complete packet: SYNC, SYNC, length, payload, checksum.
///
/// Returns `None` when the payload is longer than [`MAX_PAYLOAD_LEN`].
///
/// ```
/// # use thinkgear_rs::protocol::encode_frame;
/// assert_eq!(
///     encode_frame(&[0x04, 0x32]).unwrap(),
///     vec![0xAA, 0xAA, 0x02, 0x04, 0x32, 0xC9]
/// );
/// ```
pub fn encode_frame(payload: &[u8]) -> Option<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return None;
    }
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.extend_from_slice(&[SYNC, SYNC, payload.len() as u8]);
    frame.extend_from_slice(payload);
    frame.push(checksum(payload));
    Some(frame)
}

/// Encode one data row the way the headset puts it in a payload.
///
/// Band powers above [`MAX_BAND_POWER`] saturate to it.
pub fn encode_row(row: &DataRow) -> Vec<u8> {
    match *row {
        DataRow::PoorSignal(v) => vec![code::POOR_SIGNAL, v],
        DataRow::Attention(v) => vec![code::ATTENTION, v],
        DataRow::Meditation(v) => vec![code::MEDITATION, v],
        DataRow::BlinkStrength(v) => vec![code::BLINK_STRENGTH, v],
        DataRow::RawWave(sample) => {
            let [hi, lo] = sample.to_be_bytes();
            vec![code::RAW_WAVE, RAW_WAVE_LEN as u8, hi, lo]
        }
        DataRow::EegPower(power) => {
            let mut out = Vec::with_capacity(2 + EEG_POWER_LEN);
            out.push(code::ASIC_EEG_POWER);
            out.push(EEG_POWER_LEN as u8);
            for band in power.to_array() {
                // Band powers are 24-bit on the wire; saturate larger values.
                let band = band.min(MAX_BAND_POWER);
                out.extend_from_slice(&band.to_be_bytes()[1..]);
            }
            out
        }
    }
}

/// Concatenate several rows into one payload.
pub fn encode_payload(rows: &[DataRow]) -> Vec<u8> {
    rows.iter().flat_map(encode_row).collect()
}

/// Build the 32-byte "full data" payload the headset sends once per second.
///
/// Layout: poor signal (2) + EEG power (26) + attention (2) + meditation (2).
pub fn encode_full_payload(
    quality: u8,
    power: &EegPower,
    attention: u8,
    meditation: u8,
) -> Vec<u8> {
    encode_payload(&[
        DataRow::PoorSignal(quality),
        DataRow::EegPower(*power),
        DataRow::Attention(attention),
        DataRow::Meditation(meditation),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_reference_frames() {
        assert_eq!(checksum(&[0x04, 0x32]), 0xC9);
        assert_eq!(checksum(&[0x80, 0x02, 0x01, 0x2C]), 0x50);
        assert_eq!(checksum(&[]), 0xFF);
    }

    #[test]
    fn checksum_wraps_modulo_256() {
        let payload = [0xFF; 4];
        // 4 × 0xFF = 0x3FC → low byte 0xFC → complement 0x03
        assert_eq!(checksum(&payload), 0x03);
    }

    #[test]
    fn encode_frame_rejects_oversized_payload() {
        assert!(encode_frame(&[0u8; MAX_PAYLOAD_LEN]).is_some());
        assert!(encode_frame(&[0u8; MAX_PAYLOAD_LEN + 1]).is_none());
    }

    #[test]
    fn band_power_saturates_at_24_bits() {
        let power = EegPower::from_array([u32::MAX, MAX_BAND_POWER, 1, 0, 0, 0, 0, 0]);
        let row = encode_row(&DataRow::EegPower(power));
        assert_eq!(row.len(), 2 + EEG_POWER_LEN);
        assert_eq!(&row[2..5], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&row[5..8], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&row[8..11], &[0x00, 0x00, 0x01]);
    }

    #[test]
    fn raw_wave_row_is_big_endian() {
        assert_eq!(encode_row(&DataRow::RawWave(300)), vec![0x80, 0x02, 0x01, 0x2C]);
        assert_eq!(encode_row(&DataRow::RawWave(-2)), vec![0x80, 0x02, 0xFF, 0xFE]);
    }

    #[test]
    fn full_payload_has_full_packet_length() {
        let payload = encode_full_payload(0, &EegPower::default(), 50, 60);
        assert_eq!(payload.len(), FULL_PACKET_LEN);
    }
}
