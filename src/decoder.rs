//! Stateful half of the payload decoder: the signal accumulator and the raw
//! sample buffer.
//!
//! [`crate::parse::parse_payload`] turns bytes into [`DataRow`]s;
//! [`SignalDecoder`] applies those rows to the state that outlives a single
//! packet and reports what became ready for dispatch.

use std::mem;

use log::{debug, trace};

use crate::error::PayloadError;
use crate::parse::parse_payload;
use crate::types::{DataRow, RawBatch, Signal};

// ── Raw sample buffer ────────────────────────────────────────────────────────

/// Fixed-capacity batch collector for raw waveform samples.
///
/// Samples are written at a cursor.  When the cursor reaches capacity the
/// whole buffer is copied into a [`RawBatch`] and the cursor restarts at 0.
/// Old slots are not cleared; they are overwritten before they are read
/// again, and only the copied batch is ever handed out.
#[derive(Debug)]
pub struct RawSampleBuffer {
    buf: Vec<i16>,
    cursor: usize,
    next_sequence: u64,
}

impl RawSampleBuffer {
    /// Create a buffer emitting batches of `capacity` samples.
    ///
    /// A capacity of 0 is raised to 1; [`crate::thinkgear_client::ReaderOptions`]
    /// rejects it before it gets here.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)],
            cursor: 0,
            next_sequence: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Samples written since the last emitted batch.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Append one sample.  Returns the completed batch when this sample
    /// filled the buffer.
    pub fn push(&mut self, sample: i16) -> Option<RawBatch> {
        self.buf[self.cursor] = sample;
        self.cursor += 1;
        if self.cursor < self.buf.len() {
            return None;
        }
        self.cursor = 0;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Some(RawBatch {
            sequence,
            samples: self.buf.clone(),
        })
    }
}

// ── Signal decoder ───────────────────────────────────────────────────────────

/// Everything one payload made ready for dispatch, in dispatch order:
/// raw batches first, then the signal.
#[derive(Debug, Default, PartialEq)]
pub struct DecodedFrame {
    pub batches: Vec<RawBatch>,
    pub signal: Option<Signal>,
}

/// Applies decoded payloads to the signal accumulator and raw buffer.
///
/// Owned by the worker loop; nothing else mutates it.
#[derive(Debug)]
pub struct SignalDecoder {
    signal: Signal,
    raw: RawSampleBuffer,
    full_packet_len: usize,
}

impl SignalDecoder {
    /// `full_packet_len` is the payload length that completes a signal
    /// (normally [`crate::protocol::FULL_PACKET_LEN`]).
    pub fn new(raw_batch_capacity: usize, full_packet_len: usize) -> Self {
        Self {
            signal: Signal::default(),
            raw: RawSampleBuffer::new(raw_batch_capacity),
            full_packet_len,
        }
    }

    /// The accumulator as it stands between packets.
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn raw_buffer(&self) -> &RawSampleBuffer {
        &self.raw
    }

    /// Decode one checksum-valid payload.
    ///
    /// The payload is parsed completely before any row is applied, so a
    /// rejected payload leaves the accumulator and the raw buffer untouched.
    /// When the payload length equals the full-packet length, the
    /// accumulator is returned in [`DecodedFrame::signal`] and reset to zero.
    pub fn decode_payload(&mut self, payload: &[u8]) -> Result<DecodedFrame, PayloadError> {
        let rows = parse_payload(payload)?;
        let mut out = DecodedFrame::default();

        for row in rows {
            match row {
                DataRow::PoorSignal(v) => self.signal.quality = v,
                DataRow::Attention(v) => self.signal.attention = v,
                DataRow::Meditation(v) => self.signal.meditation = v,
                DataRow::BlinkStrength(v) => {
                    debug!("blink strength {v}");
                    self.signal.blink = v;
                }
                DataRow::EegPower(power) => self.signal.power = power,
                DataRow::RawWave(sample) => {
                    if let Some(batch) = self.raw.push(sample) {
                        trace!("raw batch #{} complete", batch.sequence);
                        out.batches.push(batch);
                    }
                }
            }
        }

        if payload.len() == self.full_packet_len {
            out.signal = Some(mem::take(&mut self.signal));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_full_payload, encode_payload, FULL_PACKET_LEN};
    use crate::types::EegPower;

    fn decoder(capacity: usize) -> SignalDecoder {
        SignalDecoder::new(capacity, FULL_PACKET_LEN)
    }

    #[test]
    fn buffer_emits_exactly_one_batch_per_capacity() {
        let mut buf = RawSampleBuffer::new(4);
        let emitted: Vec<RawBatch> = (0..4).filter_map(|i| buf.push(i)).collect();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].samples, vec![0, 1, 2, 3]);
        assert_eq!(emitted[0].sequence, 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn buffer_keeps_remainder_after_batch() {
        let mut buf = RawSampleBuffer::new(512);
        let emitted: Vec<RawBatch> = (0..515).filter_map(|i| buf.push(i as i16)).collect();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].samples.len(), 512);
        assert_eq!(buf.len(), 3);

        let next: Vec<RawBatch> = (0..509).filter_map(|_| buf.push(-1)).collect();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].sequence, 1);
        assert_eq!(&next[0].samples[..3], &[512, 513, 514]);
        assert!(next[0].samples[3..].iter().all(|&s| s == -1));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut buf = RawSampleBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.push(7).map(|b| b.samples), Some(vec![7]));
    }

    #[test]
    fn fields_persist_until_full_packet() {
        let mut dec = decoder(512);

        let out = dec
            .decode_payload(&encode_payload(&[DataRow::Attention(50)]))
            .unwrap();
        assert_eq!(out, DecodedFrame::default());

        dec.decode_payload(&encode_payload(&[DataRow::BlinkStrength(90)]))
            .unwrap();
        dec.decode_payload(&encode_payload(&[DataRow::Meditation(30), DataRow::PoorSignal(5)]))
            .unwrap();
        assert_eq!(dec.signal().attention, 50);
        assert_eq!(dec.signal().blink, 90);
        assert_eq!(dec.signal().meditation, 30);
        assert_eq!(dec.signal().quality, 5);

        let power = EegPower::from_array([1, 2, 3, 4, 5, 6, 7, 8]);
        let out = dec
            .decode_payload(&encode_full_payload(0, &power, 61, 70))
            .unwrap();
        let signal = out.signal.expect("full packet emits the accumulator");
        assert_eq!(signal.attention, 61);
        assert_eq!(signal.meditation, 70);
        assert_eq!(signal.quality, 0);
        assert_eq!(signal.blink, 90);
        assert_eq!(signal.power, power);

        assert_eq!(*dec.signal(), Signal::default());
    }

    #[test]
    fn rejected_payload_leaves_state_untouched() {
        let mut dec = decoder(2);
        dec.decode_payload(&encode_payload(&[DataRow::Attention(40), DataRow::RawWave(1)]))
            .unwrap();

        // Attention + raw + unknown code 0x03.
        let err = dec.decode_payload(&[0x04, 0x63, 0x80, 0x02, 0x00, 0x02, 0x03, 0x01]);
        assert!(err.is_err());
        assert_eq!(dec.signal().attention, 40);
        assert_eq!(dec.raw_buffer().len(), 1);
    }

    #[test]
    fn raw_batches_precede_signal_within_a_payload() {
        let mut dec = SignalDecoder::new(2, 8);
        // 4 raw rows × 4 bytes = 16 bytes, then a payload of exactly 8 bytes.
        let out = dec
            .decode_payload(&encode_payload(&[
                DataRow::RawWave(1),
                DataRow::RawWave(2),
                DataRow::RawWave(3),
                DataRow::RawWave(4),
            ]))
            .unwrap();
        assert_eq!(out.batches.len(), 2);
        assert!(out.signal.is_none());

        let out = dec
            .decode_payload(&encode_payload(&[DataRow::RawWave(5), DataRow::RawWave(6)]))
            .unwrap();
        assert_eq!(out.batches.len(), 1);
        assert_eq!(out.batches[0].samples, vec![5, 6]);
        assert!(out.signal.is_some());
    }
}
