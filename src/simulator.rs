//! Synthetic ThinkGear byte stream for demos and tests without a headset.
//!
//! [`SimulatedSource`] emits the same frames a MindWave does:
//!
//! | Frame | Rate | Payload |
//! |---|---|---|
//! | raw wave | 512 Hz | `0x80 0x02 <i16>` |
//! | full packet | 1 Hz | quality, EEG power, attention, meditation (32 bytes) |
//! | blink | every 7 s | `0x16 <strength>` |
//!
//! In real-time mode frames are released at the wall-clock rate of the raw
//! wave; otherwise every read that finds the queue empty generates the next
//! sample immediately.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::ThinkGearError;
use crate::protocol::{encode_frame, encode_full_payload, encode_row, RAW_SAMPLE_RATE};
use crate::source::ByteSource;
use crate::types::{DataRow, EegPower};

const SAMPLES_PER_SECOND: u64 = RAW_SAMPLE_RATE as u64;

/// Seconds between simulated blinks.
const BLINK_PERIOD_SECS: u64 = 7;

/// One synthetic raw-wave sample at time `t` (seconds).
///
/// | Component | Frequency | Amplitude |
/// |-----------|-----------|-----------|
/// | Alpha     | 10 Hz     | ±120      |
/// | Beta      | 22 Hz     | ±40       |
/// | Theta     | 6 Hz      | ±70       |
/// | Noise     | -         | ±30       |
///
/// A blink adds a large slow deflection in the first 200 ms of every blink
/// second, the way eye movement shows up on the forehead electrode.
pub fn sim_raw(t: f64) -> i16 {
    let alpha = 120.0 * (2.0 * PI * 10.0 * t).sin();
    let beta = 40.0 * (2.0 * PI * 22.0 * t + 0.7).sin();
    let theta = 70.0 * (2.0 * PI * 6.0 * t + 1.3).sin();
    let nx = t * 1000.7 + 137.508;
    let noise = ((nx.sin() * 9973.1).fract() - 0.5) * 60.0;

    let second = t as u64;
    let into = t - second as f64;
    let blink = if second > 0 && second % BLINK_PERIOD_SECS == 0 && into < 0.2 {
        -600.0 * (PI * into / 0.2).sin()
    } else {
        0.0
    };
    (alpha + beta + theta + noise + blink).round() as i16
}

/// Band powers for simulated second `sec`, slowly drifting so bar charts move.
fn sim_power(sec: u64) -> EegPower {
    let t = sec as f64;
    let base = [900_000.0, 400_000.0, 120_000.0, 90_000.0, 40_000.0, 30_000.0, 12_000.0, 6_000.0];
    let mut bands = [0u32; 8];
    for (i, (band, b)) in bands.iter_mut().zip(base).enumerate() {
        let wobble = 1.0 + 0.4 * (2.0 * PI * t / (11.0 + 3.0 * i as f64)).sin();
        *band = (b * wobble) as u32;
    }
    EegPower::from_array(bands)
}

/// A 0–100 eSense-style meter with period `period` seconds.
fn sim_meter(sec: u64, period: f64, phase: f64) -> u8 {
    let v = 50.0 + 40.0 * (2.0 * PI * sec as f64 / period + phase).sin();
    v.round().clamp(0.0, 100.0) as u8
}

/// A [`ByteSource`] that generates ThinkGear frames.
pub struct SimulatedSource {
    pending: VecDeque<u8>,
    samples: u64,
    frames: u64,
    started: Option<Instant>,
    /// Sample count at `started`.
    base: u64,
    /// Samples never generated because the reader fell behind.
    skipped: u64,
    realtime: bool,
    poll_interval: Duration,
    corrupt_every: Option<u64>,
    is_open: bool,
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSource {
    /// A real-time simulator with a 100 ms poll interval.
    pub fn new() -> Self {
        Self {
            pending: VecDeque::with_capacity(1024),
            samples: 0,
            frames: 0,
            started: None,
            base: 0,
            skipped: 0,
            realtime: true,
            poll_interval: Duration::from_millis(100),
            corrupt_every: None,
            is_open: false,
        }
    }

    /// Generate frames as fast as they are read instead of at 512 Hz.
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }

    /// Flip the checksum of every `n`th frame.  `0` turns corruption off.
    pub fn corrupt_every(mut self, n: u64) -> Self {
        self.corrupt_every = (n > 0).then_some(n);
        self
    }

    /// Longest a read waits for the next sample.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Raw samples generated so far.
    pub fn samples_generated(&self) -> u64 {
        self.samples
    }

    fn push_frame(&mut self, payload: &[u8]) {
        let Some(mut frame) = encode_frame(payload) else {
            return;
        };
        self.frames += 1;
        if self.corrupt_every.is_some_and(|n| self.frames % n == 0) {
            if let Some(sum) = frame.last_mut() {
                *sum ^= 0xFF;
            }
        }
        self.pending.extend(frame);
    }

    /// Queue the frames belonging to the next raw sample.
    fn push_sample(&mut self) {
        let t = self.samples as f64 / RAW_SAMPLE_RATE;
        self.push_frame(&encode_row(&DataRow::RawWave(sim_raw(t))));
        self.samples += 1;

        if self.samples % SAMPLES_PER_SECOND != 0 {
            return;
        }
        let sec = self.samples / SAMPLES_PER_SECOND;
        if sec % BLINK_PERIOD_SECS == 0 {
            let strength = 60 + (sec * 37 % 120) as u8;
            self.push_frame(&encode_row(&DataRow::BlinkStrength(strength)));
        }
        // The headset reports poor contact for a few seconds after power-on.
        let quality = 200u64.saturating_sub(sec * 50) as u8;
        let payload = encode_full_payload(
            quality,
            &sim_power(sec),
            sim_meter(sec, 40.0, 0.0),
            sim_meter(sec, 55.0, 2.0),
        );
        self.push_frame(&payload);
    }

    /// Generate everything that is due by now.
    fn generate_due(&mut self) {
        match self.started {
            Some(start) if self.realtime => {
                let elapsed = (start.elapsed().as_secs_f64() * RAW_SAMPLE_RATE) as u64;
                let due = (self.base + elapsed).saturating_sub(self.skipped);
                // At most one second of backlog, like the headset's own buffer.
                let backlog = due.saturating_sub(self.samples);
                if backlog > SAMPLES_PER_SECOND {
                    self.skipped += backlog - SAMPLES_PER_SECOND;
                    debug!("simulator dropped {} samples", backlog - SAMPLES_PER_SECOND);
                }
                let due = due.min(self.samples + SAMPLES_PER_SECOND);
                while self.samples < due {
                    self.push_sample();
                }
            }
            _ => {
                if self.pending.is_empty() {
                    self.push_sample();
                }
            }
        }
    }

    /// How long until the next sample is due, capped at the poll interval.
    fn wait_for_next(&self) -> Duration {
        let Some(start) = self.started else {
            return Duration::ZERO;
        };
        let next_index = (self.samples + 1 + self.skipped).saturating_sub(self.base);
        let next = Duration::from_secs_f64(next_index as f64 / RAW_SAMPLE_RATE);
        next.saturating_sub(start.elapsed()).min(self.poll_interval)
    }
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "simulator is not open")
}

impl ByteSource for SimulatedSource {
    fn open(&mut self) -> Result<(), ThinkGearError> {
        if !self.is_open {
            debug!("simulator started ({})", if self.realtime { "real time" } else { "unpaced" });
            self.started = Some(Instant::now());
            self.base = self.samples;
            self.skipped = 0;
            self.is_open = true;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.is_open {
            return Err(not_open());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        self.generate_due();
        if self.pending.is_empty() && self.realtime {
            thread::sleep(self.wait_for_next());
            self.generate_due();
        }
        if self.pending.is_empty() {
            return Err(io::ErrorKind::TimedOut.into());
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        if !self.is_open {
            return Err(not_open());
        }
        if self.realtime {
            self.generate_due();
        }
        Ok(self.pending.len())
    }

    fn close(&mut self) {
        if self.is_open {
            debug!("simulator stopped after {} samples", self.samples);
        }
        self.is_open = false;
        self.pending.clear();
    }

    fn name(&self) -> String {
        "ThinkGear simulator".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::SignalDecoder;
    use crate::protocol::{checksum, FULL_PACKET_LEN};

    /// Split the queued stream into payloads, dropping frames with a bad checksum.
    fn drain_payloads(src: &mut SimulatedSource, frames: usize) -> (Vec<Vec<u8>>, usize) {
        let mut good = Vec::new();
        let mut bad = 0;
        for _ in 0..frames {
            assert_eq!(src.read_byte().unwrap(), 0xAA);
            assert_eq!(src.read_byte().unwrap(), 0xAA);
            let len = src.read_byte().unwrap() as usize;
            let mut payload = vec![0u8; len];
            src.read_exact(&mut payload).unwrap();
            if src.read_byte().unwrap() == checksum(&payload) {
                good.push(payload);
            } else {
                bad += 1;
            }
        }
        (good, bad)
    }

    #[test]
    fn first_second_is_raw_then_full_packet() {
        let mut src = SimulatedSource::new().unpaced();
        src.open().unwrap();
        let (payloads, bad) = drain_payloads(&mut src, 513);
        assert_eq!(bad, 0);
        assert_eq!(payloads.iter().filter(|p| p.len() == 4).count(), 512);
        assert_eq!(payloads[512].len(), FULL_PACKET_LEN);
    }

    #[test]
    fn decoded_stream_yields_one_signal_per_second() {
        let mut src = SimulatedSource::new().unpaced();
        src.open().unwrap();
        let mut decoder = SignalDecoder::new(512, FULL_PACKET_LEN);
        let (payloads, _) = drain_payloads(&mut src, 2 * 513);

        let mut signals = Vec::new();
        let mut batches = 0;
        for p in &payloads {
            let out = decoder.decode_payload(p).unwrap();
            batches += out.batches.len();
            signals.extend(out.signal);
        }
        assert_eq!(batches, 2);
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].quality, 150);
        assert!(signals.iter().all(|s| s.attention <= 100 && s.meditation <= 100));
        assert_ne!(signals[0].power, EegPower::default());
    }

    #[test]
    fn corruption_flips_every_nth_checksum() {
        let mut src = SimulatedSource::new().unpaced().corrupt_every(10);
        src.open().unwrap();
        let (good, bad) = drain_payloads(&mut src, 100);
        assert_eq!(bad, 10);
        assert_eq!(good.len(), 90);
    }

    #[test]
    fn realtime_source_releases_samples_over_time() {
        let mut src = SimulatedSource::new().poll_interval(Duration::from_millis(1));
        src.open().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(src.bytes_available().unwrap() > 0);
        assert!(src.samples_generated() >= 10);
    }

    #[test]
    fn raw_values_stay_in_range() {
        for i in 0..(10 * SAMPLES_PER_SECOND) {
            let v = sim_raw(i as f64 / RAW_SAMPLE_RATE);
            assert!((-1000..=1000).contains(&v), "sample {i} = {v}");
        }
    }
}
