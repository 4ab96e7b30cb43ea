//! The decode loop: frame synchronizer, payload reader, and dispatch.
//!
//! [`run`] is what the reader's worker thread executes.  It is a plain
//! blocking function so it can equally be driven on the caller's thread,
//! e.g. to decode a recorded capture from a [`crate::source::MemorySource`].
//!
//! One cycle of the loop:
//!
//! 1. **Synchronize**: read bytes until `0xAA 0xAA`, then the length byte
//!    (re-read while it is `0xAA`).  Lengths above 169 restart the hunt.
//! 2. **Read payload**: fill `length` bytes, then read the checksum byte.
//!    A mismatch drops the frame.
//! 3. **Decode**: hand the payload to [`SignalDecoder`] and dispatch the
//!    raw batches and signal it produced to the [`EventSink`].
//!
//! Every read is bounded by the source's poll interval.  Between reads the
//! loop checks the stop flag and the stall deadline, so a stop request is
//! observed within one poll interval and never interrupts a read midway.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::decoder::{DecodedFrame, SignalDecoder};
use crate::error::ThinkGearError;
use crate::protocol::{checksum, MAX_PAYLOAD_LEN, SYNC};
use crate::sink::EventSink;
use crate::source::ByteSource;
use crate::stats::DecodeStats;
use crate::thinkgear_client::ReaderOptions;

/// Why the loop stopped cycling.
enum Halt {
    /// Stop flag raised or consumer gone.
    Stop,
    Fatal(ThinkGearError),
}

impl From<ThinkGearError> for Halt {
    fn from(e: ThinkGearError) -> Self {
        Halt::Fatal(e)
    }
}

struct Worker<'a, S: ?Sized, K: ?Sized> {
    source: &'a mut S,
    sink: &'a mut K,
    stop: &'a AtomicBool,
    stats: &'a DecodeStats,
    decoder: SignalDecoder,
    stall_timeout: Option<Duration>,
}

/// Decode frames from `source` into `sink` until `stop` is raised, the sink's
/// consumer goes away, or the source fails.
///
/// `source` must already be open.  [`EventSink::on_finished`] is called
/// exactly once before returning.
///
/// # Errors
///
/// * [`ThinkGearError::SourceClosed`]: the source reached end of stream.
/// * [`ThinkGearError::Stalled`]: no byte arrived within
///   [`ReaderOptions::stall_timeout`].
/// * [`ThinkGearError::Io`]: any other read failure (device unplugged, …).
pub fn run<S, K>(
    source: &mut S,
    sink: &mut K,
    stop: &AtomicBool,
    stats: &DecodeStats,
    options: &ReaderOptions,
) -> Result<(), ThinkGearError>
where
    S: ByteSource + ?Sized,
    K: EventSink + ?Sized,
{
    let mut worker = Worker {
        source,
        sink,
        stop,
        stats,
        decoder: SignalDecoder::new(options.raw_batch_capacity, options.full_packet_len),
        stall_timeout: options.stall_timeout,
    };
    let mut payload = [0u8; MAX_PAYLOAD_LEN];

    let result = loop {
        match worker.cycle(&mut payload) {
            Ok(()) => {}
            Err(Halt::Stop) => break Ok(()),
            Err(Halt::Fatal(e)) => break Err(e),
        }
    };

    match &result {
        Ok(()) => debug!("decode loop stopped"),
        Err(e) => info!("decode loop ended: {e}"),
    }
    worker.sink.on_finished(result.as_ref().err());
    result
}

impl<S, K> Worker<'_, S, K>
where
    S: ByteSource + ?Sized,
    K: EventSink + ?Sized,
{
    fn cycle(&mut self, payload: &mut [u8; MAX_PAYLOAD_LEN]) -> Result<(), Halt> {
        let len = self.synchronize()?;
        let payload = &mut payload[..len];
        if !self.read_payload(payload)? {
            return Ok(());
        }

        let received = self.next_byte()?;
        let expected = checksum(payload);
        if received != expected {
            self.stats.add_checksum_failures(1);
            debug!(
                "checksum mismatch: got 0x{received:02x}, expected 0x{expected:02x} \
                 ({len}-byte payload)"
            );
            return Ok(());
        }

        match self.decoder.decode_payload(payload) {
            Ok(frame) => {
                self.stats.add_frames(1);
                self.dispatch(frame)
            }
            Err(e) => {
                self.stats.add_rejected_payloads(1);
                debug!("dropping {len}-byte payload: {e}");
                Ok(())
            }
        }
    }

    // ── Synchronizer ─────────────────────────────────────────────────────────

    /// Consume bytes up to and including a valid header; return its length.
    fn synchronize(&mut self) -> Result<usize, Halt> {
        let mut skipped = 0u64;
        let header = self.hunt(&mut skipped);
        if skipped > 0 {
            self.stats.add_skipped_bytes(skipped);
            trace!("skipped {skipped} byte(s) before SYNC");
        }
        header
    }

    /// Counts discarded bytes into `skipped` even when the hunt is cut short.
    fn hunt(&mut self, skipped: &mut u64) -> Result<usize, Halt> {
        loop {
            if self.next_byte()? != SYNC {
                *skipped += 1;
                continue;
            }
            if self.next_byte()? != SYNC {
                *skipped += 2;
                continue;
            }
            let mut len = self.next_byte()?;
            while len == SYNC {
                len = self.next_byte()?;
            }
            if len as usize > MAX_PAYLOAD_LEN {
                self.stats.add_invalid_lengths(1);
                trace!("header announced {len}-byte payload, resyncing");
                continue;
            }
            return Ok(len as usize);
        }
    }

    // ── Payload reader ───────────────────────────────────────────────────────

    /// Fill `buf` with payload bytes.  Returns `false` if the frame had to be
    /// abandoned part-way.
    fn read_payload(&mut self, buf: &mut [u8]) -> Result<bool, Halt> {
        if buf.is_empty() {
            return Ok(true);
        }
        self.check_stop()?;

        let available = self.source.bytes_available().map_err(read_failure)?;
        if available >= buf.len() {
            return match self.source.read_exact(buf) {
                Ok(()) => Ok(true),
                Err(e) if is_timeout(&e) => {
                    debug!("payload read timed out despite {available} byte(s) available");
                    Ok(false)
                }
                Err(e) => Err(read_failure(e).into()),
            };
        }

        let mut filled = 0;
        let mut idle_since = Instant::now();
        while filled < buf.len() {
            self.check_stop()?;
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => return Err(ThinkGearError::SourceClosed.into()),
                Ok(n) => {
                    filled += n;
                    idle_since = Instant::now();
                }
                Err(e) => self.recover(e, idle_since)?,
            }
        }
        Ok(true)
    }

    /// Read one byte, waiting through poll timeouts until the stall deadline.
    fn next_byte(&mut self) -> Result<u8, Halt> {
        let idle_since = Instant::now();
        loop {
            self.check_stop()?;
            match self.source.read_byte() {
                Ok(b) => return Ok(b),
                Err(e) => self.recover(e, idle_since)?,
            }
        }
    }

    /// Decide whether a failed read may be retried.
    fn recover(&self, e: io::Error, idle_since: Instant) -> Result<(), Halt> {
        if e.kind() == io::ErrorKind::Interrupted {
            return Ok(());
        }
        if !is_timeout(&e) {
            return Err(read_failure(e).into());
        }
        match self.stall_timeout {
            Some(limit) if idle_since.elapsed() >= limit => {
                Err(ThinkGearError::Stalled(limit).into())
            }
            _ => Ok(()),
        }
    }

    fn check_stop(&self) -> Result<(), Halt> {
        if self.stop.load(Ordering::Acquire) {
            Err(Halt::Stop)
        } else {
            Ok(())
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    fn dispatch(&mut self, frame: DecodedFrame) -> Result<(), Halt> {
        for batch in frame.batches {
            self.stats.add_raw_batches(1);
            if self.sink.on_raw_batch(batch).is_err() {
                info!("event consumer dropped, stopping");
                return Err(Halt::Stop);
            }
        }
        if let Some(signal) = frame.signal {
            self.stats.add_signals(1);
            if self.sink.on_signal(signal).is_err() {
                info!("event consumer dropped, stopping");
                return Err(Halt::Stop);
            }
        }
        Ok(())
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn read_failure(e: io::Error) -> ThinkGearError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ThinkGearError::SourceClosed
    } else {
        ThinkGearError::Io(e)
    }
}
