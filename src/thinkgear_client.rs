use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::error::ThinkGearError;
use crate::protocol::{
    DEFAULT_BAUD_RATE, DEFAULT_RAW_BATCH_CAPACITY, FULL_PACKET_LEN, MAX_PAYLOAD_LEN,
    MAX_RAW_BATCH_CAPACITY,
};
use crate::sink::EventSink;
use crate::source::{ByteSource, SerialSource};
use crate::stats::{DecodeStats, StatsSnapshot};
use crate::types::ThinkGearEvent;
use crate::worker;

// ── ReaderOptions ─────────────────────────────────────────────────────────────

/// Decoder settings for a [`ThinkGearReader`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Samples per emitted [`crate::types::RawBatch`].  Default: `512`
    /// (one second of raw wave).
    pub raw_batch_capacity: usize,
    /// Payload length that completes a signal record.  Default: `32`.
    pub full_packet_len: usize,
    /// End the worker with [`ThinkGearError::Stalled`] when no byte arrives
    /// for this long.  `None` waits forever.  Default: 5 s.
    pub stall_timeout: Option<Duration>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            raw_batch_capacity: DEFAULT_RAW_BATCH_CAPACITY,
            full_packet_len: FULL_PACKET_LEN,
            stall_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl ReaderOptions {
    pub fn validate(&self) -> Result<(), ThinkGearError> {
        if self.raw_batch_capacity == 0 {
            return Err(ThinkGearError::InvalidConfig(
                "raw_batch_capacity must be at least 1".into(),
            ));
        }
        if self.raw_batch_capacity > MAX_RAW_BATCH_CAPACITY {
            return Err(ThinkGearError::InvalidConfig(format!(
                "raw_batch_capacity {} exceeds the {MAX_RAW_BATCH_CAPACITY}-sample limit",
                self.raw_batch_capacity
            )));
        }
        if self.full_packet_len > MAX_PAYLOAD_LEN {
            return Err(ThinkGearError::InvalidConfig(format!(
                "full_packet_len {} exceeds the {MAX_PAYLOAD_LEN}-byte payload limit",
                self.full_packet_len
            )));
        }
        Ok(())
    }
}

// ── ThinkGearReader ───────────────────────────────────────────────────────────

/// Lifecycle state of a [`ThinkGearReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Created,
    Opened,
    Running,
    Stopped,
    Closed,
}

type WorkerOutcome<S> = (S, Result<(), ThinkGearError>);

/// Owns a [`ByteSource`] and the worker thread that decodes it.
///
/// ```text
/// Created ──open──▶ Opened ──start──▶ Running ──stop──▶ Stopped
///                                        ▲                 │
///                                        └──────start──────┘
/// any state ──close──▶ Closed
/// ```
///
/// While running, the source lives on the `thinkgear-worker` thread and is
/// handed back by [`stop`](Self::stop).  Dropping the reader closes it.
pub struct ThinkGearReader<S: ByteSource + 'static> {
    state: ReaderState,
    source: Option<S>,
    source_name: String,
    options: ReaderOptions,
    stop: Arc<AtomicBool>,
    stats: Arc<DecodeStats>,
    worker: Option<JoinHandle<WorkerOutcome<S>>>,
}

impl<S: ByteSource + 'static> ThinkGearReader<S> {
    /// Wrap `source` without opening it.
    ///
    /// Fails with [`ThinkGearError::InvalidConfig`] if `options` do not validate.
    pub fn new(source: S, options: ReaderOptions) -> Result<Self, ThinkGearError> {
        options.validate()?;
        Ok(Self {
            state: ReaderState::Created,
            source_name: source.name(),
            source: Some(source),
            options,
            stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(DecodeStats::default()),
            worker: None,
        })
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Counters accumulated over every run of this reader.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// `true` while the worker thread is alive.  A worker that ended on a
    /// transport error reports `false` even before [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Open the underlying source.  On failure the reader stays `Created` and
    /// `open` may be retried.
    pub fn open(&mut self) -> Result<(), ThinkGearError> {
        self.expect_state(&[ReaderState::Created], "open")?;
        let source = self.source.as_mut().ok_or(ThinkGearError::NotOpen)?;
        source.open()?;
        debug!("opened {}", self.source_name);
        self.state = ReaderState::Opened;
        Ok(())
    }

    /// Move the source onto a new `thinkgear-worker` thread and start
    /// decoding into `sink`.
    pub fn start<K: EventSink + 'static>(&mut self, mut sink: K) -> Result<(), ThinkGearError> {
        self.expect_state(&[ReaderState::Opened, ReaderState::Stopped], "start")?;
        let mut source = self.source.take().ok_or(ThinkGearError::NotOpen)?;

        self.stop.store(false, Ordering::Release);
        let stop = Arc::clone(&self.stop);
        let stats = Arc::clone(&self.stats);
        let options = self.options.clone();

        let spawned = thread::Builder::new()
            .name("thinkgear-worker".into())
            .spawn(move || {
                let result = worker::run(&mut source, &mut sink, &stop, &stats, &options);
                (source, result)
            });

        match spawned {
            Ok(handle) => {
                info!("reading from {}", self.source_name);
                self.worker = Some(handle);
                self.state = ReaderState::Running;
                Ok(())
            }
            Err(e) => {
                // The closure, and the source inside it, are gone.
                self.state = ReaderState::Closed;
                Err(e.into())
            }
        }
    }

    /// Ask the worker to stop, wait for it, and take the source back.
    ///
    /// Returns the fatal error that ended the worker, if any.  The reader is
    /// `Stopped` afterwards either way and can be restarted.
    ///
    /// The worker notices the request within one read timeout, but not while
    /// its sink is blocked: drain or drop a channel receiver before calling
    /// this.
    pub fn stop(&mut self) -> Result<(), ThinkGearError> {
        self.expect_state(&[ReaderState::Running], "stop")?;
        self.stop.store(true, Ordering::Release);

        let Some(handle) = self.worker.take() else {
            self.state = ReaderState::Stopped;
            return Ok(());
        };
        match handle.join() {
            Ok((source, result)) => {
                self.source = Some(source);
                self.state = ReaderState::Stopped;
                debug!("worker for {} joined", self.source_name);
                result
            }
            Err(_) => {
                self.state = ReaderState::Closed;
                Err(ThinkGearError::WorkerPanicked)
            }
        }
    }

    /// Stop the worker if needed and release the source.  Idempotent.
    pub fn close(&mut self) {
        if self.state == ReaderState::Running {
            if let Err(e) = self.stop() {
                warn!("{} stopped with error: {e}", self.source_name);
            }
        }
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        if self.state != ReaderState::Closed {
            debug!("closed {}", self.source_name);
        }
        self.state = ReaderState::Closed;
    }

    fn expect_state(
        &self,
        allowed: &[ReaderState],
        action: &'static str,
    ) -> Result<(), ThinkGearError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ThinkGearError::InvalidState {
                state: self.state,
                action,
            })
        }
    }
}

impl<S: ByteSource + 'static> Drop for ThinkGearReader<S> {
    fn drop(&mut self) {
        self.close();
    }
}

// ── ThinkGearClientConfig ─────────────────────────────────────────────────────

/// Configuration for [`ThinkGearClient`].
#[derive(Debug, Clone)]
pub struct ThinkGearClientConfig {
    /// Serial port of the headset or dongle.
    ///
    /// Default: `/dev/rfcomm0` on Linux, `COM5` on Windows, the MindWave
    /// Mobile SPP device on macOS.
    pub port_name: String,
    /// Default: `57600`.
    pub baud_rate: u32,
    /// Upper bound on one blocking serial read; also how quickly a stop
    /// request is noticed.  Default: `100`.
    pub read_timeout_ms: u64,
    /// Seconds without any byte before the link counts as stalled.
    /// `0` disables the check.  Default: `5`.
    pub stall_timeout_secs: u64,
    /// Samples per raw batch.  Default: `512`.
    pub raw_batch_capacity: usize,
    /// Capacity of the event channel returned by `connect`.  Default: `256`.
    pub channel_capacity: usize,
}

impl Default for ThinkGearClientConfig {
    fn default() -> Self {
        let port_name = if cfg!(windows) {
            "COM5"
        } else if cfg!(target_os = "macos") {
            "/dev/tty.MindWaveMobile-SerialPo"
        } else {
            "/dev/rfcomm0"
        };
        Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
            stall_timeout_secs: 5,
            raw_batch_capacity: DEFAULT_RAW_BATCH_CAPACITY,
            channel_capacity: 256,
        }
    }
}

impl ThinkGearClientConfig {
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            raw_batch_capacity: self.raw_batch_capacity,
            full_packet_len: FULL_PACKET_LEN,
            stall_timeout: (self.stall_timeout_secs > 0)
                .then(|| Duration::from_secs(self.stall_timeout_secs)),
        }
    }
}

// ── ThinkGearClient ───────────────────────────────────────────────────────────

/// Connects to a ThinkGear device and streams [`ThinkGearEvent`]s over a
/// tokio channel.
///
/// The first event on the channel is always `Connected`.  The last is
/// `Disconnected`, preceded by `Fault` when a transport error ended the
/// stream.
pub struct ThinkGearClient {
    config: ThinkGearClientConfig,
}

impl ThinkGearClient {
    pub fn new(config: ThinkGearClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ThinkGearClientConfig {
        &self.config
    }

    /// Open the configured serial port and start streaming.
    pub fn connect(
        &self,
    ) -> Result<(mpsc::Receiver<ThinkGearEvent>, ThinkGearHandle), ThinkGearError> {
        let source = SerialSource::new(
            &self.config.port_name,
            self.config.baud_rate,
            Duration::from_millis(self.config.read_timeout_ms),
        );
        self.connect_source(source)
    }

    /// Start streaming from any byte source, e.g. a
    /// [`crate::simulator::SimulatedSource`] or a recorded capture.
    pub fn connect_source<S: ByteSource + 'static>(
        &self,
        source: S,
    ) -> Result<(mpsc::Receiver<ThinkGearEvent>, ThinkGearHandle), ThinkGearError> {
        if self.config.channel_capacity == 0 {
            return Err(ThinkGearError::InvalidConfig(
                "channel_capacity must be at least 1".into(),
            ));
        }
        let source: Box<dyn ByteSource> = Box::new(source);
        let mut reader = ThinkGearReader::new(source, self.config.reader_options())?;
        reader.open()?;

        let (tx, rx) = mpsc::channel::<ThinkGearEvent>(self.config.channel_capacity);
        let name = reader.source_name().to_owned();
        info!("Connected: {name}");
        // Fresh channel with room for at least one event.
        let _ = tx.try_send(ThinkGearEvent::Connected(name));

        reader.start(tx)?;
        Ok((rx, ThinkGearHandle { reader }))
    }
}

// ── ThinkGearHandle ───────────────────────────────────────────────────────────

/// Controls a running connection.  Dropping it closes the connection.
pub struct ThinkGearHandle {
    reader: ThinkGearReader<Box<dyn ByteSource>>,
}

impl ThinkGearHandle {
    /// Stop streaming.  See [`ThinkGearReader::stop`]; drop or drain the
    /// event receiver first.
    pub fn stop(&mut self) -> Result<(), ThinkGearError> {
        self.reader.stop()
    }

    /// Stop if still running and release the port.
    pub fn close(&mut self) {
        self.reader.close()
    }

    pub fn is_running(&self) -> bool {
        self.reader.is_running()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.reader.stats()
    }

    pub fn source_name(&self) -> &str {
        self.reader.source_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, encode_full_payload};
    use crate::source::MemorySource;
    use crate::types::EegPower;
    use std::io;

    struct BrokenSource;

    impl ByteSource for BrokenSource {
        fn open(&mut self) -> Result<(), ThinkGearError> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such device").into())
        }

        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn bytes_available(&mut self) -> io::Result<usize> {
            Ok(0)
        }

        fn close(&mut self) {}
    }

    /// Never produces a byte; every read times out after a short wait.
    struct IdleSource;

    impl ByteSource for IdleSource {
        fn open(&mut self) -> Result<(), ThinkGearError> {
            Ok(())
        }

        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(5));
            Err(io::ErrorKind::TimedOut.into())
        }

        fn bytes_available(&mut self) -> io::Result<usize> {
            Ok(0)
        }

        fn close(&mut self) {}
    }

    fn full_packet_stream() -> Vec<u8> {
        let power = EegPower::from_array([10, 20, 30, 40, 50, 60, 70, 80]);
        encode_frame(&encode_full_payload(0, &power, 55, 66)).unwrap()
    }

    #[test]
    fn rejects_zero_batch_capacity() {
        let options = ReaderOptions {
            raw_batch_capacity: 0,
            ..ReaderOptions::default()
        };
        assert!(matches!(
            ThinkGearReader::new(MemorySource::new(vec![]), options),
            Err(ThinkGearError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_oversized_batch_capacity() {
        let options = ReaderOptions {
            raw_batch_capacity: usize::MAX / 4,
            ..ReaderOptions::default()
        };
        assert!(matches!(
            ThinkGearReader::new(MemorySource::new(vec![]), options),
            Err(ThinkGearError::InvalidConfig(_))
        ));

        let largest = ReaderOptions {
            raw_batch_capacity: MAX_RAW_BATCH_CAPACITY,
            ..ReaderOptions::default()
        };
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn failed_open_stays_created() {
        let mut reader = ThinkGearReader::new(BrokenSource, ReaderOptions::default()).unwrap();
        assert!(reader.open().is_err());
        assert_eq!(reader.state(), ReaderState::Created);
    }

    #[test]
    fn wrong_state_calls_are_rejected() {
        let mut reader =
            ThinkGearReader::new(MemorySource::new(vec![]), ReaderOptions::default()).unwrap();
        let (tx, _rx) = mpsc::channel::<ThinkGearEvent>(4);
        assert!(matches!(
            reader.start(tx),
            Err(ThinkGearError::InvalidState {
                state: ReaderState::Created,
                action: "start"
            })
        ));
        assert!(matches!(reader.stop(), Err(ThinkGearError::InvalidState { .. })));

        reader.open().unwrap();
        assert!(matches!(reader.open(), Err(ThinkGearError::InvalidState { .. })));
        assert_eq!(reader.state(), ReaderState::Opened);
    }

    #[test]
    fn close_is_idempotent() {
        let mut reader =
            ThinkGearReader::new(MemorySource::new(vec![1, 2]), ReaderOptions::default()).unwrap();
        reader.open().unwrap();
        reader.close();
        reader.close();
        assert_eq!(reader.state(), ReaderState::Closed);
        assert!(matches!(reader.open(), Err(ThinkGearError::InvalidState { .. })));
    }

    #[test]
    fn end_of_stream_is_reported_by_stop() {
        let mut reader =
            ThinkGearReader::new(MemorySource::new(full_packet_stream()), ReaderOptions::default())
                .unwrap();
        reader.open().unwrap();
        let (tx, mut rx) = mpsc::channel::<ThinkGearEvent>(8);
        reader.start(tx).unwrap();
        assert_eq!(reader.state(), ReaderState::Running);

        assert!(matches!(rx.blocking_recv(), Some(ThinkGearEvent::Signal(s)) if s.attention == 55));
        assert!(matches!(rx.blocking_recv(), Some(ThinkGearEvent::Fault(_))));
        assert!(matches!(rx.blocking_recv(), Some(ThinkGearEvent::Disconnected)));
        assert!(rx.blocking_recv().is_none());

        assert!(matches!(reader.stop(), Err(ThinkGearError::SourceClosed)));
        assert_eq!(reader.state(), ReaderState::Stopped);
        assert_eq!(reader.stats().signals, 1);
    }

    #[test]
    fn stop_and_restart_idle_source() {
        let options = ReaderOptions {
            stall_timeout: None,
            ..ReaderOptions::default()
        };
        let mut reader = ThinkGearReader::new(IdleSource, options).unwrap();
        reader.open().unwrap();

        let (tx, _rx) = mpsc::channel::<ThinkGearEvent>(4);
        reader.start(tx).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(reader.is_running());
        assert!(reader.stop().is_ok());
        assert_eq!(reader.state(), ReaderState::Stopped);
        assert!(!reader.is_running());

        let (tx, _rx) = mpsc::channel::<ThinkGearEvent>(4);
        reader.start(tx).unwrap();
        assert_eq!(reader.state(), ReaderState::Running);
        reader.close();
        assert_eq!(reader.state(), ReaderState::Closed);
    }

    #[test]
    fn idle_source_stalls() {
        let options = ReaderOptions {
            stall_timeout: Some(Duration::from_millis(30)),
            ..ReaderOptions::default()
        };
        let mut reader = ThinkGearReader::new(IdleSource, options).unwrap();
        reader.open().unwrap();
        let (tx, mut rx) = mpsc::channel::<ThinkGearEvent>(4);
        reader.start(tx).unwrap();

        assert!(matches!(rx.blocking_recv(), Some(ThinkGearEvent::Fault(_))));
        assert!(matches!(reader.stop(), Err(ThinkGearError::Stalled(_))));
    }

    #[test]
    fn client_announces_connection_first() {
        let client = ThinkGearClient::new(ThinkGearClientConfig::default());
        let (mut rx, mut handle) = client
            .connect_source(MemorySource::new(full_packet_stream()))
            .unwrap();

        assert!(matches!(
            rx.blocking_recv(),
            Some(ThinkGearEvent::Connected(name)) if name.starts_with("memory")
        ));
        assert!(matches!(rx.blocking_recv(), Some(ThinkGearEvent::Signal(_))));
        assert!(handle.source_name().starts_with("memory"));
        drop(rx);
        let _ = handle.stop();
        assert_eq!(handle.stats().signals, 1);
        handle.close();
    }

    #[test]
    fn client_reports_missing_port() {
        let client = ThinkGearClient::new(ThinkGearClientConfig {
            port_name: "/dev/thinkgear-does-not-exist".into(),
            ..ThinkGearClientConfig::default()
        });
        assert!(client.connect().is_err());
    }

    #[test]
    fn zero_stall_timeout_disables_check() {
        let config = ThinkGearClientConfig {
            stall_timeout_secs: 0,
            ..ThinkGearClientConfig::default()
        };
        assert_eq!(config.reader_options().stall_timeout, None);
    }
}
