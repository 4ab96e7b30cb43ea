//! # thinkgear-rs
//!
//! Rust library and terminal UI for reading EEG data from
//! [NeuroSky](https://neurosky.com/) headsets that speak the ThinkGear
//! serial protocol.
//!
//! ## Supported hardware
//!
//! | Model | Link | Port |
//! |---|---|---|
//! | MindWave Mobile / Mobile 2 | Bluetooth SPP | `/dev/rfcomm0`, `COMx`, `/dev/tty.MindWaveMobile-*` |
//! | MindWave (original) | RF dongle | USB serial |
//! | ThinkGear ASIC modules | UART | any serial port at 57600 baud |
//!
//! ## Quick start
//!
//! ```no_run
//! use thinkgear_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ThinkGearClient::new(ThinkGearClientConfig::default());
//!     let (mut rx, mut handle) = client.connect()?;
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             ThinkGearEvent::Signal(s) => println!("attention {} meditation {}", s.attention, s.meditation),
//!             ThinkGearEvent::Disconnected => break,
//!             _ => {}
//!         }
//!     }
//!     drop(rx);
//!     handle.stop()?;
//!     Ok(())
//! }
//! ```
//!
//! Without a channel, drive a [`thinkgear_client::ThinkGearReader`] with any
//! [`sink::EventSink`], or call [`worker::run`] directly on the current
//! thread to decode a recorded capture.
//!
//! ## Using as a library dependency
//!
//! ```toml
//! [dependencies]
//! # Full build (includes the ratatui TUI feature):
//! thinkgear-rs = "0.1"
//!
//! # Library only, skips ratatui / crossterm compilation:
//! thinkgear-rs = { version = "0.1", default-features = false }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`thinkgear_client`] | Reader lifecycle, the channel-based client, and [`thinkgear_client::ThinkGearHandle`] |
//! | [`worker`] | Frame synchronizer, payload reader, and the decode loop |
//! | [`decoder`] | Signal accumulator and raw sample batching |
//! | [`parse`] | Payload bytes to [`types::DataRow`]s |
//! | [`protocol`] | Wire constants, checksum, and frame encoders |
//! | [`source`] | The [`source::ByteSource`] transport trait, serial and in-memory sources |
//! | [`sink`] | The [`sink::EventSink`] trait and its tokio channel implementation |
//! | [`simulator`] | Synthetic headset for demos and tests |
//! | [`stats`] | Decode counters |
//! | [`types`] | Signal, raw batch, and event types |
//! | [`error`] | Error enums |

pub mod decoder;
pub mod error;
pub mod parse;
pub mod protocol;
pub mod simulator;
pub mod sink;
pub mod source;
pub mod stats;
pub mod thinkgear_client;
pub mod types;
pub mod worker;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
///
/// ```no_run
/// use thinkgear_rs::prelude::*;
///
/// # fn main() -> Result<(), ThinkGearError> {
/// let client = ThinkGearClient::new(ThinkGearClientConfig {
///     port_name: "/dev/rfcomm0".into(),
///     ..ThinkGearClientConfig::default()
/// });
/// let (mut rx, mut handle) = client.connect_source(SimulatedSource::new())?;
/// while let Some(ev) = rx.blocking_recv() {
///     if let ThinkGearEvent::RawBatch(b) = ev {
///         println!("{} samples", b.samples.len());
///         break;
///     }
/// }
/// drop(rx);
/// handle.stop()?;
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    // ── Client ────────────────────────────────────────────────────────────────
    pub use crate::thinkgear_client::{
        ReaderOptions, ReaderState, ThinkGearClient, ThinkGearClientConfig, ThinkGearHandle,
        ThinkGearReader,
    };

    // ── Transports and sinks ──────────────────────────────────────────────────
    pub use crate::simulator::SimulatedSource;
    pub use crate::sink::{ConsumerGone, EventSink};
    pub use crate::source::{ByteSource, MemorySource, SerialSource};

    // ── Events and data types ─────────────────────────────────────────────────
    pub use crate::error::{PayloadError, ThinkGearError};
    pub use crate::stats::StatsSnapshot;
    pub use crate::types::{DataRow, EegPower, RawBatch, Signal, ThinkGearEvent};

    // ── Protocol constants ────────────────────────────────────────────────────
    pub use crate::protocol::{
        DEFAULT_BAUD_RATE, EEG_BAND_NAMES, FULL_PACKET_LEN, RAW_SAMPLE_RATE,
    };
}
