use serde::Serialize;

/// Spectral power of the eight EEG bands reported by the headset ASIC.
///
/// Each value is a 24-bit unsigned magnitude with no physical unit; only
/// relative changes between packets (and between bands) are meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EegPower {
    /// 0.5–2.75 Hz
    pub delta: u32,
    /// 3.5–6.75 Hz
    pub theta: u32,
    /// 7.5–9.25 Hz
    pub low_alpha: u32,
    /// 10–11.75 Hz
    pub high_alpha: u32,
    /// 13–16.75 Hz
    pub low_beta: u32,
    /// 18–29.75 Hz
    pub high_beta: u32,
    /// 31–39.75 Hz
    pub low_gamma: u32,
    /// 41–49.75 Hz
    pub mid_gamma: u32,
}

impl EegPower {
    /// Bands in wire order (see [`crate::protocol::EEG_BAND_NAMES`]).
    pub fn to_array(&self) -> [u32; 8] {
        [
            self.delta,
            self.theta,
            self.low_alpha,
            self.high_alpha,
            self.low_beta,
            self.high_beta,
            self.low_gamma,
            self.mid_gamma,
        ]
    }

    pub fn from_array(bands: [u32; 8]) -> Self {
        let [delta, theta, low_alpha, high_alpha, low_beta, high_beta, low_gamma, mid_gamma] =
            bands;
        Self {
            delta,
            theta,
            low_alpha,
            high_alpha,
            low_beta,
            high_beta,
            low_gamma,
            mid_gamma,
        }
    }
}

/// One completed set of eSense and band-power values.
///
/// The decoder keeps a single `Signal` as an accumulator: every data row
/// overwrites the matching field, and fields keep their value across
/// packets until overwritten.  When a "full data" packet
/// ([`crate::protocol::FULL_PACKET_LEN`] bytes) has been applied, the
/// accumulator is emitted by value and reset to all-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Signal {
    /// Poor-signal level.  0 = good contact, 200 = electrode off the skin.
    pub quality: u8,
    pub power: EegPower,
    /// eSense attention, 0–100.  0 means the headset could not compute it.
    pub attention: u8,
    /// eSense meditation, 0–100.  0 means the headset could not compute it.
    pub meditation: u8,
    /// Strength of the last detected blink.  0 = no blink seen.
    pub blink: u8,
}

/// A filled batch of raw waveform samples.
///
/// Always carries exactly the reader's configured capacity of samples,
/// oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawBatch {
    /// Sequential batch number since the worker started (starts at 0).
    pub sequence: u64,
    /// Signed 16-bit ADC readings in arrival order.
    pub samples: Vec<i16>,
}

/// One decoded field of a packet payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRow {
    /// Code `0x02`.
    PoorSignal(u8),
    /// Code `0x04`.
    Attention(u8),
    /// Code `0x05`.
    Meditation(u8),
    /// Code `0x16`.
    BlinkStrength(u8),
    /// Code `0x83`.
    EegPower(EegPower),
    /// Code `0x80`.
    RawWave(i16),
}

/// All events produced by [`crate::thinkgear_client::ThinkGearClient`].
///
/// Consumers receive these through the `mpsc::Receiver` returned by
/// [`crate::thinkgear_client::ThinkGearClient::connect`] or
/// [`crate::thinkgear_client::ThinkGearClient::connect_source`].
///
/// A `Signal` is never delivered ahead of raw batches completed earlier in
/// the same byte stream.
#[derive(Debug, Clone)]
pub enum ThinkGearEvent {
    /// The byte source was opened and the worker started.
    /// The inner `String` names the source (e.g. `"/dev/rfcomm0"`).
    Connected(String),
    /// A completed "full data" signal record (≈ once per second).
    Signal(Signal),
    /// A filled raw-sample batch (512 samples ≈ 1 s by default).
    RawBatch(RawBatch),
    /// The worker hit a fatal transport error; `Disconnected` follows.
    Fault(String),
    /// The worker has exited.  No further events will arrive.
    Disconnected,
}
