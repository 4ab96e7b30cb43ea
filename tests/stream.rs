use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use thinkgear_rs::prelude::*;
use thinkgear_rs::protocol::{encode_frame, encode_full_payload, encode_payload};
use thinkgear_rs::stats::DecodeStats;
use thinkgear_rs::worker;

#[derive(Default)]
struct Collected {
    signals: Vec<Signal>,
    batches: Vec<RawBatch>,
    finished: usize,
}

/// Sink that records into shared state so the test can inspect it after the
/// reader's worker thread is joined.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Collected>>);

impl EventSink for SharedSink {
    fn on_signal(&mut self, signal: Signal) -> Result<(), ConsumerGone> {
        self.0.lock().unwrap().signals.push(signal);
        Ok(())
    }

    fn on_raw_batch(&mut self, batch: RawBatch) -> Result<(), ConsumerGone> {
        self.0.lock().unwrap().batches.push(batch);
        Ok(())
    }

    fn on_finished(&mut self, _error: Option<&ThinkGearError>) {
        self.0.lock().unwrap().finished += 1;
    }
}

fn frame(rows: &[DataRow]) -> Vec<u8> {
    encode_frame(&encode_payload(rows)).unwrap()
}

/// A noisy capture: stray bytes, a corrupted frame, an oversized header, an
/// unknown code, 600 raw samples and two full packets.
fn capture() -> Vec<u8> {
    let mut bytes = vec![0x00, 0x13, 0xAA, 0x37];

    bytes.extend(frame(&[DataRow::BlinkStrength(120)]));

    let mut corrupted = frame(&[DataRow::Attention(99)]);
    let last = corrupted.len() - 1;
    corrupted[last] = corrupted[last].wrapping_add(1);
    bytes.extend(corrupted);

    bytes.extend([0xAA, 0xAA, 0xF0]);
    bytes.extend(encode_frame(&[0x04, 0x10, 0x07, 0x01]).unwrap());

    for i in 0..600i16 {
        bytes.extend(frame(&[DataRow::RawWave(i - 300)]));
    }

    let power = EegPower::from_array([8, 7, 6, 5, 4, 3, 2, 1]);
    bytes.extend(encode_frame(&encode_full_payload(26, &power, 40, 60)).unwrap());
    bytes.extend(encode_frame(&encode_full_payload(0, &power, 41, 61)).unwrap());
    bytes
}

#[test]
fn noisy_capture_decodes_synchronously() {
    let mut source = MemorySource::new(capture());
    source.open().unwrap();
    let mut sink = SharedSink::default();
    let stats = DecodeStats::default();

    let result = worker::run(
        &mut source,
        &mut sink,
        &AtomicBool::new(false),
        &stats,
        &ReaderOptions::default(),
    );
    assert!(matches!(result, Err(ThinkGearError::SourceClosed)));

    let got = sink.0.lock().unwrap();
    assert_eq!(got.finished, 1);

    assert_eq!(got.batches.len(), 1);
    let batch = &got.batches[0];
    assert_eq!(batch.sequence, 0);
    assert_eq!(batch.samples.len(), 512);
    assert_eq!(batch.samples[0], -300);
    assert_eq!(batch.samples[511], 211);

    assert_eq!(got.signals.len(), 2);
    let first = got.signals[0];
    assert_eq!(first.quality, 26);
    assert_eq!(first.attention, 40);
    assert_eq!(first.meditation, 60);
    assert_eq!(first.blink, 120);
    assert_eq!(first.power.delta, 8);
    assert_eq!(first.power.mid_gamma, 1);
    // Reset after emission: blink does not carry into the next record.
    assert_eq!(got.signals[1].blink, 0);
    assert_eq!(got.signals[1].attention, 41);

    let snap = stats.snapshot();
    assert_eq!(snap.checksum_failures, 1);
    assert_eq!(snap.invalid_lengths, 1);
    assert_eq!(snap.rejected_payloads, 1);
    assert_eq!(snap.signals, 2);
    assert_eq!(snap.raw_batches, 1);
    assert_eq!(snap.frames, 1 + 600 + 2);
    assert!(snap.skipped_bytes >= 4);
}

#[test]
fn reader_thread_delivers_to_custom_sink() {
    let mut reader = ThinkGearReader::new(MemorySource::new(capture()), ReaderOptions::default())
        .unwrap();
    reader.open().unwrap();
    let sink = SharedSink::default();
    reader.start(sink.clone()).unwrap();

    // The capture ends, so the worker exits on its own with SourceClosed.
    assert!(matches!(reader.stop(), Err(ThinkGearError::SourceClosed)));
    assert_eq!(reader.state(), ReaderState::Stopped);

    let got = sink.0.lock().unwrap();
    assert_eq!(got.signals.len(), 2);
    assert_eq!(got.batches.len(), 1);
    assert_eq!(reader.stats().dropped_frames(), 2);

    drop(got);
    reader.close();
    assert_eq!(reader.state(), ReaderState::Closed);
}

#[test]
fn simulator_stream_through_client() {
    let config = ThinkGearClientConfig {
        raw_batch_capacity: 128,
        ..ThinkGearClientConfig::default()
    };
    let client = ThinkGearClient::new(config);
    let source = SimulatedSource::new().unpaced().corrupt_every(50);
    let (mut rx, mut handle) = client.connect_source(source).unwrap();

    assert!(matches!(
        rx.blocking_recv(),
        Some(ThinkGearEvent::Connected(name)) if name == "ThinkGear simulator"
    ));

    let mut batches = 0;
    let mut signals = 0;
    while signals < 2 {
        match rx.blocking_recv() {
            Some(ThinkGearEvent::RawBatch(b)) => {
                assert_eq!(b.samples.len(), 128);
                batches += 1;
            }
            Some(ThinkGearEvent::Signal(s)) => {
                assert!(s.attention <= 100);
                signals += 1;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(batches >= 6);
    assert!(handle.is_running());

    drop(rx);
    assert!(handle.stop().is_ok());
    assert!(!handle.is_running());
    assert!(handle.stats().checksum_failures > 0);
    handle.close();
}
