//! Event delivery from the worker thread to the host application.

use log::debug;
use tokio::sync::mpsc;

use crate::error::ThinkGearError;
use crate::types::{RawBatch, Signal, ThinkGearEvent};

/// Returned by an [`EventSink`] whose consumer has gone away.
///
/// The worker treats it as a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerGone;

/// Receives decoded data on the worker thread.
///
/// Callbacks run synchronously inside the decode loop: while one runs, no
/// bytes are read.  Keep them short, or hand the value to another thread.
pub trait EventSink: Send {
    /// A completed signal record.
    fn on_signal(&mut self, signal: Signal) -> Result<(), ConsumerGone>;

    /// A filled raw batch.
    fn on_raw_batch(&mut self, batch: RawBatch) -> Result<(), ConsumerGone>;

    /// The worker is about to exit.  `error` is set when a fatal transport
    /// error ended the loop, and unset for a requested stop.
    fn on_finished(&mut self, _error: Option<&ThinkGearError>) {}
}

/// Forwards everything into a tokio channel as [`ThinkGearEvent`]s.
///
/// Uses `blocking_send`, so the worker waits when the channel is full
/// instead of dropping data.  Must only be driven from a thread outside the
/// tokio runtime, which the reader's worker thread always is.
impl EventSink for mpsc::Sender<ThinkGearEvent> {
    fn on_signal(&mut self, signal: Signal) -> Result<(), ConsumerGone> {
        self.blocking_send(ThinkGearEvent::Signal(signal))
            .map_err(|_| ConsumerGone)
    }

    fn on_raw_batch(&mut self, batch: RawBatch) -> Result<(), ConsumerGone> {
        self.blocking_send(ThinkGearEvent::RawBatch(batch))
            .map_err(|_| ConsumerGone)
    }

    fn on_finished(&mut self, error: Option<&ThinkGearError>) {
        if let Some(e) = error {
            if self.blocking_send(ThinkGearEvent::Fault(e.to_string())).is_err() {
                debug!("fault not delivered, receiver dropped: {e}");
            }
        }
        let _ = self.blocking_send(ThinkGearEvent::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_delivers_in_order() {
        let (mut tx, mut rx) = mpsc::channel::<ThinkGearEvent>(8);
        let handle = std::thread::spawn(move || {
            tx.on_raw_batch(RawBatch {
                sequence: 0,
                samples: vec![1, 2],
            })
            .unwrap();
            tx.on_signal(Signal {
                attention: 42,
                ..Signal::default()
            })
            .unwrap();
            tx.on_finished(Some(&ThinkGearError::SourceClosed));
        });
        handle.join().unwrap();

        assert!(matches!(
            rx.blocking_recv(),
            Some(ThinkGearEvent::RawBatch(b)) if b.samples == vec![1, 2]
        ));
        assert!(matches!(rx.blocking_recv(), Some(ThinkGearEvent::Signal(s)) if s.attention == 42));
        assert!(matches!(rx.blocking_recv(), Some(ThinkGearEvent::Fault(_))));
        assert!(matches!(rx.blocking_recv(), Some(ThinkGearEvent::Disconnected)));
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn dropped_receiver_reports_consumer_gone() {
        let (mut tx, rx) = mpsc::channel::<ThinkGearEvent>(1);
        drop(rx);
        assert_eq!(tx.on_signal(Signal::default()), Err(ConsumerGone));
    }
}
