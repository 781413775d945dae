//! Playback position reporting.
//!
//! The frame loop never talks to an audio device. It only reads a position
//! through [`PositionSource`]. [`Transport`] is the built-in source: a thread
//! that advances the position with wall-clock time, standing in for a device
//! callback, and posts [`LoopSignal::PlaybackFinished`] once the track is
//! over.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;

use crate::{LoopSignal, Result};

/// Position value meaning "not playing".
pub const STOPPED: i64 = -1;

/// Anything that can report how far playback has progressed.
pub trait PositionSource: Send + Sync {
    /// Milliseconds since playback started, or a negative value when
    /// playback has not started or was stopped.
    fn position_ms(&self) -> i64;
}

impl PositionSource for AtomicI64 {
    fn position_ms(&self) -> i64 {
        self.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct Shared {
    position_ms: AtomicI64,
    stop: AtomicBool,
}

/// Wall-clock playback of a track of known length on a background thread.
#[derive(Debug)]
pub struct Transport {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Transport {
    /// Starts playback immediately. The position reads 0 as soon as this
    /// returns and is refreshed every `tick`.
    pub fn start(length: Duration, tick: Duration, signals: Sender<LoopSignal>) -> Result<Self> {
        let shared = Arc::new(Shared {
            position_ms: AtomicI64::new(0),
            stop: AtomicBool::new(false),
        });

        let worker = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("transport".into())
            .spawn(move || transport_loop(&worker, length, tick, &signals))?;

        tracing::debug!(?length, "transport started");
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Stops playback. The position reads [`STOPPED`] afterwards and no
    /// finish signal is posted.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            join_worker(handle);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.shared.position_ms.load(Ordering::Acquire) >= 0
    }
}

impl PositionSource for Transport {
    fn position_ms(&self) -> i64 {
        self.shared.position_ms.load(Ordering::Acquire)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Joins the transport thread. Returns false if it panicked.
fn join_worker(handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::warn!(%reason, "transport thread panicked");
            false
        }
    }
}

fn transport_loop(shared: &Shared, length: Duration, tick: Duration, signals: &Sender<LoopSignal>) {
    let started = Instant::now();
    let mut next_deadline = started;

    loop {
        if shared.stop.load(Ordering::SeqCst) {
            shared.position_ms.store(STOPPED, Ordering::Release);
            tracing::debug!("transport stopped");
            return;
        }

        let elapsed = started.elapsed();
        if elapsed >= length {
            shared.position_ms.store(STOPPED, Ordering::Release);
            let _ = signals.send(LoopSignal::PlaybackFinished);
            tracing::debug!(?elapsed, "playback finished");
            return;
        }
        shared
            .position_ms
            .store(elapsed.as_millis() as i64, Ordering::Release);

        next_deadline += tick;
        let now = Instant::now();
        if now < next_deadline {
            std::thread::sleep(next_deadline - now);
        } else {
            next_deadline = now;
            tracing::trace!("transport overrun");
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;

    use super::*;

    #[test]
    fn posts_one_finish_signal_at_end_of_track() {
        let (tx, rx) = bounded(4);
        let transport =
            Transport::start(Duration::from_millis(30), Duration::from_millis(2), tx).unwrap();

        let signal = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(signal, LoopSignal::PlaybackFinished);
        assert_eq!(transport.position_ms(), STOPPED);
        assert!(!transport.is_running());

        drop(transport);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stop_reports_stopped_without_signal() {
        let (tx, rx) = bounded(4);
        let mut transport =
            Transport::start(Duration::from_secs(60), Duration::from_millis(2), tx).unwrap();
        assert!(transport.position_ms() >= 0);

        transport.stop();
        assert_eq!(transport.position_ms(), STOPPED);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn worker_panic_is_reported_not_propagated() {
        let clean = std::thread::spawn(|| {});
        assert!(join_worker(clean));

        let crashed = std::thread::spawn(|| {
            panic!("device lost");
        });
        assert!(!join_worker(crashed));
    }

    #[test]
    fn atomic_position_is_a_source() {
        let position = AtomicI64::new(1_500);
        assert_eq!(position.position_ms(), 1_500);
        position.store(STOPPED, Ordering::Release);
        assert_eq!(position.position_ms(), STOPPED);
    }
}
