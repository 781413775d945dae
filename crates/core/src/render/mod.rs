use crate::{Result, Snapshot};

/// Receives one snapshot per rendered frame.
///
/// Drawing is left to implementors; the frame loop only guarantees that
/// snapshots arrive in frame order and that [`finish`](RenderSink::finish) is
/// called once after the last one.
pub trait RenderSink {
    fn present(&mut self, snapshot: &Snapshot) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards every frame.
#[derive(Debug, Default)]
pub struct NullSink {
    presented: u64,
}

impl NullSink {
    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl RenderSink for NullSink {
    fn present(&mut self, _snapshot: &Snapshot) -> Result<()> {
        self.presented += 1;
        Ok(())
    }
}

/// Keeps every snapshot in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    snapshots: Vec<Snapshot>,
    finished: bool,
}

impl RecordingSink {
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn into_snapshots(self) -> Vec<Snapshot> {
        self.snapshots
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl RenderSink for RecordingSink {
    fn present(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
