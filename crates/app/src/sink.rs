use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use music_particles_core::{RenderSink, Result, Snapshot, SpriteKind};

/// Writes every snapshot as one JSON object per line.
pub struct JsonLinesSink {
    out: BufWriter<File>,
    written: u64,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        tracing::info!(path = %path.display(), "writing snapshots");
        Ok(Self {
            out: BufWriter::new(file),
            written: 0,
        })
    }
}

impl RenderSink for JsonLinesSink {
    fn present(&mut self, snapshot: &Snapshot) -> Result<()> {
        serde_json::to_writer(&mut self.out, snapshot)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        tracing::debug!(frames = self.written, "snapshot file flushed");
        Ok(())
    }
}

/// Logs a population summary once per `every` frames.
pub struct StatsSink {
    every: u64,
    peak: usize,
}

impl StatsSink {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            peak: 0,
        }
    }
}

impl RenderSink for StatsSink {
    fn present(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.peak = self.peak.max(snapshot.sprites.len());
        if snapshot.frame % self.every != 0 {
            return Ok(());
        }

        let settled = snapshot
            .sprites
            .iter()
            .filter(|s| matches!(s.kind, SpriteKind::Snowflake { fixed: true, .. }))
            .count();
        let depth: Option<f32> = snapshot.surface.as_ref().map(|h| h.iter().sum());
        tracing::info!(
            frame = snapshot.frame,
            sprites = snapshot.sprites.len(),
            settled,
            depth = ?depth,
            "frame"
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        tracing::info!(peak_sprites = self.peak, "run complete");
        Ok(())
    }
}

/// Feeds each snapshot to several sinks in turn.
pub struct FanOut {
    sinks: Vec<Box<dyn RenderSink>>,
}

impl FanOut {
    pub fn new(sinks: Vec<Box<dyn RenderSink>>) -> Self {
        Self { sinks }
    }
}

impl RenderSink for FanOut {
    fn present(&mut self, snapshot: &Snapshot) -> Result<()> {
        for sink in &mut self.sinks {
            sink.present(snapshot)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            sink.finish()?;
        }
        Ok(())
    }
}
