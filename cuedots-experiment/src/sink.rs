use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use cuedots_core::CompletedTrial;

use crate::devices::{DeviceError, Marker, MarkerSink, RecordSink};

/// Writes one JSON object per trial and flushes after each, so a crash loses
/// at most the trial in flight.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl JsonLinesSink<BufWriter<File>> {
    /// Opens `path` for appending; an existing file is extended, never
    /// truncated.
    pub fn append_to(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn append(&mut self, trial: CompletedTrial) -> Result<(), DeviceError> {
        serde_json::to_writer(&mut self.writer, &trial)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        tracing::debug!(
            block = trial.spec().block,
            trial = trial.spec().trial,
            "record appended"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Tab-separated marker stream: message, category, trial, frame.
///
/// Lines are buffered and only flushed at close so per-frame writes stay
/// cheap inside the stimulus loop.
pub struct MarkerLog<W: Write> {
    writer: W,
}

impl MarkerLog<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::with_capacity(64 * 1024, file)))
    }
}

impl<W: Write> MarkerLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MarkerSink for MarkerLog<W> {
    fn send(&mut self, marker: &Marker<'_>) -> Result<(), DeviceError> {
        writeln!(
            self.writer,
            "{}\t{}\ttrial={}\tframe={}",
            marker.message(),
            marker.category,
            marker.trial,
            marker.frame
        )?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.writer.flush()?;
        Ok(())
    }
}
