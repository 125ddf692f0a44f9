//! Trace logger backend.
//!
//! This module provides [`TraceCollector`], which runs a command on the target for the
//! duration of a capture and keeps whatever it writes to standard output, e.g.
//! `cat /sys/kernel/tracing/trace_pipe` or `logcat -v threadtime`.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::Backend;
use crate::{
    error::{CollectorError, CollectorResult},
    output::{OutputCollection, OutputEntry},
    target::{BackgroundCommand, Target},
};

const DEFAULT_FILE_NAME: &str = "trace.txt";

/// Captures the output of a background command on the target.
///
/// When the output path is an existing directory, the trace is written to
/// `trace.txt` inside it (see [`with_file_name`](Self::with_file_name)); otherwise the
/// output path is the trace file. Without an output path the trace is only kept in
/// memory and no entry is reported.
pub struct TraceCollector {
    name: String,
    target: Arc<Target>,
    command: String,
    file_name: String,
    running: Option<Box<dyn BackgroundCommand>>,
    destination: Option<PathBuf>,
    trace: Option<Vec<u8>>,
    written: bool,
}

impl TraceCollector {
    /// Create a trace collector that runs `command` on `target`.
    pub fn new(target: Arc<Target>, command: impl Into<String>) -> Self {
        Self {
            name: "trace".to_string(),
            target,
            command: command.into(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            running: None,
            destination: None,
            trace: None,
            written: false,
        }
    }

    /// Set the name used in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the file name used when the output path is a directory.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// The command run during capture.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The raw trace from the last finished capture.
    pub fn trace(&self) -> Option<&[u8]> {
        self.trace.as_deref()
    }

    fn write_trace(&self, path: &Path, trace: &[u8]) -> CollectorResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CollectorError::setup(&self.name, e))?;
        }
        fs::write(path, trace).map_err(|e| CollectorError::setup(&self.name, e))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(collector = %self.name, path = %path.display(), bytes = trace.len(), "trace written");
        Ok(())
    }

    fn resolve(&self, output: &Path) -> PathBuf {
        if output.is_dir() {
            output.join(&self.file_name)
        } else {
            output.to_path_buf()
        }
    }
}

impl Backend for TraceCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) -> CollectorResult<()> {
        self.destination = None;
        self.trace = None;
        self.written = false;
        Ok(())
    }

    fn start(&mut self, output: Option<&Path>) -> CollectorResult<()> {
        self.destination = output.map(|p| self.resolve(p));
        self.running = Some(self.target.background(&self.command)?);

        #[cfg(feature = "tracing")]
        tracing::debug!(collector = %self.name, command = %self.command, host = self.target.name(), "trace started");
        Ok(())
    }

    /// Terminates the command and writes the trace. The trace is kept in memory before
    /// it is written, so a stop that failed to write can be retried.
    fn stop(&mut self) -> CollectorResult<()> {
        if let Some(running) = self.running.take() {
            self.trace = Some(running.terminate()?);
        }
        if let (Some(path), Some(trace), false) = (&self.destination, &self.trace, self.written) {
            self.write_trace(path, trace)?;
            self.written = true;
        }
        Ok(())
    }

    fn collect(&self, _output: Option<&Path>) -> CollectorResult<OutputCollection> {
        let mut output = OutputCollection::new();
        if let (Some(path), true) = (&self.destination, self.written) {
            output.append(OutputEntry::file(path));
        }
        Ok(output)
    }
}
