//! This module defines the collector lifecycle and the backend trait it drives.
//!
//! A [`Collector`] wraps a [`Backend`] and enforces the lifecycle
//! `Idle → Active → Stopped`, re-entered through [`Collector::reset`]:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use devcollect::{
//!     collector::{Collector, TraceCollector},
//!     target::{LocalConnection, Target},
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let target = Arc::new(Target::local("host").with_connection(LocalConnection::new()));
//! let mut collector = Collector::new(TraceCollector::new(target, "dmesg --follow"));
//! collector.set_output("/tmp/dmesg.txt");
//!
//! collector.capture(|_| {
//!     // run the workload here
//!     Ok::<_, std::io::Error>(())
//! })?;
//!
//! for entry in &collector.get_data()? {
//!     println!("{entry:?}");
//! }
//! # Ok(())
//! # }
//! ```
mod counter;
mod pull;
mod trace;

use std::{
    fmt,
    path::{Path, PathBuf},
};

pub use counter::{COUNTERS_FILE, CounterCollector, CounterReading};
pub use pull::PullCollector;
pub use trace::TraceCollector;

use crate::{
    error::{CaptureError, CollectorError, CollectorResult},
    output::OutputCollection,
};

/// Current lifecycle state of a collector.
///
/// State transitions: `Idle → Active → Stopped → Idle` (via `reset`)
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CollectorState {
    /// Ready to start. Holds no captured data.
    #[default]
    Idle,
    /// Capturing.
    Active,
    /// Capture finished; data can be retrieved.
    Stopped,
}

/// A trait implemented by every concrete collector backend.
///
/// Backends only implement the work of each step. Ordering is enforced by
/// [`Collector`], so a backend never sees `start` twice without a `stop` in between.
pub trait Backend {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Drop any buffered data from a previous capture.
    fn reset(&mut self) -> CollectorResult<()> {
        Ok(())
    }

    /// Begin capturing. `output` is the path set through [`Collector::set_output`], if any.
    fn start(&mut self, output: Option<&Path>) -> CollectorResult<()>;

    /// End capturing and finalize buffered data.
    fn stop(&mut self) -> CollectorResult<()>;

    /// Describe the captured data. `output` is the path the capture was started with.
    #[allow(unused_variables)]
    fn collect(&self, output: Option<&Path>) -> CollectorResult<OutputCollection> {
        Ok(OutputCollection::new())
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn reset(&mut self) -> CollectorResult<()> {
        (**self).reset()
    }

    fn start(&mut self, output: Option<&Path>) -> CollectorResult<()> {
        (**self).start(output)
    }

    fn stop(&mut self) -> CollectorResult<()> {
        (**self).stop()
    }

    fn collect(&self, output: Option<&Path>) -> CollectorResult<OutputCollection> {
        (**self).collect(output)
    }
}

/// Drives a [`Backend`] through the collection lifecycle.
///
/// A collector is used by one caller at a time. `start` and `stop` block while the
/// backend talks to its target.
pub struct Collector<B> {
    backend: B,
    state: CollectorState,
    output_path: Option<PathBuf>,
    /// Output path snapshotted by the last successful `start`.
    active_output: Option<PathBuf>,
    /// Stop failure swallowed by a dropped [`Capture`] guard.
    dropped_stop_error: Option<CollectorError>,
}

impl<B: Backend> Collector<B> {
    /// Create a new idle collector around `backend`.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: CollectorState::Idle,
            output_path: None,
            active_output: None,
            dropped_stop_error: None,
        }
    }

    /// Returns the backend name.
    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the backend mutably, e.g. to reconfigure it between captures.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Consumes the collector and returns the backend.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Returns the output path that the next `start` will use.
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Returns the stop failure of a [`Capture`] guard that was dropped without
    /// [`finish`](Capture::finish), e.g. while a panic unwound through it.
    ///
    /// Cleared by the next successful `stop` or `reset`.
    pub fn dropped_stop_error(&self) -> Option<&CollectorError> {
        self.dropped_stop_error.as_ref()
    }

    /// Record where the backend should persist its artifacts.
    ///
    /// Legal in any state; takes effect on the next [`start`](Self::start).
    pub fn set_output(&mut self, path: impl Into<PathBuf>) {
        self.output_path = Some(path.into());
    }

    /// Drop any buffered data and return to `Idle`.
    ///
    /// Called while `Active`, the running capture is stopped first and its data discarded.
    pub fn reset(&mut self) -> CollectorResult<()> {
        if self.state == CollectorState::Active {
            #[cfg(feature = "tracing")]
            tracing::warn!(collector = self.name(), "reset while active, stopping capture");
            self.backend.stop()?;
        }
        self.backend.reset()?;
        self.active_output = None;
        self.dropped_stop_error = None;
        self.state = CollectorState::Idle;

        #[cfg(feature = "tracing")]
        tracing::debug!(collector = self.name(), "reset");
        Ok(())
    }

    /// Begin capturing. Only legal from `Idle`.
    pub fn start(&mut self) -> CollectorResult<()> {
        self.expect_state(CollectorState::Idle, "start")?;
        self.backend.start(self.output_path.as_deref())?;
        self.active_output = self.output_path.clone();
        self.state = CollectorState::Active;

        #[cfg(feature = "tracing")]
        tracing::debug!(collector = self.name(), output = ?self.active_output, "started");
        Ok(())
    }

    /// End capturing and finalize data. Only legal from `Active`.
    ///
    /// If the backend fails to stop, the collector stays `Active`.
    pub fn stop(&mut self) -> CollectorResult<()> {
        self.expect_state(CollectorState::Active, "stop")?;
        self.backend.stop()?;
        self.state = CollectorState::Stopped;
        self.dropped_stop_error = None;

        #[cfg(feature = "tracing")]
        tracing::debug!(collector = self.name(), "stopped");
        Ok(())
    }

    /// Returns a snapshot of the captured data.
    ///
    /// An idle collector returns an empty collection. Fails while a capture is active.
    pub fn get_data(&self) -> CollectorResult<OutputCollection> {
        match self.state {
            CollectorState::Idle => Ok(OutputCollection::new()),
            CollectorState::Active => Err(self.invalid_state("get data from")),
            CollectorState::Stopped => self.backend.collect(self.active_output.as_deref()),
        }
    }

    /// Reset and start the collector, returning a guard that stops it when finished or dropped.
    pub fn acquire(&mut self) -> CollectorResult<Capture<'_, B>> {
        self.reset()?;
        self.start()?;
        Ok(Capture { collector: self, finished: false })
    }

    /// Run `body` while the collector is capturing.
    ///
    /// The collector is reset and started before `body` runs and stopped exactly once
    /// afterwards, whether `body` succeeds, fails or panics. A failing stop never hides
    /// the body's error: both are returned in [`CaptureError::Body`].
    pub fn capture<T, E>(
        &mut self,
        body: impl FnOnce(&B) -> Result<T, E>,
    ) -> Result<T, CaptureError<E>> {
        let capture = self.acquire().map_err(CaptureError::Collector)?;
        match body(capture.backend()) {
            Ok(value) => capture.finish().map(|()| value).map_err(CaptureError::Collector),
            Err(error) => Err(CaptureError::Body { error, stop: capture.finish().err() }),
        }
    }

    fn expect_state(&self, expected: CollectorState, op: &'static str) -> CollectorResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(op))
        }
    }

    fn invalid_state(&self, op: &'static str) -> CollectorError {
        CollectorError::InvalidState { collector: self.name().to_string(), op, state: self.state }
    }
}

impl<B: Backend> fmt::Debug for Collector<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.name())
            .field("state", &self.state)
            .field("output_path", &self.output_path)
            .finish_non_exhaustive()
    }
}

/// An active capture. Stops the collector when finished or dropped.
///
/// Prefer [`finish`](Self::finish), which reports stop failures. A guard dropped without
/// finishing (including while panicking) still stops the collector; a failure is logged
/// and kept in [`Collector::dropped_stop_error`].
#[must_use = "dropping the guard stops the capture immediately"]
pub struct Capture<'a, B: Backend> {
    collector: &'a mut Collector<B>,
    finished: bool,
}

impl<B: Backend> Capture<'_, B> {
    /// Returns the backend being captured.
    pub fn backend(&self) -> &B {
        &self.collector.backend
    }

    /// Stop the collector and report the result.
    pub fn finish(mut self) -> CollectorResult<()> {
        self.finished = true;
        self.collector.stop()
    }
}

impl<B: Backend> Drop for Capture<'_, B> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.collector.stop() {
            #[cfg(feature = "tracing")]
            tracing::error!(collector = self.collector.name(), error = %e, "failed to stop capture");
            self.collector.dropped_stop_error = Some(e);
        }
    }
}
