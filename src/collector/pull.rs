//! Directory puller backend.
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::Backend;
use crate::{
    error::{CollectorError, CollectorResult},
    output::{OutputCollection, OutputEntry},
    target::Target,
};

/// Pulls a directory from the target (e.g. a log directory) when the capture stops.
///
/// The output path is the destination directory and must be set before `start`.
pub struct PullCollector {
    name: String,
    target: Arc<Target>,
    source: String,
    destination: Option<PathBuf>,
    pulled: bool,
}

impl PullCollector {
    /// Create a collector pulling `source` from `target`.
    pub fn new(target: Arc<Target>, source: impl Into<String>) -> Self {
        Self {
            name: "pull".to_string(),
            target,
            source: source.into(),
            destination: None,
            pulled: false,
        }
    }

    /// Set the name used in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The directory pulled from the target.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Backend for PullCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) -> CollectorResult<()> {
        self.destination = None;
        self.pulled = false;
        Ok(())
    }

    fn start(&mut self, output: Option<&Path>) -> CollectorResult<()> {
        let output = output.ok_or_else(|| {
            CollectorError::setup(
                &self.name,
                io::Error::new(io::ErrorKind::InvalidInput, "an output directory is required"),
            )
        })?;
        self.destination = Some(output.to_path_buf());
        Ok(())
    }

    fn stop(&mut self) -> CollectorResult<()> {
        if let Some(dest) = &self.destination {
            self.target.pull(&self.source, dest)?;
            self.pulled = true;

            #[cfg(feature = "tracing")]
            tracing::debug!(collector = %self.name, source = %self.source, dest = %dest.display(), "pulled");
        }
        Ok(())
    }

    fn collect(&self, _output: Option<&Path>) -> CollectorResult<OutputCollection> {
        Ok(self
            .destination
            .iter()
            .filter(|_| self.pulled)
            .map(OutputEntry::directory)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collector::Collector, output::OutputKind, target::testing::FakeConnection};

    #[test]
    fn test_pull_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("logs");
        let conn = FakeConnection::new()
            .with_files("/var/log/harness", &[("boot.log", "ok"), ("kmsg", "oops")]);
        let target = Arc::new(Target::local("board").with_connection(conn.clone()));
        let mut collector = Collector::new(PullCollector::new(target, "/var/log/harness"));
        collector.set_output(&dest);

        collector.capture(|_| Ok::<_, std::io::Error>(())).unwrap();

        let data = collector.get_data().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].kind(), OutputKind::Directory);
        assert_eq!(data[0].path(), Some(dest.as_path()));
        assert_eq!(std::fs::read_to_string(dest.join("kmsg")).unwrap(), "oops");
        assert_eq!(conn.commands(), vec!["pull /var/log/harness".to_string()]);
    }

    #[test]
    fn test_pull_requires_output() {
        let target = Arc::new(Target::local("board").with_connection(FakeConnection::new()));
        let mut collector = Collector::new(PullCollector::new(target, "/var/log"));
        let err = collector.start().unwrap_err();
        assert!(matches!(err, CollectorError::Setup { ref backend, .. } if backend == "pull"));
    }

    #[test]
    fn test_pull_failure_propagates_target_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = Arc::new(Target::local("board").with_connection(FakeConnection::new()));
        let mut collector = Collector::new(PullCollector::new(target, "/missing"));
        collector.set_output(dir.path());

        collector.start().unwrap();
        let err = collector.stop().unwrap_err();
        assert!(matches!(err, CollectorError::Target(crate::error::TargetError::Stable(_))));
    }
}
