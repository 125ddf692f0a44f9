//! Counter sampling backend.
//!
//! [`CounterCollector`] reads a set of monotonic counters (e.g. `/sys` energy or
//! interrupt counters) when a capture starts and when it stops, and reports the
//! difference for each channel.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use super::Backend;
use crate::{
    error::{CollectorError, CollectorResult},
    output::{OutputCollection, OutputEntry},
    target::Target,
};

/// File written into the output directory when a capture stops.
pub const COUNTERS_FILE: &str = "counters.json";

/// One channel's readings over a capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterReading {
    /// Channel name.
    pub channel: String,
    /// Value read at start.
    pub start: u64,
    /// Value read at stop.
    pub end: u64,
    /// `end - start`, wrapping if the counter overflowed during the capture.
    pub delta: u64,
}

#[derive(Debug, Clone)]
struct Channel {
    name: String,
    path: String,
}

/// Samples counters on the target at start and stop.
pub struct CounterCollector {
    name: String,
    target: Arc<Target>,
    channels: Vec<Channel>,
    start_values: Vec<u64>,
    readings: Vec<CounterReading>,
    output_dir: Option<PathBuf>,
    written: Option<PathBuf>,
}

impl CounterCollector {
    /// Create a counter collector with no channels.
    pub fn new(target: Arc<Target>) -> Self {
        Self {
            name: "counters".to_string(),
            target,
            channels: Vec::new(),
            start_values: Vec::new(),
            readings: Vec::new(),
            output_dir: None,
            written: None,
        }
    }

    /// Set the name used in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a channel read from `path` on the target.
    pub fn with_channel(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.channels.push(Channel { name: name.into(), path: path.into() });
        self
    }

    /// Readings from the last finished capture, in channel order.
    pub fn readings(&self) -> &[CounterReading] {
        &self.readings
    }

    fn sample(&self) -> CollectorResult<Vec<u64>> {
        self.channels
            .iter()
            .map(|channel| {
                let raw = self.target.execute(&format!("cat {}", channel.path))?;
                raw.trim().parse::<u64>().map_err(|e| {
                    CollectorError::setup(
                        &self.name,
                        format!("channel '{}' read '{}': {e}", channel.name, raw.trim()),
                    )
                })
            })
            .collect()
    }

    fn write_readings(&self, dir: &Path) -> CollectorResult<PathBuf> {
        let path = dir.join(COUNTERS_FILE);
        let json = serde_json::to_vec_pretty(&self.readings)
            .map_err(|e| CollectorError::setup(&self.name, e))?;
        fs::create_dir_all(dir).map_err(|e| CollectorError::setup(&self.name, e))?;
        fs::write(&path, json).map_err(|e| CollectorError::setup(&self.name, e))?;
        Ok(path)
    }
}

impl Backend for CounterCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) -> CollectorResult<()> {
        self.start_values.clear();
        self.readings.clear();
        self.output_dir = None;
        self.written = None;
        Ok(())
    }

    fn start(&mut self, output: Option<&Path>) -> CollectorResult<()> {
        self.start_values = self.sample()?;
        self.output_dir = output.map(Path::to_path_buf);
        Ok(())
    }

    fn stop(&mut self) -> CollectorResult<()> {
        let end_values = self.sample()?;
        self.readings = self
            .channels
            .iter()
            .zip(self.start_values.iter().zip(end_values))
            .map(|(channel, (&start, end))| CounterReading {
                channel: channel.name.clone(),
                start,
                end,
                delta: end.wrapping_sub(start),
            })
            .collect();

        #[cfg(feature = "tracing")]
        for r in &self.readings {
            tracing::debug!(collector = %self.name, channel = %r.channel, delta = r.delta, "counter sampled");
        }

        if let Some(dir) = &self.output_dir {
            self.written = Some(self.write_readings(dir)?);
        }
        Ok(())
    }

    fn collect(&self, _output: Option<&Path>) -> CollectorResult<OutputCollection> {
        let mut output: OutputCollection =
            self.readings.iter().map(|r| OutputEntry::metric(&r.channel)).collect();
        if let Some(path) = &self.written {
            output.append(OutputEntry::file(path));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collector::Collector, output::OutputKind, target::testing::FakeConnection};

    fn collector(conn: &FakeConnection) -> Collector<CounterCollector> {
        let target = Arc::new(Target::local("board").with_connection(conn.clone()));
        Collector::new(
            CounterCollector::new(target)
                .with_channel("cpu", "/sys/energy/cpu")
                .with_channel("gpu", "/sys/energy/gpu"),
        )
    }

    #[test]
    fn test_counter_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let conn = FakeConnection::new()
            .with_output("cat /sys/energy/cpu", "100\n")
            .with_output("cat /sys/energy/cpu", "350\n")
            .with_output("cat /sys/energy/gpu", "7\n")
            .with_output("cat /sys/energy/gpu", "9\n");
        let mut collector = collector(&conn);
        collector.set_output(dir.path());

        collector.capture(|_| Ok::<_, std::io::Error>(())).unwrap();

        let readings = collector.backend().readings();
        assert_eq!(readings.len(), 2);
        assert_eq!((readings[0].channel.as_str(), readings[0].delta), ("cpu", 250));
        assert_eq!((readings[1].channel.as_str(), readings[1].delta), ("gpu", 2));

        let data = collector.get_data().unwrap();
        let kinds: Vec<_> = data.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![OutputKind::Metric, OutputKind::Metric, OutputKind::File]);
        assert_eq!(data[0].value(), "cpu");
        assert_eq!(data[2].path(), Some(dir.path().join(COUNTERS_FILE).as_path()));

        let saved: Vec<CounterReading> =
            serde_json::from_slice(&fs::read(dir.path().join(COUNTERS_FILE)).unwrap()).unwrap();
        assert_eq!(saved, readings);
    }

    #[test]
    fn test_counter_wraps_on_overflow() {
        let conn = FakeConnection::new()
            .with_output("cat /sys/energy/cpu", &format!("{}", u64::MAX - 1))
            .with_output("cat /sys/energy/cpu", "3")
            .with_output("cat /sys/energy/gpu", "0");
        let mut collector = collector(&conn);

        collector.capture(|_| Ok::<_, std::io::Error>(())).unwrap();

        assert_eq!(collector.backend().readings()[0].delta, 5);
        assert_eq!(collector.backend().readings()[1].delta, 0);
        // no output path, metrics only
        assert_eq!(collector.get_data().unwrap().len(), 2);
    }

    #[test]
    fn test_counter_bad_reading() {
        let conn = FakeConnection::new()
            .with_output("cat /sys/energy/cpu", "n/a")
            .with_output("cat /sys/energy/gpu", "1");
        let mut collector = collector(&conn);
        let err = collector.start().unwrap_err();
        assert!(err.to_string().contains("channel 'cpu' read 'n/a'"));
    }

    #[test]
    fn test_counter_missing_channel_is_target_error() {
        let conn = FakeConnection::new().with_output("cat /sys/energy/cpu", "1");
        let mut collector = collector(&conn);
        let err = collector.start().unwrap_err();
        assert!(matches!(err, CollectorError::Target(ref e) if e.is_transient()));
    }
}
