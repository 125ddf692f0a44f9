//! Data collectors for device test harnesses.
//!
//! This crate provides the pieces a harness needs to capture artifacts from a device
//! under test while a workload runs on it: traces, pulled log directories and sampled
//! counters. Every collector follows one lifecycle, so a harness can drive any number
//! of them the same way and gather their results as a uniform, typed list.
//!
//! ## Features
//!
//! - **Enforced lifecycle**: `reset → start → stop → get_data`, with misuse reported as errors.
//! - **Scoped capture**: a collector is always stopped, even when the workload fails or panics.
//! - **Typed output**: every result is a file, a directory or a named metric.
//! - **Targets**: run commands on the local host or on a provisioned cloud instance.
//!
//! ## Example
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//!
//! use devcollect::{
//!     collector::{Collector, CounterCollector},
//!     manifest,
//!     target::{LocalConnection, Target},
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let target = Arc::new(Target::local("host").with_connection(LocalConnection::new()));
//!     let mut collector = Collector::new(
//!         CounterCollector::new(target).with_channel("last_pid", "/proc/sys/kernel/ns_last_pid"),
//!     );
//!     collector.set_output("target/run");
//!
//!     collector.capture(|_| {
//!         // run the workload here
//!         Ok::<_, std::io::Error>(())
//!     })?;
//!
//!     let entries = collector.get_data()?;
//!     manifest::save(Path::new("target/run"), collector.name(), collector.output_path(), &entries)?;
//!     Ok(())
//! }
//! ```
#![deny(missing_docs)]

pub mod collector;
pub mod error;
pub mod manifest;
pub mod output;
pub mod provision;
pub mod target;

pub use crate::{
    collector::{Backend, Capture, Collector, CollectorState},
    error::{CaptureError, CollectorError, CollectorResult, TargetError},
    output::{OutputCollection, OutputEntry, OutputKind},
    target::Target,
};
