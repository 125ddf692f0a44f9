use std::sync::Arc;

use anyhow::Result;
use devcollect::{
    Backend, Collector,
    collector::{CounterCollector, PullCollector, TraceCollector},
    manifest,
    target::{LocalConnection, Target},
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let out = std::env::temp_dir().join("devcollect-demo");
    let logs = out.join("source-logs");
    std::fs::create_dir_all(&logs)?;
    std::fs::write(logs.join("boot.log"), "booted\n")?;

    let target = Arc::new(Target::local("host").with_connection(LocalConnection::new()));
    let mut collectors: Vec<Collector<Box<dyn Backend>>> = vec![
        Collector::new(Box::new(TraceCollector::new(
            target.clone(),
            "while true; do date +%s.%N; sleep 0.1; done",
        ))),
        Collector::new(Box::new(PullCollector::new(target.clone(), logs.display().to_string()))),
        Collector::new(Box::new(
            CounterCollector::new(target).with_channel("last_pid", "/proc/sys/kernel/ns_last_pid"),
        )),
    ];

    for collector in &mut collectors {
        let dir = out.join(collector.name());
        std::fs::create_dir_all(&dir)?;
        collector.set_output(dir);
        collector.reset()?;
        collector.start()?;
    }

    // the workload
    for i in 0..5 {
        std::process::Command::new("true").status()?;
        tracing::info!(i, "workload step");
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    for collector in collectors.iter_mut().rev() {
        collector.stop()?;
    }

    for collector in &collectors {
        let entries = collector.get_data()?;
        for entry in &entries {
            println!("{:>10}: {entry:?}", collector.name());
        }
        let path = manifest::save(&out, collector.name(), collector.output_path(), &entries)?;
        println!("{:>10}: manifest {}", collector.name(), path.display());
    }

    Ok(())
}
