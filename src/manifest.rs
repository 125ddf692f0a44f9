//! Persisted description of a collector's output.
//!
//! A manifest records what one collector produced so downstream tooling can pick up
//! results after the harness exits. Manifests are written to `<dir>/<collector>.json`.
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ManifestError, ManifestResult},
    output::OutputCollection,
};

/// Current manifest schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// The output of one collector run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version of this manifest.
    pub schema_version: u32,
    /// Name of the collector that produced the entries.
    pub collector: String,
    /// When the manifest was written.
    pub created_at: DateTime<Utc>,
    /// The output path the collector was started with.
    pub output_path: Option<PathBuf>,
    /// Collected entries, in collection order.
    pub entries: OutputCollection,
}

/// Path of the manifest for `collector` under `dir`.
pub fn manifest_path(dir: &Path, collector: &str) -> PathBuf {
    dir.join(format!("{collector}.json"))
}

/// Save `entries` as the manifest for `collector`.
///
/// Uses atomic write (write-to-temp-then-rename) so readers never see a partial file.
pub fn save(
    dir: &Path,
    collector: &str,
    output_path: Option<&Path>,
    entries: &OutputCollection,
) -> ManifestResult<PathBuf> {
    fs::create_dir_all(dir)
        .map_err(|e| ManifestError::CreateDir { dir: dir.to_path_buf(), source: e })?;

    let manifest = Manifest {
        schema_version: SCHEMA_VERSION,
        collector: collector.to_string(),
        created_at: Utc::now(),
        output_path: output_path.map(Path::to_path_buf),
        entries: entries.clone(),
    };

    let path = manifest_path(dir, collector);
    let temp_path = dir.join(format!("{collector}.json.tmp"));

    {
        macro_rules! map_err {
            ($expr:expr, $variant:ident) => {
                $expr.map_err(|e| ManifestError::$variant { path: temp_path.clone(), source: e })?
            };
        }

        let file = map_err!(File::create(&temp_path), CreateTemp);
        let mut writer = BufWriter::new(file);
        map_err!(serde_json::to_writer_pretty(&mut writer, &manifest), Serialize);
        map_err!(writer.flush(), Flush);
        map_err!(writer.get_ref().sync_all(), Sync);
    }

    fs::rename(&temp_path, &path).map_err(|e| ManifestError::Rename {
        from: temp_path,
        to: path.clone(),
        source: e,
    })?;

    #[cfg(feature = "tracing")]
    tracing::debug!(collector, path = %path.display(), entries = entries.len(), "manifest saved");
    Ok(path)
}

/// Load a manifest from a file path.
pub fn load(path: &Path) -> ManifestResult<Manifest> {
    let file =
        File::open(path).map_err(|e| ManifestError::Open { path: path.to_path_buf(), source: e })?;
    let manifest: Manifest = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| ManifestError::Parse { path: path.to_path_buf(), source: e })?;

    #[cfg(feature = "tracing")]
    if manifest.schema_version > SCHEMA_VERSION {
        tracing::warn!(
            version = manifest.schema_version,
            "manifest was written with a newer schema version, attempting best-effort parsing"
        );
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{OutputEntry, OutputKind};

    fn entries() -> OutputCollection {
        [
            OutputEntry::file("/tmp/run/trace.txt"),
            OutputEntry::metric("cpu"),
            OutputEntry::directory("/tmp/run/logs"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let entries = entries();

        let path = save(dir.path(), "trace", Some(Path::new("/tmp/run")), &entries).unwrap();
        assert_eq!(path, dir.path().join("trace.json"));
        assert!(!dir.path().join("trace.json.tmp").exists());

        let manifest = load(&path).unwrap();
        assert_eq!(manifest.schema_version, SCHEMA_VERSION);
        assert_eq!(manifest.collector, "trace");
        assert_eq!(manifest.output_path.as_deref(), Some(Path::new("/tmp/run")));
        assert_eq!(manifest.entries, entries);
        let kinds: Vec<_> = manifest.entries.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, [OutputKind::File, OutputKind::Metric, OutputKind::Directory]);
    }

    #[test]
    fn test_save_creates_directory_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");

        save(&nested, "pull", None, &entries()).unwrap();
        let path = save(&nested, "pull", None, &OutputCollection::new()).unwrap();

        let manifest = load(&path).unwrap();
        assert!(manifest.entries.is_empty());
        assert!(manifest.output_path.is_none());
    }

    #[test]
    fn test_load_errors_carry_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = load(&missing).unwrap_err();
        assert!(matches!(err, ManifestError::Open { ref path, .. } if path == &missing));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, r#"{"schema_version":1,"collector":"x","created_at":"2024-01-01T00:00:00Z","output_path":null,"entries":[{"value":"a","kind":"socket"}]}"#).unwrap();
        let err = load(&bad).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
        assert!(err.to_string().contains("bad.json"));
    }
}
