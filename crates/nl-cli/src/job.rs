//! `ntloop run` job configuration.
//!
//! Relative paths are resolved against the directory of the config file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use nl_core::{KeyColumns, LoopMode, SchemaVersion, StreamKind};
use nl_io::{ColumnCatalog, ColumnSpec, ParquetSource, RecordStream};
use nl_loop::StreamSet;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Reco ntuple (Parquet).
    pub reco: PathBuf,
    /// Sum-of-weights ntuple.
    #[serde(default)]
    pub weights: Option<PathBuf>,
    /// Particle-level ntuple.
    #[serde(default)]
    pub particle: Option<PathBuf>,
    /// Truth ntuple, positionally aligned with `particle`.
    #[serde(default)]
    pub truth: Option<PathBuf>,

    #[serde(default)]
    pub loop_mode: LoopMode,

    #[serde(default = "default_true")]
    pub progress: bool,
    #[serde(default = "default_progress_step")]
    pub progress_step_percent: u32,

    /// Overrides the version tag stored in every input file.
    #[serde(default)]
    pub schema_version: Option<SchemaVersion>,

    /// Key events by `randomRunNumber` instead of `runNumber`.
    #[serde(default)]
    pub use_random_run_number: bool,

    /// Extra column declarations (YAML/JSON list), merged over the default catalog.
    #[serde(default)]
    pub columns: Option<PathBuf>,

    /// JSON summary destination. Defaults to stdout.
    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_progress_step() -> u32 {
    10
}

fn from_slice<T: serde::de::DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let value = if ext == "json" {
        serde_json::from_slice(bytes).with_context(|| format!("invalid JSON in {}", path.display()))?
    } else {
        // Default: YAML (serde_yaml_ng).
        serde_yaml_ng::from_slice(bytes).with_context(|| format!("invalid YAML in {}", path.display()))?
    };
    Ok(value)
}

pub fn read_job_config(path: &Path) -> Result<JobConfig> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut cfg: JobConfig = from_slice(path, &bytes)?;
    cfg.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(cfg)
}

impl JobConfig {
    pub fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() { p.to_path_buf() } else { self.base_dir.join(p) }
    }

    pub fn key_columns(&self) -> KeyColumns {
        if self.use_random_run_number {
            KeyColumns::default().with_random_run_number()
        } else {
            KeyColumns::default()
        }
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.output.as_deref().map(|p| self.resolve(p))
    }

    /// Open every configured stream.
    pub fn open_streams(&self) -> Result<StreamSet> {
        let inputs = [
            (StreamKind::Reco, Some(&self.reco)),
            (StreamKind::Weights, self.weights.as_ref()),
            (StreamKind::Particle, self.particle.as_ref()),
            (StreamKind::Truth, self.truth.as_ref()),
        ];
        let mut streams = StreamSet::new();
        for (kind, path) in inputs {
            if let Some(path) = path {
                streams.insert(open_stream(kind, &self.resolve(path), self.schema_version, self.key_columns())?);
            }
        }
        Ok(streams)
    }

    /// Default catalog plus the declarations from `columns`.
    pub fn catalog(&self) -> Result<ColumnCatalog> {
        let mut catalog = ColumnCatalog::default_ntuple();
        if let Some(p) = &self.columns {
            let path = self.resolve(p);
            let bytes = std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let extra: Vec<ColumnSpec> = from_slice(&path, &bytes)?;
            tracing::info!(columns = extra.len(), file = %path.display(), "extra column declarations loaded");
            catalog.extend(extra);
        }
        Ok(catalog)
    }
}

pub fn open_stream(
    kind: StreamKind,
    path: &Path,
    schema_version: Option<SchemaVersion>,
    keys: KeyColumns,
) -> Result<RecordStream> {
    let mut source =
        ParquetSource::open(path).with_context(|| format!("failed to open {kind} input {}", path.display()))?;
    if let Some(v) = schema_version {
        source = source.with_schema_version(v);
    }
    Ok(RecordStream::open(kind, Box::new(source)).with_key_columns(keys))
}
