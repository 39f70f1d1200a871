//! Common data types for ntloop

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::column::{PhysicalType, Value};
use crate::error::{Error, Result};

/// Kind of record stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Detector-level reconstructed events.
    Reco,
    /// Per-sample normalization metadata.
    Weights,
    /// Generator-level (particle-level) events.
    Particle,
    /// Generator truth summary records.
    Truth,
}

impl StreamKind {
    /// All stream kinds, in canonical order.
    pub const ALL: [StreamKind; 4] =
        [StreamKind::Reco, StreamKind::Weights, StreamKind::Particle, StreamKind::Truth];

    /// Lowercase name used in logs and configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Reco => "reco",
            StreamKind::Weights => "weights",
            StreamKind::Particle => "particle",
            StreamKind::Truth => "truth",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reco" | "nominal" => Ok(StreamKind::Reco),
            "weights" | "sumweights" => Ok(StreamKind::Weights),
            "particle" | "particlelevel" => Ok(StreamKind::Particle),
            "truth" => Ok(StreamKind::Truth),
            other => Err(Error::Configuration(format!("unknown stream kind '{other}'"))),
        }
    }
}

/// Ordinal tag distinguishing which physical column representations a file uses.
///
/// Determined once when a source is opened and fixed for the lifetime of the job.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SchemaVersion(pub u32);

impl SchemaVersion {
    /// Files that carry no version tag.
    pub const UNKNOWN: SchemaVersion = SchemaVersion(0);

    /// First version that stores per-object flags as one byte per element
    /// instead of packed booleans.
    pub const BYTE_FLAGS: SchemaVersion = SchemaVersion(28);
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for SchemaVersion {
    type Err = Error;

    /// Accepts `"28"`, `"v28"` or `"V28"`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        digits
            .parse::<u32>()
            .map(SchemaVersion)
            .map_err(|_| Error::Configuration(format!("invalid schema version '{s}'")))
    }
}

/// Composite identifier of one logical physics event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    /// Run number (or random run number for systematic-variation samples).
    pub run_number: u32,
    /// Event number within the run.
    pub event_number: u64,
}

impl EventKey {
    /// Create a key.
    pub fn new(run_number: u32, event_number: u64) -> Self {
        Self { run_number, event_number }
    }

    /// Build a key from raw column values, widening where needed.
    pub fn from_values(run: Value, event: Value) -> Result<Self> {
        let run_number = match run.convert(PhysicalType::scalar(crate::LeafType::U32)) {
            Some(Value::U32(v)) => v,
            _ => return Err(Error::Source("run number column is not a u32-compatible scalar".into())),
        };
        let event_number = match event.convert(PhysicalType::scalar(crate::LeafType::U64)) {
            Some(Value::U64(v)) => v,
            _ => {
                return Err(Error::Source(
                    "event number column is not a u64-compatible scalar".into(),
                ));
            }
        };
        Ok(Self { run_number, event_number })
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.run_number, self.event_number)
    }
}

/// Names of the columns that make up an [`EventKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumns {
    /// Run number column.
    pub run_number: String,
    /// Event number column.
    pub event_number: String,
    /// When set, this column replaces `run_number` (systematic-variation samples).
    #[serde(default)]
    pub random_run_number: Option<String>,
}

impl Default for KeyColumns {
    fn default() -> Self {
        Self {
            run_number: "runNumber".into(),
            event_number: "eventNumber".into(),
            random_run_number: None,
        }
    }
}

impl KeyColumns {
    /// Use `randomRunNumber` in place of the run number.
    pub fn with_random_run_number(mut self) -> Self {
        self.random_run_number = Some("randomRunNumber".into());
        self
    }

    /// Column that supplies the run component of the key.
    pub fn run_column(&self) -> &str {
        self.random_run_number.as_deref().unwrap_or(&self.run_number)
    }
}

/// Which stream(s) the event loop iterates, and how they are paired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Reco positions only; no correspondence table.
    RecoOnly,
    /// Every reco position, exposing the particle companion when paired.
    #[default]
    RecoStandard,
    /// Only reco/particle pairs that share an event key.
    RecoWithParticle,
    /// Particle positions only; no correspondence table.
    ParticleOnly,
    /// Every particle position, exposing the reco companion when paired.
    ParticleAll,
}

impl LoopMode {
    /// Whether this mode iterates or consults the particle stream.
    pub fn requires_particle(self) -> bool {
        matches!(self, LoopMode::RecoWithParticle | LoopMode::ParticleOnly | LoopMode::ParticleAll)
    }

    /// Whether this mode needs a reco stream.
    pub fn requires_reco(self) -> bool {
        !matches!(self, LoopMode::ParticleOnly)
    }

    /// Whether a reco/particle correspondence table must be built first.
    pub fn requires_correspondence(self) -> bool {
        matches!(self, LoopMode::RecoStandard | LoopMode::RecoWithParticle | LoopMode::ParticleAll)
    }

    /// Snake-case name used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            LoopMode::RecoOnly => "reco_only",
            LoopMode::RecoStandard => "reco_standard",
            LoopMode::RecoWithParticle => "reco_with_particle",
            LoopMode::ParticleOnly => "particle_only",
            LoopMode::ParticleAll => "particle_all",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let norm: String =
            s.chars().filter(|c| *c != '_' && *c != '-').collect::<String>().to_ascii_lowercase();
        match norm.as_str() {
            "recoonly" => Ok(LoopMode::RecoOnly),
            "recostandard" => Ok(LoopMode::RecoStandard),
            "recowithparticle" => Ok(LoopMode::RecoWithParticle),
            "particleonly" => Ok(LoopMode::ParticleOnly),
            "particleall" => Ok(LoopMode::ParticleAll),
            _ => Err(Error::Configuration(format!("unknown loop mode '{s}'"))),
        }
    }
}

/// Result of one per-event callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Keep iterating.
    Continue,
    /// Stop the job; surfaces as [`Error::CallbackFailure`].
    Fail,
}
