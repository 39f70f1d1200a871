//! Logical column declarations and schema-version aliases.
//!
//! A [`ColumnSpec`] names a column the analysis wants, its logical type, and
//! the physical representations it may be stored under. Each [`Candidate`]
//! applies to a half-open window of schema versions `since <= v < until`.
//! Candidates are tried newest-first; the first one that applies, exists in
//! the source, and converts to the logical type wins.

use serde::{Deserialize, Serialize};

use nl_core::{LeafType, PhysicalType, SchemaVersion, StreamKind};

/// One physical representation of a logical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Physical column name in the source.
    pub physical: String,
    /// Required physical type; any type convertible to the logical type when `None`.
    #[serde(default, rename = "type")]
    pub physical_type: Option<PhysicalType>,
    /// First schema version this representation applies to.
    #[serde(default)]
    pub since: SchemaVersion,
    /// First schema version this representation no longer applies to.
    #[serde(default)]
    pub until: Option<SchemaVersion>,
}

impl Candidate {
    /// Candidate valid for every schema version.
    pub fn new(physical: impl Into<String>) -> Self {
        Self { physical: physical.into(), physical_type: None, since: SchemaVersion::UNKNOWN, until: None }
    }

    /// Restrict to versions `>= version`.
    pub fn since(mut self, version: SchemaVersion) -> Self {
        self.since = version;
        self
    }

    /// Restrict to versions `< version`.
    pub fn until(mut self, version: SchemaVersion) -> Self {
        self.until = Some(version);
        self
    }

    /// Require an exact physical type.
    pub fn with_type(mut self, ty: PhysicalType) -> Self {
        self.physical_type = Some(ty);
        self
    }

    /// Whether this representation is valid for `version`.
    pub fn applies_to(&self, version: SchemaVersion) -> bool {
        version >= self.since && self.until.is_none_or(|until| version < until)
    }
}

/// Declaration of one logical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Logical name used by the analysis.
    pub name: String,
    /// Stream the column lives on.
    pub stream: StreamKind,
    /// Logical type handed to the analysis.
    #[serde(rename = "type")]
    pub logical: PhysicalType,
    /// Skip instead of failing when no candidate resolves.
    #[serde(default)]
    pub optional: bool,
    /// Physical representations. Empty means "the logical name, any version".
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl ColumnSpec {
    /// Spec whose only representation is its own name.
    pub fn new(name: impl Into<String>, stream: StreamKind, logical: PhysicalType) -> Self {
        Self { name: name.into(), stream, logical, optional: false, candidates: Vec::new() }
    }

    /// Mark the column optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Add a physical representation.
    pub fn candidate(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Candidates ordered by `since`, newest first. Ties keep declaration order.
    pub fn candidates_newest_first(&self) -> Vec<Candidate> {
        if self.candidates.is_empty() {
            return vec![Candidate::new(self.name.clone())];
        }
        let mut out = self.candidates.clone();
        out.sort_by(|a, b| b.since.cmp(&a.since));
        out
    }
}

/// Set of logical column declarations, unique per `(stream, name)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnCatalog {
    specs: Vec<ColumnSpec>,
}

const U32: PhysicalType = PhysicalType::scalar(LeafType::U32);
const U64: PhysicalType = PhysicalType::scalar(LeafType::U64);
const I32: PhysicalType = PhysicalType::scalar(LeafType::I32);
const F32: PhysicalType = PhysicalType::scalar(LeafType::F32);
const VF32: PhysicalType = PhysicalType::jagged(LeafType::F32);
const VI32: PhysicalType = PhysicalType::jagged(LeafType::I32);
const VBOOL: PhysicalType = PhysicalType::jagged(LeafType::Bool);
const VSTR: PhysicalType = PhysicalType::jagged(LeafType::Str);

/// `(name, logical type, optional)`
type Row = (&'static str, PhysicalType, bool);

const EVENT_KEYS: &[Row] = &[
    ("eventNumber", U64, false),
    ("runNumber", U32, false),
    ("randomRunNumber", U32, true),
    ("mcChannelNumber", U32, true),
];

const OBJECT_KINEMATICS: &[Row] = &[
    ("el_pt", VF32, false),
    ("el_eta", VF32, false),
    ("el_phi", VF32, false),
    ("el_e", VF32, false),
    ("el_charge", VF32, false),
    ("mu_pt", VF32, false),
    ("mu_eta", VF32, false),
    ("mu_phi", VF32, false),
    ("mu_e", VF32, false),
    ("mu_charge", VF32, false),
    ("jet_pt", VF32, false),
    ("jet_eta", VF32, false),
    ("jet_phi", VF32, false),
    ("jet_e", VF32, false),
    ("met_met", F32, false),
    ("met_phi", F32, false),
    ("weight_mc", F32, true),
];

const RECO_ONLY: &[Row] = &[
    ("mu", F32, true),
    ("weight_pileup", F32, true),
    ("weight_leptonSF", F32, true),
    ("weight_jvt", F32, true),
    ("weight_bTagSF_MV2c10_77", F32, true),
    ("jet_isbtagged_MV2c10_77", VBOOL, true),
    ("el_true_pdg", VI32, true),
    ("mu_true_pdg", VI32, true),
];

const TRUTH: &[Row] = &[
    ("eventNumber", U64, false),
    ("runNumber", U32, false),
    ("weight_mc", F32, true),
    ("MC_t_afterFSR_pt", F32, true),
    ("MC_t_afterFSR_eta", F32, true),
    ("MC_t_afterFSR_phi", F32, true),
    ("MC_t_afterFSR_m", F32, true),
    ("MC_tbar_afterFSR_pt", F32, true),
    ("MC_tbar_afterFSR_eta", F32, true),
    ("MC_tbar_afterFSR_phi", F32, true),
    ("MC_tbar_afterFSR_m", F32, true),
];

const WEIGHTS: &[Row] = &[
    ("dsid", I32, false),
    ("totalEventsWeighted", F32, true),
    ("totalEvents", U64, true),
    ("totalEventsWeighted_mc_generator_weights", VF32, true),
    ("names_mc_generator_weights", VSTR, true),
];

/// Per-object flags whose storage changed at [`SchemaVersion::BYTE_FLAGS`].
pub const BYTE_FLAG_COLUMNS: &[&str] = &["el_trigMatch", "el_tight", "mu_trigMatch", "mu_tight"];

/// Suffix of the pre-[`SchemaVersion::BYTE_FLAGS`] flag columns.
pub const LEGACY_FLAG_SUFFIX: &str = "_old";

impl ColumnCatalog {
    /// Empty catalog: every name binds to itself.
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard ntuple layout for all four streams, including the
    /// byte-encoded / packed-bool flag aliases.
    pub fn default_ntuple() -> Self {
        let mut cat = Self::new();
        let rows = |cat: &mut Self, stream: StreamKind, rows: &[Row]| {
            for &(name, ty, optional) in rows {
                let mut spec = ColumnSpec::new(name, stream, ty);
                spec.optional = optional;
                cat.insert(spec);
            }
        };
        rows(&mut cat, StreamKind::Reco, EVENT_KEYS);
        rows(&mut cat, StreamKind::Reco, OBJECT_KINEMATICS);
        rows(&mut cat, StreamKind::Reco, RECO_ONLY);
        rows(&mut cat, StreamKind::Particle, EVENT_KEYS);
        rows(&mut cat, StreamKind::Particle, OBJECT_KINEMATICS);
        rows(&mut cat, StreamKind::Truth, TRUTH);
        rows(&mut cat, StreamKind::Weights, WEIGHTS);
        for flag in BYTE_FLAG_COLUMNS {
            cat.insert(Self::byte_flag(flag));
        }
        cat
    }

    /// Spec for one per-object flag: byte-encoded (`vec<i8>` or `vec<u8>`)
    /// under its own name from [`SchemaVersion::BYTE_FLAGS`], packed booleans
    /// under `<name>_old` before.
    pub fn byte_flag(name: &str) -> ColumnSpec {
        ColumnSpec::new(name, StreamKind::Reco, VBOOL)
            .candidate(Candidate::new(name).since(SchemaVersion::BYTE_FLAGS))
            .candidate(
                Candidate::new(format!("{name}{LEGACY_FLAG_SUFFIX}"))
                    .until(SchemaVersion::BYTE_FLAGS)
                    .with_type(VBOOL),
            )
    }

    /// Add `spec`, replacing any spec with the same stream and name.
    pub fn insert(&mut self, spec: ColumnSpec) {
        match self.specs.iter_mut().find(|s| s.stream == spec.stream && s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, spec: ColumnSpec) -> Self {
        self.insert(spec);
        self
    }

    /// Look up a spec.
    pub fn get(&self, stream: StreamKind, name: &str) -> Option<&ColumnSpec> {
        self.specs.iter().find(|s| s.stream == stream && s.name == name)
    }

    /// Specs for one stream, in declaration order.
    pub fn for_stream(&self, stream: StreamKind) -> impl Iterator<Item = &ColumnSpec> + '_ {
        self.specs.iter().filter(move |s| s.stream == stream)
    }

    /// All specs.
    pub fn iter(&self) -> impl Iterator<Item = &ColumnSpec> + '_ {
        self.specs.iter()
    }

    /// Number of specs.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// `true` if there are no specs.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Extend<ColumnSpec> for ColumnCatalog {
    fn extend<I: IntoIterator<Item = ColumnSpec>>(&mut self, iter: I) {
        for spec in iter {
            self.insert(spec);
        }
    }
}
