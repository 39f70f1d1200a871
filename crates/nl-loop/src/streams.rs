//! The set of streams a job runs over.

use nl_core::{Error, Result, StreamKind};
use nl_io::RecordStream;

/// Up to one open stream per [`StreamKind`]. Absent streams are `None`.
#[derive(Debug, Default)]
pub struct StreamSet {
    reco: Option<RecordStream>,
    weights: Option<RecordStream>,
    particle: Option<RecordStream>,
    truth: Option<RecordStream>,
}

pub(crate) struct LoopStreams<'a> {
    pub reco: Option<&'a mut RecordStream>,
    pub particle: Option<&'a mut RecordStream>,
    pub truth: Option<&'a mut RecordStream>,
}

impl StreamSet {
    /// No streams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `stream` under its own kind.
    pub fn with(mut self, stream: RecordStream) -> Self {
        self.insert(stream);
        self
    }

    /// Add `stream` under its own kind, returning the stream it replaces.
    pub fn insert(&mut self, stream: RecordStream) -> Option<RecordStream> {
        self.slot_mut(stream.kind()).replace(stream)
    }

    /// Remove and return a stream.
    pub fn take(&mut self, kind: StreamKind) -> Option<RecordStream> {
        self.slot_mut(kind).take()
    }

    /// Stream of `kind`, if open.
    pub fn get(&self, kind: StreamKind) -> Option<&RecordStream> {
        match kind {
            StreamKind::Reco => self.reco.as_ref(),
            StreamKind::Weights => self.weights.as_ref(),
            StreamKind::Particle => self.particle.as_ref(),
            StreamKind::Truth => self.truth.as_ref(),
        }
    }

    /// Mutable stream of `kind`, if open.
    pub fn get_mut(&mut self, kind: StreamKind) -> Option<&mut RecordStream> {
        self.slot_mut(kind).as_mut()
    }

    /// Mutable stream of `kind`, or a configuration error naming what needed it.
    pub fn require_mut(&mut self, kind: StreamKind, needed_by: &str) -> Result<&mut RecordStream> {
        self.get_mut(kind)
            .ok_or_else(|| Error::Configuration(format!("{needed_by} needs a {kind} stream, none is open")))
    }

    /// Whether a stream of `kind` is open.
    pub fn contains(&self, kind: StreamKind) -> bool {
        self.get(kind).is_some()
    }

    /// Kinds of the open streams, in canonical order.
    pub fn kinds(&self) -> Vec<StreamKind> {
        StreamKind::ALL.into_iter().filter(|k| self.contains(*k)).collect()
    }

    pub(crate) fn loop_streams(&mut self) -> LoopStreams<'_> {
        LoopStreams {
            reco: self.reco.as_mut(),
            particle: self.particle.as_mut(),
            truth: self.truth.as_mut(),
        }
    }

    fn slot_mut(&mut self, kind: StreamKind) -> &mut Option<RecordStream> {
        match kind {
            StreamKind::Reco => &mut self.reco,
            StreamKind::Weights => &mut self.weights,
            StreamKind::Particle => &mut self.particle,
            StreamKind::Truth => &mut self.truth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nl_core::SchemaVersion;
    use nl_io::MemorySource;

    fn stream(kind: StreamKind) -> RecordStream {
        let src = MemorySource::builder(kind.as_str(), SchemaVersion::UNKNOWN)
            .column("eventNumber", vec![1u64])
            .build()
            .unwrap();
        RecordStream::open(kind, Box::new(src))
    }

    #[test]
    fn streams_are_filed_by_kind() {
        let mut set = StreamSet::new().with(stream(StreamKind::Truth)).with(stream(StreamKind::Reco));
        assert_eq!(set.kinds(), vec![StreamKind::Reco, StreamKind::Truth]);
        assert!(set.insert(stream(StreamKind::Reco)).is_some());
        assert!(set.require_mut(StreamKind::Particle, "particle_all").is_err());
        assert!(set.take(StreamKind::Truth).is_some());
        assert!(!set.contains(StreamKind::Truth));
    }
}
