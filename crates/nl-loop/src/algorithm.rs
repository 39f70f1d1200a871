//! User algorithm contract.
//!
//! An [`Algorithm`] binds its columns in [`init`](Algorithm::init), reads
//! them once per logical event in [`execute`](Algorithm::execute), and
//! summarizes in [`finish`](Algorithm::finish).

use std::cell::Ref;

use nl_core::{Error, ErrorKind, EventKey, EventStatus, FromValue, LoopMode, Result, SchemaVersion, StreamKind};
use nl_io::{AnyColumn, ColumnBinder, ColumnHandle, RecordStream};

use crate::driver::RunReport;
use crate::streams::StreamSet;
use crate::weights::WeightsSummary;

/// Per-event analysis logic driven by [`Job`](crate::Job).
pub trait Algorithm {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Bind columns. Runs once, before the correspondence pre-pass.
    fn init(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Process one logical event.
    fn execute(&mut self, ctx: &EventContext<'_>) -> Result<EventStatus>;

    /// Runs once after the last event.
    fn finish(&mut self, _ctx: &FinishContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Column binding surface handed to [`Algorithm::init`].
pub struct InitContext<'a> {
    streams: &'a mut StreamSet,
    binder: &'a ColumnBinder,
    mode: LoopMode,
    weights: Option<&'a WeightsSummary>,
}

impl<'a> InitContext<'a> {
    pub(crate) fn new(
        streams: &'a mut StreamSet,
        binder: &'a ColumnBinder,
        mode: LoopMode,
        weights: Option<&'a WeightsSummary>,
    ) -> Self {
        Self { streams, binder, mode, weights }
    }

    /// Loop mode that will actually run.
    pub fn loop_mode(&self) -> LoopMode {
        self.mode
    }

    /// Whether a stream of `kind` is open.
    pub fn has_stream(&self, kind: StreamKind) -> bool {
        self.streams.contains(kind)
    }

    /// Schema version of an open stream.
    pub fn schema_version(&self, kind: StreamKind) -> Option<SchemaVersion> {
        self.streams.get(kind).map(RecordStream::schema_version)
    }

    /// Aggregated weights stream, if one was open.
    pub fn weights(&self) -> Option<&WeightsSummary> {
        self.weights
    }

    /// Bind `name` on the `kind` stream.
    pub fn bind<T: FromValue>(&mut self, kind: StreamKind, name: &str) -> Result<ColumnHandle<T>> {
        let stream = self.streams.require_mut(kind, &format!("column '{name}'"))?;
        self.binder.bind(stream, name)
    }

    /// Like [`bind`](Self::bind), but `None` when the stream is not open or
    /// the column does not resolve.
    pub fn bind_optional<T: FromValue>(&mut self, kind: StreamKind, name: &str) -> Result<Option<ColumnHandle<T>>> {
        let Some(stream) = self.streams.get_mut(kind) else {
            return Ok(None);
        };
        match self.binder.bind(stream, name) {
            Ok(h) => Ok(Some(h)),
            Err(e) if e.kind() == ErrorKind::SchemaResolution => {
                tracing::debug!(stream = %kind, column = name, "optional column unavailable");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Bind every catalog column of every open event stream.
    ///
    /// The weights stream is skipped: it is consumed by the aggregate.
    pub fn bind_catalog(&mut self) -> Result<Vec<(StreamKind, String, AnyColumn)>> {
        let mut out = Vec::new();
        for kind in [StreamKind::Reco, StreamKind::Particle, StreamKind::Truth] {
            let Some(stream) = self.streams.get_mut(kind) else {
                tracing::debug!(stream = %kind, "stream not open, catalog entries skipped");
                continue;
            };
            for (name, col) in self.binder.bind_catalog(stream)? {
                out.push((kind, name, col));
            }
        }
        Ok(out)
    }
}

/// Read access to the records of the current logical event.
pub struct EventContext<'a> {
    index: u64,
    reco: Option<&'a RecordStream>,
    particle: Option<&'a RecordStream>,
    truth: Option<&'a RecordStream>,
    weights: Option<&'a WeightsSummary>,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(
        index: u64,
        reco: Option<&'a RecordStream>,
        particle: Option<&'a RecordStream>,
        truth: Option<&'a RecordStream>,
        weights: Option<&'a WeightsSummary>,
    ) -> Self {
        Self { index, reco, particle, truth, weights }
    }

    /// 0-based logical event counter.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Reco record of this event, if it has one.
    pub fn reco(&self) -> Option<&'a RecordStream> {
        self.reco
    }

    /// Particle record of this event, if it has one.
    pub fn particle(&self) -> Option<&'a RecordStream> {
        self.particle
    }

    /// Truth record following the particle record, if any.
    pub fn truth(&self) -> Option<&'a RecordStream> {
        self.truth
    }

    /// Aggregated weights stream, if one was open.
    pub fn weights(&self) -> Option<&'a WeightsSummary> {
        self.weights
    }

    /// Stream of `kind` positioned on this event, if any.
    pub fn stream(&self, kind: StreamKind) -> Option<&'a RecordStream> {
        match kind {
            StreamKind::Reco => self.reco,
            StreamKind::Particle => self.particle,
            StreamKind::Truth => self.truth,
            StreamKind::Weights => None,
        }
    }

    /// Whether this event has a record of `kind`.
    pub fn has(&self, kind: StreamKind) -> bool {
        self.stream(kind).is_some()
    }

    /// Borrow a bound column's value for this event.
    pub fn get<T: FromValue>(&self, handle: ColumnHandle<T>) -> Result<Ref<'a, T>> {
        self.require(handle.stream())?.get(handle)
    }

    /// Clone a bound column's value for this event.
    pub fn value<T: FromValue + Clone>(&self, handle: ColumnHandle<T>) -> Result<T> {
        self.require(handle.stream())?.value(handle)
    }

    /// Event key of this event's record of `kind`.
    pub fn key(&self, kind: StreamKind) -> Result<EventKey> {
        self.require(kind)?.current_key()
    }

    fn require(&self, kind: StreamKind) -> Result<&'a RecordStream> {
        self.stream(kind).ok_or_else(|| {
            Error::Configuration(format!("event {} has no {} record", self.index, kind))
        })
    }
}

/// Handed to [`Algorithm::finish`].
pub struct FinishContext<'a> {
    /// Summary of the loop that just ran.
    pub report: &'a RunReport,
}
