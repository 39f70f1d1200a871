//! Event loop driver.
//!
//! [`drive`] walks the streams once according to a [`LoopMode`] and calls
//! the per-event callback exactly once per visited position. [`Job`] wraps it
//! with mode validation, weights aggregation, the correspondence pre-pass and
//! the [`Algorithm`] lifecycle.

use serde::Serialize;

use nl_core::{Error, EventStatus, LoopMode, Result, StreamKind};
use nl_io::ColumnBinder;

use crate::algorithm::{Algorithm, EventContext, FinishContext, InitContext};
use crate::progress::Progress;
use crate::streams::{LoopStreams, StreamSet};
use crate::sync::{CorrespondenceTable, TableSummary};
use crate::weights::WeightsSummary;

/// Outcome of a successful [`Job::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Mode the job was configured with.
    pub requested_mode: LoopMode,
    /// Mode that actually ran.
    pub mode: LoopMode,
    /// Logical events visited; the callback ran once for each.
    pub events: u64,
    /// Correspondence table sizes, for table-driven modes.
    pub table: Option<TableSummary>,
    /// Weights aggregate, when a weights stream was open.
    pub weights: Option<WeightsSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Visit {
    reco: Option<u64>,
    particle: Option<u64>,
}

/// Every position `0..n` of the driving stream, with the companion taken from
/// `pairs` when it pairs with that position. `pairs` must be ascending in
/// both coordinates.
fn with_companions(n: u64, pairs: &[(u64, u64)], by_particle: bool) -> impl Iterator<Item = Visit> + '_ {
    let mut pairs = pairs.iter().peekable();
    (0..n).map(move |pos| {
        let companion = pairs
            .next_if(|&&(r, p)| if by_particle { p == pos } else { r == pos })
            .map(|&(r, p)| if by_particle { r } else { p });
        if by_particle {
            Visit { reco: companion, particle: Some(pos) }
        } else {
            Visit { reco: Some(pos), particle: companion }
        }
    })
}

type Visits<'t> = Box<dyn Iterator<Item = Visit> + 't>;

fn plan<'t>(
    mode: LoopMode,
    n_reco: u64,
    n_particle: u64,
    table: Option<&'t CorrespondenceTable>,
) -> Result<(u64, Visits<'t>)> {
    let need_table = || {
        table.ok_or_else(|| Error::Configuration(format!("loop mode {mode} needs a correspondence table")))
    };
    Ok(match mode {
        LoopMode::RecoOnly => {
            (n_reco, Box::new((0..n_reco).map(|r| Visit { reco: Some(r), particle: None })) as Visits<'t>)
        }
        LoopMode::ParticleOnly => (
            n_particle,
            Box::new((0..n_particle).map(|p| Visit { reco: None, particle: Some(p) })) as Visits<'t>,
        ),
        LoopMode::RecoStandard => {
            (n_reco, Box::new(with_companions(n_reco, need_table()?.paired(), false)) as Visits<'t>)
        }
        LoopMode::ParticleAll => {
            (n_particle, Box::new(with_companions(n_particle, need_table()?.paired(), true)) as Visits<'t>)
        }
        LoopMode::RecoWithParticle => {
            let paired = need_table()?.paired();
            let visits = paired.iter().map(|&(r, p)| Visit { reco: Some(r), particle: Some(p) });
            (paired.len() as u64, Box::new(visits) as Visits<'t>)
        }
    })
}

/// Run one pass over `streams` in `mode`, calling `callback` once per
/// logical event. Returns the number of events visited.
///
/// Table-driven modes (`reco_standard`, `reco_with_particle`,
/// `particle_all`) need `table`, built from these same streams. The truth
/// stream, when open, follows the particle cursor.
pub fn drive<F>(
    mode: LoopMode,
    streams: &mut StreamSet,
    table: Option<&CorrespondenceTable>,
    progress: &mut Progress,
    callback: F,
) -> Result<u64>
where
    F: FnMut(&EventContext<'_>) -> Result<EventStatus>,
{
    drive_with(mode, streams, table, None, progress, "callback", callback)
}

fn drive_with<F>(
    mode: LoopMode,
    streams: &mut StreamSet,
    table: Option<&CorrespondenceTable>,
    weights: Option<&WeightsSummary>,
    progress: &mut Progress,
    label: &str,
    mut callback: F,
) -> Result<u64>
where
    F: FnMut(&EventContext<'_>) -> Result<EventStatus>,
{
    let LoopStreams { mut reco, mut particle, truth } = streams.loop_streams();
    if mode.requires_reco() && reco.is_none() {
        return Err(Error::Configuration(format!("loop mode {mode} needs a reco stream")));
    }
    if (mode.requires_particle() || mode.requires_correspondence()) && particle.is_none() {
        return Err(Error::Configuration(format!("loop mode {mode} needs a particle stream")));
    }

    let n_reco = reco.as_deref().map_or(0, |s| s.length());
    let n_particle = particle.as_deref().map_or(0, |s| s.length());

    let table = if mode.requires_correspondence() { table } else { None };
    if let Some(t) = table {
        if t.n_reco() != n_reco || t.n_particle() != n_particle {
            return Err(Error::CorrelationInconsistency(format!(
                "table built for {} reco / {} particle records, streams have {} / {}",
                t.n_reco(),
                t.n_particle(),
                n_reco,
                n_particle
            )));
        }
        t.check_visitation_order()?;
    }

    let mut truth = if mode == LoopMode::RecoOnly {
        if truth.is_some() {
            tracing::debug!("truth stream not used in reco_only mode");
        }
        None
    } else {
        truth
    };
    if let Some(t) = truth.as_deref() {
        if t.length() < n_particle {
            return Err(Error::Configuration(format!(
                "truth stream has {} records, particle stream has {}",
                t.length(),
                n_particle
            )));
        }
    }

    let (total, visits) = plan(mode, n_reco, n_particle, table)?;
    progress.reset(total);
    tracing::debug!(%mode, total, "event loop started");

    let mut events = 0u64;
    for visit in visits {
        if let (Some(pos), Some(s)) = (visit.reco, reco.as_deref_mut()) {
            s.advance_to(pos)?;
        }
        if let Some(pos) = visit.particle {
            if let Some(s) = particle.as_deref_mut() {
                s.advance_to(pos)?;
            }
            if let Some(t) = truth.as_deref_mut() {
                t.advance_to(pos)?;
            }
        }

        let ctx = EventContext::new(
            events,
            visit.reco.and(reco.as_deref()),
            visit.particle.and(particle.as_deref()),
            visit.particle.and(truth.as_deref()),
            weights,
        );
        if callback(&ctx)? == EventStatus::Fail {
            return Err(Error::CallbackFailure { event: events, reason: format!("{label} returned Fail") });
        }
        events += 1;
        progress.update(events);
    }
    Ok(events)
}

/// Event loop configuration.
///
/// ```
/// use nl_core::LoopMode;
/// use nl_loop::Job;
///
/// let job = Job::new().loop_mode(LoopMode::ParticleAll).progress(false);
/// assert_eq!(job.mode(), LoopMode::ParticleAll);
/// ```
#[derive(Debug, Clone)]
pub struct Job {
    mode: LoopMode,
    progress: bool,
    progress_step: u32,
}

impl Default for Job {
    fn default() -> Self {
        Self { mode: LoopMode::default(), progress: true, progress_step: 10 }
    }
}

impl Job {
    /// `reco_standard`, progress every 10%.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the loop mode.
    pub fn loop_mode(mut self, mode: LoopMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable progress logging.
    pub fn progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Log progress every `percent` percent.
    pub fn progress_step(mut self, percent: u32) -> Self {
        self.progress_step = percent;
        self
    }

    /// Configured loop mode.
    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    /// Mode that will run over `streams`.
    ///
    /// `reco_standard` without a particle stream runs as `reco_only`. Any
    /// other missing stream is a configuration error.
    pub fn effective_mode(&self, streams: &StreamSet) -> Result<LoopMode> {
        let mode = self.mode;
        if mode.requires_reco() && !streams.contains(StreamKind::Reco) {
            return Err(Error::Configuration(format!("loop mode {mode} needs a reco stream")));
        }
        if mode.requires_particle() && !streams.contains(StreamKind::Particle) {
            return Err(Error::Configuration(format!("loop mode {mode} needs a particle stream")));
        }
        if mode == LoopMode::RecoStandard && !streams.contains(StreamKind::Particle) {
            tracing::warn!("no particle stream open; {mode} runs as {}", LoopMode::RecoOnly);
            return Ok(LoopMode::RecoOnly);
        }
        Ok(mode)
    }

    /// Run `algorithm` over `streams`.
    ///
    /// Order: mode check, weights aggregation, [`Algorithm::init`],
    /// correspondence pre-pass, event loop, [`Algorithm::finish`]. Any error
    /// stops the run.
    pub fn run(
        &self,
        streams: &mut StreamSet,
        binder: &ColumnBinder,
        algorithm: &mut dyn Algorithm,
    ) -> Result<RunReport> {
        let mode = self.effective_mode(streams)?;
        let name = algorithm.name().to_string();
        tracing::info!(%mode, algorithm = %name, streams = ?streams.kinds(), "job starting");

        let weights = match streams.get_mut(StreamKind::Weights) {
            Some(w) => Some(WeightsSummary::aggregate(w, binder)?),
            None => None,
        };

        algorithm.init(&mut InitContext::new(streams, binder, mode, weights.as_ref()))?;

        let table = if mode.requires_correspondence() {
            let (Some(reco), Some(particle)) =
                (streams.get(StreamKind::Reco), streams.get(StreamKind::Particle))
            else {
                return Err(Error::Configuration(format!("loop mode {mode} needs reco and particle streams")));
            };
            Some(CorrespondenceTable::correlate(reco, particle)?)
        } else {
            None
        };

        let mut progress = if self.progress {
            Progress::new(format!("{name}/{mode}"), 0, self.progress_step)
        } else {
            Progress::disabled()
        };
        let events = drive_with(
            mode,
            streams,
            table.as_ref(),
            weights.as_ref(),
            &mut progress,
            &name,
            |ctx| algorithm.execute(ctx),
        )?;

        let report = RunReport {
            requested_mode: self.mode,
            mode,
            events,
            table: table.as_ref().map(CorrespondenceTable::summary),
            weights,
        };
        algorithm.finish(&FinishContext { report: &report })?;
        tracing::info!(%mode, events, algorithm = %name, "job finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visits(mode: LoopMode, n_reco: u64, n_particle: u64, table: Option<&CorrespondenceTable>) -> Vec<(Option<u64>, Option<u64>)> {
        let (total, it) = plan(mode, n_reco, n_particle, table).unwrap();
        let v: Vec<_> = it.map(|v| (v.reco, v.particle)).collect();
        assert_eq!(v.len() as u64, total);
        v
    }

    fn table() -> CorrespondenceTable {
        let k = |e: &[u64]| e.iter().map(|&e| nl_core::EventKey::new(1, e)).collect::<Vec<_>>();
        CorrespondenceTable::from_keys(&k(&[100, 101, 102]), &k(&[101, 103]))
    }

    #[test]
    fn reco_standard_exposes_companions() {
        let t = table();
        assert_eq!(
            visits(LoopMode::RecoStandard, 3, 2, Some(&t)),
            vec![(Some(0), None), (Some(1), Some(0)), (Some(2), None)]
        );
    }

    #[test]
    fn particle_all_exposes_reco_companions() {
        let t = table();
        assert_eq!(visits(LoopMode::ParticleAll, 3, 2, Some(&t)), vec![(Some(1), Some(0)), (None, Some(1))]);
    }

    #[test]
    fn reco_with_particle_visits_pairs_only() {
        let t = table();
        assert_eq!(visits(LoopMode::RecoWithParticle, 3, 2, Some(&t)), vec![(Some(1), Some(0))]);
    }

    #[test]
    fn single_stream_modes_need_no_table() {
        assert_eq!(visits(LoopMode::ParticleOnly, 0, 2, None), vec![(None, Some(0)), (None, Some(1))]);
        assert_eq!(visits(LoopMode::RecoOnly, 1, 0, None), vec![(Some(0), None)]);
        assert!(plan(LoopMode::ParticleAll, 1, 1, None).is_err());
    }
}
