use nl_core::{
    ErrorKind, EventKey, EventStatus, KeyColumns, LeafType, LoopMode, PhysicalType, Result, SchemaVersion,
    StreamKind,
};
use nl_io::{AnyColumn, ColumnBinder, ColumnCatalog, ColumnHandle, ColumnSpec, MemorySource, RecordStream};
use nl_loop::{
    Algorithm, CorrespondenceTable, EventContext, FinishContext, InitContext, Job, Progress, StreamSet, drive,
};
use proptest::prelude::*;

fn stream(kind: StreamKind, events: &[u64]) -> RecordStream {
    let src = MemorySource::builder(kind.as_str(), SchemaVersion(29))
        .column("eventNumber", events.to_vec())
        .column("runNumber", vec![1u32; events.len()])
        .column("met_met", events.iter().map(|&e| e as f32 * 10.0).collect::<Vec<_>>())
        .build()
        .unwrap();
    RecordStream::open(kind, Box::new(src))
}

fn weights() -> RecordStream {
    let src = MemorySource::builder("sumWeights", SchemaVersion(29))
        .column("dsid", vec![410_470i32, 410_470])
        .column("totalEventsWeighted", vec![10.0f32, 5.0])
        .build()
        .unwrap();
    RecordStream::open(StreamKind::Weights, Box::new(src))
}

fn example_streams() -> StreamSet {
    StreamSet::new()
        .with(stream(StreamKind::Reco, &[100, 101, 102]))
        .with(stream(StreamKind::Particle, &[101, 103]))
}

/// Records `(reco event, particle event, truth event)` for every callback.
#[derive(Default)]
struct Recorder {
    fail_at: Option<u64>,
    seen: Vec<(Option<u64>, Option<u64>, Option<u64>)>,
    met: Option<ColumnHandle<f32>>,
    finished_with: Option<u64>,
    sum_weights: Option<f64>,
}

impl Algorithm for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        self.met = ctx.bind_optional(StreamKind::Reco, "met_met")?;
        self.sum_weights = ctx.weights().and_then(|w| w.sum_weights);
        Ok(())
    }

    fn execute(&mut self, ctx: &EventContext<'_>) -> Result<EventStatus> {
        if self.fail_at == Some(ctx.index()) {
            return Ok(EventStatus::Fail);
        }
        let ev = |kind| ctx.key(kind).ok().map(|k: EventKey| k.event_number);
        if let (Some(met), Some(reco)) = (self.met, ctx.reco()) {
            let key = reco.current_key()?;
            assert_eq!(*ctx.get(met)?, key.event_number as f32 * 10.0);
        }
        self.seen.push((ev(StreamKind::Reco), ev(StreamKind::Particle), ev(StreamKind::Truth)));
        Ok(EventStatus::Continue)
    }

    fn finish(&mut self, ctx: &FinishContext<'_>) -> Result<()> {
        self.finished_with = Some(ctx.report.events);
        Ok(())
    }
}

fn run(mode: LoopMode, mut streams: StreamSet) -> (Result<nl_loop::RunReport>, Recorder) {
    run_on(mode, &mut streams)
}

fn run_on(mode: LoopMode, streams: &mut StreamSet) -> (Result<nl_loop::RunReport>, Recorder) {
    let mut alg = Recorder::default();
    let binder = ColumnBinder::with_catalog(ColumnCatalog::default_ntuple());
    let report = Job::new().loop_mode(mode).progress(false).run(streams, &binder, &mut alg);
    (report, alg)
}

/// Keys `(runNumber, eventNumber)` plus a `randomRunNumber` column.
fn keyed_stream(kind: StreamKind, events: &[u64], random_runs: &[u32], keys: KeyColumns) -> RecordStream {
    let src = MemorySource::builder(kind.as_str(), SchemaVersion(29))
        .column("eventNumber", events.to_vec())
        .column("runNumber", vec![1u32; events.len()])
        .column("randomRunNumber", random_runs.to_vec())
        .build()
        .unwrap();
    RecordStream::open(kind, Box::new(src)).with_key_columns(keys)
}

/// Binds the whole catalog in `init` and reads `met_met` through it.
#[derive(Default)]
struct CatalogReader {
    bound: Vec<(StreamKind, String, AnyColumn)>,
    met: Vec<f32>,
}

impl Algorithm for CatalogReader {
    fn name(&self) -> &str {
        "catalog_reader"
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        self.bound = ctx.bind_catalog()?;
        Ok(())
    }

    fn execute(&mut self, ctx: &EventContext<'_>) -> Result<EventStatus> {
        for (kind, name, col) in &self.bound {
            if *kind == StreamKind::Reco && name == "met_met" {
                self.met.push(*ctx.get(col.typed::<f32>()?)?);
            }
        }
        Ok(EventStatus::Continue)
    }
}

fn reco_catalog() -> ColumnCatalog {
    const F32: PhysicalType = PhysicalType::scalar(LeafType::F32);
    ColumnCatalog::new()
        .with(ColumnSpec::new("met_met", StreamKind::Reco, F32))
        .with(ColumnSpec::new("mu", StreamKind::Reco, F32).optional())
        .with(ColumnSpec::new("met_met", StreamKind::Particle, F32))
        .with(ColumnSpec::new("dsid", StreamKind::Weights, PhysicalType::scalar(LeafType::I32)))
}

fn run_catalog(catalog: ColumnCatalog, mut streams: StreamSet) -> (Result<nl_loop::RunReport>, CatalogReader) {
    let mut alg = CatalogReader::default();
    let binder = ColumnBinder::with_catalog(catalog);
    let report = Job::new().loop_mode(LoopMode::RecoOnly).progress(false).run(&mut streams, &binder, &mut alg);
    (report, alg)
}

#[test]
fn correlate_partitions_example_streams() {
    let streams = example_streams();
    let table = CorrespondenceTable::correlate(
        streams.get(StreamKind::Reco).unwrap(),
        streams.get(StreamKind::Particle).unwrap(),
    )
    .unwrap();
    assert_eq!(table.paired(), &[(1, 0)]);
    assert_eq!(table.reco_only(), &[0, 2]);
    assert_eq!(table.particle_only(), &[1]);
}

#[test]
fn correlate_requires_unadvanced_streams() {
    let mut streams = example_streams();
    streams.get_mut(StreamKind::Reco).unwrap().advance().unwrap();
    let err = CorrespondenceTable::correlate(
        streams.get(StreamKind::Reco).unwrap(),
        streams.get(StreamKind::Particle).unwrap(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn reco_only_visits_every_position_in_order() {
    let mut streams = StreamSet::new().with(stream(StreamKind::Reco, &[10, 11, 12, 13, 14]));
    let mut seen = Vec::new();
    let n = drive(LoopMode::RecoOnly, &mut streams, None, &mut Progress::disabled(), |ctx| {
        seen.push(ctx.reco().and_then(|s| s.position()));
        assert!(ctx.particle().is_none());
        Ok(EventStatus::Continue)
    })
    .unwrap();
    assert_eq!(n, 5);
    assert_eq!(seen, (0..5).map(Some).collect::<Vec<_>>());
}

#[test]
fn reco_standard_exposes_particle_companion_by_key() {
    let (report, alg) = run(LoopMode::RecoStandard, example_streams());
    let report = report.unwrap();
    assert_eq!(report.events, 3);
    assert_eq!(alg.finished_with, Some(3));
    assert_eq!(alg.seen, vec![(Some(100), None, None), (Some(101), Some(101), None), (Some(102), None, None)]);
    let table = report.table.unwrap();
    assert_eq!((table.paired, table.reco_only, table.particle_only), (1, 2, 1));
}

#[test]
fn reco_standard_without_particle_runs_reco_only() {
    let streams = StreamSet::new().with(stream(StreamKind::Reco, &[1, 2]));
    let (report, alg) = run(LoopMode::RecoStandard, streams);
    let report = report.unwrap();
    assert_eq!(report.requested_mode, LoopMode::RecoStandard);
    assert_eq!(report.mode, LoopMode::RecoOnly);
    assert!(report.table.is_none());
    assert_eq!(alg.seen.len(), 2);
}

#[test]
fn reco_with_particle_visits_pairs_only() {
    let (report, alg) = run(LoopMode::RecoWithParticle, example_streams());
    assert_eq!(report.unwrap().events, 1);
    assert_eq!(alg.seen, vec![(Some(101), Some(101), None)]);
}

#[test]
fn particle_all_follows_particle_stream_with_truth() {
    let streams = example_streams().with(stream(StreamKind::Truth, &[101, 103, 999]));
    let (report, alg) = run(LoopMode::ParticleAll, streams);
    assert_eq!(report.unwrap().events, 2);
    assert_eq!(alg.seen, vec![(Some(101), Some(101), Some(101)), (None, Some(103), Some(103))]);
}

#[test]
fn particle_only_ignores_reco() {
    let streams = StreamSet::new().with(stream(StreamKind::Particle, &[7, 8]));
    let (report, alg) = run(LoopMode::ParticleOnly, streams);
    assert_eq!(report.unwrap().events, 2);
    assert_eq!(alg.seen, vec![(None, Some(7), None), (None, Some(8), None)]);
}

#[test]
fn missing_particle_stream_is_a_configuration_error() {
    for mode in [LoopMode::RecoWithParticle, LoopMode::ParticleOnly, LoopMode::ParticleAll] {
        let streams = StreamSet::new().with(stream(StreamKind::Reco, &[1]));
        let (report, alg) = run(mode, streams);
        assert_eq!(report.unwrap_err().kind(), ErrorKind::Configuration, "{mode}");
        assert!(alg.seen.is_empty());
    }
}

#[test]
fn short_truth_stream_is_a_configuration_error() {
    let streams = example_streams().with(stream(StreamKind::Truth, &[101]));
    let (report, _) = run(LoopMode::ParticleAll, streams);
    assert_eq!(report.unwrap_err().kind(), ErrorKind::Configuration);
}

#[test]
fn fail_stops_the_loop() {
    let mut alg = Recorder { fail_at: Some(1), ..Default::default() };
    let mut streams = StreamSet::new().with(stream(StreamKind::Reco, &[1, 2, 3]));
    let err = Job::new()
        .loop_mode(LoopMode::RecoOnly)
        .progress(false)
        .run(&mut streams, &ColumnBinder::default(), &mut alg)
        .unwrap_err();
    assert!(matches!(err, nl_core::Error::CallbackFailure { event: 1, .. }));
    assert_eq!(alg.seen.len(), 1);
    assert_eq!(alg.finished_with, None);
}

#[test]
fn callback_errors_are_not_masked() {
    let mut streams = StreamSet::new().with(stream(StreamKind::Reco, &[1, 2]));
    let err = drive(LoopMode::RecoOnly, &mut streams, None, &mut Progress::disabled(), |_| {
        Err(nl_core::Error::Source("corrupt basket".into()))
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Source);
}

#[test]
fn crossed_key_order_fails_before_first_callback() {
    let streams = StreamSet::new()
        .with(stream(StreamKind::Reco, &[1, 2]))
        .with(stream(StreamKind::Particle, &[2, 1]));
    let (report, alg) = run(LoopMode::RecoWithParticle, streams);
    assert_eq!(report.unwrap_err().kind(), ErrorKind::CorrelationInconsistency);
    assert!(alg.seen.is_empty());
}

#[test]
fn mismatched_table_is_rejected() {
    let mut streams = example_streams();
    let table = CorrespondenceTable::from_keys(&[EventKey::new(1, 1)], &[EventKey::new(1, 1)]);
    let err = drive(LoopMode::RecoWithParticle, &mut streams, Some(&table), &mut Progress::disabled(), |_| {
        Ok(EventStatus::Continue)
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorrelationInconsistency);
}

#[test]
fn weights_are_aggregated_before_init() {
    let streams = example_streams().with(weights());
    let (report, alg) = run(LoopMode::RecoStandard, streams);
    let report = report.unwrap();
    assert_eq!(alg.sum_weights, Some(15.0));
    let w = report.weights.unwrap();
    assert_eq!(w.dsid, Some(410_470));
    assert_eq!(w.n_records, 2);
}

#[test]
fn report_serializes_for_json_output() {
    let (report, _) = run(LoopMode::RecoStandard, example_streams().with(weights()));
    let v = serde_json::to_value(report.unwrap()).unwrap();
    assert_eq!(v["requested_mode"], "reco_standard");
    assert_eq!(v["events"], 3);
    assert_eq!(v["table"]["paired"], 1);
    assert_eq!(v["weights"]["sum_weights"], 15.0);
    assert_eq!(v["weights"]["dsid"], 410_470);
}

#[test]
fn reco_standard_moves_truth_with_paired_particles() {
    let mut streams = example_streams().with(stream(StreamKind::Truth, &[101, 103]));
    let (report, alg) = run_on(LoopMode::RecoStandard, &mut streams);
    assert_eq!(report.unwrap().events, 3);
    assert_eq!(
        alg.seen,
        vec![(Some(100), None, None), (Some(101), Some(101), Some(101)), (Some(102), None, None)]
    );
    assert_eq!(streams.get(StreamKind::Truth).unwrap().position(), Some(0));
    assert_eq!(streams.get(StreamKind::Particle).unwrap().position(), Some(0));
}

#[test]
fn random_run_number_keys_the_correlation() {
    let events = [5, 6, 7];
    let reco_runs = [300_000, 300_001, 300_002];
    let particle_runs = [300_000, 310_000, 300_002];

    let plain = CorrespondenceTable::correlate(
        &keyed_stream(StreamKind::Reco, &events, &reco_runs, KeyColumns::default()),
        &keyed_stream(StreamKind::Particle, &events, &particle_runs, KeyColumns::default()),
    )
    .unwrap();
    assert_eq!(plain.paired(), &[(0, 0), (1, 1), (2, 2)]);

    let random = KeyColumns::default().with_random_run_number();
    let mut streams = StreamSet::new()
        .with(keyed_stream(StreamKind::Reco, &events, &reco_runs, random.clone()))
        .with(keyed_stream(StreamKind::Particle, &events, &particle_runs, random));
    let table = CorrespondenceTable::correlate(
        streams.get(StreamKind::Reco).unwrap(),
        streams.get(StreamKind::Particle).unwrap(),
    )
    .unwrap();
    assert_eq!(table.paired(), &[(0, 0), (2, 2)]);
    assert_eq!(table.reco_only(), &[1]);
    assert_eq!(table.particle_only(), &[1]);

    let (report, alg) = run_on(LoopMode::RecoWithParticle, &mut streams);
    assert_eq!(report.unwrap().events, 2);
    assert_eq!(alg.seen, vec![(Some(5), Some(5), None), (Some(7), Some(7), None)]);
    let reco = streams.get(StreamKind::Reco).unwrap();
    assert_eq!(reco.key_columns().run_column(), "randomRunNumber");
    assert_eq!(reco.current_key().unwrap(), EventKey::new(300_002, 7));
}

#[test]
fn catalog_binding_skips_absent_streams_and_optional_columns() {
    let streams = StreamSet::new().with(stream(StreamKind::Reco, &[1, 2])).with(weights());
    let (report, alg) = run_catalog(reco_catalog(), streams);
    assert_eq!(report.unwrap().events, 2);
    let names: Vec<_> = alg.bound.iter().map(|(k, n, _)| (*k, n.as_str())).collect();
    assert_eq!(names, vec![(StreamKind::Reco, "met_met")]);
    assert_eq!(alg.met, vec![10.0, 20.0]);
}

#[test]
fn catalog_binding_fails_on_missing_required_column() {
    let catalog = reco_catalog()
        .with(ColumnSpec::new("weight_mc", StreamKind::Reco, PhysicalType::scalar(LeafType::F32)));
    let (report, alg) = run_catalog(catalog, StreamSet::new().with(stream(StreamKind::Reco, &[1, 2])));
    let err = report.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaResolution);
    assert!(err.to_string().contains("weight_mc"));
    assert!(alg.met.is_empty());
}

proptest! {
    #[test]
    fn table_partitions_both_streams(
        reco in prop::collection::vec((0u32..3, 0u64..40), 0..60),
        particle in prop::collection::vec((0u32..3, 0u64..40), 0..60),
    ) {
        let reco: Vec<_> = reco.into_iter().map(|(r, e)| EventKey::new(r, e)).collect();
        let particle: Vec<_> = particle.into_iter().map(|(r, e)| EventKey::new(r, e)).collect();
        let t = CorrespondenceTable::from_keys(&reco, &particle);

        let mut reco_seen: Vec<u64> = t.reco_only().to_vec();
        reco_seen.extend(t.paired().iter().map(|&(r, _)| r));
        reco_seen.sort_unstable();
        prop_assert_eq!(reco_seen, (0..reco.len() as u64).collect::<Vec<_>>());

        let mut particle_seen: Vec<u64> = t.particle_only().to_vec();
        particle_seen.extend(t.paired().iter().map(|&(_, p)| p));
        particle_seen.sort_unstable();
        prop_assert_eq!(particle_seen, (0..particle.len() as u64).collect::<Vec<_>>());

        prop_assert!(t.paired().windows(2).all(|w| w[0].0 < w[1].0));
        prop_assert!(t.reco_only().windows(2).all(|w| w[0] < w[1]));
        prop_assert!(t.particle_only().windows(2).all(|w| w[0] < w[1]));
        for &(r, p) in t.paired() {
            prop_assert_eq!(reco[r as usize], particle[p as usize]);
        }
    }
}
