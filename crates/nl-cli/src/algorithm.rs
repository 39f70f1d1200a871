//! Built-in dilepton summary run by `ntloop run`.

use std::collections::BTreeMap;

use serde::Serialize;

use nl_core::{EventStatus, Result, StreamKind};
use nl_edm::{FinalState, FourMomentum, GEV, Jet, Lepton, LeptonPair, Met, PairCharge, PairFlavor};
use nl_io::ColumnHandle;
use nl_loop::{Algorithm, EventContext, FinishContext, InitContext, RunReport};

type Floats = ColumnHandle<Vec<f32>>;

#[derive(Debug, Clone, Copy)]
struct LeptonColumns {
    pt: Floats,
    eta: Floats,
    phi: Floats,
    e: Floats,
    charge: Floats,
    tight: Option<ColumnHandle<Vec<bool>>>,
}

impl LeptonColumns {
    /// `None` when any kinematic column of `prefix` is missing on `kind`.
    fn bind_optional(ctx: &mut InitContext<'_>, kind: StreamKind, prefix: &str) -> Result<Option<Self>> {
        let mut kin = Vec::with_capacity(5);
        for var in ["pt", "eta", "phi", "e", "charge"] {
            match ctx.bind_optional::<Vec<f32>>(kind, &format!("{prefix}_{var}"))? {
                Some(h) => kin.push(h),
                None => return Ok(None),
            }
        }
        let tight = if kind == StreamKind::Reco {
            ctx.bind_optional::<Vec<bool>>(kind, &format!("{prefix}_tight"))?
        } else {
            None
        };
        Ok(Some(Self { pt: kin[0], eta: kin[1], phi: kin[2], e: kin[3], charge: kin[4], tight }))
    }

    fn bind(ctx: &mut InitContext<'_>, kind: StreamKind, prefix: &str) -> Result<Self> {
        let kin = |ctx: &mut InitContext<'_>, var: &str| ctx.bind::<Vec<f32>>(kind, &format!("{prefix}_{var}"));
        Ok(Self {
            pt: kin(ctx, "pt")?,
            eta: kin(ctx, "eta")?,
            phi: kin(ctx, "phi")?,
            e: kin(ctx, "e")?,
            charge: kin(ctx, "charge")?,
            tight: ctx.bind_optional::<Vec<bool>>(kind, &format!("{prefix}_tight"))?,
        })
    }

    /// Append the (tight, when flagged) leptons of the current record.
    fn collect(
        &self,
        ctx: &EventContext<'_>,
        make: fn(FourMomentum, i32) -> Lepton,
        out: &mut FinalState,
    ) -> Result<()> {
        let pt = ctx.get(self.pt)?;
        let eta = ctx.get(self.eta)?;
        let phi = ctx.get(self.phi)?;
        let e = ctx.get(self.e)?;
        let charge = ctx.get(self.charge)?;
        let tight = self.tight.map(|h| ctx.get(h)).transpose()?;
        for i in 0..pt.len() {
            if tight.as_ref().is_some_and(|t| !t.get(i).copied().unwrap_or(false)) {
                continue;
            }
            let (Some(&eta), Some(&phi), Some(&e), Some(&q)) = (eta.get(i), phi.get(i), e.get(i), charge.get(i))
            else {
                tracing::warn!(event = ctx.index(), object = i, "lepton columns have different lengths");
                break;
            };
            let p4 = FourMomentum::from_pt_eta_phi_e(f64::from(pt[i]), f64::from(eta), f64::from(phi), f64::from(e));
            out.add_lepton(make(p4, q.round() as i32));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct JetColumns {
    pt: Floats,
    eta: Floats,
    phi: Floats,
    e: Floats,
    btag: Option<ColumnHandle<Vec<bool>>>,
}

/// Weighted and raw event counts of one dilepton category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Yield {
    pub events: u64,
    pub weighted: f64,
}

impl Yield {
    fn fill(&mut self, weight: f64) {
        self.events += 1;
        self.weighted += weight;
    }
}

/// JSON document written by `ntloop run`.
#[derive(Debug, Clone, Serialize)]
pub struct DileptonReport {
    pub algorithm: String,
    pub run: RunReport,
    pub reco_events: u64,
    pub particle_events: u64,
    pub matched_events: u64,
    /// Reco events with exactly two selected leptons, by `<flavour>_<charge>`.
    pub dilepton: BTreeMap<String, Yield>,
    pub particle_dilepton: u64,
    pub mean_mll_gev: Option<f64>,
    pub mean_met_gev: Option<f64>,
    pub max_jets: usize,
}

/// Counts dilepton events by flavour and charge at reco level, and
/// particle-level dilepton events when particle kinematics are present.
#[derive(Debug, Default)]
pub struct DileptonSummary {
    reco_el: Option<LeptonColumns>,
    reco_mu: Option<LeptonColumns>,
    jets: Option<JetColumns>,
    met: Option<(ColumnHandle<f32>, ColumnHandle<f32>)>,
    weight_mc: Option<ColumnHandle<f32>>,
    particle_el: Option<LeptonColumns>,
    particle_mu: Option<LeptonColumns>,

    fs: FinalState,
    reco_events: u64,
    particle_events: u64,
    matched_events: u64,
    dilepton: BTreeMap<String, Yield>,
    particle_dilepton: u64,
    mll_sum: f64,
    met_sum: f64,
    max_jets: usize,
    report: Option<RunReport>,
}

fn category(pair: &LeptonPair) -> String {
    let flavour = match pair.flavor() {
        PairFlavor::ElEl => "elel",
        PairFlavor::ElMu => "elmu",
        PairFlavor::MuMu => "mumu",
        PairFlavor::Unclassified => "other",
    };
    let charge = match pair.charge() {
        PairCharge::OppositeSign => "os",
        PairCharge::SameSign => "ss",
        PairCharge::Unclassified => "other",
    };
    format!("{flavour}_{charge}")
}

impl DileptonSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Final report. `None` before `finish` has run.
    pub fn report(&self) -> Option<DileptonReport> {
        let run = self.report.clone()?;
        let n_dilepton: u64 = self.dilepton.values().map(|y| y.events).sum();
        Some(DileptonReport {
            algorithm: self.name().to_string(),
            run,
            reco_events: self.reco_events,
            particle_events: self.particle_events,
            matched_events: self.matched_events,
            dilepton: self.dilepton.clone(),
            particle_dilepton: self.particle_dilepton,
            mean_mll_gev: (n_dilepton > 0).then(|| self.mll_sum / n_dilepton as f64),
            mean_met_gev: (self.met.is_some() && self.reco_events > 0)
                .then(|| self.met_sum / self.reco_events as f64),
            max_jets: self.max_jets,
        })
    }

    fn reco_event(&mut self, ctx: &EventContext<'_>) -> Result<()> {
        self.fs.clear();
        if let Some(cols) = &self.reco_el {
            cols.collect(ctx, Lepton::electron, &mut self.fs)?;
        }
        if let Some(cols) = &self.reco_mu {
            cols.collect(ctx, Lepton::muon, &mut self.fs)?;
        }
        if let Some(jets) = &self.jets {
            let pt = ctx.get(jets.pt)?;
            let eta = ctx.get(jets.eta)?;
            let phi = ctx.get(jets.phi)?;
            let e = ctx.get(jets.e)?;
            let btag = jets.btag.map(|h| ctx.get(h)).transpose()?;
            for (i, (((&pt, &eta), &phi), &e)) in pt.iter().zip(eta.iter()).zip(phi.iter()).zip(e.iter()).enumerate() {
                let p4 = FourMomentum::from_pt_eta_phi_e(f64::from(pt), f64::from(eta), f64::from(phi), f64::from(e));
                let tagged = btag.as_ref().and_then(|b| b.get(i).copied()).unwrap_or(false);
                self.fs.add_jet(Jet::new(p4, tagged));
            }
        }
        if let Some((met, phi)) = self.met {
            self.fs.set_met(Met::new(f64::from(ctx.value(met)?), f64::from(ctx.value(phi)?)));
        }
        self.fs.evaluate_lepton_pairs();
        self.fs.evaluate_self();

        let weight = match self.weight_mc {
            Some(h) => f64::from(ctx.value(h)?),
            None => 1.0,
        };
        self.met_sum += self.fs.met().met * GEV;
        self.max_jets = self.max_jets.max(self.fs.jets().len());
        if let [pair] = self.fs.lepton_pairs() {
            self.dilepton.entry(category(pair)).or_default().fill(weight);
            self.mll_sum += pair.mass() * GEV;
        }
        Ok(())
    }

    fn particle_event(&self, ctx: &EventContext<'_>) -> Result<bool> {
        let mut fs = FinalState::new();
        if let Some(cols) = &self.particle_el {
            cols.collect(ctx, Lepton::electron, &mut fs)?;
        }
        if let Some(cols) = &self.particle_mu {
            cols.collect(ctx, Lepton::muon, &mut fs)?;
        }
        Ok(fs.leptons().len() == 2)
    }
}

impl Algorithm for DileptonSummary {
    fn name(&self) -> &str {
        "dilepton_summary"
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        if ctx.has_stream(StreamKind::Reco) {
            self.reco_el = Some(LeptonColumns::bind(ctx, StreamKind::Reco, "el")?);
            self.reco_mu = Some(LeptonColumns::bind(ctx, StreamKind::Reco, "mu")?);
            let jet = |ctx: &mut InitContext<'_>, var: &str| ctx.bind_optional::<Vec<f32>>(StreamKind::Reco, var);
            if let (Some(pt), Some(eta), Some(phi), Some(e)) =
                (jet(ctx, "jet_pt")?, jet(ctx, "jet_eta")?, jet(ctx, "jet_phi")?, jet(ctx, "jet_e")?)
            {
                let btag = ctx.bind_optional::<Vec<bool>>(StreamKind::Reco, "jet_isbtagged_MV2c10_77")?;
                self.jets = Some(JetColumns { pt, eta, phi, e, btag });
            }
            let met = ctx.bind_optional::<f32>(StreamKind::Reco, "met_met")?;
            let met_phi = ctx.bind_optional::<f32>(StreamKind::Reco, "met_phi")?;
            self.met = met.zip(met_phi);
            self.weight_mc = ctx.bind_optional::<f32>(StreamKind::Reco, "weight_mc")?;
        }
        self.particle_el = LeptonColumns::bind_optional(ctx, StreamKind::Particle, "el")?;
        self.particle_mu = LeptonColumns::bind_optional(ctx, StreamKind::Particle, "mu")?;
        tracing::info!(
            mode = %ctx.loop_mode(),
            jets = self.jets.is_some(),
            particle_leptons = self.particle_el.is_some() || self.particle_mu.is_some(),
            "dilepton summary initialised"
        );
        Ok(())
    }

    fn execute(&mut self, ctx: &EventContext<'_>) -> Result<EventStatus> {
        let has_reco = ctx.has(StreamKind::Reco);
        let has_particle = ctx.has(StreamKind::Particle);
        if has_reco {
            self.reco_events += 1;
            self.reco_event(ctx)?;
        }
        if has_particle {
            self.particle_events += 1;
            if self.particle_event(ctx)? {
                self.particle_dilepton += 1;
            }
        }
        if has_reco && has_particle {
            self.matched_events += 1;
        }
        Ok(EventStatus::Continue)
    }

    fn finish(&mut self, ctx: &FinishContext<'_>) -> Result<()> {
        self.report = Some(ctx.report.clone());
        tracing::info!(
            events = ctx.report.events,
            dilepton = self.dilepton.values().map(|y| y.events).sum::<u64>(),
            "dilepton summary finished"
        );
        Ok(())
    }
}
