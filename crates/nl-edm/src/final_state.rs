//! Per-event collection of selected objects.

use crate::kinematics::FourMomentum;
use crate::lepton_pair::LeptonPair;
use crate::objects::{Jet, Lepton, Met};

/// Leptons, jets, missing momentum and lepton pairs of one event.
///
/// Derived quantities are only updated by [`evaluate_lepton_pairs`] and
/// [`evaluate_self`]; adding objects does not touch them.
///
/// [`evaluate_lepton_pairs`]: FinalState::evaluate_lepton_pairs
/// [`evaluate_self`]: FinalState::evaluate_self
#[derive(Debug, Clone, Default)]
pub struct FinalState {
    leptons: Vec<Lepton>,
    jets: Vec<Jet>,
    met: Met,
    lepton_pairs: Vec<LeptonPair>,
    mass: f64,
    leading_lepton: Option<usize>,
    leading_jet: Option<usize>,
}

fn leading<T>(items: &[T], pt: impl Fn(&T) -> f64) -> Option<usize> {
    items
        .iter()
        .enumerate()
        .map(|(i, x)| (i, pt(x)))
        .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(i, _)| i)
}

impl FinalState {
    /// Empty final state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lepton.
    pub fn add_lepton(&mut self, lepton: Lepton) {
        self.leptons.push(lepton);
    }

    /// Append a jet.
    pub fn add_jet(&mut self, jet: Jet) {
        self.jets.push(jet);
    }

    /// Replace the missing transverse momentum.
    pub fn set_met(&mut self, met: Met) {
        self.met = met;
    }

    /// Append one pair.
    pub fn add_lepton_pair(&mut self, pair: LeptonPair) {
        self.lepton_pairs.push(pair);
    }

    /// Append every pair from `pairs`.
    pub fn add_lepton_pairs(&mut self, pairs: impl IntoIterator<Item = LeptonPair>) {
        self.lepton_pairs.extend(pairs);
    }

    /// Replace the lepton pairs with every `i < j` combination of the leptons.
    pub fn evaluate_lepton_pairs(&mut self) {
        self.lepton_pairs.clear();
        for (i, a) in self.leptons.iter().enumerate() {
            for (j, b) in self.leptons.iter().enumerate().skip(i + 1) {
                self.lepton_pairs.push(LeptonPair::new(a, b, i, j));
            }
        }
    }

    /// Recompute the leading lepton and jet and the invariant mass of all
    /// leptons and jets.
    pub fn evaluate_self(&mut self) {
        self.leading_lepton = leading(&self.leptons, Lepton::pt);
        self.leading_jet = leading(&self.jets, Jet::pt);
        let total: FourMomentum =
            self.leptons.iter().map(|l| l.p4).chain(self.jets.iter().map(|j| j.p4)).sum();
        self.mass = total.m();
    }

    /// Forget everything, ready for the next event.
    pub fn clear(&mut self) {
        self.leptons.clear();
        self.jets.clear();
        self.lepton_pairs.clear();
        self.met = Met::default();
        self.mass = 0.0;
        self.leading_lepton = None;
        self.leading_jet = None;
    }

    /// Leptons in insertion order.
    pub fn leptons(&self) -> &[Lepton] {
        &self.leptons
    }

    /// Jets in insertion order.
    pub fn jets(&self) -> &[Jet] {
        &self.jets
    }

    /// Missing transverse momentum.
    pub fn met(&self) -> Met {
        self.met
    }

    /// Pairs built so far.
    pub fn lepton_pairs(&self) -> &[LeptonPair] {
        &self.lepton_pairs
    }

    /// Invariant mass from the last [`evaluate_self`](Self::evaluate_self).
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Index of the highest-pt lepton, as of the last `evaluate_self`.
    pub fn leading_lepton_idx(&self) -> Option<usize> {
        self.leading_lepton
    }

    /// Index of the highest-pt jet, as of the last `evaluate_self`.
    pub fn leading_jet_idx(&self) -> Option<usize> {
        self.leading_jet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lep(pt: f64, phi: f64, charge: i32) -> Lepton {
        Lepton::muon(FourMomentum::from_pt_eta_phi_m(pt, 0.0, phi, 0.0), charge)
    }

    #[test]
    fn pairs_every_combination_once() {
        let mut fs = FinalState::new();
        for (pt, q) in [(20.0, 1), (50.0, -1), (35.0, 1)] {
            fs.add_lepton(lep(pt, 0.3 * pt, q));
        }
        fs.evaluate_lepton_pairs();
        let idx: Vec<_> = fs.lepton_pairs().iter().map(LeptonPair::index_pair).collect();
        assert_eq!(idx, vec![(0, 1), (0, 2), (1, 2)]);
        fs.evaluate_lepton_pairs();
        assert_eq!(fs.lepton_pairs().len(), 3);
    }

    #[test]
    fn leading_indices_are_computed_on_demand() {
        let mut fs = FinalState::new();
        fs.add_lepton(lep(20.0, 0.0, 1));
        fs.add_lepton(lep(50.0, 1.0, -1));
        assert_eq!(fs.leading_lepton_idx(), None);
        fs.evaluate_self();
        assert_eq!(fs.leading_lepton_idx(), Some(1));
        assert_eq!(fs.leading_jet_idx(), None);

        fs.add_jet(Jet::new(FourMomentum::from_pt_eta_phi_m(80.0, 1.0, 2.0, 5.0), true));
        fs.add_jet(Jet::new(FourMomentum::from_pt_eta_phi_m(80.0, -1.0, -2.0, 5.0), false));
        fs.evaluate_self();
        assert_eq!(fs.leading_jet_idx(), Some(0));
    }

    #[test]
    fn mass_of_back_to_back_leptons() {
        let mut fs = FinalState::new();
        fs.add_lepton(lep(45.0, 0.0, 1));
        fs.add_lepton(lep(45.0, std::f64::consts::PI, -1));
        fs.evaluate_self();
        assert_relative_eq!(fs.mass(), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn clear_resets_everything() {
        let mut fs = FinalState::new();
        fs.add_lepton(lep(30.0, 0.0, 1));
        fs.set_met(Met::new(20.0, 1.0));
        fs.evaluate_self();
        fs.clear();
        assert!(fs.leptons().is_empty() && fs.jets().is_empty() && fs.lepton_pairs().is_empty());
        assert_eq!(fs.leading_lepton_idx(), None);
        assert_eq!(fs.met(), Met::default());
        assert_eq!(fs.mass(), 0.0);
    }
}
