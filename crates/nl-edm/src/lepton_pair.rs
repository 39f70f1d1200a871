//! Two-lepton system.

use serde::Serialize;

use crate::kinematics::FourMomentum;
use crate::objects::Lepton;

/// Flavour content of a lepton pair, from the sum of absolute PDG ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairFlavor {
    /// 11 + 11
    ElEl,
    /// 11 + 13
    ElMu,
    /// 13 + 13
    MuMu,
    /// Anything else.
    Unclassified,
}

impl PairFlavor {
    /// Classify a sum of absolute PDG ids. Unknown sums log a warning.
    pub fn from_pdg_sum(sum: i32) -> Self {
        match sum {
            22 => PairFlavor::ElEl,
            24 => PairFlavor::ElMu,
            26 => PairFlavor::MuMu,
            other => {
                tracing::warn!(pdg_sum = other, "lepton pair with unexpected PDG sum");
                PairFlavor::Unclassified
            }
        }
    }
}

/// Charge content of a lepton pair, from the absolute charge sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairCharge {
    /// Charges sum to 0.
    OppositeSign,
    /// Charges sum to ±2.
    SameSign,
    /// Anything else.
    Unclassified,
}

impl PairCharge {
    /// Classify an absolute charge sum. Unknown sums log a warning.
    pub fn from_abs_charge_sum(sum: i32) -> Self {
        match sum {
            0 => PairCharge::OppositeSign,
            2 => PairCharge::SameSign,
            other => {
                tracing::warn!(charge_sum = other, "lepton pair with unexpected charge sum");
                PairCharge::Unclassified
            }
        }
    }
}

/// Two leptons of one event, with their combined kinematics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeptonPair {
    p4: FourMomentum,
    delta_r: f64,
    delta_eta: f64,
    delta_phi: f64,
    flavor: PairFlavor,
    charge: PairCharge,
    indices: (usize, usize),
}

impl LeptonPair {
    /// Pair `a` (at `idx_a`) with `b` (at `idx_b`).
    pub fn new(a: &Lepton, b: &Lepton, idx_a: usize, idx_b: usize) -> Self {
        Self {
            p4: a.p4 + b.p4,
            delta_r: a.p4.delta_r(&b.p4),
            delta_eta: a.p4.delta_eta(&b.p4),
            delta_phi: a.p4.delta_phi(&b.p4),
            flavor: PairFlavor::from_pdg_sum(a.pdg_id.abs() + b.pdg_id.abs()),
            charge: PairCharge::from_abs_charge_sum((a.charge + b.charge).abs()),
            indices: (idx_a, idx_b),
        }
    }

    /// Summed four-momentum.
    pub fn p4(&self) -> FourMomentum {
        self.p4
    }

    /// Invariant mass of the pair.
    pub fn mass(&self) -> f64 {
        self.p4.m()
    }

    /// Angular separation of the two leptons.
    pub fn delta_r(&self) -> f64 {
        self.delta_r
    }

    /// Signed pseudorapidity difference, first minus second.
    pub fn delta_eta(&self) -> f64 {
        self.delta_eta
    }

    /// In `(-π, π]`.
    pub fn delta_phi(&self) -> f64 {
        self.delta_phi
    }

    /// Flavor combination of the pair.
    pub fn flavor(&self) -> PairFlavor {
        self.flavor
    }

    /// Opposite or same sign.
    pub fn charge(&self) -> PairCharge {
        self.charge
    }

    /// Opposite-sign pair.
    pub fn os(&self) -> bool {
        self.charge == PairCharge::OppositeSign
    }

    /// Same-sign pair.
    pub fn ss(&self) -> bool {
        self.charge == PairCharge::SameSign
    }

    /// Both leptons are electrons.
    pub fn elel(&self) -> bool {
        self.flavor == PairFlavor::ElEl
    }

    /// One electron, one muon.
    pub fn elmu(&self) -> bool {
        self.flavor == PairFlavor::ElMu
    }

    /// Both leptons are muons.
    pub fn mumu(&self) -> bool {
        self.flavor == PairFlavor::MuMu
    }

    /// Indices of the two leptons in the owning container.
    pub fn index_pair(&self) -> (usize, usize) {
        self.indices
    }

    /// Index of the first lepton in the source list.
    pub fn first_idx(&self) -> usize {
        self.indices.0
    }

    /// Index of the second lepton in the source list.
    pub fn second_idx(&self) -> usize {
        self.indices.1
    }
}
