//! Reconstructed physics objects.

use crate::kinematics::FourMomentum;

/// PDG id of the electron.
pub const PDG_ELECTRON: i32 = 11;
/// PDG id of the muon.
pub const PDG_MUON: i32 = 13;

/// Charged lepton.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lepton {
    /// Four-momentum.
    pub p4: FourMomentum,
    /// Electric charge in units of e.
    pub charge: i32,
    /// Signed PDG id.
    pub pdg_id: i32,
}

impl Lepton {
    /// Lepton with an explicit PDG id.
    pub fn new(p4: FourMomentum, charge: i32, pdg_id: i32) -> Self {
        Self { p4, charge, pdg_id }
    }

    /// Electron (`charge < 0`) or positron.
    pub fn electron(p4: FourMomentum, charge: i32) -> Self {
        Self::new(p4, charge, if charge > 0 { -PDG_ELECTRON } else { PDG_ELECTRON })
    }

    /// Muon (`charge < 0`) or antimuon.
    pub fn muon(p4: FourMomentum, charge: i32) -> Self {
        Self::new(p4, charge, if charge > 0 { -PDG_MUON } else { PDG_MUON })
    }

    /// `|pdg_id|` is 11.
    pub fn is_electron(&self) -> bool {
        self.pdg_id.abs() == PDG_ELECTRON
    }

    /// `|pdg_id|` is 13.
    pub fn is_muon(&self) -> bool {
        self.pdg_id.abs() == PDG_MUON
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.p4.pt()
    }
}

/// Hadronic jet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jet {
    /// Four-momentum.
    pub p4: FourMomentum,
    /// Passed the b-tagging working point.
    pub btagged: bool,
}

impl Jet {
    /// Jet from its four-momentum and b-tag decision.
    pub fn new(p4: FourMomentum, btagged: bool) -> Self {
        Self { p4, btagged }
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.p4.pt()
    }
}

/// Missing transverse momentum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Met {
    /// Magnitude.
    pub met: f64,
    /// Azimuth.
    pub phi: f64,
}

impl Met {
    /// MET from magnitude and azimuth.
    pub fn new(met: f64, phi: f64) -> Self {
        Self { met, phi }
    }

    /// x projection of the missing momentum.
    pub fn px(&self) -> f64 {
        self.met * self.phi.cos()
    }

    /// y projection of the missing momentum.
    pub fn py(&self) -> f64 {
        self.met * self.phi.sin()
    }

    /// Massless transverse four-momentum.
    pub fn p4(&self) -> FourMomentum {
        FourMomentum::new(self.px(), self.py(), 0.0, self.met)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn lepton_flavour_from_pdg_id() {
        let p4 = FourMomentum::from_pt_eta_phi_e(30.0, 0.1, 0.2, 31.0);
        let e = Lepton::electron(p4, 1);
        assert_eq!(e.pdg_id, -11);
        assert!(e.is_electron() && !e.is_muon());
        assert_eq!(Lepton::muon(p4, -1).pdg_id, 13);
    }

    #[test]
    fn met_components() {
        let m = Met::new(50.0, std::f64::consts::FRAC_PI_2);
        assert_abs_diff_eq!(m.px(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.py(), 50.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.p4().pt(), 50.0, epsilon = 1e-12);
    }
}
