//! Four-momentum arithmetic and angular distances.

use std::f64::consts::{PI, TAU};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// `phi1 - phi2` wrapped to `(-π, π]`.
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    let d = (phi1 - phi2) % TAU;
    if d > PI {
        d - TAU
    } else if d <= -PI {
        d + TAU
    } else {
        d
    }
}

/// Cartesian four-momentum `(px, py, pz, E)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FourMomentum {
    px: f64,
    py: f64,
    pz: f64,
    e: f64,
}

impl FourMomentum {
    /// From Cartesian components.
    pub fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    /// From transverse momentum, pseudorapidity, azimuth and energy.
    pub fn from_pt_eta_phi_e(pt: f64, eta: f64, phi: f64, e: f64) -> Self {
        Self { px: pt * phi.cos(), py: pt * phi.sin(), pz: pt * eta.sinh(), e }
    }

    /// From transverse momentum, pseudorapidity, azimuth and mass.
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let pz = pt * eta.sinh();
        let e = (pt * pt + pz * pz + m * m).sqrt();
        Self { px: pt * phi.cos(), py: pt * phi.sin(), pz, e }
    }

    /// x component.
    pub fn px(&self) -> f64 {
        self.px
    }

    /// y component.
    pub fn py(&self) -> f64 {
        self.py
    }

    /// z component, along the beam.
    pub fn pz(&self) -> f64 {
        self.pz
    }

    /// Energy.
    pub fn e(&self) -> f64 {
        self.e
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    /// Momentum magnitude.
    pub fn p(&self) -> f64 {
        (self.px * self.px + self.py * self.py + self.pz * self.pz).sqrt()
    }

    /// Azimuth in `(-π, π]`; 0 for a momentum along the beam.
    pub fn phi(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 { 0.0 } else { self.py.atan2(self.px) }
    }

    /// Pseudorapidity. Infinite (signed by `pz`) along the beam, 0 at rest.
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt > 0.0 {
            (self.pz / pt).asinh()
        } else if self.pz == 0.0 {
            0.0
        } else {
            f64::INFINITY.copysign(self.pz)
        }
    }

    /// Squared invariant mass.
    pub fn m2(&self) -> f64 {
        self.e * self.e - (self.px * self.px + self.py * self.py + self.pz * self.pz)
    }

    /// Invariant mass; negative for space-like vectors.
    pub fn m(&self) -> f64 {
        let m2 = self.m2();
        if m2 < 0.0 { -(-m2).sqrt() } else { m2.sqrt() }
    }

    /// Rapidity.
    pub fn rapidity(&self) -> f64 {
        0.5 * ((self.e + self.pz) / (self.e - self.pz)).ln()
    }

    /// `self.phi() - other.phi()` wrapped to `(-π, π]`.
    pub fn delta_phi(&self, other: &FourMomentum) -> f64 {
        delta_phi(self.phi(), other.phi())
    }

    /// `self.eta() - other.eta()`.
    pub fn delta_eta(&self, other: &FourMomentum) -> f64 {
        self.eta() - other.eta()
    }

    /// `sqrt(Δη² + Δφ²)`.
    pub fn delta_r(&self, other: &FourMomentum) -> f64 {
        self.delta_eta(other).hypot(self.delta_phi(other))
    }

    /// All components multiplied by `factor`, e.g. [`GEV`](crate::units::GEV).
    pub fn scaled(&self, factor: f64) -> Self {
        Self { px: self.px * factor, py: self.py * factor, pz: self.pz * factor, e: self.e * factor }
    }
}

impl Add for FourMomentum {
    type Output = FourMomentum;

    fn add(self, rhs: FourMomentum) -> FourMomentum {
        FourMomentum {
            px: self.px + rhs.px,
            py: self.py + rhs.py,
            pz: self.pz + rhs.pz,
            e: self.e + rhs.e,
        }
    }
}

impl AddAssign for FourMomentum {
    fn add_assign(&mut self, rhs: FourMomentum) {
        *self = *self + rhs;
    }
}

impl Sum for FourMomentum {
    fn sum<I: Iterator<Item = FourMomentum>>(iter: I) -> Self {
        iter.fold(FourMomentum::default(), Add::add)
    }
}

impl<'a> Sum<&'a FourMomentum> for FourMomentum {
    fn sum<I: Iterator<Item = &'a FourMomentum>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
