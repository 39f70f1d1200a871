//! Unit conversion factors. Ntuple energies are stored in MeV.

/// MeV to GeV.
pub const GEV: f64 = 1.0e-3;

/// MeV to TeV.
pub const TEV: f64 = 1.0e-6;

/// GeV to TeV, for quantities already in GeV.
pub const GEV_TO_TEV: f64 = 1.0e-3;
