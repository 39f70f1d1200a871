//! # nl-edm
//!
//! Event-scoped physics objects built by user algorithms from bound columns.
//! Everything here is a plain value: build it for the current event, drop or
//! [`FinalState::clear`] it before the next.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod final_state;
pub mod kinematics;
pub mod lepton_pair;
pub mod objects;
pub mod units;

pub use final_state::FinalState;
pub use kinematics::{FourMomentum, delta_phi};
pub use lepton_pair::{LeptonPair, PairCharge, PairFlavor};
pub use objects::{Jet, Lepton, Met, PDG_ELECTRON, PDG_MUON};
pub use units::{GEV, GEV_TO_TEV, TEV};
