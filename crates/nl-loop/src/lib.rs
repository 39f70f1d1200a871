//! # nl-loop
//!
//! Multi-stream event loop for ntloop.
//!
//! - [`CorrespondenceTable`]: reco/particle position partition keyed by
//!   [`nl_core::EventKey`], built by a non-destructive pre-pass.
//! - [`drive`]: one forward pass in a given [`nl_core::LoopMode`].
//! - [`Job`]: mode validation, weights aggregation and the [`Algorithm`]
//!   lifecycle around [`drive`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithm;
pub mod driver;
pub mod progress;
pub mod streams;
pub mod sync;
pub mod weights;

pub use algorithm::{Algorithm, EventContext, FinishContext, InitContext};
pub use driver::{Job, RunReport, drive};
pub use progress::Progress;
pub use streams::StreamSet;
pub use sync::{CorrespondenceTable, TableSummary};
pub use weights::WeightsSummary;
