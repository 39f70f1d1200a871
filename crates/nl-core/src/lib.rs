//! # nl-core
//!
//! Shared vocabulary for the ntloop event-processing harness.
//!
//! This crate holds everything the other crates agree on: the error
//! taxonomy, stream and event identifiers, the loop modes, the typed column
//! values exchanged with record sources, and the [`RecordSource`] trait that
//! abstracts the underlying column store.
//!
//! ## Architecture
//!
//! ```text
//! nl-core (types, traits, errors)
//!    ├── nl-io   (record sources, RecordStream, ColumnBinder)
//!    │     └── nl-loop (Synchronizer, Job driver, Algorithm)
//!    ├── nl-edm  (derived physics objects)
//!    └── nl-cli  (ntloop binary)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod column;
pub mod error;
pub mod traits;
pub mod types;

pub use column::{FromValue, LeafType, PhysicalType, Value};
pub use error::{Error, ErrorKind, Result};
pub use traits::RecordSource;
pub use types::{EventKey, EventStatus, KeyColumns, LoopMode, SchemaVersion, StreamKind};
