//! # nl-io
//!
//! Record sources and column binding for ntloop.
//!
//! - [`MemorySource`] / [`ParquetSource`]: implementations of
//!   [`nl_core::RecordSource`].
//! - [`RecordStream`]: a forward-only cursor over one source that owns the
//!   values of every column bound to it.
//! - [`ColumnBinder`]: resolves a logical column name to one physical
//!   representation, using the stream's schema version and the
//!   [`ColumnCatalog`] alias table.
//!
//! ## Example
//!
//! ```
//! use nl_core::{SchemaVersion, StreamKind};
//! use nl_io::{ColumnBinder, MemorySource, RecordStream};
//!
//! let src = MemorySource::builder("reco", SchemaVersion(29))
//!     .column("eventNumber", vec![100u64, 101])
//!     .column("runNumber", vec![1u32, 1])
//!     .column("el_pt", vec![vec![25_000.0f32], vec![]])
//!     .build()
//!     .unwrap();
//! let mut reco = RecordStream::open(StreamKind::Reco, Box::new(src));
//! let binder = ColumnBinder::default();
//! let el_pt = binder.bind::<Vec<f32>>(&mut reco, "el_pt").unwrap();
//!
//! while reco.advance().unwrap() {
//!     let pts = reco.get(el_pt).unwrap();
//!     println!("{} electrons", pts.len());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binder;
pub mod catalog;
pub mod memory;
pub mod parquet_source;
pub mod stream;

pub use binder::{AnyColumn, ColumnBinder, ColumnHandle};
pub use catalog::{Candidate, ColumnCatalog, ColumnSpec};
pub use memory::{MemorySource, MemorySourceBuilder};
pub use parquet_source::{
    META_KEY_SCHEMA_VERSION, ParquetSource, read_parquet_batches, record_batch_from_memory,
    write_parquet, write_parquet_bytes,
};
pub use stream::{RecordStream, StreamState};
