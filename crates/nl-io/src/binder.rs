//! Column binding.
//!
//! [`ColumnBinder::bind`] turns a logical column name into a typed
//! [`ColumnHandle`] on one [`RecordStream`]. Which physical column backs the
//! handle is decided once, at bind time, from the stream's schema version.

use std::fmt;
use std::marker::PhantomData;

use nl_core::{Error, FromValue, PhysicalType, Result, StreamKind};

use crate::catalog::{ColumnCatalog, ColumnSpec};
use crate::stream::RecordStream;

/// Typed handle to a bound column. Cheap to copy.
pub struct ColumnHandle<T> {
    stream: StreamKind,
    slot: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ColumnHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ColumnHandle<T> {}

impl<T> PartialEq for ColumnHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.stream == other.stream && self.slot == other.slot
    }
}

impl<T> Eq for ColumnHandle<T> {}

impl<T> fmt::Debug for ColumnHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColumnHandle<{}>({}#{})", std::any::type_name::<T>(), self.stream, self.slot)
    }
}

impl<T> ColumnHandle<T> {
    /// Stream the column is bound on.
    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }
}

/// Untyped handle, as returned by catalog-driven binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnyColumn {
    stream: StreamKind,
    slot: usize,
    logical: PhysicalType,
}

impl AnyColumn {
    pub(crate) fn new(stream: StreamKind, slot: usize, logical: PhysicalType) -> Self {
        Self { stream, slot, logical }
    }

    /// Stream the column is bound on.
    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    /// Logical type values are delivered as.
    pub fn logical_type(&self) -> PhysicalType {
        self.logical
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    /// Recover a typed handle. Fails if `T` is not the bound logical type.
    pub fn typed<T: FromValue>(self) -> Result<ColumnHandle<T>> {
        if T::logical_type() != self.logical {
            return Err(Error::SchemaResolution(format!(
                "{} column slot {} is bound as {}, requested {}",
                self.stream,
                self.slot,
                self.logical,
                T::logical_type()
            )));
        }
        Ok(ColumnHandle { stream: self.stream, slot: self.slot, _marker: PhantomData })
    }
}

/// Resolves logical column names against a [`ColumnCatalog`].
///
/// Names missing from the catalog bind directly to the physical column of
/// the same name.
#[derive(Debug, Clone, Default)]
pub struct ColumnBinder {
    catalog: ColumnCatalog,
}

impl ColumnBinder {
    /// Binder over `catalog`.
    pub fn with_catalog(catalog: ColumnCatalog) -> Self {
        Self { catalog }
    }

    /// Alias table in use.
    pub fn catalog(&self) -> &ColumnCatalog {
        &self.catalog
    }

    /// Bind `name` on `stream`, delivering values as `T`.
    ///
    /// Binding the same name twice returns an equal handle.
    pub fn bind<T: FromValue>(&self, stream: &mut RecordStream, name: &str) -> Result<ColumnHandle<T>> {
        self.bind_as(stream, name, T::logical_type())?.typed()
    }

    /// Untyped [`bind`](Self::bind).
    pub fn bind_as(
        &self,
        stream: &mut RecordStream,
        name: &str,
        logical: PhysicalType,
    ) -> Result<AnyColumn> {
        match self.catalog.get(stream.kind(), name) {
            Some(spec) if spec.logical != logical => Err(Error::SchemaResolution(format!(
                "column '{}' on the {} stream is declared as {}, requested {}",
                name,
                stream.kind(),
                spec.logical,
                logical
            ))),
            Some(spec) => bind_spec(stream, spec),
            None => bind_spec(stream, &ColumnSpec::new(name, stream.kind(), logical)),
        }
    }

    /// Bind every catalog column declared for `stream`'s kind.
    ///
    /// Optional columns that do not resolve are skipped.
    pub fn bind_catalog(&self, stream: &mut RecordStream) -> Result<Vec<(String, AnyColumn)>> {
        let mut bound = Vec::new();
        for spec in self.catalog.for_stream(stream.kind()) {
            match bind_spec(stream, spec) {
                Ok(col) => bound.push((spec.name.clone(), col)),
                Err(e @ Error::SchemaResolution(_)) if spec.optional => {
                    tracing::debug!(stream = %stream.kind(), column = %spec.name, "optional column skipped: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(bound)
    }
}

/// Bind one spec on `stream`.
pub(crate) fn bind_spec(stream: &mut RecordStream, spec: &ColumnSpec) -> Result<AnyColumn> {
    if spec.stream != stream.kind() {
        return Err(Error::Configuration(format!(
            "column '{}' is declared for the {} stream, not {}",
            spec.name,
            spec.stream,
            stream.kind()
        )));
    }
    if stream.is_exhausted() {
        return Err(Error::Configuration(format!(
            "cannot bind '{}': {} stream is exhausted",
            spec.name,
            stream.kind()
        )));
    }
    let (physical_name, physical) = resolve(stream, spec)?;
    let slot = stream.register(&spec.name, &physical_name, physical, spec.logical)?;
    tracing::debug!(
        stream = %stream.kind(),
        column = %spec.name,
        physical = %physical_name,
        ty = %physical,
        schema = %stream.schema_version(),
        "column bound"
    );
    Ok(AnyColumn::new(stream.kind(), slot, spec.logical))
}

fn resolve(stream: &RecordStream, spec: &ColumnSpec) -> Result<(String, PhysicalType)> {
    let version = stream.schema_version();
    let mut tried = Vec::new();
    for cand in spec.candidates_newest_first() {
        if !cand.applies_to(version) {
            tried.push(format!("'{}' (not valid for {})", cand.physical, version));
            continue;
        }
        let Some(found) = stream.physical_type(&cand.physical) else {
            tried.push(format!("'{}' (absent)", cand.physical));
            continue;
        };
        if cand.physical_type.is_some_and(|want| want != found) {
            tried.push(format!("'{}' (stored as {})", cand.physical, found));
            continue;
        }
        if !found.converts_to(spec.logical) {
            tried.push(format!("'{}' ({} does not convert to {})", cand.physical, found, spec.logical));
            continue;
        }
        return Ok((cand.physical, found));
    }
    Err(Error::SchemaResolution(format!(
        "column '{}' on the {} stream has no representation for schema {}; tried {}",
        spec.name,
        stream.kind(),
        version,
        tried.join(", ")
    )))
}
