//! Forward-only record cursor.
//!
//! A [`RecordStream`] wraps one [`RecordSource`] and owns the value slots of
//! every column bound to it. Moving the cursor drops the decoded values; the
//! next access decodes again from the source, once per record.
//!
//! State machine: `Ready` (possibly before the first record) →
//! `Ready` on each successful move → `Exhausted` (terminal).

use std::cell::{Ref, RefCell};

use nl_core::{
    Error, EventKey, FromValue, KeyColumns, PhysicalType, RecordSource, Result, SchemaVersion,
    StreamKind, Value,
};

use crate::binder::{AnyColumn, ColumnHandle};

/// Cursor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Open; records may remain.
    Ready,
    /// Advanced past the last record. Terminal.
    Exhausted,
}

/// One bound column.
#[derive(Debug)]
struct Slot {
    logical_name: String,
    physical_name: String,
    physical: PhysicalType,
    logical: PhysicalType,
    cache: RefCell<Option<Value>>,
}

/// Forward-only cursor over one record source.
pub struct RecordStream {
    kind: StreamKind,
    source: Box<dyn RecordSource>,
    keys: KeyColumns,
    state: StreamState,
    position: Option<u64>,
    slots: Vec<Slot>,
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("kind", &self.kind)
            .field("source", &self.source.name())
            .field("state", &self.state)
            .field("position", &self.position)
            .field("bound", &self.slots.len())
            .finish()
    }
}

impl RecordStream {
    /// Open a stream over `source`. The cursor sits before the first record.
    pub fn open(kind: StreamKind, source: Box<dyn RecordSource>) -> Self {
        tracing::debug!(
            stream = %kind,
            source = source.name(),
            entries = source.n_entries(),
            schema = %source.schema_version(),
            "stream opened"
        );
        Self {
            kind,
            source,
            keys: KeyColumns::default(),
            state: StreamState::Ready,
            position: None,
            slots: Vec::new(),
        }
    }

    /// Override the columns that make up this stream's [`EventKey`].
    pub fn with_key_columns(mut self, keys: KeyColumns) -> Self {
        self.keys = keys;
        self
    }

    /// Stream kind.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Name of the underlying source.
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Total number of records.
    pub fn length(&self) -> u64 {
        self.source.n_entries()
    }

    /// Schema version of the underlying source.
    pub fn schema_version(&self) -> SchemaVersion {
        self.source.schema_version()
    }

    /// Current position, `None` before the first record.
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    /// Cursor state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// `true` once the stream has moved past its last record.
    pub fn is_exhausted(&self) -> bool {
        self.state == StreamState::Exhausted
    }

    /// Key column names.
    pub fn key_columns(&self) -> &KeyColumns {
        &self.keys
    }

    /// Physical type of a column in the underlying source.
    pub fn physical_type(&self, column: &str) -> Option<PhysicalType> {
        self.source.physical_type(column)
    }

    /// All physical column names of the underlying source.
    pub fn column_names(&self) -> Vec<String> {
        self.source.column_names()
    }

    /// Number of bound columns.
    pub fn n_bound(&self) -> usize {
        self.slots.len()
    }

    /// Move to the next record. Returns `false` once the stream is exhausted.
    pub fn advance(&mut self) -> Result<bool> {
        if self.is_exhausted() {
            return Ok(false);
        }
        let next = self.position.map_or(0, |p| p + 1);
        if next >= self.length() {
            tracing::trace!(stream = %self.kind, "stream exhausted");
            self.state = StreamState::Exhausted;
            self.clear_values();
            return Ok(false);
        }
        self.move_to(next)?;
        Ok(true)
    }

    /// Move forward to `entry`, skipping intermediate records.
    ///
    /// Staying on the current record is a no-op. Moving backwards or past the
    /// end means the caller's index table does not match this stream, and is
    /// reported as [`Error::CorrelationInconsistency`].
    pub fn advance_to(&mut self, entry: u64) -> Result<()> {
        self.ensure_ready()?;
        if let Some(cur) = self.position {
            if entry == cur {
                return Ok(());
            }
            if entry < cur {
                return Err(Error::CorrelationInconsistency(format!(
                    "{} stream cannot move backwards from entry {} to {}",
                    self.kind, cur, entry
                )));
            }
        }
        if entry >= self.length() {
            return Err(Error::CorrelationInconsistency(format!(
                "{} stream has {} entries; entry {} requested",
                self.kind,
                self.length(),
                entry
            )));
        }
        self.move_to(entry)
    }

    /// Key of the current record.
    pub fn current_key(&self) -> Result<EventKey> {
        self.current_position()?;
        let run = self.source.read(self.keys.run_column())?;
        let event = self.source.read(&self.keys.event_number)?;
        EventKey::from_values(run, event)
    }

    /// Every record's key, without moving the cursor.
    pub fn scan_keys(&self) -> Result<Vec<EventKey>> {
        self.ensure_ready()?;
        let keys = self.source.scan_keys(&self.keys)?;
        if keys.len() as u64 != self.length() {
            return Err(Error::Source(format!(
                "{} stream '{}': key scan returned {} keys for {} entries",
                self.kind,
                self.source.name(),
                keys.len(),
                self.length()
            )));
        }
        Ok(keys)
    }

    /// Borrow the current value of a bound column.
    ///
    /// The borrow ends before the cursor can move again.
    pub fn get<T: FromValue>(&self, handle: ColumnHandle<T>) -> Result<Ref<'_, T>> {
        let value = self.slot_value(handle.stream(), handle.slot())?;
        Ref::filter_map(value, T::from_value_ref).map_err(|_| {
            Error::SchemaResolution(format!(
                "{} column slot {} does not hold {}",
                self.kind,
                handle.slot(),
                T::logical_type()
            ))
        })
    }

    /// Clone the current value of a bound column.
    pub fn value<T: FromValue + Clone>(&self, handle: ColumnHandle<T>) -> Result<T> {
        Ok(self.get(handle)?.clone())
    }

    /// Borrow the current value of an untyped column handle.
    pub fn get_any(&self, column: AnyColumn) -> Result<Ref<'_, Value>> {
        self.slot_value(column.stream(), column.slot())
    }

    /// Typed handle for a column bound earlier under `logical_name`.
    pub fn handle<T: FromValue>(&self, logical_name: &str) -> Result<ColumnHandle<T>> {
        let idx = self
            .slots
            .iter()
            .position(|s| s.logical_name == logical_name)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "column '{}' is not bound on the {} stream",
                    logical_name, self.kind
                ))
            })?;
        AnyColumn::new(self.kind, idx, self.slots[idx].logical).typed()
    }

    /// Physical column name a bound logical column resolved to.
    pub fn resolved_name(&self, logical_name: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|s| s.logical_name == logical_name)
            .map(|s| s.physical_name.as_str())
    }

    /// Register a column slot. Binding the same logical name again with the
    /// same representation returns the existing slot.
    pub(crate) fn register(
        &mut self,
        logical_name: &str,
        physical_name: &str,
        physical: PhysicalType,
        logical: PhysicalType,
    ) -> Result<usize> {
        self.ensure_ready()?;
        if let Some(idx) = self.slots.iter().position(|s| s.logical_name == logical_name) {
            let slot = &self.slots[idx];
            if slot.logical != logical || slot.physical_name != physical_name {
                return Err(Error::Configuration(format!(
                    "column '{}' on the {} stream is already bound as {} from '{}'",
                    logical_name, self.kind, slot.logical, slot.physical_name
                )));
            }
            return Ok(idx);
        }
        if self.position.is_some() {
            return Err(Error::Configuration(format!(
                "column '{}' must be bound before the {} stream starts iterating",
                logical_name, self.kind
            )));
        }
        self.slots.push(Slot {
            logical_name: logical_name.to_string(),
            physical_name: physical_name.to_string(),
            physical,
            logical,
            cache: RefCell::new(None),
        });
        Ok(self.slots.len() - 1)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_exhausted() {
            return Err(Error::Configuration(format!("{} stream is exhausted", self.kind)));
        }
        Ok(())
    }

    fn current_position(&self) -> Result<u64> {
        self.ensure_ready()?;
        self.position.ok_or_else(|| {
            Error::Configuration(format!("{} stream has no current record yet", self.kind))
        })
    }

    fn move_to(&mut self, entry: u64) -> Result<()> {
        if self.position.is_none() {
            let mut wanted: Vec<String> = self.slots.iter().map(|s| s.physical_name.clone()).collect();
            for key in [self.keys.run_column(), self.keys.event_number.as_str()] {
                if self.source.physical_type(key).is_some() && !wanted.iter().any(|w| w == key) {
                    wanted.push(key.to_string());
                }
            }
            self.source.select_columns(&wanted)?;
        }
        self.source.load(entry)?;
        self.position = Some(entry);
        self.clear_values();
        Ok(())
    }

    fn clear_values(&mut self) {
        for slot in &mut self.slots {
            *slot.cache.get_mut() = None;
        }
    }

    fn slot_value(&self, stream: StreamKind, idx: usize) -> Result<Ref<'_, Value>> {
        if stream != self.kind {
            return Err(Error::Configuration(format!(
                "handle for the {} stream used on the {} stream",
                stream, self.kind
            )));
        }
        let position = self.current_position()?;
        let slot = self.slots.get(idx).ok_or_else(|| {
            Error::Configuration(format!("{} stream has no column slot {}", self.kind, idx))
        })?;
        if slot.cache.borrow().is_none() {
            let raw = self.source.read(&slot.physical_name)?;
            let found = raw.physical_type();
            if found != slot.physical {
                return Err(Error::Source(format!(
                    "{} column '{}' at entry {}: source returned {}, schema says {}",
                    self.kind, slot.physical_name, position, found, slot.physical
                )));
            }
            let value = raw.convert(slot.logical).ok_or_else(|| {
                Error::SchemaResolution(format!(
                    "{} column '{}' cannot be read as {}",
                    self.kind, slot.physical_name, slot.logical
                ))
            })?;
            *slot.cache.borrow_mut() = Some(value);
        }
        Ref::filter_map(slot.cache.borrow(), Option::as_ref).map_err(|_| {
            Error::Source(format!("{} column '{}' has no value", self.kind, slot.physical_name))
        })
    }
}
