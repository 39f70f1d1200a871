//! Core traits for ntloop
//!
//! The event loop never talks to a file format directly. Everything it needs
//! from the column store goes through [`RecordSource`], so the correlation and
//! binding logic does not depend on how records are stored.

use crate::Result;
use crate::column::{PhysicalType, Value};
use crate::types::{EventKey, KeyColumns, SchemaVersion};

/// Narrow capability surface of an external record source.
///
/// A source holds one homogeneous sequence of records. It is read forward
/// through [`load`](RecordSource::load) and [`read`](RecordSource::read), and
/// it can produce the full key sequence through
/// [`scan_keys`](RecordSource::scan_keys) without disturbing that cursor.
pub trait RecordSource {
    /// Human-readable name (file path, dataset name, ...).
    fn name(&self) -> &str;

    /// Total number of records.
    fn n_entries(&self) -> u64;

    /// Schema version tag, fixed at open time.
    fn schema_version(&self) -> SchemaVersion;

    /// Physical type of `column`, or `None` if the source has no such column.
    fn physical_type(&self, column: &str) -> Option<PhysicalType>;

    /// All column names, in storage order.
    fn column_names(&self) -> Vec<String>;

    /// Declare which columns later reads will touch.
    ///
    /// Called once before the first [`load`](RecordSource::load); sources may
    /// use it to restrict I/O. The default ignores it.
    fn select_columns(&mut self, _columns: &[String]) -> Result<()> {
        Ok(())
    }

    /// Make `entry` the current record. Entries must be non-decreasing.
    fn load(&mut self, entry: u64) -> Result<()>;

    /// Decode `column` at the current record.
    fn read(&self, column: &str) -> Result<Value>;

    /// Every record's [`EventKey`], in position order.
    ///
    /// Must not move the cursor used by [`load`](RecordSource::load).
    fn scan_keys(&self, keys: &KeyColumns) -> Result<Vec<EventKey>>;
}
