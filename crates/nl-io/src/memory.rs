//! In-memory record source.
//!
//! Columns are stored fully decoded, one [`Value`] per record. Used for
//! synthetic data, tests, and as the staging format for Parquet fixtures.

use nl_core::{
    Error, EventKey, FromValue, KeyColumns, PhysicalType, RecordSource, Result, SchemaVersion,
    Value,
};

#[derive(Debug, Clone)]
struct MemoryColumn {
    name: String,
    ty: PhysicalType,
    values: Vec<Value>,
}

/// Record source backed by owned, decoded columns.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    version: SchemaVersion,
    n_entries: u64,
    columns: Vec<MemoryColumn>,
    current: Option<u64>,
}

/// Builder for [`MemorySource`].
#[derive(Debug)]
pub struct MemorySourceBuilder {
    name: String,
    version: SchemaVersion,
    columns: Vec<MemoryColumn>,
}

impl MemorySourceBuilder {
    /// Add a typed column; the physical type is taken from `T`.
    pub fn column<T>(mut self, name: impl Into<String>, values: Vec<T>) -> Self
    where
        T: FromValue + Into<Value>,
    {
        self.columns.push(MemoryColumn {
            name: name.into(),
            ty: T::logical_type(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add a column from raw values with an explicit physical type.
    pub fn raw_column(mut self, name: impl Into<String>, ty: PhysicalType, values: Vec<Value>) -> Self {
        self.columns.push(MemoryColumn { name: name.into(), ty, values });
        self
    }

    /// Validate column lengths and types, then build the source.
    pub fn build(self) -> Result<MemorySource> {
        let n_entries = self.columns.first().map(|c| c.values.len()).unwrap_or(0);
        for col in &self.columns {
            if col.values.len() != n_entries {
                return Err(Error::Source(format!(
                    "memory source '{}': column '{}' has {} entries, expected {}",
                    self.name,
                    col.name,
                    col.values.len(),
                    n_entries
                )));
            }
            if let Some(bad) = col.values.iter().find(|v| v.physical_type() != col.ty) {
                return Err(Error::Source(format!(
                    "memory source '{}': column '{}' declared {} but holds {}",
                    self.name,
                    col.name,
                    col.ty,
                    bad.physical_type()
                )));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(Error::Source(format!(
                    "memory source '{}': duplicate column '{}'",
                    self.name, col.name
                )));
            }
        }
        Ok(MemorySource {
            name: self.name,
            version: self.version,
            n_entries: n_entries as u64,
            columns: self.columns,
            current: None,
        })
    }
}

impl MemorySource {
    /// Start building a source with the given schema version.
    pub fn builder(name: impl Into<String>, version: SchemaVersion) -> MemorySourceBuilder {
        MemorySourceBuilder { name: name.into(), version, columns: Vec::new() }
    }

    /// Iterate `(name, type, values)` for every column in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, PhysicalType, &[Value])> + '_ {
        self.columns.iter().map(|c| (c.name.as_str(), c.ty, c.values.as_slice()))
    }

    fn column(&self, name: &str) -> Option<&MemoryColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn require(&self, name: &str) -> Result<&MemoryColumn> {
        self.column(name).ok_or_else(|| {
            Error::Source(format!("memory source '{}' has no column '{}'", self.name, name))
        })
    }
}

impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_entries(&self) -> u64 {
        self.n_entries
    }

    fn schema_version(&self) -> SchemaVersion {
        self.version
    }

    fn physical_type(&self, column: &str) -> Option<PhysicalType> {
        self.column(column).map(|c| c.ty)
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn load(&mut self, entry: u64) -> Result<()> {
        if entry >= self.n_entries {
            return Err(Error::Source(format!(
                "memory source '{}': entry {} out of range ({} entries)",
                self.name, entry, self.n_entries
            )));
        }
        if let Some(cur) = self.current {
            if entry < cur {
                return Err(Error::Source(format!(
                    "memory source '{}': cannot rewind from entry {} to {}",
                    self.name, cur, entry
                )));
            }
        }
        self.current = Some(entry);
        Ok(())
    }

    fn read(&self, column: &str) -> Result<Value> {
        let entry = self.current.ok_or_else(|| {
            Error::Source(format!("memory source '{}': no record loaded", self.name))
        })?;
        Ok(self.require(column)?.values[entry as usize].clone())
    }

    fn scan_keys(&self, keys: &KeyColumns) -> Result<Vec<EventKey>> {
        let run = self.require(keys.run_column())?;
        let event = self.require(&keys.event_number)?;
        run.values
            .iter()
            .zip(&event.values)
            .map(|(r, e)| EventKey::from_values(r.clone(), e.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nl_core::LeafType;

    fn source() -> MemorySource {
        MemorySource::builder("reco", SchemaVersion(29))
            .column("eventNumber", vec![10u64, 11, 12])
            .column("runNumber", vec![7u32, 7, 7])
            .column("randomRunNumber", vec![300u32, 301, 302])
            .column("mu_pt", vec![vec![30_000.0f32], vec![], vec![12_000.0, 9_000.0]])
            .build()
            .unwrap()
    }

    #[test]
    fn reads_current_record() {
        let mut src = source();
        assert!(src.read("eventNumber").is_err());
        src.load(0).unwrap();
        src.load(2).unwrap();
        assert_eq!(src.read("eventNumber").unwrap(), Value::U64(12));
        assert_eq!(src.read("mu_pt").unwrap(), Value::F32Vec(vec![12_000.0, 9_000.0]));
        assert_eq!(src.physical_type("mu_pt"), Some(PhysicalType::jagged(LeafType::F32)));
    }

    #[test]
    fn refuses_rewind_and_overrun() {
        let mut src = source();
        src.load(1).unwrap();
        assert!(src.load(0).is_err());
        assert!(src.load(3).is_err());
    }

    #[test]
    fn scan_keys_does_not_move_cursor() {
        let mut src = source();
        src.load(1).unwrap();
        let keys = src.scan_keys(&KeyColumns::default()).unwrap();
        assert_eq!(keys, vec![EventKey::new(7, 10), EventKey::new(7, 11), EventKey::new(7, 12)]);
        assert_eq!(src.read("eventNumber").unwrap(), Value::U64(11));

        let random = src.scan_keys(&KeyColumns::default().with_random_run_number()).unwrap();
        assert_eq!(random[2], EventKey::new(302, 12));
    }

    #[test]
    fn build_rejects_ragged_columns() {
        let err = MemorySource::builder("bad", SchemaVersion::UNKNOWN)
            .column("a", vec![1u32, 2])
            .column("b", vec![1u32])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("column 'b'"));
    }

    #[test]
    fn build_rejects_mistyped_raw_column() {
        let err = MemorySource::builder("bad", SchemaVersion::UNKNOWN)
            .raw_column("a", PhysicalType::scalar(LeafType::U32), vec![Value::F32(1.0)])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("declared u32"));
    }
}
