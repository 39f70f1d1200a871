//! Parquet record source.
//!
//! One Parquet file holds one stream. Columns map to physical types as:
//!
//! | Arrow type                      | Physical type  |
//! |---------------------------------|----------------|
//! | `Boolean`, `Int8`, `UInt8`      | `bool`, `i8`, `u8` |
//! | `Int32`, `Int64`, `UInt32`, `UInt64` | `i32`, `i64`, `u32`, `u64` |
//! | `Float32`, `Float64`            | `f32`, `f64`   |
//! | `Utf8`                          | `string`       |
//! | `List<T>` of any of the above   | `vec<T>`       |
//!
//! Other column types are ignored. The schema version is read from the
//! [`META_KEY_SCHEMA_VERSION`] metadata entry (`"28"` or `"v28"`); files
//! without it report [`SchemaVersion::UNKNOWN`].
//!
//! Records are read forward in batches, projected to the columns selected
//! through [`RecordSource::select_columns`].

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, BooleanBuilder, Float32Array, Float64Array, Int8Array,
    Int32Array, Int64Array, ListArray, ListBuilder, StringArray, StringBuilder, UInt8Array,
    UInt32Array, UInt64Array,
};
use arrow::datatypes::{
    DataType, Field, Float32Type, Float64Type, Int8Type, Int32Type, Int64Type, Schema, SchemaRef,
    UInt8Type, UInt32Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::ChunkReader;

use nl_core::{
    Error, EventKey, FromValue, KeyColumns, LeafType, PhysicalType, RecordSource, Result,
    SchemaVersion, Value,
};

use crate::memory::MemorySource;

/// Metadata key carrying the schema version.
pub const META_KEY_SCHEMA_VERSION: &str = "ntloop.schema_version";

const DEFAULT_BATCH_SIZE: usize = 8192;

#[derive(Debug, Clone)]
enum Input {
    File(PathBuf),
    Bytes(Bytes),
}

/// Record source reading one Parquet file.
pub struct ParquetSource {
    name: String,
    input: Input,
    schema: SchemaRef,
    columns: Vec<(String, PhysicalType)>,
    version: SchemaVersion,
    n_entries: u64,
    batch_size: usize,
    selected: Option<Vec<String>>,
    reader: Option<ParquetRecordBatchReader>,
    batch: Option<RecordBatch>,
    batch_start: u64,
    current: Option<u64>,
}

impl std::fmt::Debug for ParquetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSource")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("n_entries", &self.n_entries)
            .field("columns", &self.columns.len())
            .field("current", &self.current)
            .finish()
    }
}

impl ParquetSource {
    /// Open a Parquet file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::Source(format!("failed to open {}: {e}", path.display()))
        })?;
        Self::from_reader(path.display().to_string(), Input::File(path.to_path_buf()), file)
    }

    /// Read Parquet data held in memory.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        Self::from_reader(name.into(), Input::Bytes(data.clone()), data)
    }

    /// Override the schema version found in the file metadata.
    pub fn with_schema_version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    /// Rows decoded per batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Arrow schema of the file, including unsupported columns.
    pub fn arrow_schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn from_reader<R: ChunkReader + 'static>(name: String, input: Input, reader: R) -> Result<Self> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(reader)
            .map_err(|e| Error::Source(format!("failed to read Parquet metadata of {name}: {e}")))?;
        let schema = builder.schema().clone();
        let file_meta = builder.metadata().file_metadata();
        let n_entries = u64::try_from(file_meta.num_rows())
            .map_err(|_| Error::Source(format!("{name}: negative row count")))?;

        let tag = schema.metadata().get(META_KEY_SCHEMA_VERSION).cloned().or_else(|| {
            file_meta.key_value_metadata().and_then(|kv| {
                kv.iter().find(|e| e.key == META_KEY_SCHEMA_VERSION).and_then(|e| e.value.clone())
            })
        });
        let version = match tag {
            Some(tag) => tag.parse::<SchemaVersion>().map_err(|_| {
                Error::Source(format!("{name}: invalid {META_KEY_SCHEMA_VERSION} '{tag}'"))
            })?,
            None => SchemaVersion::UNKNOWN,
        };

        let mut columns = Vec::new();
        for field in schema.fields() {
            match physical_type_of(field.data_type()) {
                Some(ty) => columns.push((field.name().clone(), ty)),
                None => tracing::debug!(
                    source = %name,
                    column = %field.name(),
                    data_type = %field.data_type(),
                    "unsupported column type, ignored"
                ),
            }
        }
        tracing::debug!(source = %name, entries = n_entries, schema = %version, "parquet source opened");

        Ok(Self {
            name,
            input,
            schema,
            columns,
            version,
            n_entries,
            batch_size: DEFAULT_BATCH_SIZE,
            selected: None,
            reader: None,
            batch: None,
            batch_start: 0,
            current: None,
        })
    }

    fn projected_reader(&self, columns: &[String], batch_size: usize) -> Result<ParquetRecordBatchReader> {
        match &self.input {
            Input::File(path) => {
                let file = File::open(path).map_err(|e| {
                    Error::Source(format!("failed to open {}: {e}", path.display()))
                })?;
                build_reader(&self.name, file, &self.schema, columns, batch_size)
            }
            Input::Bytes(data) => build_reader(&self.name, data.clone(), &self.schema, columns, batch_size),
        }
    }

    fn next_batch(&mut self) -> Result<bool> {
        if self.reader.is_none() {
            let wanted = match &self.selected {
                Some(cols) => cols.clone(),
                None => self.columns.iter().map(|(n, _)| n.clone()).collect(),
            };
            self.reader = Some(self.projected_reader(&wanted, self.batch_size)?);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };
        match reader.next() {
            Some(Ok(batch)) => {
                if let Some(prev) = self.batch.take() {
                    self.batch_start += prev.num_rows() as u64;
                }
                self.batch = Some(batch);
                Ok(true)
            }
            Some(Err(e)) => Err(Error::Source(format!("{}: failed to decode batch: {e}", self.name))),
            None => Ok(false),
        }
    }

    fn column_type(&self, column: &str) -> Option<PhysicalType> {
        self.columns.iter().find(|(n, _)| n == column).map(|(_, t)| *t)
    }
}

fn build_reader<R: ChunkReader + 'static>(
    name: &str,
    reader: R,
    schema: &Schema,
    columns: &[String],
    batch_size: usize,
) -> Result<ParquetRecordBatchReader> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(reader)
        .map_err(|e| Error::Source(format!("failed to reopen {name}: {e}")))?;
    let mut indices = Vec::with_capacity(columns.len());
    for col in columns {
        let idx = schema
            .index_of(col)
            .map_err(|_| Error::Source(format!("{name} has no column '{col}'")))?;
        indices.push(idx);
    }
    let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
    builder
        .with_projection(mask)
        .with_batch_size(batch_size)
        .build()
        .map_err(|e| Error::Source(format!("failed to build reader for {name}: {e}")))
}

impl RecordSource for ParquetSource {
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
        self.column_type(column)
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    fn select_columns(&mut self, columns: &[String]) -> Result<()> {
        if self.reader.is_some() {
            return Err(Error::Source(format!(
                "{}: columns must be selected before the first record is loaded",
                self.name
            )));
        }
        for col in columns {
            if self.column_type(col).is_none() {
                return Err(Error::Source(format!("{} has no readable column '{col}'", self.name)));
            }
        }
        tracing::trace!(source = %self.name, columns = columns.len(), "projection selected");
        self.selected = Some(columns.to_vec());
        Ok(())
    }

    fn load(&mut self, entry: u64) -> Result<()> {
        if entry >= self.n_entries {
            return Err(Error::Source(format!(
                "{}: entry {} out of range ({} entries)",
                self.name, entry, self.n_entries
            )));
        }
        if let Some(cur) = self.current {
            if entry < cur {
                return Err(Error::Source(format!(
                    "{}: cannot rewind from entry {} to {}",
                    self.name, cur, entry
                )));
            }
        }
        loop {
            let end = self.batch.as_ref().map_or(self.batch_start, |b| self.batch_start + b.num_rows() as u64);
            if self.batch.is_some() && entry < end {
                break;
            }
            if !self.next_batch()? {
                return Err(Error::Source(format!(
                    "{}: reader ended before entry {}",
                    self.name, entry
                )));
            }
        }
        self.current = Some(entry);
        Ok(())
    }

    fn read(&self, column: &str) -> Result<Value> {
        let (Some(entry), Some(batch)) = (self.current, self.batch.as_ref()) else {
            return Err(Error::Source(format!("{}: no record loaded", self.name)));
        };
        let ty = self
            .column_type(column)
            .ok_or_else(|| Error::Source(format!("{} has no readable column '{column}'", self.name)))?;
        let array = batch.column_by_name(column).ok_or_else(|| {
            Error::Source(format!("{}: column '{column}' was not selected", self.name))
        })?;
        value_at(array.as_ref(), (entry - self.batch_start) as usize, ty)
            .map_err(|e| Error::Source(format!("{} column '{column}' entry {entry}: {e}", self.name)))
    }

    fn scan_keys(&self, keys: &KeyColumns) -> Result<Vec<EventKey>> {
        let run_col = keys.run_column().to_string();
        let event_col = keys.event_number.clone();
        let run_ty = self
            .column_type(&run_col)
            .ok_or_else(|| Error::Source(format!("{} has no key column '{run_col}'", self.name)))?;
        let event_ty = self
            .column_type(&event_col)
            .ok_or_else(|| Error::Source(format!("{} has no key column '{event_col}'", self.name)))?;

        let reader = self.projected_reader(&[run_col.clone(), event_col.clone()], DEFAULT_BATCH_SIZE)?;
        let mut out = Vec::with_capacity(self.n_entries as usize);
        for batch in reader {
            let batch = batch.map_err(|e| Error::Source(format!("{}: key scan failed: {e}", self.name)))?;
            let (Some(run), Some(event)) = (batch.column_by_name(&run_col), batch.column_by_name(&event_col))
            else {
                return Err(Error::Source(format!("{}: key columns missing from scan", self.name)));
            };
            for row in 0..batch.num_rows() {
                let r = value_at(run.as_ref(), row, run_ty)?;
                let e = value_at(event.as_ref(), row, event_ty)?;
                out.push(EventKey::from_values(r, e)?);
            }
        }
        Ok(out)
    }
}

fn leaf_of(dt: &DataType) -> Option<LeafType> {
    Some(match dt {
        DataType::Boolean => LeafType::Bool,
        DataType::Int8 => LeafType::I8,
        DataType::UInt8 => LeafType::U8,
        DataType::Int32 => LeafType::I32,
        DataType::Int64 => LeafType::I64,
        DataType::UInt32 => LeafType::U32,
        DataType::UInt64 => LeafType::U64,
        DataType::Float32 => LeafType::F32,
        DataType::Float64 => LeafType::F64,
        DataType::Utf8 => LeafType::Str,
        _ => return None,
    })
}

fn physical_type_of(dt: &DataType) -> Option<PhysicalType> {
    match dt {
        DataType::List(item) => leaf_of(item.data_type()).map(PhysicalType::jagged),
        other => leaf_of(other).map(PhysicalType::scalar),
    }
}

fn mismatch(want: &str) -> Error {
    Error::Source(format!("array is not {want}"))
}

macro_rules! primitive_at {
    ($array:expr, $row:expr, $arrow:ty, $variant:ident) => {
        Value::$variant($array.as_primitive_opt::<$arrow>().ok_or_else(|| mismatch(stringify!($arrow)))?.value($row))
    };
}

macro_rules! primitive_vec {
    ($array:expr, $arrow:ty, $variant:ident) => {{
        let arr = $array.as_primitive_opt::<$arrow>().ok_or_else(|| mismatch(stringify!($arrow)))?;
        Value::$variant(arr.values().to_vec())
    }};
}

fn value_at(array: &dyn Array, row: usize, ty: PhysicalType) -> Result<Value> {
    if row >= array.len() {
        return Err(Error::Source(format!("row {row} outside batch of {}", array.len())));
    }
    if ty.jagged {
        let list = array.as_list_opt::<i32>().ok_or_else(|| mismatch("a list"))?;
        if list.is_null(row) {
            return Value::empty(ty).ok_or_else(|| mismatch("a list"));
        }
        return list_values(list.value(row).as_ref(), ty.leaf);
    }
    if array.is_null(row) {
        return Err(Error::Source(format!("null at row {row}")));
    }
    Ok(match ty.leaf {
        LeafType::Bool => Value::Bool(array.as_boolean_opt().ok_or_else(|| mismatch("Boolean"))?.value(row)),
        LeafType::I8 => primitive_at!(array, row, Int8Type, I8),
        LeafType::U8 => primitive_at!(array, row, UInt8Type, U8),
        LeafType::I32 => primitive_at!(array, row, Int32Type, I32),
        LeafType::I64 => primitive_at!(array, row, Int64Type, I64),
        LeafType::U32 => primitive_at!(array, row, UInt32Type, U32),
        LeafType::U64 => primitive_at!(array, row, UInt64Type, U64),
        LeafType::F32 => primitive_at!(array, row, Float32Type, F32),
        LeafType::F64 => primitive_at!(array, row, Float64Type, F64),
        LeafType::Str => {
            Value::Str(array.as_string_opt::<i32>().ok_or_else(|| mismatch("Utf8"))?.value(row).to_string())
        }
    })
}

fn list_values(values: &dyn Array, leaf: LeafType) -> Result<Value> {
    if values.null_count() > 0 {
        return Err(Error::Source("null element inside a list".into()));
    }
    Ok(match leaf {
        LeafType::Bool => {
            let arr = values.as_boolean_opt().ok_or_else(|| mismatch("Boolean"))?;
            Value::BoolVec(arr.iter().map(|v| v.unwrap_or(false)).collect())
        }
        LeafType::I8 => primitive_vec!(values, Int8Type, I8Vec),
        LeafType::U8 => primitive_vec!(values, UInt8Type, U8Vec),
        LeafType::I32 => primitive_vec!(values, Int32Type, I32Vec),
        LeafType::I64 => primitive_vec!(values, Int64Type, I64Vec),
        LeafType::U32 => primitive_vec!(values, UInt32Type, U32Vec),
        LeafType::U64 => primitive_vec!(values, UInt64Type, U64Vec),
        LeafType::F32 => primitive_vec!(values, Float32Type, F32Vec),
        LeafType::F64 => primitive_vec!(values, Float64Type, F64Vec),
        LeafType::Str => {
            let arr = values.as_string_opt::<i32>().ok_or_else(|| mismatch("Utf8"))?;
            Value::StrVec(arr.iter().map(|v| v.unwrap_or_default().to_string()).collect())
        }
    })
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn typed<T: FromValue + Clone>(column: &str, values: &[Value]) -> Result<Vec<T>> {
    values
        .iter()
        .map(|v| {
            T::from_value_ref(v).cloned().ok_or_else(|| {
                Error::Source(format!("column '{column}' holds {} values", v.physical_type()))
            })
        })
        .collect()
}

macro_rules! primitive_list {
    ($column:expr, $values:expr, $rust:ty, $arrow:ty) => {{
        let rows = typed::<Vec<$rust>>($column, $values)?;
        Arc::new(ListArray::from_iter_primitive::<$arrow, _, _>(
            rows.into_iter().map(|r| Some(r.into_iter().map(Some))),
        )) as ArrayRef
    }};
}

fn column_array(column: &str, ty: PhysicalType, values: &[Value]) -> Result<ArrayRef> {
    if !ty.jagged {
        return Ok(match ty.leaf {
            LeafType::Bool => Arc::new(BooleanArray::from(typed::<bool>(column, values)?)),
            LeafType::I8 => Arc::new(Int8Array::from(typed::<i8>(column, values)?)),
            LeafType::U8 => Arc::new(UInt8Array::from(typed::<u8>(column, values)?)),
            LeafType::I32 => Arc::new(Int32Array::from(typed::<i32>(column, values)?)),
            LeafType::I64 => Arc::new(Int64Array::from(typed::<i64>(column, values)?)),
            LeafType::U32 => Arc::new(UInt32Array::from(typed::<u32>(column, values)?)),
            LeafType::U64 => Arc::new(UInt64Array::from(typed::<u64>(column, values)?)),
            LeafType::F32 => Arc::new(Float32Array::from(typed::<f32>(column, values)?)),
            LeafType::F64 => Arc::new(Float64Array::from(typed::<f64>(column, values)?)),
            LeafType::Str => Arc::new(StringArray::from(typed::<String>(column, values)?)),
        });
    }
    Ok(match ty.leaf {
        LeafType::Bool => {
            let mut b = ListBuilder::new(BooleanBuilder::new());
            for row in typed::<Vec<bool>>(column, values)? {
                for v in row {
                    b.values().append_value(v);
                }
                b.append(true);
            }
            Arc::new(b.finish())
        }
        LeafType::Str => {
            let mut b = ListBuilder::new(StringBuilder::new());
            for row in typed::<Vec<String>>(column, values)? {
                for v in row {
                    b.values().append_value(v);
                }
                b.append(true);
            }
            Arc::new(b.finish())
        }
        LeafType::I8 => primitive_list!(column, values, i8, Int8Type),
        LeafType::U8 => primitive_list!(column, values, u8, UInt8Type),
        LeafType::I32 => primitive_list!(column, values, i32, Int32Type),
        LeafType::I64 => primitive_list!(column, values, i64, Int64Type),
        LeafType::U32 => primitive_list!(column, values, u32, UInt32Type),
        LeafType::U64 => primitive_list!(column, values, u64, UInt64Type),
        LeafType::F32 => primitive_list!(column, values, f32, Float32Type),
        LeafType::F64 => primitive_list!(column, values, f64, Float64Type),
    })
}

/// Build an Arrow [`RecordBatch`] from a [`MemorySource`].
///
/// The source's schema version is stored under [`META_KEY_SCHEMA_VERSION`]
/// unless it is [`SchemaVersion::UNKNOWN`].
pub fn record_batch_from_memory(source: &MemorySource) -> Result<RecordBatch> {
    let mut fields = Vec::new();
    let mut arrays = Vec::new();
    for (name, ty, values) in source.columns() {
        let array = column_array(name, ty, values)?;
        fields.push(Field::new(name, array.data_type().clone(), false));
        arrays.push(array);
    }
    let version = source.schema_version();
    let metadata = if version == SchemaVersion::UNKNOWN {
        HashMap::new()
    } else {
        HashMap::from([(META_KEY_SCHEMA_VERSION.to_string(), version.0.to_string())])
    };
    let schema = Arc::new(Schema::new(fields).with_metadata(metadata));
    RecordBatch::try_new(schema, arrays)
        .map_err(|e| Error::Source(format!("failed to build RecordBatch for {}: {e}", source.name())))
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder().set_compression(Compression::SNAPPY).build()
}

/// Write a batch to a Parquet file.
pub fn write_parquet(path: impl AsRef<Path>, batch: &RecordBatch) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(|e| Error::Source(format!("failed to create {}: {e}", path.display())))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties()))
        .map_err(|e| Error::Source(format!("failed to create Parquet writer: {e}")))?;
    writer.write(batch).map_err(|e| Error::Source(format!("failed to write Parquet: {e}")))?;
    writer.close().map_err(|e| Error::Source(format!("failed to close Parquet writer: {e}")))?;
    Ok(())
}

/// Write a batch to Parquet bytes in memory.
pub fn write_parquet_bytes(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(writer_properties()))
        .map_err(|e| Error::Source(format!("failed to create Parquet writer: {e}")))?;
    writer.write(batch).map_err(|e| Error::Source(format!("failed to write Parquet: {e}")))?;
    writer.close().map_err(|e| Error::Source(format!("failed to close Parquet writer: {e}")))?;
    Ok(buf)
}

/// Read every batch of a Parquet file.
pub fn read_parquet_batches(path: impl AsRef<Path>) -> Result<Vec<RecordBatch>> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::Source(format!("failed to open {}: {e}", path.display())))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|b| b.build())
        .map_err(|e| Error::Source(format!("failed to read {}: {e}", path.display())))?;
    reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Source(format!("failed to decode {}: {e}", path.display())))
}
