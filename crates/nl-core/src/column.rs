//! Physical and logical column types.
//!
//! A record source reports each column's [`PhysicalType`] and hands back
//! [`Value`]s. Consumers ask for a Rust type implementing [`FromValue`]; the
//! binder checks at bind time that the physical representation converts into
//! the requested logical one, and the conversion itself happens per record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Element type of a column (scalar or per-element for sequences).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafType {
    /// Packed boolean.
    Bool,
    /// 8-bit signed integer (`char` flags in the ntuples).
    I8,
    /// 8-bit unsigned integer.
    U8,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit unsigned integer.
    U64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// UTF-8 string.
    Str,
}

impl LeafType {
    /// Size in bytes of one element (strings report 0).
    pub fn byte_size(self) -> usize {
        match self {
            LeafType::Bool | LeafType::I8 | LeafType::U8 => 1,
            LeafType::I32 | LeafType::U32 | LeafType::F32 => 4,
            LeafType::I64 | LeafType::U64 | LeafType::F64 => 8,
            LeafType::Str => 0,
        }
    }

    /// Whether a value stored as `self` can be read as `target` without loss.
    ///
    /// Besides identity this covers numeric widening and the byte-encoded
    /// flag case (`i8`/`u8` read as `bool`, non-zero meaning `true`).
    pub fn converts_to(self, target: LeafType) -> bool {
        use LeafType::*;
        self == target
            || matches!(
                (self, target),
                (I8, Bool)
                    | (U8, Bool)
                    | (I8, I32)
                    | (I8, I64)
                    | (I32, I64)
                    | (U8, U32)
                    | (U8, U64)
                    | (U32, U64)
                    | (U32, I64)
                    | (F32, F64)
            )
    }

    fn as_str(self) -> &'static str {
        match self {
            LeafType::Bool => "bool",
            LeafType::I8 => "i8",
            LeafType::U8 => "u8",
            LeafType::I32 => "i32",
            LeafType::I64 => "i64",
            LeafType::U32 => "u32",
            LeafType::U64 => "u64",
            LeafType::F32 => "f32",
            LeafType::F64 => "f64",
            LeafType::Str => "string",
        }
    }
}

impl fmt::Display for LeafType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeafType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "bool" => LeafType::Bool,
            "i8" | "char" => LeafType::I8,
            "u8" => LeafType::U8,
            "i32" | "int" => LeafType::I32,
            "i64" => LeafType::I64,
            "u32" => LeafType::U32,
            "u64" => LeafType::U64,
            "f32" | "float" => LeafType::F32,
            "f64" | "double" => LeafType::F64,
            "string" | "str" => LeafType::Str,
            other => return Err(Error::Configuration(format!("unknown leaf type '{other}'"))),
        })
    }
}

/// Full type of a column: element type plus whether each record holds a
/// variable-length sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhysicalType {
    /// Element type.
    pub leaf: LeafType,
    /// `true` for per-record sequences (`vec<T>`).
    pub jagged: bool,
}

impl PhysicalType {
    /// One value per record.
    pub const fn scalar(leaf: LeafType) -> Self {
        Self { leaf, jagged: false }
    }

    /// One variable-length sequence per record.
    pub const fn jagged(leaf: LeafType) -> Self {
        Self { leaf, jagged: true }
    }

    /// Whether values of this type can be read as `target`.
    pub fn converts_to(self, target: PhysicalType) -> bool {
        self.jagged == target.jagged && self.leaf.converts_to(target.leaf)
    }
}

impl fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.jagged { write!(f, "vec<{}>", self.leaf) } else { write!(f, "{}", self.leaf) }
    }
}

impl FromStr for PhysicalType {
    type Err = Error;

    /// Accepts `"f32"`, `"vec<f32>"` or `"vector<float>"`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        for prefix in ["vec<", "vector<"] {
            if let Some(inner) = s.strip_prefix(prefix) {
                let inner = inner.strip_suffix('>').ok_or_else(|| {
                    Error::Configuration(format!("unterminated sequence type '{s}'"))
                })?;
                return Ok(PhysicalType::jagged(inner.parse()?));
            }
        }
        Ok(PhysicalType::scalar(s.parse()?))
    }
}

impl TryFrom<String> for PhysicalType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PhysicalType> for String {
    fn from(t: PhysicalType) -> String {
        t.to_string()
    }
}

/// One decoded column value for a single record.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    BoolVec(Vec<bool>),
    I8Vec(Vec<i8>),
    U8Vec(Vec<u8>),
    I32Vec(Vec<i32>),
    I64Vec(Vec<i64>),
    U32Vec(Vec<u32>),
    U64Vec(Vec<u64>),
    F32Vec(Vec<f32>),
    F64Vec(Vec<f64>),
    StrVec(Vec<String>),
}

impl Value {
    /// Physical type of this value.
    pub fn physical_type(&self) -> PhysicalType {
        use Value::*;
        match self {
            Bool(_) => PhysicalType::scalar(LeafType::Bool),
            I8(_) => PhysicalType::scalar(LeafType::I8),
            U8(_) => PhysicalType::scalar(LeafType::U8),
            I32(_) => PhysicalType::scalar(LeafType::I32),
            I64(_) => PhysicalType::scalar(LeafType::I64),
            U32(_) => PhysicalType::scalar(LeafType::U32),
            U64(_) => PhysicalType::scalar(LeafType::U64),
            F32(_) => PhysicalType::scalar(LeafType::F32),
            F64(_) => PhysicalType::scalar(LeafType::F64),
            Str(_) => PhysicalType::scalar(LeafType::Str),
            BoolVec(_) => PhysicalType::jagged(LeafType::Bool),
            I8Vec(_) => PhysicalType::jagged(LeafType::I8),
            U8Vec(_) => PhysicalType::jagged(LeafType::U8),
            I32Vec(_) => PhysicalType::jagged(LeafType::I32),
            I64Vec(_) => PhysicalType::jagged(LeafType::I64),
            U32Vec(_) => PhysicalType::jagged(LeafType::U32),
            U64Vec(_) => PhysicalType::jagged(LeafType::U64),
            F32Vec(_) => PhysicalType::jagged(LeafType::F32),
            F64Vec(_) => PhysicalType::jagged(LeafType::F64),
            StrVec(_) => PhysicalType::jagged(LeafType::Str),
        }
    }

    /// Empty sequence of the given element type.
    ///
    /// Returns `None` for scalar types, which have no empty value.
    pub fn empty(ty: PhysicalType) -> Option<Value> {
        if !ty.jagged {
            return None;
        }
        Some(match ty.leaf {
            LeafType::Bool => Value::BoolVec(Vec::new()),
            LeafType::I8 => Value::I8Vec(Vec::new()),
            LeafType::U8 => Value::U8Vec(Vec::new()),
            LeafType::I32 => Value::I32Vec(Vec::new()),
            LeafType::I64 => Value::I64Vec(Vec::new()),
            LeafType::U32 => Value::U32Vec(Vec::new()),
            LeafType::U64 => Value::U64Vec(Vec::new()),
            LeafType::F32 => Value::F32Vec(Vec::new()),
            LeafType::F64 => Value::F64Vec(Vec::new()),
            LeafType::Str => Value::StrVec(Vec::new()),
        })
    }

    /// Number of elements for sequences, `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        use Value::*;
        match self {
            BoolVec(v) => Some(v.len()),
            I8Vec(v) => Some(v.len()),
            U8Vec(v) => Some(v.len()),
            I32Vec(v) => Some(v.len()),
            I64Vec(v) => Some(v.len()),
            U32Vec(v) => Some(v.len()),
            U64Vec(v) => Some(v.len()),
            F32Vec(v) => Some(v.len()),
            F64Vec(v) => Some(v.len()),
            StrVec(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Convert into `target`, following [`PhysicalType::converts_to`].
    ///
    /// Returns `None` when the conversion is not allowed.
    pub fn convert(self, target: PhysicalType) -> Option<Value> {
        use Value::*;
        let source = self.physical_type();
        if source == target {
            return Some(self);
        }
        if !source.converts_to(target) {
            return None;
        }
        Some(match (self, target.leaf) {
            (I8(x), LeafType::Bool) => Bool(x != 0),
            (U8(x), LeafType::Bool) => Bool(x != 0),
            (I8(x), LeafType::I32) => I32(x.into()),
            (I8(x), LeafType::I64) => I64(x.into()),
            (I32(x), LeafType::I64) => I64(x.into()),
            (U8(x), LeafType::U32) => U32(x.into()),
            (U8(x), LeafType::U64) => U64(x.into()),
            (U32(x), LeafType::U64) => U64(x.into()),
            (U32(x), LeafType::I64) => I64(x.into()),
            (F32(x), LeafType::F64) => F64(x.into()),
            (I8Vec(v), LeafType::Bool) => BoolVec(v.into_iter().map(|x| x != 0).collect()),
            (U8Vec(v), LeafType::Bool) => BoolVec(v.into_iter().map(|x| x != 0).collect()),
            (I8Vec(v), LeafType::I32) => I32Vec(v.into_iter().map(i32::from).collect()),
            (I8Vec(v), LeafType::I64) => I64Vec(v.into_iter().map(i64::from).collect()),
            (I32Vec(v), LeafType::I64) => I64Vec(v.into_iter().map(i64::from).collect()),
            (U8Vec(v), LeafType::U32) => U32Vec(v.into_iter().map(u32::from).collect()),
            (U8Vec(v), LeafType::U64) => U64Vec(v.into_iter().map(u64::from).collect()),
            (U32Vec(v), LeafType::U64) => U64Vec(v.into_iter().map(u64::from).collect()),
            (U32Vec(v), LeafType::I64) => I64Vec(v.into_iter().map(i64::from).collect()),
            (F32Vec(v), LeafType::F64) => F64Vec(v.into_iter().map(f64::from).collect()),
            _ => return None,
        })
    }
}

/// Rust types that a bound column can be read as.
pub trait FromValue: Sized + 'static {
    /// Logical type this Rust type corresponds to.
    fn logical_type() -> PhysicalType;

    /// Borrow the payload of a value already converted to [`Self::logical_type`].
    fn from_value_ref(value: &Value) -> Option<&Self>;

    /// Take the payload of a value already converted to [`Self::logical_type`].
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! impl_value_type {
    ($ty:ty, $variant:ident, $leaf:ident, $jagged:expr) => {
        impl FromValue for $ty {
            fn logical_type() -> PhysicalType {
                PhysicalType { leaf: LeafType::$leaf, jagged: $jagged }
            }

            fn from_value_ref(value: &Value) -> Option<&Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Value {
                Value::$variant(v)
            }
        }
    };
}

impl_value_type!(bool, Bool, Bool, false);
impl_value_type!(i8, I8, I8, false);
impl_value_type!(u8, U8, U8, false);
impl_value_type!(i32, I32, I32, false);
impl_value_type!(i64, I64, I64, false);
impl_value_type!(u32, U32, U32, false);
impl_value_type!(u64, U64, U64, false);
impl_value_type!(f32, F32, F32, false);
impl_value_type!(f64, F64, F64, false);
impl_value_type!(String, Str, Str, false);
impl_value_type!(Vec<bool>, BoolVec, Bool, true);
impl_value_type!(Vec<i8>, I8Vec, I8, true);
impl_value_type!(Vec<u8>, U8Vec, U8, true);
impl_value_type!(Vec<i32>, I32Vec, I32, true);
impl_value_type!(Vec<i64>, I64Vec, I64, true);
impl_value_type!(Vec<u32>, U32Vec, U32, true);
impl_value_type!(Vec<u64>, U64Vec, U64, true);
impl_value_type!(Vec<f32>, F32Vec, F32, true);
impl_value_type!(Vec<f64>, F64Vec, F64, true);
impl_value_type!(Vec<String>, StrVec, Str, true);
