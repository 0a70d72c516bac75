//! Column types, values and index schemas.
//!
//! Keys are stored fixed-width: integers in little-endian at their natural
//! width, `Float8` as IEEE bits, `Uuid` as 16 raw bytes and `Text` zero-padded
//! to an 8/16/32 byte bucket.

pub mod compare;
pub mod encoding;

pub use compare::{BoundValue, KeyComparator};
pub use encoding::{decode_value, encode_value, ordered_u64, text_bucket};

use crate::error::{Error, Result};

/// Maximum number of INCLUDE columns.
pub const MAX_INCLUDE_COLUMNS: usize = 16;

/// Maximum number of key columns.
pub const MAX_KEY_COLUMNS: usize = 2;

/// Longest text value that can be indexed, in bytes.
pub const MAX_TEXT_LEN: usize = 32;

/// The type of an indexed or included column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyType {
    /// 16-bit signed integer.
    Int2 = 1,
    /// 32-bit signed integer.
    Int4 = 2,
    /// 64-bit signed integer.
    Int8 = 3,
    /// Days since epoch, stored as a 32-bit signed integer.
    Date = 4,
    /// Microseconds since epoch, stored as a 64-bit signed integer.
    Timestamp = 5,
    /// 64-bit float, ordered by `f64::total_cmp` after `-0.0` is folded
    /// into `0.0` and NaNs into a single NaN that sorts last.
    Float8 = 6,
    /// 16 raw bytes ordered bytewise.
    Uuid = 7,
    /// UTF-8 text of at most 32 bytes without NUL characters.
    Text = 8,
}

impl KeyType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(KeyType::Int2),
            2 => Some(KeyType::Int4),
            3 => Some(KeyType::Int8),
            4 => Some(KeyType::Date),
            5 => Some(KeyType::Timestamp),
            6 => Some(KeyType::Float8),
            7 => Some(KeyType::Uuid),
            8 => Some(KeyType::Text),
            _ => None,
        }
    }

    /// Stored width for fixed-width types; `None` for text, whose width is
    /// chosen per build.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            KeyType::Int2 => Some(2),
            KeyType::Int4 | KeyType::Date => Some(4),
            KeyType::Int8 | KeyType::Timestamp | KeyType::Float8 => Some(8),
            KeyType::Uuid => Some(16),
            KeyType::Text => None,
        }
    }

    /// True for types ordered as signed machine integers.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            KeyType::Int2 | KeyType::Int4 | KeyType::Int8 | KeyType::Date | KeyType::Timestamp
        )
    }

    /// True for the text type.
    pub fn is_text(self) -> bool {
        self == KeyType::Text
    }

    /// Human readable type name.
    pub fn name(self) -> &'static str {
        match self {
            KeyType::Int2 => "int2",
            KeyType::Int4 => "int4",
            KeyType::Int8 => "int8",
            KeyType::Date => "date",
            KeyType::Timestamp => "timestamp",
            KeyType::Float8 => "float8",
            KeyType::Uuid => "uuid",
            KeyType::Text => "text",
        }
    }
}

/// Ordering rules for text columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Collation {
    /// Bytewise ordering. Enables every byte-comparison optimization.
    #[default]
    Binary = 0,
    /// ASCII case-insensitive ordering; routed through the generic comparator.
    CaseInsensitive = 1,
}

impl Collation {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Collation::Binary),
            1 => Some(Collation::CaseInsensitive),
            _ => None,
        }
    }
}

/// A column of the index schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name, used in error messages.
    pub name: String,
    /// Column type.
    pub ty: KeyType,
    /// Collation (text only).
    pub collation: Collation,
}

impl Column {
    /// Create a column with the binary collation.
    pub fn new(name: impl Into<String>, ty: KeyType) -> Self {
        Self { name: name.into(), ty, collation: Collation::Binary }
    }

    /// Set the collation.
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }
}

/// Key and INCLUDE columns of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// One or two key columns.
    pub keys: Vec<Column>,
    /// Up to sixteen payload columns.
    pub includes: Vec<Column>,
}

impl Schema {
    /// Create a schema from key columns.
    pub fn new(keys: Vec<Column>) -> Self {
        Self { keys, includes: Vec::new() }
    }

    /// Single key column schema.
    pub fn single(name: impl Into<String>, ty: KeyType) -> Self {
        Self::new(vec![Column::new(name, ty)])
    }

    /// Add INCLUDE columns.
    pub fn with_includes(mut self, includes: Vec<Column>) -> Self {
        self.includes = includes;
        self
    }

    /// Number of key columns.
    pub fn nkeys(&self) -> usize {
        self.keys.len()
    }

    /// Number of columns in every row (keys then includes).
    pub fn natts(&self) -> usize {
        self.keys.len() + self.includes.len()
    }

    /// Check that the schema can be indexed.
    pub fn validate(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(Error::unsupported("at least one key column is required"));
        }
        if self.keys.len() > MAX_KEY_COLUMNS {
            return Err(Error::unsupported(format!(
                "at most {} key columns are supported, got {}",
                MAX_KEY_COLUMNS,
                self.keys.len()
            )));
        }
        if self.includes.len() > MAX_INCLUDE_COLUMNS {
            return Err(Error::unsupported(format!(
                "at most {} INCLUDE columns are supported, got {}",
                MAX_INCLUDE_COLUMNS,
                self.includes.len()
            )));
        }
        if self.keys.len() == 2 && self.keys.iter().any(|c| c.ty.is_text()) {
            return Err(Error::unsupported("two-column keys must be fixed-width types"));
        }
        for col in self.keys.iter().chain(self.includes.iter()) {
            if col.collation != Collation::Binary && !col.ty.is_text() {
                return Err(Error::unsupported(format!(
                    "collation on non-text column {}",
                    col.name
                )));
            }
        }
        Ok(())
    }
}

/// A column value as supplied to a build or returned by a scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL. Never stored.
    Null,
    /// Any integer-ordered type.
    Int(i64),
    /// Float8.
    Float(f64),
    /// Uuid bytes.
    Bytes(Vec<u8>),
    /// Text.
    Text(String),
}

impl Value {
    /// True for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}
