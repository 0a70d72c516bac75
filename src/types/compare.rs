//! Key comparison.
//!
//! [`KeyComparator`] is the comparator object handed to sorts, the leaf
//! packer and the scan engine. Integer widths take an inline fast path;
//! everything else goes through the generic per-type comparison.

use super::encoding::{canonical_f64, read_f64, read_int, trim_text};
use super::{Collation, KeyType, Value};
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::cmp::Ordering;

/// Compares stored keys of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyComparator {
    ty: KeyType,
    collation: Collation,
}

/// A scan argument converted to the comparison domain of a column.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    /// Integer-ordered columns.
    Int(i64),
    /// Float8 columns.
    Float(f64),
    /// Uuid columns.
    Bytes(Vec<u8>),
    /// Text columns (unpadded bytes).
    Text(Vec<u8>),
}

impl KeyComparator {
    /// Create a comparator for a column type and collation.
    pub fn new(ty: KeyType, collation: Collation) -> Self {
        Self { ty, collation }
    }

    /// Column type.
    pub fn key_type(&self) -> KeyType {
        self.ty
    }

    /// Collation.
    pub fn collation(&self) -> Collation {
        self.collation
    }

    /// True when two stored keys compare equal exactly when their bytes are
    /// equal. Only text under a non-binary collation fails this; such keys
    /// get no run-length encoding and no precomputed scan end.
    pub fn is_bytewise(&self) -> bool {
        self.ty != KeyType::Text || self.collation == Collation::Binary
    }

    /// Compare two stored keys.
    #[inline]
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.ty {
            KeyType::Int2 | KeyType::Int4 | KeyType::Int8 | KeyType::Date | KeyType::Timestamp => {
                read_int(a).cmp(&read_int(b))
            }
            _ => self.compare_generic(a, b),
        }
    }

    fn compare_generic(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.ty {
            KeyType::Float8 => read_f64(a).total_cmp(&read_f64(b)),
            KeyType::Uuid => a.cmp(b),
            KeyType::Text => match self.collation {
                Collation::Binary => trim_text(a).cmp(trim_text(b)),
                Collation::CaseInsensitive => compare_ci(trim_text(a), trim_text(b)),
            },
            _ => read_int(a).cmp(&read_int(b)),
        }
    }

    /// Compare a stored key with a scan argument.
    #[inline]
    pub fn compare_to_bound(&self, key: &[u8], bound: &BoundValue) -> Ordering {
        match bound {
            BoundValue::Int(v) => read_int(key).cmp(v),
            BoundValue::Float(v) => read_f64(key).total_cmp(v),
            BoundValue::Bytes(b) => key.cmp(b.as_slice()),
            BoundValue::Text(b) => match self.collation {
                Collation::Binary => trim_text(key).cmp(b.as_slice()),
                Collation::CaseInsensitive => compare_ci(trim_text(key), b),
            },
        }
    }

    /// Convert a scan argument. Returns `Ok(None)` for a NULL argument.
    pub fn bound(&self, value: &Value) -> Result<Option<BoundValue>> {
        let bound = match (self.ty, value) {
            (_, Value::Null) => return Ok(None),
            (ty, Value::Int(v)) if ty.is_integer() => BoundValue::Int(*v),
            (KeyType::Float8, Value::Float(v)) => BoundValue::Float(canonical_f64(*v)),
            (KeyType::Float8, Value::Int(v)) => BoundValue::Float(canonical_f64(*v as f64)),
            (KeyType::Uuid, Value::Bytes(b)) if b.len() == 16 => BoundValue::Bytes(b.clone()),
            (KeyType::Text, Value::Text(s)) => {
                if s.as_bytes().contains(&0) {
                    return Err(Error::invalid_argument("text argument contains NUL"));
                }
                BoundValue::Text(s.as_bytes().to_vec())
            }
            (ty, value) => {
                return Err(Error::invalid_argument(format!(
                    "argument {:?} does not match column type {}",
                    value,
                    ty.name()
                )))
            }
        };
        Ok(Some(bound))
    }

    /// Bytes fed to the bloom hash for a stored key. Keys equal under the
    /// comparator hash identically.
    pub fn hash_input<'a>(&self, key: &'a [u8]) -> Cow<'a, [u8]> {
        match self.ty {
            KeyType::Int2 | KeyType::Int4 | KeyType::Int8 | KeyType::Date | KeyType::Timestamp => {
                Cow::Owned(read_int(key).to_le_bytes().to_vec())
            }
            KeyType::Text => {
                let t = trim_text(key);
                match self.collation {
                    Collation::Binary => Cow::Borrowed(t),
                    Collation::CaseInsensitive => Cow::Owned(t.to_ascii_lowercase()),
                }
            }
            _ => Cow::Borrowed(key),
        }
    }

    /// Order two scan arguments of this column. Arguments of different
    /// kinds compare equal.
    pub fn compare_bounds(&self, a: &BoundValue, b: &BoundValue) -> Ordering {
        match (a, b) {
            (BoundValue::Int(x), BoundValue::Int(y)) => x.cmp(y),
            (BoundValue::Float(x), BoundValue::Float(y)) => x.total_cmp(y),
            (BoundValue::Bytes(x), BoundValue::Bytes(y)) => x.cmp(y),
            (BoundValue::Text(x), BoundValue::Text(y)) => match self.collation {
                Collation::Binary => x.cmp(y),
                Collation::CaseInsensitive => compare_ci(x, y),
            },
            _ => Ordering::Equal,
        }
    }

    /// Bytes fed to the bloom hash for a scan argument.
    pub fn bound_hash_input(&self, bound: &BoundValue) -> Vec<u8> {
        match bound {
            BoundValue::Int(v) => v.to_le_bytes().to_vec(),
            BoundValue::Float(v) => v.to_le_bytes().to_vec(),
            BoundValue::Bytes(b) => b.clone(),
            BoundValue::Text(b) => match self.collation {
                Collation::Binary => b.clone(),
                Collation::CaseInsensitive => b.to_ascii_lowercase(),
            },
        }
    }
}

fn compare_ci(a: &[u8], b: &[u8]) -> Ordering {
    let la = a.iter().map(|c| c.to_ascii_lowercase());
    let lb = b.iter().map(|c| c.to_ascii_lowercase());
    la.cmp(lb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encode_value;

    fn enc(ty: KeyType, width: usize, v: Value) -> Vec<u8> {
        let mut out = Vec::new();
        encode_value(ty, width, &v, &mut out).unwrap();
        out
    }

    #[test]
    fn test_integer_fast_path() {
        let cmp = KeyComparator::new(KeyType::Int4, Collation::Binary);
        let a = enc(KeyType::Int4, 4, Value::Int(-2));
        let b = enc(KeyType::Int4, 4, Value::Int(1));
        // little-endian bytes of -2 sort after 1 bytewise
        assert_eq!(a.as_slice().cmp(b.as_slice()), Ordering::Greater);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        assert_eq!(cmp.compare_to_bound(&a, &BoundValue::Int(-2)), Ordering::Equal);
    }

    #[test]
    fn test_text_collations() {
        let bin = KeyComparator::new(KeyType::Text, Collation::Binary);
        let ci = KeyComparator::new(KeyType::Text, Collation::CaseInsensitive);
        let apple = enc(KeyType::Text, 8, Value::from("apple"));
        let upper = enc(KeyType::Text, 8, Value::from("APPLE"));
        let app = enc(KeyType::Text, 8, Value::from("app"));

        assert_eq!(bin.compare(&upper, &apple), Ordering::Less);
        assert_eq!(ci.compare(&upper, &apple), Ordering::Equal);
        assert_eq!(bin.compare(&app, &apple), Ordering::Less);
        assert_eq!(ci.hash_input(&upper), ci.hash_input(&apple));

        let bound = ci.bound(&Value::from("Apple")).unwrap().unwrap();
        assert_eq!(ci.compare_to_bound(&apple, &bound), Ordering::Equal);
        assert_eq!(ci.bound_hash_input(&bound), ci.hash_input(&apple).to_vec());
        assert!(bin.is_bytewise());
        assert!(!ci.is_bytewise());
        assert!(KeyComparator::new(KeyType::Float8, Collation::Binary).is_bytewise());
    }

    #[test]
    fn test_compare_bounds() {
        let ci = KeyComparator::new(KeyType::Text, Collation::CaseInsensitive);
        let a = ci.bound(&Value::from("Apple")).unwrap().unwrap();
        let b = ci.bound(&Value::from("apple")).unwrap().unwrap();
        assert_eq!(ci.compare_bounds(&a, &b), Ordering::Equal);

        let int = KeyComparator::new(KeyType::Int4, Collation::Binary);
        assert_eq!(int.compare_bounds(&BoundValue::Int(-1), &BoundValue::Int(3)), Ordering::Less);
    }

    #[test]
    fn test_bound_conversion() {
        let cmp = KeyComparator::new(KeyType::Int8, Collation::Binary);
        assert_eq!(cmp.bound(&Value::Null).unwrap(), None);
        assert!(cmp.bound(&Value::from("x")).is_err());

        let f = KeyComparator::new(KeyType::Float8, Collation::Binary);
        assert_eq!(f.bound(&Value::Int(2)).unwrap(), Some(BoundValue::Float(2.0)));
        let zero = f.bound(&Value::Float(-0.0)).unwrap().unwrap();
        assert_eq!(f.compare_to_bound(&0.0f64.to_le_bytes(), &zero), Ordering::Equal);
    }

    #[test]
    fn test_int_hash_input_is_width_independent() {
        let c2 = KeyComparator::new(KeyType::Int2, Collation::Binary);
        let c8 = KeyComparator::new(KeyType::Int8, Collation::Binary);
        let k2 = enc(KeyType::Int2, 2, Value::Int(42));
        let k8 = enc(KeyType::Int8, 8, Value::Int(42));
        assert_eq!(c2.hash_input(&k2), c8.hash_input(&k8));
        assert_eq!(c2.bound_hash_input(&BoundValue::Int(42)), c2.hash_input(&k2).to_vec());
    }
}
