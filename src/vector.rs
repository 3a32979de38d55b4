/// The 1-D array container, backed by the persistent tree.
///
/// A `Vector` owns a published `Slice`; edits go through a fresh transient
/// and publish a new logical vector, so every operation here is pure.
use crate::conf::Config;
use crate::core::arith;
use crate::core::value::Value;
use crate::errors::{EvalError, Result};
use crate::sets;
use crate::tree::{Slice, Transient};

#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    slice: Slice,
}

impl Vector {
    pub fn empty() -> Vector {
        Vector {
            slice: Slice::empty(),
        }
    }

    pub fn from_slice(slice: Slice) -> Vector {
        Vector { slice }
    }

    pub fn from_values(values: Vec<Value>) -> Vector {
        Vector {
            slice: Slice::from_values(values),
        }
    }

    pub fn from_ints(ints: impl IntoIterator<Item = i64>) -> Vector {
        Vector::from_values(ints.into_iter().map(Value::from_i64).collect())
    }

    pub fn from_chars(text: &str) -> Vector {
        Vector::from_values(text.chars().map(Value::Char).collect())
    }

    pub fn len(&self) -> usize {
        self.slice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }

    pub fn at(&self, i: usize) -> Value {
        self.slice.at(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.slice.iter()
    }

    pub fn to_values(&self) -> Vec<Value> {
        self.iter().collect()
    }

    /// Open a transient editor over this vector's storage.
    pub fn edit(&self) -> Transient {
        self.slice.transient()
    }

    // ── Classification ───────────────────────────────────────────────────────

    pub fn all_chars(&self) -> bool {
        self.iter().all(|v| matches!(v, Value::Char(_)))
    }

    pub fn all_ints(&self) -> bool {
        self.iter().all(|v| matches!(v, Value::Int(_)))
    }

    pub fn all_scalars(&self) -> bool {
        self.iter().all(|v| v.is_scalar())
    }

    /// Machine-int view, for shapes, counts, and index vectors.
    pub fn to_ints(&self, what: &str) -> Result<Vec<i64>> {
        self.iter().map(|v| v.small_int(what)).collect()
    }

    // ── Rearrangement ────────────────────────────────────────────────────────

    pub fn reverse(&self) -> Vector {
        let n = self.len();
        let t = Transient::with_len(n);
        for i in 0..n {
            t.set(n - 1 - i, self.at(i));
        }
        Vector::from_slice(t.persist())
    }

    /// Cyclic left rotation by `n` (negative rotates right), modular on the
    /// length.
    pub fn rotate(&self, n: i64) -> Vector {
        let len = self.len();
        if len == 0 {
            return self.clone();
        }
        let shift = n.rem_euclid(len as i64) as usize;
        if shift == 0 {
            return self.clone();
        }
        let t = Transient::with_len(len);
        for i in 0..len {
            t.set(i, self.at((i + shift) % len));
        }
        Vector::from_slice(t.persist())
    }

    pub fn catenate(&self, other: &Vector) -> Vector {
        let (n, m) = (self.len(), other.len());
        let t = Transient::with_len(n + m);
        for i in 0..n {
            t.set(i, self.at(i));
        }
        for i in 0..m {
            t.set(n + i, other.at(i));
        }
        Vector::from_slice(t.persist())
    }

    /// Index permutation that sorts the vector, adjusted by the origin.
    pub fn grade(&self, conf: &Config, ascending: bool) -> Vector {
        let mut perm: Vec<usize> = (0..self.len()).collect();
        let values = self.to_values();
        perm.sort_by(|&a, &b| {
            let ord = sets::ordered_compare(&values[a], &values[b]);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        Vector::from_ints(perm.into_iter().map(|i| i as i64 + conf.origin()))
    }

    /// The reciprocal vector `v / v+.*conj v`.
    pub fn inverse(&self, conf: &Config) -> Result<Vector> {
        if self.is_empty() {
            return Err(EvalError::domain("inverse of empty vector"));
        }
        let mut norm = Value::zero();
        for v in self.iter() {
            let conj = match &v {
                Value::Complex(c) => c.conj(conf)?,
                other => other.clone(),
            };
            norm = arith::add(conf, &norm, &arith::mul(conf, &v, &conj)?)?;
        }
        if norm.is_zero_scalar() {
            return Err(EvalError::domain("inverse of zero vector"));
        }
        let mut out = Vec::with_capacity(self.len());
        for v in self.iter() {
            out.push(arith::quo(conf, &v, &norm)?);
        }
        Ok(Vector::from_values(out))
    }

    /// Group elements by a score vector: zero-scored elements are dropped and
    /// a new group opens wherever the score exceeds its predecessor.
    pub fn partition(&self, scores: &[i64]) -> Result<Vector> {
        if scores.len() != self.len() {
            return Err(EvalError::shape(format!(
                "partition: count mismatch {} vs {}",
                scores.len(),
                self.len()
            )));
        }
        let mut groups: Vec<Vec<Value>> = Vec::new();
        let mut prev = 0;
        for (i, &s) in scores.iter().enumerate() {
            if s < 0 {
                return Err(EvalError::domain("partition: negative score"));
            }
            if s > prev {
                groups.push(Vec::new());
            }
            if s != 0 {
                match groups.last_mut() {
                    Some(g) => g.push(self.at(i)),
                    None => return Err(EvalError::Internal("partition lost a group".into())),
                }
            }
            prev = s;
        }
        Ok(Vector::from_values(
            groups
                .into_iter()
                .map(|g| Value::Vector(Vector::from_values(g)))
                .collect(),
        ))
    }
}

/// The padding element used by take-beyond-shape and reshape-from-empty:
/// blank for characters, zero for numbers, elementwise fill for nested
/// values.
pub fn fill_like(proto: &Value) -> Value {
    match proto {
        Value::Char(_) => Value::Char(' '),
        Value::Vector(v) => {
            Value::Vector(Vector::from_values(v.iter().map(|e| fill_like(&e)).collect()))
        }
        Value::Matrix(m) => {
            let data = Vector::from_values(m.data().iter().map(|e| fill_like(&e)).collect());
            match crate::matrix::Matrix::new(m.shape().to_vec(), data) {
                Ok(m) => Value::Matrix(m),
                Err(_) => Value::zero(),
            }
        }
        _ => Value::zero(),
    }
}
