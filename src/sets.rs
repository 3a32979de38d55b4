/// Set operations and the stable total order used by sorts and membership.
///
/// Vectors are treated as ordered lists permitting duplicates; the
/// operations preserve original input order.
use std::cmp::Ordering;

use num_bigint::{BigInt, BigUint, Sign};
use num_rational::BigRational;
use num_traits::One;

use crate::core::value::Value;
use crate::vector::Vector;

/// Sort rank across kinds: chars below all non-char scalars, complex off the
/// real line above them, then vectors, then matrices. A char that happens to
/// share a code point with an equal number still sorts below it.
fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Char(_) => 0,
        Value::Int(_) | Value::Big(_) | Value::Rat(_) | Value::Float(_) => 1,
        Value::Complex(c) => {
            if c.im.is_zero_scalar() {
                1
            } else {
                2
            }
        }
        Value::Vector(_) => 3,
        Value::Matrix(_) => 4,
    }
}

/// Exact rational view of a real scalar. Floats convert exactly:
/// `±mant · 2^(exp − prec)`.
fn exact_rat(v: &Value) -> BigRational {
    match v {
        Value::Int(i) => BigRational::from_integer(BigInt::from(*i)),
        Value::Big(b) => BigRational::from_integer(b.clone()),
        Value::Rat(r) => r.clone(),
        Value::Float(f) => {
            let (neg, mant, exp, prec) = f.parts();
            let e2 = exp - prec as i64;
            let sign = if neg { Sign::Minus } else { Sign::Plus };
            let (num, den): (BigUint, BigUint) = if e2 >= 0 {
                (mant.clone() << e2 as usize, BigUint::one())
            } else {
                (mant.clone(), BigUint::one() << (-e2) as usize)
            };
            BigRational::new(BigInt::from_biguint(sign, num), BigInt::from(den))
        }
        Value::Complex(c) => exact_rat(&c.re),
        _ => BigRational::from_integer(BigInt::from(0)),
    }
}

/// Total order over all values.
pub fn ordered_compare(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (kind_rank(a), kind_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match ra {
        0 => match (a, b) {
            (Value::Char(x), Value::Char(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
        1 => exact_rat(a).cmp(&exact_rat(b)),
        2 => match (a, b) {
            (Value::Complex(x), Value::Complex(y)) => exact_rat(&x.re)
                .cmp(&exact_rat(&y.re))
                .then_with(|| exact_rat(&x.im).cmp(&exact_rat(&y.im))),
            _ => Ordering::Equal,
        },
        3 => match (a, b) {
            (Value::Vector(x), Value::Vector(y)) => compare_seq(x, y),
            _ => Ordering::Equal,
        },
        _ => match (a, b) {
            (Value::Matrix(x), Value::Matrix(y)) => compare_seq(x.data(), y.data())
                .then_with(|| x.shape().cmp(y.shape())),
            _ => Ordering::Equal,
        },
    }
}

/// Length first, then lexicographic.
fn compare_seq(a: &Vector, b: &Vector) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| {
        for i in 0..a.len() {
            let ord = ordered_compare(&a.at(i), &b.at(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    })
}

/// Remove duplicates keeping first occurrences: sort a copy with indices,
/// dedup, and re-sort the survivors by original index.
pub fn unique(v: &Vector) -> Vector {
    let values = v.to_values();
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| ordered_compare(&values[a], &values[b]));
    let mut keep: Vec<usize> = Vec::with_capacity(order.len());
    for (k, &i) in order.iter().enumerate() {
        if k == 0 || ordered_compare(&values[order[k - 1]], &values[i]) != Ordering::Equal {
            keep.push(i);
        }
    }
    keep.sort_unstable();
    Vector::from_values(keep.into_iter().map(|i| values[i].clone()).collect())
}

/// Per-element membership of `u` in `v`, by sort and binary search.
pub fn membership(u: &Vector, v: &Vector) -> Vec<bool> {
    let mut sorted = v.to_values();
    sorted.sort_by(ordered_compare_ref);
    u.iter()
        .map(|e| {
            sorted
                .binary_search_by(|probe| ordered_compare(probe, &e))
                .is_ok()
        })
        .collect()
}

fn ordered_compare_ref(a: &Value, b: &Value) -> Ordering {
    ordered_compare(a, b)
}

pub fn union(u: &Vector, v: &Vector) -> Vector {
    unique(&u.catenate(v))
}

/// Elements of `u` that appear in `v`, duplicates preserved.
pub fn intersect(u: &Vector, v: &Vector) -> Vector {
    let hits = membership(u, v);
    Vector::from_values(
        u.iter()
            .zip(hits)
            .filter_map(|(e, hit)| hit.then_some(e))
            .collect(),
    )
}
