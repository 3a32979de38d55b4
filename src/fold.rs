/// Reduction, scan, and the inner and outer products.
///
/// Reduction is right-associative: `op/v` folds from the last element toward
/// the first. Over a matrix it runs along the last axis, one result per row,
/// and rows are processed in parallel for the associative operator subset.
use crate::conf::Config;
use crate::core::value::Value;
use crate::errors::{EvalError, Result};
use crate::matrix::{self, Matrix};
use crate::ops;
use crate::parallel;
use crate::tree::Transient;
use crate::vector::Vector;

fn is_associative(op: &str) -> bool {
    ops::ASSOCIATIVE.contains(&op)
}

/// Right-associative fold of `data[lo..hi]`, which must be nonempty.
fn fold_right(conf: &Config, op: &str, data: &Vector, lo: usize, hi: usize) -> Result<Value> {
    let mut acc = data.at(hi - 1);
    for i in (lo..hi - 1).rev() {
        acc = ops::eval_binary(conf, &data.at(i), op, &acc)?;
    }
    Ok(acc)
}

pub fn reduce(conf: &Config, op: &str, v: &Value) -> Result<Value> {
    match v {
        Value::Vector(vec) => {
            if vec.is_empty() {
                return Ok(Value::Vector(Vector::empty()));
            }
            fold_right(conf, op, vec, 0, vec.len())
        }
        Value::Matrix(m) => {
            let width = *m.shape().last().unwrap_or(&0);
            let outer_shape = m.shape()[..m.rank() - 1].to_vec();
            let rows = matrix::product_checked(&outer_shape)?;
            if width == 0 {
                let data = vec![Value::Vector(Vector::empty()); rows];
                return matrix::demote(outer_shape, Vector::from_values(data));
            }
            let out = Transient::with_len(rows);
            let data = m.data();
            parallel::try_pfor(is_associative(op), width, rows, |lo, hi| {
                for r in lo..hi {
                    out.set(r, fold_right(conf, op, data, r * width, (r + 1) * width)?);
                }
                Ok(())
            })?;
            matrix::demote(outer_shape, Vector::from_slice(out.persist()))
        }
        scalar => Ok(scalar.clone()),
    }
}

/// `op\v`: element `i` is `reduce(op, v[0..=i])`. Linear for associative
/// operators, quadratic otherwise.
pub fn scan(conf: &Config, op: &str, v: &Value) -> Result<Value> {
    match v {
        Value::Vector(vec) => Ok(Value::Vector(scan_row(conf, op, vec, 0, vec.len())?)),
        Value::Matrix(m) => {
            let width = *m.shape().last().unwrap_or(&0);
            if width == 0 {
                return Ok(v.clone());
            }
            let rows = m.elems() / width;
            let data = m.data();
            let mut out = Vec::with_capacity(m.elems());
            for r in 0..rows {
                out.extend(scan_row(conf, op, data, r * width, (r + 1) * width)?.iter());
            }
            Ok(Value::Matrix(Matrix::new(
                m.shape().to_vec(),
                Vector::from_values(out),
            )?))
        }
        scalar => Ok(scalar.clone()),
    }
}

fn scan_row(conf: &Config, op: &str, data: &Vector, lo: usize, hi: usize) -> Result<Vector> {
    let mut out = Vec::with_capacity(hi - lo);
    if lo == hi {
        return Ok(Vector::empty());
    }
    if is_associative(op) {
        let mut acc = data.at(lo);
        out.push(acc.clone());
        for i in lo + 1..hi {
            acc = ops::eval_binary(conf, &acc, op, &data.at(i))?;
            out.push(acc.clone());
        }
    } else {
        for i in lo..hi {
            out.push(fold_right(conf, op, data, lo, i + 1)?);
        }
    }
    Ok(Vector::from_values(out))
}

/// Shape and ravel with scalars as one-element vectors, the view the
/// products work over.
fn product_parts(v: &Value) -> (Vec<usize>, Vector) {
    match v {
        Value::Vector(vec) => (vec![vec.len()], vec.clone()),
        Value::Matrix(m) => (m.shape().to_vec(), m.ravel()),
        scalar => (vec![1], Vector::from_values(vec![scalar.clone()])),
    }
}

/// `u lhs.rhs v`: elementwise `rhs` down the shared axis, folded with `lhs`.
/// The last axis of `u` must match the first axis of `v`; the result drops
/// both.
pub fn inner(conf: &Config, u: &Value, lhs: &str, rhs: &str, v: &Value) -> Result<Value> {
    let (su, du) = product_parts(u);
    let (sv, dv) = product_parts(v);
    let n = *su.last().unwrap();
    if *sv.first().unwrap() != n {
        return Err(EvalError::shape(format!(
            "inner product: shape mismatch {:?} vs {:?}",
            su, sv
        )));
    }
    if n == 0 {
        return Err(EvalError::shape("inner product over empty axis"));
    }
    let mut shape = su[..su.len() - 1].to_vec();
    shape.extend(&sv[1..]);
    let total = matrix::product_checked(&shape)?;
    let inner_v: usize = sv[1..].iter().product();
    let out = Transient::with_len(total);
    let safe = ops::safe_binary(lhs) && ops::safe_binary(rhs);
    parallel::try_pfor(safe, 2 * n, total, |cell_lo, cell_hi| {
        for cell in cell_lo..cell_hi {
            let (i, j) = (cell / inner_v.max(1), cell % inner_v.max(1));
            let mut acc: Option<Value> = None;
            for k in (0..n).rev() {
                let term = ops::eval_binary(
                    conf,
                    &du.at(i * n + k),
                    rhs,
                    &dv.at(k * inner_v + j),
                )?;
                acc = Some(match acc {
                    None => term,
                    Some(a) => ops::eval_binary(conf, &term, lhs, &a)?,
                });
            }
            match acc {
                Some(a) => out.set(cell, a),
                None => return Err(EvalError::Internal("empty inner fold".into())),
            }
        }
        Ok(())
    })?;
    matrix::demote(shape, Vector::from_slice(out.persist()))
}

/// `u o.op v`: all-pairs application; the result shape is the concatenation
/// of the operand shapes.
pub fn outer(conf: &Config, u: &Value, op: &str, v: &Value) -> Result<Value> {
    let (su, du) = outer_parts(u);
    let (sv, dv) = outer_parts(v);
    let mut shape = su;
    shape.extend(&sv);
    let total = matrix::product_checked(&shape)?;
    let nv = dv.len();
    let out = Transient::with_len(total);
    parallel::try_pfor(ops::safe_binary(op), 1, total, |lo, hi| {
        for cell in lo..hi {
            let (i, j) = (cell / nv.max(1), cell % nv.max(1));
            out.set(cell, ops::eval_binary(conf, &du.at(i), op, &dv.at(j))?);
        }
        Ok(())
    })?;
    matrix::demote(shape, Vector::from_slice(out.persist()))
}

/// Scalars contribute no axes to an outer product.
fn outer_parts(v: &Value) -> (Vec<usize>, Vector) {
    match v {
        Value::Vector(vec) => (vec![vec.len()], vec.clone()),
        Value::Matrix(m) => (m.shape().to_vec(), m.ravel()),
        scalar => (vec![], Vector::from_values(vec![scalar.clone()])),
    }
}
