/// The rank-N array container and its shape algebra.
///
/// A `Matrix` owns its shape and shares its data vector. The shape is never
/// empty (a scalar is not a matrix) and its product never exceeds the
/// machine-int range. Rank-0 and rank-1 results are demoted to scalars and
/// vectors before they escape.
use crate::conf::Config;
use crate::core::arith;
use crate::core::value::{Value, MAX_INT};
use crate::errors::{EvalError, Result};
use crate::sets;
use crate::vector::{fill_like, Vector};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    shape: Vec<usize>,
    data: Vector,
}

pub fn product_checked(dims: &[usize]) -> Result<usize> {
    let mut p: u128 = 1;
    for &d in dims {
        p *= d as u128;
        if p > MAX_INT as u128 {
            return Err(EvalError::overflow("matrix too large"));
        }
    }
    Ok(p as usize)
}

fn strides(shape: &[usize]) -> Vec<usize> {
    let mut s = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        s[i] = s[i + 1] * shape[i + 1];
    }
    s
}

fn unflatten(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let st = strides(shape);
    let mut coord = Vec::with_capacity(shape.len());
    for s in st {
        coord.push(flat / s);
        flat %= s;
    }
    coord
}

/// Shape-directed constructor that demotes low ranks: an empty shape yields
/// the lone element, one axis yields a vector.
pub fn demote(shape: Vec<usize>, data: Vector) -> Result<Value> {
    match shape.len() {
        0 => Ok(data.at(0)),
        1 => Ok(Value::Vector(data)),
        _ => Ok(Value::Matrix(Matrix::new(shape, data)?)),
    }
}

/// Shape and data view of an array operand, lifting vectors to one axis.
fn parts(v: &Value) -> Result<(Vec<usize>, Vector)> {
    match v {
        Value::Vector(vec) => Ok((vec![vec.len()], vec.clone())),
        Value::Matrix(m) => Ok((m.shape.clone(), m.data.clone())),
        _ => Err(EvalError::type_err(format!(
            "expected array, not {}",
            v.type_name()
        ))),
    }
}

impl Matrix {
    pub fn new(shape: Vec<usize>, data: Vector) -> Result<Matrix> {
        if shape.is_empty() {
            return Err(EvalError::Internal("matrix with empty shape".into()));
        }
        let n = product_checked(&shape)?;
        if n != data.len() {
            return Err(EvalError::Internal(format!(
                "matrix shape {:?} does not cover {} elements",
                shape,
                data.len()
            )));
        }
        Ok(Matrix { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &Vector {
        &self.data
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn elems(&self) -> usize {
        self.data.len()
    }

    /// Length of the last axis and the number of such rows.
    fn row_geometry(&self) -> (usize, usize) {
        let width = *self.shape.last().unwrap_or(&1);
        let rows = if width == 0 {
            0
        } else {
            self.elems() / width
        };
        (width, rows)
    }

    pub fn ravel(&self) -> Vector {
        self.data.clone()
    }

    // ── Rotation ─────────────────────────────────────────────────────────────

    /// Cyclic rotation along the last axis.
    pub fn rotate(&self, n: i64) -> Result<Matrix> {
        let (width, rows) = self.row_geometry();
        if width == 0 {
            return Ok(self.clone());
        }
        let shift = n.rem_euclid(width as i64) as usize;
        let mut out = Vec::with_capacity(self.elems());
        for r in 0..rows {
            for c in 0..width {
                out.push(self.data.at(r * width + (c + shift) % width));
            }
        }
        Matrix::new(self.shape.clone(), Vector::from_values(out))
    }

    /// Cyclic rotation along the first axis.
    pub fn vrotate(&self, n: i64) -> Result<Matrix> {
        let planes = self.shape[0];
        if planes == 0 {
            return Ok(self.clone());
        }
        let plane_size = self.elems() / planes;
        let shift = n.rem_euclid(planes as i64) as usize;
        let mut out = Vec::with_capacity(self.elems());
        for p in 0..planes {
            let src = (p + shift) % planes;
            for i in 0..plane_size {
                out.push(self.data.at(src * plane_size + i));
            }
        }
        Matrix::new(self.shape.clone(), Vector::from_values(out))
    }

    // ── Transposition ────────────────────────────────────────────────────────

    /// Reverse the axes.
    pub fn transpose(&self) -> Result<Matrix> {
        let axes: Vec<i64> = (0..self.rank() as i64).rev().collect();
        match self.transpose_map(&axes)? {
            Value::Matrix(m) => Ok(m),
            Value::Vector(v) => Matrix::new(vec![v.len()], v),
            v => Matrix::new(vec![1], Vector::from_values(vec![v])),
        }
    }

    /// Dyadic transpose: `axes[i]` is the result axis fed by source axis `i`
    /// (already origin-0). Repeated targets take diagonals; a result axis
    /// nobody maps to is an error.
    pub fn transpose_map(&self, axes: &[i64]) -> Result<Value> {
        let rank = self.rank();
        if axes.len() != rank {
            return Err(EvalError::shape(format!(
                "transpose: {} axes for rank {}",
                axes.len(),
                rank
            )));
        }
        let mut new_rank = 0usize;
        for &a in axes {
            if a < 0 || a as usize >= rank {
                return Err(EvalError::shape(format!("transpose: axis {} out of range", a)));
            }
            new_rank = new_rank.max(a as usize + 1);
        }
        let mut new_shape = vec![usize::MAX; new_rank];
        for (i, &a) in axes.iter().enumerate() {
            let a = a as usize;
            new_shape[a] = new_shape[a].min(self.shape[i]);
        }
        if let Some(missing) = new_shape.iter().position(|&d| d == usize::MAX) {
            return Err(EvalError::shape(format!("transpose: missing axis {}", missing)));
        }
        let total = product_checked(&new_shape)?;
        let src_strides = strides(&self.shape);
        let mut out = Vec::with_capacity(total);
        for flat in 0..total {
            let coord = unflatten(flat, &new_shape);
            let mut src = 0;
            for (i, &a) in axes.iter().enumerate() {
                src += coord[a as usize] * src_strides[i];
            }
            out.push(self.data.at(src));
        }
        demote(new_shape, Vector::from_values(out))
    }

    // ── Row ordering and inversion ───────────────────────────────────────────

    /// Permutation that sorts the rows lexicographically.
    pub fn grade(&self, conf: &Config, ascending: bool) -> Result<Vector> {
        let (width, rows) = self.row_geometry();
        let row_values: Vec<Vec<Value>> = (0..rows)
            .map(|r| (0..width).map(|c| self.data.at(r * width + c)).collect())
            .collect();
        let mut perm: Vec<usize> = (0..rows).collect();
        perm.sort_by(|&a, &b| {
            let mut ord = std::cmp::Ordering::Equal;
            for c in 0..width {
                ord = sets::ordered_compare(&row_values[a][c], &row_values[b][c]);
                if ord != std::cmp::Ordering::Equal {
                    break;
                }
            }
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        Ok(Vector::from_ints(
            perm.into_iter().map(|i| i as i64 + conf.origin()),
        ))
    }

    /// Gauss-Jordan elimination over exact scalar arithmetic.
    pub fn inverse(&self, conf: &Config) -> Result<Matrix> {
        if self.rank() != 2 || self.shape[0] != self.shape[1] {
            return Err(EvalError::shape("inverse of non-square matrix"));
        }
        let n = self.shape[0];
        let mut rows: Vec<Vec<Value>> = Vec::with_capacity(n);
        for r in 0..n {
            let mut row = Vec::with_capacity(2 * n);
            for c in 0..n {
                let v = self.data.at(r * n + c);
                if !v.is_scalar() {
                    return Err(EvalError::type_err("inverse of matrix with non-scalar element"));
                }
                row.push(v);
            }
            for c in 0..n {
                row.push(if c == r { Value::one() } else { Value::zero() });
            }
            rows.push(row);
        }
        for col in 0..n {
            // A zero on the diagonal sends us hunting below for a pivot.
            let pivot = (col..n).find(|&r| !rows[r][col].is_zero_scalar());
            let pivot = pivot.ok_or_else(|| EvalError::domain("inverse of singular matrix"))?;
            rows.swap(col, pivot);
            let d = rows[col][col].clone();
            for c in col..2 * n {
                rows[col][c] = arith::quo(conf, &rows[col][c], &d)?;
            }
            for r in 0..n {
                if r == col || rows[r][col].is_zero_scalar() {
                    continue;
                }
                let f = rows[r][col].clone();
                for c in col..2 * n {
                    let scaled = arith::mul(conf, &f, &rows[col][c])?;
                    rows[r][c] = arith::sub(conf, &rows[r][c], &scaled)?;
                }
            }
        }
        let mut out = Vec::with_capacity(n * n);
        for row in &rows {
            out.extend(row[n..].iter().cloned());
        }
        Matrix::new(vec![n, n], Vector::from_values(out))
    }
}

// ── Reshape ──────────────────────────────────────────────────────────────────

/// `A rho B`: fill shape `A` with the elements of `B`, cycling; an empty `B`
/// fills with a single zero.
pub fn reshape(dims: &[i64], src: &Value) -> Result<Value> {
    let mut shape = Vec::with_capacity(dims.len());
    for &d in dims {
        if d < 0 {
            return Err(EvalError::shape(format!("reshape: negative dimension {}", d)));
        }
        shape.push(d as usize);
    }
    let total = product_checked(&shape)?;
    let elems: Vec<Value> = match src {
        Value::Vector(v) => v.to_values(),
        Value::Matrix(m) => m.data.to_values(),
        scalar => vec![scalar.clone()],
    };
    let elems = if elems.is_empty() {
        vec![Value::zero()]
    } else {
        elems
    };
    let data: Vec<Value> = (0..total).map(|i| elems[i % elems.len()].clone()).collect();
    demote(shape, Vector::from_values(data))
}

// ── Take and drop ────────────────────────────────────────────────────────────

/// Signed take: positive counts keep the front, negative the back; counts
/// beyond the shape pad with the fill element. Short count vectors extend
/// with the operand's own shape.
pub fn take(counts_in: &[i64], operand: &Value) -> Result<Value> {
    let (shape, data) = parts(operand)?;
    if counts_in.len() > shape.len() {
        return Err(EvalError::shape(format!(
            "take: {} counts for rank {}",
            counts_in.len(),
            shape.len()
        )));
    }
    let mut counts = counts_in.to_vec();
    counts.extend(shape[counts_in.len()..].iter().map(|&d| d as i64));
    let new_shape: Vec<usize> = counts.iter().map(|c| c.unsigned_abs() as usize).collect();
    let offsets: Vec<i64> = counts
        .iter()
        .zip(&shape)
        .map(|(&c, &d)| if c >= 0 { 0 } else { d as i64 + c })
        .collect();
    let total = product_checked(&new_shape)?;
    let fill = if data.is_empty() {
        Value::zero()
    } else {
        fill_like(&data.at(0))
    };
    let src_strides = strides(&shape);
    let mut out = Vec::with_capacity(total);
    'outer: for flat in 0..total {
        let coord = unflatten(flat, &new_shape);
        let mut src = 0usize;
        for (i, &c) in coord.iter().enumerate() {
            let s = c as i64 + offsets[i];
            if s < 0 || s >= shape[i] as i64 {
                out.push(fill.clone());
                continue 'outer;
            }
            src += s as usize * src_strides[i];
        }
        out.push(data.at(src));
    }
    demote(new_shape, Vector::from_values(out))
}

/// Signed drop: positive counts drop the front, negative the back. Short
/// count vectors extend with zeros.
pub fn drop(counts_in: &[i64], operand: &Value) -> Result<Value> {
    let (shape, data) = parts(operand)?;
    if counts_in.len() > shape.len() {
        return Err(EvalError::shape(format!(
            "drop: {} counts for rank {}",
            counts_in.len(),
            shape.len()
        )));
    }
    let mut counts = counts_in.to_vec();
    counts.resize(shape.len(), 0);
    let mut new_shape = Vec::with_capacity(shape.len());
    let mut offsets = Vec::with_capacity(shape.len());
    for (&c, &d) in counts.iter().zip(&shape) {
        let keep = (d as i64 - c.abs()).max(0);
        new_shape.push(keep as usize);
        offsets.push(if c >= 0 { c } else { 0 });
    }
    let total = product_checked(&new_shape)?;
    let src_strides = strides(&shape);
    let mut out = Vec::with_capacity(total);
    for flat in 0..total {
        let coord = unflatten(flat, &new_shape);
        let mut src = 0usize;
        for (i, &c) in coord.iter().enumerate() {
            src += (c as i64 + offsets[i]) as usize * src_strides[i];
        }
        out.push(data.at(src));
    }
    demote(new_shape, Vector::from_values(out))
}

// ── Catenation ───────────────────────────────────────────────────────────────

/// Catenate along the last axis (or the first, with `first` set). Accepts
/// equal ranks with matching off-axis shapes, a rank difference of one
/// (the lower operand is a slab of thickness one), and one-element unit
/// extension on either side.
pub fn catenate(u: &Value, v: &Value, first: bool) -> Result<Value> {
    if let (Value::Vector(a), Value::Vector(b)) = (u, v) {
        return Ok(Value::Vector(a.catenate(b)));
    }
    let (sa, da) = parts(u)?;
    let (sb, db) = parts(v)?;
    let (sa, da) = align_for_cat(&sa, &da, &sb, first)?;
    let (sb, db) = align_for_cat(&sb, &db, &sa, first)?;
    if sa.len() != sb.len() {
        return Err(EvalError::shape("catenate: rank mismatch"));
    }
    let rank = sa.len();
    let axis = if first { 0 } else { rank - 1 };
    for i in 0..rank {
        if i != axis && sa[i] != sb[i] {
            return Err(EvalError::shape(format!(
                "catenate: shape mismatch {:?} vs {:?}",
                sa, sb
            )));
        }
    }
    let mut new_shape = sa.clone();
    new_shape[axis] = sa[axis] + sb[axis];
    product_checked(&new_shape)?;
    let out = if first {
        let mut out = da.to_values();
        out.extend(db.iter());
        out
    } else {
        let (wa, wb) = (sa[axis], sb[axis]);
        let outer: usize = sa[..rank - 1].iter().product();
        let mut out = Vec::with_capacity(da.len() + db.len());
        for o in 0..outer {
            for c in 0..wa {
                out.push(da.at(o * wa + c));
            }
            for c in 0..wb {
                out.push(db.at(o * wb + c));
            }
        }
        out
    };
    demote(new_shape, Vector::from_values(out))
}

/// Bring one catenation operand up to the rank of the other: a one-element
/// vector broadcasts into a slab of thickness one; an operand one rank lower
/// with matching off-axis shape becomes such a slab directly.
fn align_for_cat(
    s: &[usize],
    d: &Vector,
    other: &[usize],
    first: bool,
) -> Result<(Vec<usize>, Vector)> {
    if s.len() >= other.len() {
        return Ok((s.to_vec(), d.clone()));
    }
    if s.len() + 1 != other.len() {
        return Err(EvalError::shape("catenate: rank mismatch"));
    }
    let off_axis: Vec<usize> = if first {
        other[1..].to_vec()
    } else {
        other[..other.len() - 1].to_vec()
    };
    let slab_shape: Vec<usize> = if first {
        let mut v = vec![1];
        v.extend(&off_axis);
        v
    } else {
        let mut v = off_axis.clone();
        v.push(1);
        v
    };
    if s == off_axis.as_slice() {
        return Ok((slab_shape, d.clone()));
    }
    if s == [1] {
        // Unit extension: replicate the lone element across the slab.
        let n: usize = off_axis.iter().product();
        let e = d.at(0);
        return Ok((slab_shape, Vector::from_values(vec![e; n])));
    }
    Err(EvalError::shape("catenate: shape mismatch"))
}

// ── Select, split, mix ───────────────────────────────────────────────────────

const SEL_LIMIT: usize = 100_000_000;

/// Per-element repetition along the last axis; a negative count substitutes
/// zero replicas. The count vector must match the last axis or be a single
/// count for every element.
pub fn sel(counts: &[i64], operand: &Value) -> Result<Value> {
    let (shape, data) = parts(operand)?;
    let width = *shape.last().unwrap_or(&0);
    if counts.len() != width && counts.len() != 1 {
        return Err(EvalError::shape(format!(
            "sel: {} counts for width {}",
            counts.len(),
            width
        )));
    }
    let count_at = |i: usize| counts[if counts.len() == 1 { 0 } else { i }];
    let new_width: usize = (0..width).map(|i| count_at(i).unsigned_abs() as usize).sum();
    let rows = if width == 0 { 0 } else { data.len() / width };
    if rows.saturating_mul(new_width) > SEL_LIMIT {
        return Err(EvalError::overflow("sel result too large"));
    }
    let mut out = Vec::with_capacity(rows * new_width);
    for r in 0..rows {
        for c in 0..width {
            let n = count_at(c);
            let elem = data.at(r * width + c);
            if n >= 0 {
                for _ in 0..n {
                    out.push(elem.clone());
                }
            } else {
                for _ in 0..-n {
                    out.push(Value::zero());
                }
            }
        }
    }
    let mut new_shape = shape.clone();
    *new_shape.last_mut().unwrap() = new_width;
    demote(new_shape, Vector::from_values(out))
}

/// Reduce rank by one: the innermost rows become element vectors.
pub fn split(operand: &Value) -> Result<Value> {
    let (shape, data) = parts(operand)?;
    let width = *shape.last().unwrap();
    let outer_shape = shape[..shape.len() - 1].to_vec();
    let rows = if width == 0 {
        product_checked(&outer_shape)?
    } else {
        data.len() / width
    };
    let mut out = Vec::with_capacity(rows);
    for r in 0..rows {
        let row: Vec<Value> = (0..width).map(|c| data.at(r * width + c)).collect();
        out.push(Value::Vector(Vector::from_values(row)));
    }
    demote(outer_shape, Vector::from_values(out))
}

/// Inverse of split: widen every element to a common last axis, padding with
/// the element's own fill.
pub fn mix(operand: &Value) -> Result<Value> {
    let (shape, data) = parts(operand)?;
    let as_row = |v: &Value| -> Vector {
        match v {
            Value::Vector(inner) => inner.clone(),
            scalar => Vector::from_values(vec![scalar.clone()]),
        }
    };
    let width = data
        .iter()
        .map(|v| as_row(&v).len())
        .max()
        .unwrap_or(0);
    let mut out = Vec::with_capacity(data.len() * width);
    for v in data.iter() {
        let row = as_row(&v);
        let padded = take(&[width as i64], &Value::Vector(row))?;
        match padded {
            Value::Vector(row) => out.extend(row.iter()),
            other => out.push(other),
        }
    }
    let mut new_shape = shape;
    new_shape.push(width);
    demote(new_shape, Vector::from_values(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iota_matrix(rows: usize, cols: usize) -> Matrix {
        let data = Vector::from_ints((1..=(rows * cols) as i64).collect::<Vec<_>>());
        Matrix::new(vec![rows, cols], data).unwrap()
    }

    fn ints(ns: &[i64]) -> Vector {
        Vector::from_ints(ns.iter().copied())
    }

    #[test]
    fn reshape_cycles_and_demotes() {
        let v = Value::Vector(ints(&[1, 2, 3]));
        match reshape(&[2, 4], &v).unwrap() {
            Value::Matrix(m) => {
                assert_eq!(m.shape(), &[2, 4]);
                assert_eq!(m.data(), &ints(&[1, 2, 3, 1, 2, 3, 1, 2]));
            }
            other => panic!("expected matrix, got {:?}", other),
        }
        assert_eq!(reshape(&[0], &v).unwrap(), Value::Vector(Vector::empty()));
        // Empty source fills with zero.
        let empty = Value::Vector(Vector::empty());
        assert_eq!(reshape(&[3], &empty).unwrap(), Value::Vector(ints(&[0, 0, 0])));
        // Scalar demotion from an empty shape.
        assert_eq!(reshape(&[], &v).unwrap(), Value::Int(1));
    }

    #[test]
    fn transpose_involutive() {
        let m = iota_matrix(2, 3);
        let t = m.transpose().unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.data(), &ints(&[1, 4, 2, 5, 3, 6]));
        assert_eq!(t.transpose().unwrap(), m);
    }

    #[test]
    fn dyadic_transpose_diagonal() {
        let m = iota_matrix(3, 3);
        // Both axes to result axis 0: the main diagonal.
        assert_eq!(
            m.transpose_map(&[0, 0]).unwrap(),
            Value::Vector(ints(&[1, 5, 9]))
        );
        assert!(m.transpose_map(&[1, 1]).is_err());
    }

    #[test]
    fn rotate_axes() {
        let m = iota_matrix(2, 3);
        let r = m.rotate(1).unwrap();
        assert_eq!(r.data(), &ints(&[2, 3, 1, 5, 6, 4]));
        let v = m.vrotate(1).unwrap();
        assert_eq!(v.data(), &ints(&[4, 5, 6, 1, 2, 3]));
        assert_eq!(m.rotate(3).unwrap(), m);
    }

    #[test]
    fn take_pads_and_drop_trims() {
        let v = Value::Vector(ints(&[1, 2, 3]));
        assert_eq!(take(&[2], &v).unwrap(), Value::Vector(ints(&[1, 2])));
        assert_eq!(take(&[-2], &v).unwrap(), Value::Vector(ints(&[2, 3])));
        assert_eq!(take(&[5], &v).unwrap(), Value::Vector(ints(&[1, 2, 3, 0, 0])));
        assert_eq!(take(&[-5], &v).unwrap(), Value::Vector(ints(&[0, 0, 1, 2, 3])));
        assert_eq!(drop(&[1], &v).unwrap(), Value::Vector(ints(&[2, 3])));
        assert_eq!(drop(&[-2], &v).unwrap(), Value::Vector(ints(&[1])));
        // Char fill is blank.
        let s = Value::Vector(Vector::from_chars("ab"));
        assert_eq!(
            take(&[3], &s).unwrap(),
            Value::Vector(Vector::from_chars("ab "))
        );
    }

    #[test]
    fn take_extends_short_counts_with_shape() {
        let m = Value::Matrix(iota_matrix(3, 4));
        match take(&[2], &m).unwrap() {
            Value::Matrix(t) => {
                assert_eq!(t.shape(), &[2, 4]);
                assert_eq!(t.data(), &ints(&[1, 2, 3, 4, 5, 6, 7, 8]));
            }
            other => panic!("expected matrix, got {:?}", other),
        }
    }

    #[test]
    fn catenate_shapes() {
        let a = Value::Matrix(iota_matrix(2, 2));
        let b = Value::Matrix(iota_matrix(2, 2));
        match catenate(&a, &b, false).unwrap() {
            Value::Matrix(m) => {
                assert_eq!(m.shape(), &[2, 4]);
                assert_eq!(m.data(), &ints(&[1, 2, 1, 2, 3, 4, 3, 4]));
            }
            other => panic!("expected matrix, got {:?}", other),
        }
        match catenate(&a, &b, true).unwrap() {
            Value::Matrix(m) => {
                assert_eq!(m.shape(), &[4, 2]);
                assert_eq!(m.data(), &ints(&[1, 2, 3, 4, 1, 2, 3, 4]));
            }
            other => panic!("expected matrix, got {:?}", other),
        }
        // Column vector glued on the last axis.
        let col = Value::Vector(ints(&[9, 9]));
        match catenate(&a, &col, false).unwrap() {
            Value::Matrix(m) => {
                assert_eq!(m.shape(), &[2, 3]);
                assert_eq!(m.data(), &ints(&[1, 2, 9, 3, 4, 9]));
            }
            other => panic!("expected matrix, got {:?}", other),
        }
        // Unit extension.
        let unit = Value::Vector(ints(&[7]));
        match catenate(&unit, &a, true).unwrap() {
            Value::Matrix(m) => {
                assert_eq!(m.shape(), &[3, 2]);
                assert_eq!(m.data(), &ints(&[7, 7, 1, 2, 3, 4]));
            }
            other => panic!("expected matrix, got {:?}", other),
        }
    }

    #[test]
    fn sel_repeats_and_zeroes() {
        let v = Value::Vector(ints(&[5, 6, 7]));
        assert_eq!(
            sel(&[2, 0, 1], &v).unwrap(),
            Value::Vector(ints(&[5, 5, 7]))
        );
        assert_eq!(
            sel(&[-2, 1, 1], &v).unwrap(),
            Value::Vector(ints(&[0, 0, 6, 7]))
        );
        assert_eq!(
            sel(&[2], &v).unwrap(),
            Value::Vector(ints(&[5, 5, 6, 6, 7, 7]))
        );
    }

    #[test]
    fn split_and_mix_are_inverse() {
        let m = Value::Matrix(iota_matrix(2, 3));
        let s = split(&m).unwrap();
        match &s {
            Value::Vector(v) => {
                assert_eq!(v.len(), 2);
                assert_eq!(v.at(0), Value::Vector(ints(&[1, 2, 3])));
            }
            other => panic!("expected vector, got {:?}", other),
        }
        assert_eq!(mix(&s).unwrap(), m);
    }

    #[test]
    fn mix_pads_ragged_rows() {
        let v = Value::Vector(Vector::from_values(vec![
            Value::Vector(ints(&[1, 2])),
            Value::Int(9),
        ]));
        match mix(&v).unwrap() {
            Value::Matrix(m) => {
                assert_eq!(m.shape(), &[2, 2]);
                assert_eq!(m.data(), &ints(&[1, 2, 9, 0]));
            }
            other => panic!("expected matrix, got {:?}", other),
        }
    }

    #[test]
    fn gaussian_inverse() {
        let conf = Config::new();
        let m = Matrix::new(vec![2, 2], ints(&[2, 0, 0, 4])).unwrap();
        let inv = m.inverse(&conf).unwrap();
        assert_eq!(
            inv.data(),
            &Vector::from_values(vec![
                Value::Rat(num_rational::BigRational::new(1.into(), 2.into())),
                Value::Int(0),
                Value::Int(0),
                Value::Rat(num_rational::BigRational::new(1.into(), 4.into())),
            ])
        );
        // Pivot search handles a zero on the diagonal.
        let swap = Matrix::new(vec![2, 2], ints(&[0, 1, 1, 0])).unwrap();
        assert_eq!(swap.inverse(&conf).unwrap(), swap);
        let singular = Matrix::new(vec![2, 2], ints(&[1, 2, 2, 4])).unwrap();
        assert!(singular.inverse(&conf).is_err());
    }

    #[test]
    fn grade_sorts_rows() {
        let conf = Config::new();
        let m = Matrix::new(vec![3, 2], ints(&[3, 1, 1, 2, 3, 0])).unwrap();
        assert_eq!(m.grade(&conf, true).unwrap(), ints(&[2, 3, 1]));
    }
}
