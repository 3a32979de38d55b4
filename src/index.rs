/// N-axis indexing and indexed assignment.
///
/// An index expression `L[e1; …; ek]` selects with scalar, vector, or matrix
/// indices per axis; a missing index takes the whole axis. The result shape
/// is the concatenation of the index shapes plus the unindexed trailing
/// axes. Writes go through a transient editor and republish the variable.
use crate::conf::Config;
use crate::core::value::Value;
use crate::errors::{EvalError, Result};
use crate::matrix::{self, Matrix};
use crate::parallel;
use crate::tree::Transient;
use crate::vector::Vector;

/// One resolved axis: the index's own shape and its zero-based selections.
struct AxisSel {
    shape: Vec<usize>,
    picks: Vec<usize>,
}

fn shape_of(v: &Value) -> Result<(Vec<usize>, Vector)> {
    match v {
        Value::Vector(vec) => Ok((vec![vec.len()], vec.clone())),
        Value::Matrix(m) => Ok((m.shape().to_vec(), m.ravel())),
        _ => Err(EvalError::type_err(format!(
            "cannot index {}",
            v.type_name()
        ))),
    }
}

fn strides(shape: &[usize]) -> Vec<usize> {
    let mut s = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        s[i] = s[i + 1] * shape[i + 1];
    }
    s
}

fn check_range(conf: &Config, ix: i64, size: usize, shape: &[usize]) -> Result<usize> {
    let zero = ix - conf.origin();
    if zero < 0 || zero >= size as i64 {
        return Err(EvalError::Index {
            index: ix,
            shape: shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        });
    }
    Ok(zero as usize)
}

fn resolve_axis(
    conf: &Config,
    index: &Option<Value>,
    size: usize,
    shape: &[usize],
) -> Result<AxisSel> {
    match index {
        None => Ok(AxisSel {
            shape: vec![size],
            picks: (0..size).collect(),
        }),
        Some(Value::Int(i)) => Ok(AxisSel {
            shape: vec![],
            picks: vec![check_range(conf, *i, size, shape)?],
        }),
        Some(Value::Vector(v)) => {
            let ints = v.to_ints("index")?;
            let picks = ints
                .iter()
                .map(|&i| check_range(conf, i, size, shape))
                .collect::<Result<Vec<_>>>()?;
            Ok(AxisSel {
                shape: vec![v.len()],
                picks,
            })
        }
        Some(Value::Matrix(m)) => {
            let ints = m.data().to_ints("index")?;
            let picks = ints
                .iter()
                .map(|&i| check_range(conf, i, size, shape))
                .collect::<Result<Vec<_>>>()?;
            Ok(AxisSel {
                shape: m.shape().to_vec(),
                picks,
            })
        }
        Some(other) => Err(EvalError::type_err(format!(
            "index must be integer, not {}",
            other.type_name()
        ))),
    }
}

/// Flat source offsets addressed by the index expression, in result order,
/// together with the result shape. The trailing block (unindexed axes) is
/// returned as a separate factor.
struct Selection {
    result_shape: Vec<usize>,
    offsets: Vec<usize>,
    block: usize,
}

fn coordinate_list(indexes: &[Option<Value>]) -> Option<&Vector> {
    if indexes.len() != 1 {
        return None;
    }
    let Value::Vector(outer) = indexes[0].as_ref()? else {
        return None;
    };
    if outer.is_empty() {
        return None;
    }
    let mut width = None;
    for e in outer.iter() {
        match e {
            Value::Vector(inner) if inner.all_ints() => {
                if *width.get_or_insert(inner.len()) != inner.len() {
                    return None;
                }
            }
            _ => return None,
        }
    }
    Some(outer)
}

fn select(conf: &Config, shape: &[usize], indexes: &[Option<Value>]) -> Result<Selection> {
    let m = shape.len();
    let k = indexes.len();
    if k > m {
        return Err(EvalError::shape(format!(
            "{} indexes for rank {}",
            k, m
        )));
    }
    let st = strides(shape);

    // Special form: a single vector of equal-length coordinate vectors picks
    // whole cells along the leading axes.
    if let Some(coords) = coordinate_list(indexes) {
        let d = match coords.at(0) {
            Value::Vector(first) => first.len(),
            _ => 0,
        };
        if d > m {
            return Err(EvalError::shape(format!(
                "coordinate length {} for rank {}",
                d, m
            )));
        }
        let block: usize = shape[d..].iter().product();
        let mut offsets = Vec::with_capacity(coords.len());
        for c in coords.iter() {
            let inner = match &c {
                Value::Vector(inner) => inner.to_ints("index")?,
                _ => return Err(EvalError::Internal("coordinate shape".into())),
            };
            let mut off = 0;
            for (axis, &ix) in inner.iter().enumerate() {
                off += check_range(conf, ix, shape[axis], shape)? * st[axis];
            }
            offsets.push(off);
        }
        let mut result_shape = vec![coords.len()];
        result_shape.extend(&shape[d..]);
        return Ok(Selection {
            result_shape,
            offsets,
            block,
        });
    }

    let mut axes = Vec::with_capacity(k);
    for (i, ix) in indexes.iter().enumerate() {
        axes.push(resolve_axis(conf, ix, shape[i], shape)?);
    }
    let block: usize = shape[k..].iter().product();
    let mut result_shape = Vec::new();
    for a in &axes {
        result_shape.extend(&a.shape);
    }
    result_shape.extend(&shape[k..]);

    let mut offsets = vec![0usize];
    for (i, a) in axes.iter().enumerate() {
        let mut next = Vec::with_capacity(offsets.len() * a.picks.len());
        for &base in &offsets {
            for &p in &a.picks {
                next.push(base + p * st[i]);
            }
        }
        offsets = next;
    }
    Ok(Selection {
        result_shape,
        offsets,
        block,
    })
}

/// Read `L[indexes]`.
pub fn index(conf: &Config, left: &Value, indexes: &[Option<Value>]) -> Result<Value> {
    let (shape, data) = shape_of(left)?;
    let sel = select(conf, &shape, indexes)?;
    let total = sel.offsets.len() * sel.block;
    let out = Transient::with_len(total);
    parallel::try_pfor(true, 1, sel.offsets.len(), |lo, hi| {
        for c in lo..hi {
            for t in 0..sel.block {
                out.set(c * sel.block + t, data.at(sel.offsets[c] + t));
            }
        }
        Ok(())
    })?;
    matrix::demote(sel.result_shape, Vector::from_slice(out.persist()))
}

/// Write `rhs` through `L[indexes]`, returning the updated array for the
/// variable slot. The right side must be a scalar, a vector as long as the
/// indexed shape, or a matrix of that shape.
pub fn assign_indexed(
    conf: &Config,
    left: &Value,
    indexes: &[Option<Value>],
    rhs: &Value,
) -> Result<Value> {
    let (shape, data) = shape_of(left)?;
    let sel = select(conf, &shape, indexes)?;
    let total = sel.offsets.len() * sel.block;
    let source: Box<dyn Fn(usize) -> Value + Send + Sync> = match rhs {
        Value::Vector(v) => {
            if v.len() != total {
                return Err(EvalError::shape(format!(
                    "assignment length mismatch: {} cells, {} values",
                    total,
                    v.len()
                )));
            }
            let v = v.clone();
            Box::new(move |i| v.at(i))
        }
        Value::Matrix(m) => {
            if m.shape() != sel.result_shape.as_slice() {
                return Err(EvalError::shape(format!(
                    "assignment shape mismatch: {:?} cells, {:?} values",
                    sel.result_shape,
                    m.shape()
                )));
            }
            let d = m.ravel();
            Box::new(move |i| d.at(i))
        }
        scalar => {
            let s = scalar.clone();
            Box::new(move |_| s.clone())
        }
    };
    let edit = data.edit();
    parallel::try_pfor(true, 1, sel.offsets.len(), |lo, hi| {
        for c in lo..hi {
            for t in 0..sel.block {
                edit.set(sel.offsets[c] + t, source(c * sel.block + t));
            }
        }
        Ok(())
    })?;
    let updated = Vector::from_slice(edit.persist());
    match left {
        Value::Vector(_) => Ok(Value::Vector(updated)),
        Value::Matrix(m) => Ok(Value::Matrix(Matrix::new(m.shape().to_vec(), updated)?)),
        _ => Err(EvalError::Internal("indexed assignment target".into())),
    }
}
