/// Scalar arithmetic kernels.
///
/// These operate on scalars only; the operator tables lift them over arrays.
/// Every function promotes its operands along the lattice, guards inflating
/// results with `must_fit`, and shrinks before returning.
use std::cmp::Ordering;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::conf::Config;
use crate::core::bigfloat::BigFloat;
use crate::core::complex::Complex;
use crate::core::value::{self, binary_arith_type, rational_type, Type, Value, WhichType};
use crate::errors::{EvalError, Result};

pub fn promote2(conf: &Config, a: &Value, b: &Value, which: WhichType) -> Result<(Value, Value)> {
    let (ta, tb) = which(a.type_of(), b.type_of());
    Ok((a.to_type(conf, ta)?, b.to_type(conf, tb)?))
}

fn rat_guard(conf: &Config, r: &BigRational) -> Result<()> {
    conf.must_fit(r.numer().bits() + r.denom().bits())
}

// ── Ring operations ──────────────────────────────────────────────────────────

pub fn add(conf: &Config, a: &Value, b: &Value) -> Result<Value> {
    match promote2(conf, a, b, binary_arith_type)? {
        (Value::Int(x), Value::Int(y)) => Ok(Value::from_i64(x + y)),
        (Value::Big(x), Value::Big(y)) => {
            conf.must_fit(x.bits().max(y.bits()) + 1)?;
            Ok(Value::from_big(x + y))
        }
        (Value::Rat(x), Value::Rat(y)) => {
            let r = x + y;
            rat_guard(conf, &r)?;
            Ok(Value::from_rat(r))
        }
        (Value::Float(x), Value::Float(y)) => Ok(Value::from_float(x.add(&y))),
        (Value::Complex(x), Value::Complex(y)) => complex_add(conf, &x, &y),
        (a, _) => Err(EvalError::binary_not_implemented("+", a.type_name())),
    }
}

pub fn sub(conf: &Config, a: &Value, b: &Value) -> Result<Value> {
    match promote2(conf, a, b, binary_arith_type)? {
        (Value::Int(x), Value::Int(y)) => Ok(Value::from_i64(x - y)),
        (Value::Big(x), Value::Big(y)) => {
            conf.must_fit(x.bits().max(y.bits()) + 1)?;
            Ok(Value::from_big(x - y))
        }
        (Value::Rat(x), Value::Rat(y)) => {
            let r = x - y;
            rat_guard(conf, &r)?;
            Ok(Value::from_rat(r))
        }
        (Value::Float(x), Value::Float(y)) => Ok(Value::from_float(x.sub(&y))),
        (Value::Complex(x), Value::Complex(y)) => complex_sub(conf, &x, &y),
        (a, _) => Err(EvalError::binary_not_implemented("-", a.type_name())),
    }
}

pub fn mul(conf: &Config, a: &Value, b: &Value) -> Result<Value> {
    match promote2(conf, a, b, binary_arith_type)? {
        (Value::Int(x), Value::Int(y)) => Ok(Value::from_i64(x * y)),
        (Value::Big(x), Value::Big(y)) => {
            conf.must_fit(x.bits() + y.bits())?;
            Ok(Value::from_big(x * y))
        }
        (Value::Rat(x), Value::Rat(y)) => {
            conf.must_fit(
                x.numer().bits() + x.denom().bits() + y.numer().bits() + y.denom().bits(),
            )?;
            Ok(Value::from_rat(x * y))
        }
        (Value::Float(x), Value::Float(y)) => Ok(Value::from_float(x.mul(&y))),
        (Value::Complex(x), Value::Complex(y)) => complex_mul(conf, &x, &y),
        (a, _) => Err(EvalError::binary_not_implemented("*", a.type_name())),
    }
}

/// Exact division: integer operands yield a rational.
pub fn quo(conf: &Config, a: &Value, b: &Value) -> Result<Value> {
    match promote2(conf, a, b, rational_type)? {
        (Value::Rat(x), Value::Rat(y)) => {
            if y.is_zero() {
                return Err(EvalError::domain("division by zero"));
            }
            let r = x / y;
            rat_guard(conf, &r)?;
            Ok(Value::from_rat(r))
        }
        (Value::Float(x), Value::Float(y)) => Ok(Value::from_float(x.div(&y)?)),
        (Value::Complex(x), Value::Complex(y)) => complex_div(conf, &x, &y),
        (a, _) => Err(EvalError::binary_not_implemented("/", a.type_name())),
    }
}

pub fn neg(conf: &Config, v: &Value) -> Result<Value> {
    match v {
        Value::Int(i) => Ok(Value::from_i64(-i)),
        Value::Big(b) => Ok(Value::from_big(-b.clone())),
        Value::Rat(r) => Ok(Value::from_rat(-r.clone())),
        Value::Float(f) => Ok(Value::Float(f.neg())),
        Value::Complex(c) => Ok(Value::complex(neg(conf, &c.re)?, neg(conf, &c.im)?)),
        _ => Err(EvalError::unary_not_implemented("-", v.type_name())),
    }
}

pub fn abs(v: &Value) -> Result<Value> {
    match v {
        Value::Int(i) => Ok(Value::from_i64(i.abs())),
        Value::Big(b) => Ok(Value::from_big(b.abs())),
        Value::Rat(r) => Ok(Value::from_rat(r.abs())),
        Value::Float(f) => Ok(Value::Float(f.abs()).shrink()),
        // Complex magnitude needs sqrt; the transcendental kernel handles it.
        _ => Err(EvalError::unary_not_implemented("abs", v.type_name())),
    }
}

pub fn sgn(v: &Value) -> Result<Value> {
    let s = match v {
        Value::Int(i) => i.signum(),
        Value::Big(b) => match b.sign() {
            num_bigint::Sign::Minus => -1,
            num_bigint::Sign::NoSign => 0,
            num_bigint::Sign::Plus => 1,
        },
        Value::Rat(r) => {
            if r.is_negative() {
                -1
            } else if r.is_zero() {
                0
            } else {
                1
            }
        }
        Value::Float(f) => {
            if f.is_zero() {
                0
            } else if f.is_negative() {
                -1
            } else {
                1
            }
        }
        _ => return Err(EvalError::unary_not_implemented("sgn", v.type_name())),
    };
    Ok(Value::Int(s))
}

pub fn floor(conf: &Config, v: &Value) -> Result<Value> {
    match v {
        Value::Int(_) | Value::Big(_) => Ok(v.clone()),
        Value::Rat(r) => Ok(Value::from_big(r.floor().to_integer())),
        Value::Float(f) => {
            if f.is_integer() {
                Ok(v.clone())
            } else {
                Ok(Value::from_big(f.floor_int()))
            }
        }
        Value::Complex(c) => c.floor(conf),
        _ => Err(EvalError::unary_not_implemented("floor", v.type_name())),
    }
}

pub fn ceil(conf: &Config, v: &Value) -> Result<Value> {
    match v {
        Value::Int(_) | Value::Big(_) => Ok(v.clone()),
        Value::Rat(r) => Ok(Value::from_big(r.ceil().to_integer())),
        Value::Float(f) => {
            if f.is_integer() {
                Ok(v.clone())
            } else {
                Ok(Value::from_big(f.ceil_int()))
            }
        }
        Value::Complex(c) => c.ceil(conf),
        _ => Err(EvalError::unary_not_implemented("ceil", v.type_name())),
    }
}

// ── Comparison ───────────────────────────────────────────────────────────────

/// Numeric order. Complex values are unordered; chars order among
/// themselves by code point.
pub fn cmp(conf: &Config, a: &Value, b: &Value) -> Result<Ordering> {
    if let (Value::Char(x), Value::Char(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    match promote2(conf, a, b, binary_arith_type)? {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(&y)),
        (Value::Big(x), Value::Big(y)) => Ok(x.cmp(&y)),
        (Value::Rat(x), Value::Rat(y)) => Ok(x.cmp(&y)),
        (Value::Float(x), Value::Float(y)) => Ok(x.cmp(&y)),
        (Value::Complex(_), _) | (_, Value::Complex(_)) => {
            Err(EvalError::type_err("complex numbers are not ordered"))
        }
        (a, _) => Err(EvalError::binary_not_implemented("<", a.type_name())),
    }
}

/// Equality across the numeric tower; componentwise for complex.
pub fn eq(conf: &Config, a: &Value, b: &Value) -> Result<bool> {
    if a.type_of() == Type::Complex || b.type_of() == Type::Complex {
        let (pa, pb) = promote2(conf, a, b, binary_arith_type)?;
        if let (Value::Complex(x), Value::Complex(y)) = (pa, pb) {
            return Ok(eq(conf, &x.re, &y.re)? && eq(conf, &x.im, &y.im)?);
        }
        return Err(EvalError::Internal("complex promotion failed".into()));
    }
    if (a.type_of() == Type::Char) != (b.type_of() == Type::Char) {
        return Err(EvalError::binary_not_implemented("==", Type::Char.name()));
    }
    Ok(cmp(conf, a, b)? == Ordering::Equal)
}

// ── Conversions ──────────────────────────────────────────────────────────────

pub fn as_float(conf: &Config, v: &Value) -> Result<BigFloat> {
    match v {
        Value::Int(i) => Ok(BigFloat::from_i64(*i, conf.float_prec())),
        Value::Big(b) => Ok(BigFloat::from_bigint(b, conf.float_prec())),
        Value::Rat(r) => Ok(BigFloat::from_ratio(r.numer(), r.denom(), conf.float_prec())),
        Value::Float(f) => Ok(f.clone()),
        _ => Err(EvalError::type_err(format!(
            "cannot convert {} to float",
            v.type_name()
        ))),
    }
}

/// Exact integer view for operators that demand whole numbers.
pub fn as_bigint(v: &Value) -> Result<BigInt> {
    match v {
        Value::Int(i) => Ok(BigInt::from(*i)),
        Value::Big(b) => Ok(b.clone()),
        _ => Err(EvalError::type_err(format!(
            "expected integer, not {}",
            v.type_name()
        ))),
    }
}

/// Nonnegative machine count, for shifts and repetition factors.
pub fn shift_count(v: &Value) -> Result<u64> {
    let n = match v {
        Value::Int(i) => i.to_u64(),
        Value::Big(b) => b.to_u64(),
        _ => None,
    };
    match n {
        Some(n) if n < value::MAX_INT as u64 => Ok(n),
        _ => Err(EvalError::domain("illegal shift count")),
    }
}

// ── Complex component arithmetic ─────────────────────────────────────────────

pub fn complex_add(conf: &Config, x: &Complex, y: &Complex) -> Result<Value> {
    Ok(Value::complex(
        add(conf, &x.re, &y.re)?,
        add(conf, &x.im, &y.im)?,
    ))
}

pub fn complex_sub(conf: &Config, x: &Complex, y: &Complex) -> Result<Value> {
    Ok(Value::complex(
        sub(conf, &x.re, &y.re)?,
        sub(conf, &x.im, &y.im)?,
    ))
}

pub fn complex_mul(conf: &Config, x: &Complex, y: &Complex) -> Result<Value> {
    let (a, b, c, d) = (&x.re, &x.im, &y.re, &y.im);
    Ok(Value::complex(
        sub(conf, &mul(conf, a, c)?, &mul(conf, b, d)?)?,
        add(conf, &mul(conf, a, d)?, &mul(conf, b, c)?)?,
    ))
}

pub fn complex_div(conf: &Config, x: &Complex, y: &Complex) -> Result<Value> {
    let (a, b, c, d) = (&x.re, &x.im, &y.re, &y.im);
    let den = add(conf, &mul(conf, c, c)?, &mul(conf, d, d)?)?;
    if den.is_zero_scalar() {
        return Err(EvalError::domain("division by zero"));
    }
    Ok(Value::complex(
        quo(conf, &add(conf, &mul(conf, a, c)?, &mul(conf, b, d)?)?, &den)?,
        quo(conf, &sub(conf, &mul(conf, b, c)?, &mul(conf, a, d)?)?, &den)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf() -> Config {
        Config::new()
    }

    #[test]
    fn int_overflow_promotes() {
        let c = conf();
        let max = Value::Int(value::MAX_INT);
        let r = add(&c, &max, &Value::Int(1)).unwrap();
        assert_eq!(r, Value::Big(BigInt::from(value::MAX_INT) + 1));
        let r2 = sub(&c, &r, &Value::Int(1)).unwrap();
        assert_eq!(r2, max);
    }

    #[test]
    fn exact_division_yields_rationals() {
        let c = conf();
        let r = quo(&c, &Value::Int(1), &Value::Int(3)).unwrap();
        assert_eq!(r, Value::Rat(BigRational::new(1.into(), 3.into())));
        let r = quo(&c, &Value::Int(6), &Value::Int(3)).unwrap();
        assert_eq!(r, Value::Int(2));
        assert!(quo(&c, &Value::Int(1), &Value::Int(0)).is_err());
    }

    #[test]
    fn mixed_promotion() {
        let c = conf();
        let half = Value::Rat(BigRational::new(1.into(), 2.into()));
        assert_eq!(add(&c, &Value::Int(1), &half.clone()).unwrap(),
            Value::Rat(BigRational::new(3.into(), 2.into())));
        let f = BigFloat::from_i64(2, 256);
        let r = mul(&c, &Value::Float(f), &half).unwrap();
        assert_eq!(r, Value::Int(1));
    }

    #[test]
    fn complex_arithmetic() {
        let c = conf();
        let i = Value::complex(Value::Int(0), Value::Int(1));
        let sq = mul(&c, &i, &i).unwrap();
        assert_eq!(sq, Value::Int(-1));
        let z = Value::complex(Value::Int(3), Value::Int(4));
        let w = quo(&c, &z, &i).unwrap();
        assert_eq!(w, Value::complex(Value::Int(4), Value::Int(-3)));
    }

    #[test]
    fn comparisons() {
        let c = conf();
        assert_eq!(cmp(&c, &Value::Int(1), &Value::Int(2)).unwrap(), Ordering::Less);
        let third = Value::Rat(BigRational::new(1.into(), 3.into()));
        assert_eq!(cmp(&c, &third, &Value::Int(1)).unwrap(), Ordering::Less);
        assert!(eq(&c, &Value::Int(2), &Value::Big(BigInt::from(2))).unwrap());
        assert!(cmp(&c, &Value::complex(Value::Int(0), Value::Int(1)), &Value::Int(1)).is_err());
        assert!(eq(&c, &Value::Char('a'), &Value::Int(97)).is_err());
        assert_eq!(cmp(&c, &Value::Char('a'), &Value::Char('b')).unwrap(), Ordering::Less);
    }

    #[test]
    fn must_fit_stops_runaway_bigints() {
        let mut c = conf();
        c.set_max_bits(64);
        let big = Value::Big(BigInt::from(1u64) << 60usize);
        assert!(mul(&c, &big, &big).is_err());
    }
}
