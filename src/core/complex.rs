/// Complex scalar: a pair of non-complex tower scalars.
///
/// Arithmetic lives in `arith` so component operations share the promotion
/// machinery. After `shrink`, a complex at rest always has a nonzero
/// imaginary part.
use std::cmp::Ordering;

use crate::conf::Config;
use crate::core::arith;
use crate::core::value::Value;
use crate::errors::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct Complex {
    pub re: Value,
    pub im: Value,
}

impl Complex {
    pub fn new(re: Value, im: Value) -> Complex {
        debug_assert!(re.is_scalar() && !matches!(re, Value::Complex(_)));
        debug_assert!(im.is_scalar() && !matches!(im, Value::Complex(_)));
        Complex { re, im }
    }

    pub fn conj(&self, conf: &Config) -> Result<Value> {
        Ok(Value::complex(
            self.re.clone(),
            arith::neg(conf, &self.im)?,
        ))
    }

    /// Complex floor after McDonnell (1973): floor both components, then move
    /// one unit along the axis of the larger fractional part when the result
    /// lands outside the unit cell.
    pub fn floor(&self, conf: &Config) -> Result<Value> {
        let one = Value::one();
        let fa = arith::floor(conf, &self.re)?;
        let fb = arith::floor(conf, &self.im)?;
        let x = arith::sub(conf, &self.re, &fa)?;
        let y = arith::sub(conf, &self.im, &fb)?;
        let frac_sum = arith::add(conf, &x, &y)?;
        if arith::cmp(conf, &frac_sum, &one)? == Ordering::Less {
            Ok(Value::complex(fa, fb))
        } else if arith::cmp(conf, &x, &y)? != Ordering::Less {
            Ok(Value::complex(arith::add(conf, &fa, &one)?, fb))
        } else {
            Ok(Value::complex(fa, arith::add(conf, &fb, &one)?))
        }
    }

    pub fn ceil(&self, conf: &Config) -> Result<Value> {
        let negated = Complex::new(
            arith::neg(conf, &self.re)?,
            arith::neg(conf, &self.im)?,
        );
        arith::neg(conf, &negated.floor(conf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf() -> Config {
        Config::new()
    }

    fn cpx(re: i64, im: i64) -> Complex {
        Complex::new(Value::Int(re), Value::Int(im))
    }

    #[test]
    fn conjugate_negates_imaginary() {
        let c = conf();
        assert_eq!(
            cpx(3, 4).conj(&c).unwrap(),
            Value::complex(Value::Int(3), Value::Int(-4))
        );
    }

    #[test]
    fn mcdonnell_floor() {
        let c = conf();
        let half = |n: i64| Value::Rat(num_rational::BigRational::new(n.into(), 2.into()));
        // 1.5 + 0.5j: fractions sum to 1 and x ≥ y, so real part rounds up.
        let z = Complex::new(half(3), half(1));
        assert_eq!(
            z.floor(&c).unwrap(),
            Value::complex(Value::Int(2), Value::Int(0))
        );
        // 0.5 + 1.5j: imaginary fraction dominates.
        let z = Complex::new(half(1), half(3));
        assert_eq!(
            z.floor(&c).unwrap(),
            Value::complex(Value::Int(0), Value::Int(2))
        );
        // 0.25 + 0.25j stays in the cell.
        let quarter = Value::Rat(num_rational::BigRational::new(1.into(), 4.into()));
        let z = Complex::new(quarter.clone(), quarter);
        assert_eq!(
            z.floor(&c).unwrap(),
            Value::complex(Value::Int(0), Value::Int(0))
        );
    }

    #[test]
    fn ceil_is_negated_floor() {
        let c = conf();
        let half = |n: i64| Value::Rat(num_rational::BigRational::new(n.into(), 2.into()));
        let z = Complex::new(half(3), half(1));
        assert_eq!(
            z.ceil(&c).unwrap(),
            Value::complex(Value::Int(1), Value::Int(1))
        );
    }
}
