/// The universal value type: a closed tagged sum over the numeric tower plus
/// the two array containers.
///
/// Every arithmetic result passes through `shrink`, which collapses a value
/// to the lowest type in the tower that represents it, so a `Big` at rest
/// never fits a machine int, a `Rat` is never integral, and a `Complex`
/// never has a zero imaginary part.
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::conf::Config;
use crate::core::bigfloat::BigFloat;
use crate::core::complex::Complex;
use crate::errors::{EvalError, Result};
use crate::matrix::Matrix;
use crate::vector::Vector;

pub const MIN_INT: i64 = -(1 << 31);
pub const MAX_INT: i64 = (1 << 31) - 1;

/// The promotion lattice, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Int,
    Char,
    Big,
    Rat,
    Float,
    Complex,
    Vector,
    Matrix,
}

impl Type {
    pub fn name(self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Char => "char",
            Type::Big => "big int",
            Type::Rat => "rational",
            Type::Float => "float",
            Type::Complex => "complex",
            Type::Vector => "vector",
            Type::Matrix => "matrix",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Big(BigInt),
    Rat(BigRational),
    Float(BigFloat),
    Complex(Box<Complex>),
    Char(char),
    Vector(Vector),
    Matrix(Matrix),
}

impl Value {
    pub fn zero() -> Value {
        Value::Int(0)
    }

    pub fn one() -> Value {
        Value::Int(1)
    }

    /// 0 or 1, the result type of relational and boolean operators.
    pub fn bool(b: bool) -> Value {
        Value::Int(i64::from(b))
    }

    pub fn type_of(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int,
            Value::Big(_) => Type::Big,
            Value::Rat(_) => Type::Rat,
            Value::Float(_) => Type::Float,
            Value::Complex(_) => Type::Complex,
            Value::Char(_) => Type::Char,
            Value::Vector(_) => Type::Vector,
            Value::Matrix(_) => Type::Matrix,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_of().name()
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Vector(_) | Value::Matrix(_))
    }

    /// Scalar zero test, used by `shrink` and the boolean operators.
    pub fn is_zero_scalar(&self) -> bool {
        match self {
            Value::Int(i) => *i == 0,
            Value::Big(b) => b.is_zero(),
            Value::Rat(r) => r.is_zero(),
            Value::Float(f) => f.is_zero(),
            Value::Complex(c) => c.re.is_zero_scalar() && c.im.is_zero_scalar(),
            Value::Char(c) => *c == '\0',
            _ => false,
        }
    }

    /// Truthiness for conditions. Arrays are invalid.
    pub fn is_true(&self) -> Result<bool> {
        match self {
            Value::Int(i) => Ok(*i != 0),
            Value::Char(c) => Ok(*c != '\0'),
            // A zero-valued big or rational would have shrunk.
            Value::Big(_) | Value::Rat(_) => Ok(true),
            Value::Float(f) => Ok(!f.is_zero()),
            Value::Complex(c) => Ok(!(c.re.is_zero_scalar() && c.im.is_zero_scalar())),
            Value::Vector(_) | Value::Matrix(_) => Err(EvalError::type_err(format!(
                "non-scalar condition of type {}",
                self.type_name()
            ))),
        }
    }

    // ── Constructors that keep the shrink invariant ──────────────────────────

    pub fn from_i64(i: i64) -> Value {
        if (MIN_INT..=MAX_INT).contains(&i) {
            Value::Int(i)
        } else {
            Value::Big(BigInt::from(i))
        }
    }

    pub fn from_big(b: BigInt) -> Value {
        match b.to_i64() {
            Some(i) if (MIN_INT..=MAX_INT).contains(&i) => Value::Int(i),
            _ => Value::Big(b),
        }
    }

    pub fn from_rat(r: BigRational) -> Value {
        if r.denom().is_one() {
            Value::from_big(r.numer().clone())
        } else {
            Value::Rat(r)
        }
    }

    pub fn from_float(f: BigFloat) -> Value {
        Value::Float(f).shrink()
    }

    pub fn complex(re: Value, im: Value) -> Value {
        Value::Complex(Box::new(Complex::new(re, im))).shrink()
    }

    /// Collapse to the lowest type in the tower that represents the value.
    pub fn shrink(self) -> Value {
        match self {
            Value::Big(b) => Value::from_big(b),
            Value::Rat(r) => Value::from_rat(r),
            Value::Float(f) => {
                if f.exponent() <= 100 {
                    match f.to_bigint_exact() {
                        Some(i) => Value::from_big(i),
                        None => Value::Float(f),
                    }
                } else {
                    Value::Float(f)
                }
            }
            Value::Complex(c) => {
                if c.im.is_zero_scalar() {
                    c.re.shrink()
                } else {
                    Value::Complex(c)
                }
            }
            other => other,
        }
    }

    // ── Narrow views ─────────────────────────────────────────────────────────

    /// Machine integer, for counts, shifts, and indices.
    pub fn small_int(&self, what: &str) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            _ => Err(EvalError::type_err(format!(
                "{} must be a small integer, not {}",
                what,
                self.type_name()
            ))),
        }
    }

    pub fn as_vector(&self) -> Result<&Vector> {
        match self {
            Value::Vector(v) => Ok(v),
            _ => Err(EvalError::type_err(format!(
                "expected vector, not {}",
                self.type_name()
            ))),
        }
    }

    // ── Promotion ────────────────────────────────────────────────────────────

    /// Upward conversion along the lattice. Downward moves and numeric↔char
    /// moves are errors; the operator tables guarantee they are not requested
    /// for implemented operators.
    pub fn to_type(&self, conf: &Config, t: Type) -> Result<Value> {
        let from = self.type_of();
        if from == t {
            return Ok(self.clone());
        }
        match (self, t) {
            (Value::Int(i), Type::Big) => Ok(Value::Big(BigInt::from(*i))),
            (Value::Int(i), Type::Rat) => Ok(Value::Rat(BigRational::from_integer(BigInt::from(*i)))),
            (Value::Int(i), Type::Float) => Ok(Value::Float(BigFloat::from_i64(*i, conf.float_prec()))),
            (Value::Big(b), Type::Rat) => Ok(Value::Rat(BigRational::from_integer(b.clone()))),
            (Value::Big(b), Type::Float) => {
                Ok(Value::Float(BigFloat::from_bigint(b, conf.float_prec())))
            }
            (Value::Rat(r), Type::Float) => Ok(Value::Float(BigFloat::from_ratio(
                r.numer(),
                r.denom(),
                conf.float_prec(),
            ))),
            (v, Type::Complex) if v.is_scalar() && from != Type::Char => Ok(Value::Complex(
                Box::new(Complex::new(v.clone(), Value::zero())),
            )),
            (v, Type::Vector) if v.is_scalar() => {
                Ok(Value::Vector(Vector::from_values(vec![v.clone()])))
            }
            (Value::Vector(v), Type::Matrix) => {
                Ok(Value::Matrix(Matrix::new(vec![v.len()], v.clone())?))
            }
            (v, Type::Matrix) if v.is_scalar() => {
                let vec = Vector::from_values(vec![v.clone()]);
                Ok(Value::Matrix(Matrix::new(vec![1], vec)?))
            }
            _ => Err(EvalError::type_err(format!(
                "cannot convert {} to {}",
                from.name(),
                t.name()
            ))),
        }
    }
}

// ── whichType family ─────────────────────────────────────────────────────────

pub type WhichType = fn(Type, Type) -> (Type, Type);

/// Promote both operands to the larger type.
pub fn binary_arith_type(a: Type, b: Type) -> (Type, Type) {
    let m = a.max(b);
    (m, m)
}

/// As arithmetic, but machine ints go through big ints (exponentiation and
/// shifts need bignum headroom).
pub fn div_type(a: Type, b: Type) -> (Type, Type) {
    let mut m = a.max(b);
    if m == Type::Int {
        m = Type::Big;
    }
    (m, m)
}

/// Promote both operands to at least rational (true division).
pub fn rational_type(a: Type, b: Type) -> (Type, Type) {
    let m = a.max(b).max(Type::Rat);
    (m, m)
}

/// Promote a scalar to a one-element vector when the other side is an array.
pub fn at_least_vector_type(a: Type, b: Type) -> (Type, Type) {
    (a.max(Type::Vector), b.max(Type::Vector))
}

// ── Literal parsing ──────────────────────────────────────────────────────────

/// Parse a numeric literal: machine int, then big int, then rational `p/q`,
/// then float for text with a decimal point or exponent. `j` complex forms
/// are assembled by the scanner from their halves.
pub fn parse_number(conf: &Config, text: &str) -> Result<Value> {
    let err = || EvalError::Parse(format!("bad number syntax: {:?}", text));
    if let Some((num, den)) = text.split_once('/') {
        let n = parse_int(conf, num).ok_or_else(err)?;
        let d = parse_int(conf, den).ok_or_else(err)?;
        if d.is_zero() {
            return Err(EvalError::domain("division by zero"));
        }
        return Ok(Value::from_rat(BigRational::new(n, d)));
    }
    if effective_base(conf, text) == 10
        && (text.contains('.') || text.contains('e') || text.contains('E'))
    {
        return parse_float(conf, text);
    }
    match parse_int(conf, text) {
        Some(i) => Ok(Value::from_big(i)),
        None => Err(err()),
    }
}

fn effective_base(conf: &Config, text: &str) -> u32 {
    match conf.input_base() {
        0 => {
            let t = text.trim_start_matches(['+', '-']);
            if t.starts_with("0x") || t.starts_with("0X") {
                16
            } else if t.starts_with("0o") || t.starts_with("0O") {
                8
            } else if t.starts_with("0b") || t.starts_with("0B") {
                2
            } else {
                10
            }
        }
        b => b,
    }
}

/// Drop a C-style radix prefix from unsigned digit text.
fn strip_prefix<'a>(conf: &Config, t: &'a str) -> &'a str {
    if conf.input_base() != 0 {
        return t;
    }
    t.strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .or_else(|| t.strip_prefix("0o"))
        .or_else(|| t.strip_prefix("0O"))
        .or_else(|| t.strip_prefix("0b"))
        .or_else(|| t.strip_prefix("0B"))
        .unwrap_or(t)
}

fn parse_int(conf: &Config, text: &str) -> Option<BigInt> {
    let base = effective_base(conf, text);
    let neg = text.starts_with('-');
    let body = strip_prefix(conf, text.trim_start_matches(['+', '-']));
    if body.is_empty() {
        return None;
    }
    let mag = BigInt::parse_bytes(body.as_bytes(), base)?;
    Some(if neg { -mag } else { mag })
}

fn parse_float(conf: &Config, text: &str) -> Result<Value> {
    let err = || EvalError::Parse(format!("bad number syntax: {:?}", text));
    let (mant_text, exp_text) = match text.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (text, None),
    };
    let mut exp: i64 = match exp_text {
        Some(e) => e.parse().map_err(|_| err())?,
        None => 0,
    };
    let neg = mant_text.starts_with('-');
    let mant_text = mant_text.trim_start_matches(['+', '-']);
    let (int_part, frac_part) = match mant_text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mant_text, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(err());
    }
    let mut digits = String::with_capacity(int_part.len() + frac_part.len());
    digits.push_str(int_part);
    digits.push_str(frac_part);
    let mant = BigInt::parse_bytes(digits.as_bytes(), 10).ok_or_else(err)?;
    exp -= frac_part.len() as i64;
    if exp.unsigned_abs() > 300_000 {
        return Err(EvalError::overflow("exponent too large"));
    }
    let ten = BigInt::from(10);
    let (num, den) = if exp >= 0 {
        (mant * ten.pow(exp as u32), BigInt::one())
    } else {
        (mant, ten.pow((-exp) as u32))
    };
    let f = BigFloat::from_ratio(&num, &den, conf.float_prec());
    Ok(Value::from_float(if neg { f.neg() } else { f }))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Big(a), Value::Big(b)) => a == b,
            (Value::Rat(a), Value::Rat(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Complex(a), Value::Complex(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Matrix(a), Value::Matrix(b)) => a == b,
            _ => false,
        }
    }
}

/// Machine-int division helpers shared by the integer operators.
pub fn euclid_divmod(a: &BigInt, b: &BigInt) -> (BigInt, BigInt) {
    let (mut q, mut r) = a.div_rem(b);
    if r.is_negative() {
        if b.is_positive() {
            q -= 1;
            r += b;
        } else {
            q += 1;
            r -= b;
        }
    }
    (q, r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf() -> Config {
        Config::new()
    }

    #[test]
    fn lattice_order() {
        assert!(Type::Int < Type::Char);
        assert!(Type::Char < Type::Big);
        assert!(Type::Big < Type::Rat);
        assert!(Type::Rat < Type::Float);
        assert!(Type::Float < Type::Complex);
        assert!(Type::Complex < Type::Vector);
        assert!(Type::Vector < Type::Matrix);
    }

    #[test]
    fn shrink_collapses() {
        assert_eq!(Value::Big(BigInt::from(5)).shrink(), Value::Int(5));
        let r = BigRational::new(BigInt::from(4), BigInt::from(2));
        assert_eq!(Value::Rat(r).shrink(), Value::Int(2));
        let f = BigFloat::from_i64(9, 256);
        assert_eq!(Value::Float(f).shrink(), Value::Int(9));
        let c = Value::complex(Value::Int(3), Value::Int(0));
        assert_eq!(c, Value::Int(3));
    }

    #[test]
    fn shrink_keeps_wide_values() {
        let big = BigInt::from(MAX_INT) + 1;
        assert!(matches!(Value::Big(big).shrink(), Value::Big(_)));
        let r = BigRational::new(BigInt::from(1), BigInt::from(3));
        assert!(matches!(Value::Rat(r).shrink(), Value::Rat(_)));
        // Huge exact float stays a float: the exponent guard.
        let f = BigFloat::from_i64(1, 256).scalb(200);
        assert!(matches!(Value::Float(f).shrink(), Value::Float(_)));
    }

    #[test]
    fn parse_ladder() {
        let c = conf();
        assert_eq!(parse_number(&c, "42").unwrap(), Value::Int(42));
        assert_eq!(
            parse_number(&c, "4294967296").unwrap(),
            Value::Big(BigInt::from(1u64 << 32))
        );
        assert_eq!(
            parse_number(&c, "1/3").unwrap(),
            Value::Rat(BigRational::new(BigInt::from(1), BigInt::from(3)))
        );
        assert_eq!(parse_number(&c, "6/3").unwrap(), Value::Int(2));
        assert_eq!(parse_number(&c, "1.0").unwrap(), Value::Int(1));
        assert!(matches!(parse_number(&c, "1.5").unwrap(), Value::Float(_)));
        assert_eq!(parse_number(&c, "1e3").unwrap(), Value::Int(1000));
        assert_eq!(parse_number(&c, "0x10").unwrap(), Value::Int(16));
        assert_eq!(parse_number(&c, "0b101").unwrap(), Value::Int(5));
    }

    #[test]
    fn parse_respects_input_base() {
        let mut c = conf();
        c.set_base(16, 0).unwrap();
        assert_eq!(parse_number(&c, "ff").unwrap(), Value::Int(255));
        assert_eq!(parse_number(&c, "10/2").unwrap(), Value::Int(8));
    }

    #[test]
    fn euclid_division_is_nonnegative() {
        let cases = [(7, 3), (-7, 3), (7, -3), (-7, -3)];
        for (a, b) in cases {
            let (q, r) = euclid_divmod(&BigInt::from(a), &BigInt::from(b));
            assert!(!r.is_negative(), "{} mod {} gave {}", a, b, r);
            assert_eq!(q * b + r, BigInt::from(a));
        }
    }

    #[test]
    fn which_type_tables() {
        assert_eq!(binary_arith_type(Type::Int, Type::Float), (Type::Float, Type::Float));
        assert_eq!(div_type(Type::Int, Type::Int), (Type::Big, Type::Big));
        assert_eq!(rational_type(Type::Int, Type::Big), (Type::Rat, Type::Rat));
        assert_eq!(
            at_least_vector_type(Type::Int, Type::Matrix),
            (Type::Vector, Type::Matrix)
        );
    }
}
