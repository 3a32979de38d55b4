/// Series-based transcendental kernel over `BigFloat`.
///
/// Every series runs under a convergence loop: it stops when successive
/// results agree to within one ulp (after at least three iterations) and
/// fails loudly when the iteration budget `10 + itersPerBit · prec` runs out.
/// Constants (π, ln 2) and the gamma coefficient table are computed once per
/// precision and cached behind a read-write lock.
use std::collections::HashMap;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::conf::Config;
use crate::core::arith;
use crate::core::bigfloat::BigFloat;
use crate::core::complex::Complex;
use crate::core::value::Value;
use crate::errors::{EvalError, Result};
use crate::format;

/// Largest binary exponent a float result may reach before `exp` and the
/// power operator report overflow.
const MAX_FLOAT_EXP: i64 = 1 << 20;

// ── Convergence loop ─────────────────────────────────────────────────────────

struct Loop {
    name: &'static str,
    arg: String,
    i: usize,
    max_iters: usize,
    prev: BigFloat,
}

impl Loop {
    fn new(name: &'static str, arg: String, prec: u32, iters_per_bit: usize) -> Loop {
        Loop {
            name,
            arg,
            i: 0,
            max_iters: 10 + iters_per_bit * prec as usize,
            prev: BigFloat::zero(prec),
        }
    }

    fn with_cap(name: &'static str, arg: String, prec: u32, cap: usize) -> Loop {
        let mut l = Loop::new(name, arg, prec, 1);
        l.max_iters = cap;
        l
    }

    /// Feed the next approximation; true means the series has settled.
    fn done(&mut self, z: &BigFloat) -> Result<bool> {
        self.i += 1;
        let delta = self.prev.sub(z);
        let settled = delta.is_zero()
            || delta.exponent() < z.exponent() - z.precision() as i64;
        if settled && self.i >= 3 {
            return Ok(true);
        }
        if self.i >= self.max_iters {
            return Err(EvalError::Convergence {
                name: self.name,
                arg: self.arg.clone(),
                iters: self.i,
            });
        }
        self.prev = z.clone();
        Ok(false)
    }
}

fn arg_text(conf: &Config, x: &BigFloat) -> String {
    format::sprint(conf, &Value::Float(x.clone()))
}

fn fi(i: i64, prec: u32) -> BigFloat {
    BigFloat::from_i64(i, prec)
}

fn fr(num: i64, den: i64, prec: u32) -> BigFloat {
    BigFloat::from_ratio(&BigInt::from(num), &BigInt::from(den), prec)
}

// ── Cached constants ─────────────────────────────────────────────────────────

static PI_CACHE: Lazy<RwLock<HashMap<u32, BigFloat>>> = Lazy::new(|| RwLock::new(HashMap::new()));
static LN2_CACHE: Lazy<RwLock<HashMap<u32, BigFloat>>> = Lazy::new(|| RwLock::new(HashMap::new()));

pub fn pi(prec: u32) -> BigFloat {
    if let Some(v) = PI_CACHE.read().get(&prec) {
        return v.clone();
    }
    // Machin: π = 16·atan(1/5) − 4·atan(1/239). Both arguments sit deep in
    // the Taylor regime.
    let work = prec + 32;
    let a = atan_taylor(&fr(1, 5, work), work).expect("atan(1/5) converges");
    let b = atan_taylor(&fr(1, 239, work), work).expect("atan(1/239) converges");
    let v = a.scalb(4).sub(&b.scalb(2)).with_prec(prec);
    PI_CACHE.write().insert(prec, v.clone());
    v
}

pub fn ln2(prec: u32) -> BigFloat {
    if let Some(v) = LN2_CACHE.read().get(&prec) {
        return v.clone();
    }
    // ln 2 = 2·atanh(1/3) = 2·Σ (1/3)^(2k+1)/(2k+1).
    let work = prec + 32;
    let x = fr(1, 3, work);
    let x2 = x.mul(&x);
    let mut term = x.clone();
    let mut sum = x;
    let mut k: i64 = 1;
    loop {
        term = term.mul(&x2);
        k += 2;
        let next = sum.add(&term.div(&fi(k, work)).expect("odd k"));
        if next == sum {
            break;
        }
        sum = next;
    }
    let v = sum.scalb(1).with_prec(prec);
    LN2_CACHE.write().insert(prec, v.clone());
    v
}

// ── Square root ──────────────────────────────────────────────────────────────

/// Newton's method, seeded by halving the binary exponent.
pub fn sqrt(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    if x.is_negative() {
        return Err(EvalError::domain("sqrt of negative number"));
    }
    if x.is_zero() {
        return Ok(x.clone());
    }
    let prec = conf.float_prec();
    let (_, e) = x.mant_exp();
    let mut z = x.scalb(-e + e / 2);
    let mut l = Loop::with_cap("sqrt", arg_text(conf, x), prec, 100);
    loop {
        z = z.add(&x.div(&z)?).scalb(-1);
        if l.done(&z)? {
            return Ok(z);
        }
    }
}

// ── Logarithm and exponential ────────────────────────────────────────────────

pub fn log(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    if x.is_zero() || x.is_negative() {
        return Err(EvalError::domain("log of non-positive value"));
    }
    let prec = conf.float_prec();
    if x.cmp(&fi(1, prec)) == std::cmp::Ordering::Equal {
        return Ok(BigFloat::zero(prec));
    }
    // Split x = m·2^e with m ∈ [0.5, 1): log x = log m + e·ln 2, and the
    // Maclaurin series for log(1−y) covers y = 1−m ∈ (0, 0.5].
    let (m, e) = x.mant_exp();
    let y = fi(1, prec).sub(&m);
    let log_m = if y.is_zero() {
        BigFloat::zero(prec)
    } else {
        let mut term = y.clone();
        let mut sum = y.clone();
        let mut k: i64 = 1;
        let mut l = Loop::new("log", arg_text(conf, x), prec, 1);
        loop {
            if l.done(&sum)? {
                break;
            }
            k += 1;
            term = term.mul(&y);
            sum = sum.add(&term.div(&fi(k, prec))?);
        }
        sum.neg()
    };
    Ok(log_m.add(&ln2(prec).mul(&fi(e, prec))))
}

pub fn exp(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    let prec = conf.float_prec();
    if x.is_zero() {
        return Ok(fi(1, prec));
    }
    if x.is_negative() {
        return fi(1, prec).div(&exp(conf, &x.neg())?);
    }
    // The result's binary exponent is about x/ln 2.
    if x.cmp(&fi(MAX_FLOAT_EXP / 2, prec)) == std::cmp::Ordering::Greater {
        return Err(EvalError::overflow("exponent too large"));
    }
    // Argument reduction: exp(x) = exp(x/2^k)^(2^k) with k = ⌈√prec⌉.
    let mut k: i64 = 0;
    while (k * k) < prec as i64 {
        k += 1;
    }
    let xr = x.scalb(-k);
    let mut term = xr.clone();
    let mut sum = fi(1, prec).add(&term);
    let mut n: i64 = 1;
    let mut l = Loop::new("exp", arg_text(conf, x), prec, 2);
    loop {
        if l.done(&sum)? {
            break;
        }
        n += 1;
        term = term.mul(&xr).div(&fi(n, prec))?;
        sum = sum.add(&term);
    }
    let mut z = sum;
    for _ in 0..k {
        z = z.mul(&z);
        if z.exponent() > MAX_FLOAT_EXP {
            return Err(EvalError::overflow("exponent too large"));
        }
    }
    Ok(z)
}

// ── Circular functions ───────────────────────────────────────────────────────

/// Reduce modulo 2π into [0, 2π).
fn mod_two_pi(conf: &Config, x: &BigFloat) -> BigFloat {
    let prec = conf.float_prec();
    let two_pi = pi(prec).scalb(1);
    let q = x.div(&two_pi).expect("2π is nonzero").floor_int();
    if q.is_zero() {
        return x.clone();
    }
    x.sub(&two_pi.mul(&BigFloat::from_bigint(&q, prec)))
}

fn sin_cos_series(
    conf: &Config,
    name: &'static str,
    x: &BigFloat,
    odd: bool,
) -> Result<BigFloat> {
    let prec = conf.float_prec();
    let x = mod_two_pi(conf, x);
    let x2 = x.mul(&x).neg();
    let (mut term, mut n) = if odd {
        (x.clone(), 1i64)
    } else {
        (fi(1, prec), 0i64)
    };
    let mut sum = term.clone();
    let mut l = Loop::new(name, arg_text(conf, &x), prec, 2);
    loop {
        if l.done(&sum)? {
            return Ok(sum);
        }
        term = term.mul(&x2).div(&fi((n + 1) * (n + 2), prec))?;
        n += 2;
        sum = sum.add(&term);
    }
}

pub fn sin(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    sin_cos_series(conf, "sin", x, true)
}

pub fn cos(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    sin_cos_series(conf, "cos", x, false)
}

pub fn tan(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    let c = cos(conf, x)?;
    if c.is_zero() {
        return Err(EvalError::domain("tangent is infinite"));
    }
    sin(conf, x)?.div(&c)
}

// ── Inverse circular functions ───────────────────────────────────────────────

fn atan_taylor(x: &BigFloat, prec: u32) -> Result<BigFloat> {
    let x2 = x.mul(x).neg();
    let mut pow = x.clone();
    let mut sum = x.clone();
    let mut k: i64 = 1;
    let mut l = Loop::new("atan", String::new(), prec, 2);
    loop {
        if l.done(&sum)? {
            return Ok(sum);
        }
        pow = pow.mul(&x2);
        k += 2;
        sum = sum.add(&pow.div(&fi(k, prec))?);
    }
}

pub fn atan(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    let prec = conf.float_prec();
    if x.is_negative() {
        return Ok(atan(conf, &x.neg())?.neg());
    }
    let half = fr(1, 2, prec);
    if x.cmp(&half) == std::cmp::Ordering::Less {
        return atan_taylor(x, prec);
    }
    if x.cmp(&fr(3, 2, prec)) != std::cmp::Ordering::Greater {
        // Euler's wedge: atan x = π/8 + atan((x−tan π/8)/(1+x·tan π/8)),
        // tan π/8 = √2 − 1, which pulls the argument into the Taylor zone.
        let t = sqrt(conf, &fi(2, prec))?.sub(&fi(1, prec));
        let u = x.sub(&t).div(&fi(1, prec).add(&x.mul(&t)))?;
        return Ok(pi(prec).scalb(-3).add(&atan(conf, &u)?));
    }
    // |x| > 1: fold through the reciprocal.
    Ok(pi(prec).scalb(-1).sub(&atan(conf, &fi(1, prec).div(x)?)?))
}

pub fn asin(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    let prec = conf.float_prec();
    let one = fi(1, prec);
    match x.abs().cmp(&one) {
        std::cmp::Ordering::Greater => Err(EvalError::domain("asin argument out of range")),
        std::cmp::Ordering::Equal => {
            let v = pi(prec).scalb(-1);
            Ok(if x.is_negative() { v.neg() } else { v })
        }
        std::cmp::Ordering::Less => {
            let den = sqrt(conf, &one.sub(&x.mul(x)))?;
            atan(conf, &x.div(&den)?)
        }
    }
}

pub fn acos(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    if x.abs().cmp(&fi(1, conf.float_prec())) == std::cmp::Ordering::Greater {
        return Err(EvalError::domain("acos argument out of range"));
    }
    Ok(pi(conf.float_prec()).scalb(-1).sub(&asin(conf, x)?))
}

/// Quadrant-aware angle of the point `(x, y)`.
pub fn atan2(conf: &Config, y: &BigFloat, x: &BigFloat) -> Result<BigFloat> {
    let prec = conf.float_prec();
    if x.is_zero() {
        if y.is_zero() {
            return Ok(BigFloat::zero(prec));
        }
        let v = pi(prec).scalb(-1);
        return Ok(if y.is_negative() { v.neg() } else { v });
    }
    let base = atan(conf, &y.div(x)?)?;
    if !x.is_negative() {
        return Ok(base);
    }
    if y.is_negative() {
        Ok(base.sub(&pi(prec)))
    } else {
        Ok(base.add(&pi(prec)))
    }
}

// ── Hyperbolic functions ─────────────────────────────────────────────────────

fn sinh_cosh_series(
    conf: &Config,
    name: &'static str,
    x: &BigFloat,
    odd: bool,
) -> Result<BigFloat> {
    let prec = conf.float_prec();
    if x.cmp_abs(&fi(MAX_FLOAT_EXP / 2, prec)) == std::cmp::Ordering::Greater {
        return Err(EvalError::overflow("exponent too large"));
    }
    let x2 = x.mul(x);
    let (mut term, mut n) = if odd {
        (x.clone(), 1i64)
    } else {
        (fi(1, prec), 0i64)
    };
    let mut sum = term.clone();
    let mut l = Loop::new(name, arg_text(conf, x), prec, 2);
    loop {
        if l.done(&sum)? {
            return Ok(sum);
        }
        term = term.mul(&x2).div(&fi((n + 1) * (n + 2), prec))?;
        n += 2;
        sum = sum.add(&term);
    }
}

pub fn sinh(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    sinh_cosh_series(conf, "sinh", x, true)
}

pub fn cosh(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    sinh_cosh_series(conf, "cosh", x, false)
}

pub fn tanh(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    sinh(conf, x)?.div(&cosh(conf, x)?)
}

pub fn asinh(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    if x.is_negative() {
        return Ok(asinh(conf, &x.neg())?.neg());
    }
    let one = fi(1, conf.float_prec());
    log(conf, &x.add(&sqrt(conf, &x.mul(x).add(&one))?))
}

pub fn acosh(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    let one = fi(1, conf.float_prec());
    if x.cmp(&one) == std::cmp::Ordering::Less {
        return Err(EvalError::domain("acosh argument out of range"));
    }
    log(conf, &x.add(&sqrt(conf, &x.mul(x).sub(&one))?))
}

pub fn atanh(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    let one = fi(1, conf.float_prec());
    if x.cmp_abs(&one) != std::cmp::Ordering::Less {
        return Err(EvalError::domain("atanh argument out of range"));
    }
    let ratio = one.add(x).div(&one.sub(x))?;
    Ok(log(conf, &ratio)?.scalb(-1))
}

// ── Factorial and gamma ──────────────────────────────────────────────────────

fn sieve(n: u64) -> Vec<u64> {
    if n < 2 {
        return Vec::new();
    }
    let mut composite = vec![false; (n + 1) as usize];
    let mut primes = Vec::new();
    for p in 2..=n {
        if composite[p as usize] {
            continue;
        }
        primes.push(p);
        let mut q = p * p;
        while q <= n {
            composite[q as usize] = true;
            q += p;
        }
    }
    primes
}

/// `swing(n) = n! / ⌊n/2⌋!²`, as a product of prime powers: the exponent of
/// `p` counts the odd values among `⌊n/p⌋, ⌊n/p²⌋, …`.
fn swing(n: u64, primes: &[u64]) -> BigInt {
    let mut acc = BigInt::from(1);
    for &p in primes {
        if p > n {
            break;
        }
        let mut e = 0u32;
        let mut q = n / p;
        while q > 0 {
            if q % 2 == 1 {
                e += 1;
            }
            q /= p;
        }
        if e > 0 {
            acc *= BigInt::from(p).pow(e);
        }
    }
    acc
}

fn factorial_swing(n: u64, primes: &[u64]) -> BigInt {
    if n < 2 {
        return BigInt::from(1);
    }
    let half = factorial_swing(n / 2, primes);
    swing(n, primes) * &half * &half
}

pub fn factorial(conf: &Config, n: &BigInt) -> Result<BigInt> {
    if n.is_negative() {
        return Err(EvalError::domain("factorial of negative integer"));
    }
    let n = n
        .to_u64()
        .ok_or_else(|| EvalError::overflow("factorial argument too large"))?;
    // n! has about n·log2(n) bits.
    let log2n = 64 - n.leading_zeros() as u64;
    conf.must_fit(n.saturating_mul(log2n))?;
    let primes = sieve(n);
    Ok(factorial_swing(n, &primes))
}

/// Spouge coefficient table for a given precision. The term count tracks the
/// precision (about 100 terms at 256 bits); the table is shared and reused.
static SPOUGE_CACHE: Lazy<RwLock<HashMap<u32, (i64, Vec<BigFloat>)>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn spouge_table(conf: &Config) -> Result<(i64, Vec<BigFloat>)> {
    let prec = conf.float_prec();
    if let Some(t) = SPOUGE_CACHE.read().get(&prec) {
        return Ok(t.clone());
    }
    // a ≈ prec · ln2/ln(2π) terms gives full precision.
    let a = (prec as i64 * 377) / 1000 + 3;
    let two_pi = pi(prec).scalb(1);
    let mut coeffs = Vec::with_capacity(a as usize);
    coeffs.push(sqrt(conf, &two_pi)?);
    let mut kfact = BigFloat::from_i64(1, prec);
    for k in 1..a {
        if k > 1 {
            kfact = kfact.mul(&fi(k - 1, prec));
        }
        let amk = fi(a - k, prec);
        // c_k = (−1)^(k−1)/(k−1)! · (a−k)^(k−1/2) · e^(a−k)
        let power = float_pow_u64(&amk, (k - 1) as u64).mul(&sqrt(conf, &amk)?);
        let mut c = power.mul(&exp(conf, &amk)?).div(&kfact)?;
        if k % 2 == 0 {
            c = c.neg();
        }
        coeffs.push(c);
    }
    SPOUGE_CACHE.write().insert(prec, (a, coeffs.clone()));
    Ok((a, coeffs))
}

fn float_pow_u64(x: &BigFloat, mut e: u64) -> BigFloat {
    let mut base = x.clone();
    let mut acc = BigFloat::from_i64(1, x.precision());
    while e > 0 {
        if e & 1 == 1 {
            acc = acc.mul(&base);
        }
        base = base.mul(&base);
        e >>= 1;
    }
    acc
}

pub fn gamma(conf: &Config, x: &BigFloat) -> Result<BigFloat> {
    let prec = conf.float_prec();
    if x.is_integer() && !x.trunc().is_positive() {
        return Err(EvalError::domain("gamma of non-positive integer"));
    }
    let half = fr(1, 2, prec);
    if x.cmp(&half) == std::cmp::Ordering::Less {
        // Reflection: Γ(x) = π / (sin(πx)·Γ(1−x)).
        let s = sin(conf, &pi(prec).mul(x))?;
        if s.is_zero() {
            return Err(EvalError::domain("gamma of non-positive integer"));
        }
        let rest = gamma(conf, &fi(1, prec).sub(x))?;
        return pi(prec).div(&s.mul(&rest));
    }
    // Spouge series for Γ(z+1) at z = x−1.
    let z = x.sub(&fi(1, prec));
    let (a, coeffs) = spouge_table(conf)?;
    let mut sum = coeffs[0].clone();
    for (k, c) in coeffs.iter().enumerate().skip(1) {
        sum = sum.add(&c.div(&z.add(&fi(k as i64, prec)))?);
    }
    let za = z.add(&fi(a, prec));
    let scale = exp(conf, &z.add(&half).mul(&log(conf, &za)?))?;
    let decay = exp(conf, &za.neg())?;
    Ok(scale.mul(&decay).mul(&sum))
}

// ── Power ────────────────────────────────────────────────────────────────────

/// The `**` operator on scalars: exponents 0, 1, and ½ are special-cased,
/// integer exponents go by repeated squaring (negative through the
/// reciprocal), and the fractional remainder through `exp(frac·log x)`.
pub fn power(conf: &Config, u: &Value, v: &Value) -> Result<Value> {
    if v.is_zero_scalar() {
        return Ok(Value::one());
    }
    let int_exp = match v {
        Value::Int(i) => Some(BigInt::from(*i)),
        Value::Big(b) => Some(b.clone()),
        Value::Float(f) => f.to_bigint_exact(),
        _ => None,
    };
    if let Some(e) = int_exp {
        return integer_power(conf, u, &e);
    }
    if let Value::Rat(r) = v {
        if *r.numer() == BigInt::from(1) && *r.denom() == BigInt::from(2) {
            return sqrt_value(conf, u);
        }
    }
    if matches!(u, Value::Complex(_)) || matches!(v, Value::Complex(_)) {
        return complex_power(conf, u, v);
    }
    let base = arith::as_float(conf, u)?;
    let expo = arith::as_float(conf, v)?;
    if base.is_zero() {
        if expo.is_negative() {
            return Err(EvalError::domain("negative exponent of zero"));
        }
        return Ok(Value::zero());
    }
    if base.is_negative() {
        return complex_power(conf, u, v);
    }
    let int_part = expo.floor_int();
    let frac = expo.sub(&BigFloat::from_bigint(&int_part, conf.float_prec()));
    let whole = integer_power(conf, u, &int_part)?;
    let fractional = exp(conf, &frac.mul(&log(conf, &base)?))?;
    arith::mul(conf, &whole, &Value::Float(fractional))
}

fn integer_power(conf: &Config, u: &Value, e: &BigInt) -> Result<Value> {
    if e.is_negative() {
        if u.is_zero_scalar() {
            return Err(EvalError::domain("negative exponent of zero"));
        }
        let pos = integer_power(conf, u, &-e.clone())?;
        return arith::quo(conf, &Value::one(), &pos);
    }
    let exp_u32 = e
        .to_u32()
        .filter(|&e| e <= i32::MAX as u32)
        .ok_or_else(|| EvalError::overflow("exponent too large"))?;
    match u {
        Value::Int(_) | Value::Big(_) => {
            let b = arith::as_bigint(u)?;
            conf.must_fit(b.bits().saturating_mul(exp_u32 as u64).max(1))?;
            Ok(Value::from_big(b.pow(exp_u32)))
        }
        Value::Rat(r) => {
            conf.must_fit(
                (r.numer().bits() + r.denom().bits()).saturating_mul(exp_u32 as u64).max(1),
            )?;
            Ok(Value::from_rat(r.pow(exp_u32 as i32)))
        }
        Value::Float(f) => {
            if f.exponent().saturating_mul(exp_u32 as i64) > MAX_FLOAT_EXP {
                return Err(EvalError::overflow("exponent too large"));
            }
            Ok(Value::Float(float_pow_u64(f, exp_u32 as u64)).shrink())
        }
        Value::Complex(_) => {
            let mut acc = Value::one();
            let mut base = u.clone();
            let mut e = exp_u32;
            while e > 0 {
                if e & 1 == 1 {
                    acc = arith::mul(conf, &acc, &base)?;
                }
                base = arith::mul(conf, &base, &base)?;
                e >>= 1;
            }
            Ok(acc)
        }
        _ => Err(EvalError::binary_not_implemented("**", u.type_name())),
    }
}

// ── Complex lifts ────────────────────────────────────────────────────────────

/// Real and imaginary parts as floats; real scalars get a zero imaginary
/// part.
pub fn complex_parts(conf: &Config, v: &Value) -> Result<(BigFloat, BigFloat)> {
    match v {
        Value::Complex(c) => Ok((
            arith::as_float(conf, &c.re)?,
            arith::as_float(conf, &c.im)?,
        )),
        other => Ok((
            arith::as_float(conf, other)?,
            BigFloat::zero(conf.float_prec()),
        )),
    }
}

pub fn complex_exp(conf: &Config, v: &Value) -> Result<Value> {
    let (x, y) = complex_parts(conf, v)?;
    let ex = exp(conf, &x)?;
    Ok(Value::complex(
        Value::Float(ex.mul(&cos(conf, &y)?)).shrink(),
        Value::Float(ex.mul(&sin(conf, &y)?)).shrink(),
    ))
}

pub fn complex_log(conf: &Config, v: &Value) -> Result<Value> {
    let (x, y) = complex_parts(conf, v)?;
    let r2 = x.mul(&x).add(&y.mul(&y));
    if r2.is_zero() {
        return Err(EvalError::domain("log of non-positive value"));
    }
    let modulus = log(conf, &r2)?.scalb(-1);
    let argument = atan2(conf, &y, &x)?;
    Ok(Value::complex(
        Value::Float(modulus).shrink(),
        Value::Float(argument).shrink(),
    ))
}

pub fn complex_sqrt(conf: &Config, v: &Value) -> Result<Value> {
    let l = complex_log(conf, v)?;
    let half = Value::Rat(num_rational::BigRational::new(1.into(), 2.into()));
    complex_exp(conf, &arith::mul(conf, &l, &half)?)
}

pub fn complex_power(conf: &Config, u: &Value, v: &Value) -> Result<Value> {
    if u.is_zero_scalar() {
        return Err(EvalError::domain("zero base with complex exponent"));
    }
    let l = complex_log(conf, u)?;
    complex_exp(conf, &arith::mul(conf, v, &l)?)
}

pub fn complex_sin(conf: &Config, v: &Value) -> Result<Value> {
    let (x, y) = complex_parts(conf, v)?;
    Ok(Value::complex(
        Value::Float(sin(conf, &x)?.mul(&cosh(conf, &y)?)).shrink(),
        Value::Float(cos(conf, &x)?.mul(&sinh(conf, &y)?)).shrink(),
    ))
}

pub fn complex_cos(conf: &Config, v: &Value) -> Result<Value> {
    let (x, y) = complex_parts(conf, v)?;
    Ok(Value::complex(
        Value::Float(cos(conf, &x)?.mul(&cosh(conf, &y)?)).shrink(),
        Value::Float(sin(conf, &x)?.mul(&sinh(conf, &y)?).neg()).shrink(),
    ))
}

pub fn complex_tan(conf: &Config, v: &Value) -> Result<Value> {
    let s = complex_sin(conf, v)?;
    let c = complex_cos(conf, v)?;
    if c.is_zero_scalar() {
        return Err(EvalError::domain("tangent is infinite"));
    }
    arith::quo(conf, &s, &c)
}

pub fn complex_sinh(conf: &Config, v: &Value) -> Result<Value> {
    let (x, y) = complex_parts(conf, v)?;
    Ok(Value::complex(
        Value::Float(sinh(conf, &x)?.mul(&cos(conf, &y)?)).shrink(),
        Value::Float(cosh(conf, &x)?.mul(&sin(conf, &y)?)).shrink(),
    ))
}

pub fn complex_cosh(conf: &Config, v: &Value) -> Result<Value> {
    let (x, y) = complex_parts(conf, v)?;
    Ok(Value::complex(
        Value::Float(cosh(conf, &x)?.mul(&cos(conf, &y)?)).shrink(),
        Value::Float(sinh(conf, &x)?.mul(&sin(conf, &y)?)).shrink(),
    ))
}

pub fn complex_tanh(conf: &Config, v: &Value) -> Result<Value> {
    let s = complex_sinh(conf, v)?;
    let c = complex_cosh(conf, v)?;
    if c.is_zero_scalar() {
        return Err(EvalError::domain("tangent is infinite"));
    }
    arith::quo(conf, &s, &c)
}

pub fn complex_abs(conf: &Config, c: &Complex) -> Result<Value> {
    let (x, y) = complex_parts(conf, &Value::Complex(Box::new(c.clone())))?;
    let m = sqrt(conf, &x.mul(&x).add(&y.mul(&y)))?;
    Ok(Value::Float(m).shrink())
}

pub fn complex_phase(conf: &Config, v: &Value) -> Result<Value> {
    let (x, y) = complex_parts(conf, v)?;
    Ok(Value::Float(atan2(conf, &y, &x)?).shrink())
}

/// Square root over the whole tower: negative reals lift to the imaginary
/// axis, complex goes through exp/log.
pub fn sqrt_value(conf: &Config, v: &Value) -> Result<Value> {
    match v {
        Value::Complex(_) => complex_sqrt(conf, v),
        other => {
            let f = arith::as_float(conf, other)?;
            if f.is_negative() {
                let m = sqrt(conf, &f.neg())?;
                Ok(Value::complex(Value::zero(), Value::Float(m).shrink()))
            } else {
                Ok(Value::Float(sqrt(conf, &f)?).shrink())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf() -> Config {
        Config::new()
    }

    /// |a − b| within `ulps` ulps of b.
    fn close(a: &BigFloat, b: &BigFloat, ulps: i64) -> bool {
        let delta = a.sub(b);
        if delta.is_zero() {
            return true;
        }
        delta.exponent() <= b.exponent() - b.precision() as i64 + ulps
    }

    #[test]
    fn sqrt_squares_back() {
        let c = conf();
        for i in [2i64, 3, 10, 1 << 20] {
            let x = fi(i, c.float_prec());
            let r = sqrt(&c, &x).unwrap();
            assert!(close(&r.mul(&r), &x, 1), "sqrt {} off", i);
        }
        assert!(sqrt(&c, &fi(-1, 256)).is_err());
    }

    #[test]
    fn exp_log_inverse() {
        let c = conf();
        for i in [1i64, 2, 10, 100] {
            let x = fi(i, c.float_prec());
            let back = log(&c, &exp(&c, &x).unwrap()).unwrap();
            assert!(close(&back, &x, 2), "log exp {} off", i);
        }
        assert!(log(&c, &BigFloat::zero(256)).is_err());
    }

    #[test]
    fn ln2_matches_log_of_two() {
        let c = conf();
        let via_series = ln2(c.float_prec());
        let via_log = log(&c, &fi(2, c.float_prec())).unwrap();
        assert!(close(&via_series, &via_log, 1));
    }

    #[test]
    fn trig_identity() {
        let c = conf();
        let x = fr(7, 5, c.float_prec());
        let s = sin(&c, &x).unwrap();
        let co = cos(&c, &x).unwrap();
        let one = s.mul(&s).add(&co.mul(&co));
        assert!(close(&one, &fi(1, c.float_prec()), 2));
        let t = tan(&c, &x).unwrap();
        assert!(close(&t, &s.div(&co).unwrap(), 2));
    }

    #[test]
    fn atan_regimes_agree_with_tan() {
        let c = conf();
        for (n, d) in [(1i64, 4i64), (3, 4), (5, 4), (4, 1)] {
            let x = fr(n, d, c.float_prec());
            let back = tan(&c, &atan(&c, &x).unwrap()).unwrap();
            assert!(close(&back, &x, 4), "atan {}/{} off", n, d);
        }
    }

    #[test]
    fn asin_special_cases() {
        let c = conf();
        let one = fi(1, c.float_prec());
        let half_pi = pi(c.float_prec()).scalb(-1);
        assert_eq!(asin(&c, &one).unwrap(), half_pi);
        assert_eq!(asin(&c, &one.neg()).unwrap(), half_pi.neg());
        assert!(asin(&c, &fi(2, 256)).is_err());
        assert!(close(&acos(&c, &BigFloat::zero(256)).unwrap(), &half_pi, 1));
    }

    #[test]
    fn hyperbolic_identity() {
        let c = conf();
        let x = fr(3, 2, c.float_prec());
        let sh = sinh(&c, &x).unwrap();
        let ch = cosh(&c, &x).unwrap();
        let one = ch.mul(&ch).sub(&sh.mul(&sh));
        assert!(close(&one, &fi(1, c.float_prec()), 2));
        let back = asinh(&c, &sh).unwrap();
        assert!(close(&back, &x, 2));
        let back = acosh(&c, &ch).unwrap();
        assert!(close(&back, &x, 2));
        let back = atanh(&c, &tanh(&c, &x).unwrap()).unwrap();
        assert!(close(&back, &x, 2));
    }

    #[test]
    fn factorial_small_and_large() {
        let c = conf();
        assert_eq!(factorial(&c, &BigInt::from(0)).unwrap(), BigInt::from(1));
        assert_eq!(factorial(&c, &BigInt::from(5)).unwrap(), BigInt::from(120));
        assert_eq!(
            factorial(&c, &BigInt::from(20)).unwrap().to_string(),
            "2432902008176640000"
        );
        assert_eq!(
            factorial(&c, &BigInt::from(25)).unwrap().to_string(),
            "15511210043330985984000000"
        );
        assert!(factorial(&c, &BigInt::from(-1)).is_err());
    }

    #[test]
    fn gamma_agrees_with_factorial() {
        let c = conf();
        let g6 = gamma(&c, &fi(6, c.float_prec())).unwrap();
        assert!(close(&g6, &fi(120, c.float_prec()), 8));
        // Γ(1/2) = √π.
        let ghalf = gamma(&c, &fr(1, 2, c.float_prec())).unwrap();
        let root_pi = sqrt(&c, &pi(c.float_prec())).unwrap();
        assert!(close(&ghalf, &root_pi, 8));
        assert!(gamma(&c, &fi(0, 256)).is_err());
        assert!(gamma(&c, &fi(-3, 256)).is_err());
    }

    #[test]
    fn power_paths() {
        let c = conf();
        assert_eq!(power(&c, &Value::Int(2), &Value::Int(10)).unwrap(), Value::Int(1024));
        assert_eq!(
            power(&c, &Value::Int(2), &Value::Int(-2)).unwrap(),
            Value::Rat(num_rational::BigRational::new(1.into(), 4.into()))
        );
        assert_eq!(power(&c, &Value::Int(9), &Value::Int(0)).unwrap(), Value::Int(1));
        // 2 ** 1/2 is sqrt 2.
        let half = Value::Rat(num_rational::BigRational::new(1.into(), 2.into()));
        let r = power(&c, &Value::Int(2), &half).unwrap();
        match r {
            Value::Float(f) => {
                assert!(close(&f.mul(&f), &fi(2, c.float_prec()), 2));
            }
            other => panic!("expected float, got {:?}", other),
        }
        assert!(power(&c, &Value::Int(0), &Value::Int(-1)).is_err());
    }

    #[test]
    fn complex_exp_of_i_pi_is_minus_one() {
        let c = conf();
        let ipi = Value::complex(Value::zero(), Value::Float(pi(c.float_prec())));
        let r = complex_exp(&c, &ipi).unwrap();
        match r {
            Value::Complex(z) => {
                let re = arith::as_float(&c, &z.re).unwrap();
                let im = arith::as_float(&c, &z.im).unwrap();
                assert!(close(&re, &fi(-1, c.float_prec()), 2));
                // The residual imaginary part is sin π at working precision.
                assert!(im.exponent() < -200);
            }
            Value::Int(-1) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sqrt_of_negative_lifts_to_complex() {
        let c = conf();
        let r = sqrt_value(&c, &Value::Int(-4)).unwrap();
        assert_eq!(r, Value::complex(Value::Int(0), Value::Int(2)));
    }

    #[test]
    fn convergence_failure_reports() {
        let mut l = Loop::new("probe", "x".into(), 4, 0);
        let a = fi(1, 64);
        let b = fi(2, 64);
        // Alternate forever between two values; the budget is 10 steps.
        let mut err = None;
        for i in 0..20 {
            match l.done(if i % 2 == 0 { &a } else { &b }) {
                Ok(true) => panic!("should not settle"),
                Ok(false) => continue,
                Err(e) => {
                    err = Some(e);
                    break;
                }
            }
        }
        let msg = err.expect("must fail").to_string();
        assert!(msg.contains("did not converge after 10 iterations"), "{}", msg);
    }
}
