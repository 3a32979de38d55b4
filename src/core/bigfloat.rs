/// Arbitrary-precision binary floating point.
///
/// A `BigFloat` is `±mant · 2^(exp − prec)` where `mant` is either zero or
/// normalized to exactly `prec` bits (top bit set), so `exp` is the binary
/// exponent: `2^(exp−1) ≤ |v| < 2^exp`. All rounding is to nearest, ties to
/// even. Precision is carried per value; binary operations round to the wider
/// of the two operands.
use std::cmp::Ordering;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Signed, Zero};

use crate::errors::{EvalError, Result};

#[derive(Debug, Clone)]
pub struct BigFloat {
    neg: bool,
    mant: BigUint,
    exp: i64,
    prec: u32,
}

impl BigFloat {
    pub fn zero(prec: u32) -> Self {
        BigFloat {
            neg: false,
            mant: BigUint::zero(),
            exp: 0,
            prec,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.mant.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.neg && !self.is_zero()
    }

    pub fn precision(&self) -> u32 {
        self.prec
    }

    /// Binary exponent: `2^(exp−1) ≤ |v| < 2^exp`. Zero reports 0.
    pub fn exponent(&self) -> i64 {
        self.exp
    }

    pub(crate) fn parts(&self) -> (bool, &BigUint, i64, u32) {
        (self.neg, &self.mant, self.exp, self.prec)
    }

    // ── Construction ─────────────────────────────────────────────────────────

    /// Build from `±mant · 2^e`, rounding to `prec` bits.
    pub fn normalize(neg: bool, mant: BigUint, e: i64, prec: u32) -> Self {
        Self::normalize_sticky(neg, mant, e, false, prec)
    }

    /// As `normalize`, with an extra sticky bit logically below the lowest
    /// bit of `mant` (set when discarded low-order value was nonzero).
    pub fn normalize_sticky(neg: bool, mant: BigUint, e: i64, sticky: bool, prec: u32) -> Self {
        if mant.is_zero() {
            return BigFloat::zero(prec);
        }
        let bits = mant.bits() as i64;
        let mut exp = e + bits;
        let prec_i = prec as i64;
        let mant = if bits > prec_i {
            let drop = (bits - prec_i) as usize;
            let mut kept: BigUint = &mant >> drop;
            let rem: BigUint = mant - (&kept << drop);
            let half: BigUint = BigUint::one() << (drop - 1);
            let odd = (&kept & BigUint::one()) == BigUint::one();
            let up = match rem.cmp(&half) {
                Ordering::Greater => true,
                Ordering::Equal => sticky || odd,
                Ordering::Less => false,
            };
            if up {
                kept += BigUint::one();
                if kept.bits() as i64 > prec_i {
                    kept >>= 1usize;
                    exp += 1;
                }
            }
            kept
        } else {
            // No bits discarded; a sticky remainder is below half an ulp.
            mant << ((prec_i - bits) as usize)
        };
        BigFloat {
            neg,
            mant,
            exp,
            prec,
        }
    }

    pub fn from_bigint(i: &BigInt, prec: u32) -> Self {
        Self::normalize(i.is_negative(), i.magnitude().clone(), 0, prec)
    }

    pub fn from_i64(i: i64, prec: u32) -> Self {
        Self::from_bigint(&BigInt::from(i), prec)
    }

    /// `num/den` rounded to `prec` bits. `den` must be nonzero.
    pub fn from_ratio(num: &BigInt, den: &BigInt, prec: u32) -> Self {
        debug_assert!(!den.is_zero());
        if num.is_zero() {
            return BigFloat::zero(prec);
        }
        let neg = num.is_negative() != den.is_negative();
        let mut n = num.magnitude().clone();
        let d = den.magnitude().clone();
        // Scale the dividend so the quotient carries two guard bits.
        let want = prec as i64 + 2;
        let have = n.bits() as i64 - d.bits() as i64;
        let shift = (want - have).max(0) as usize;
        n <<= shift;
        let q = &n / &d;
        let r = n - &q * &d;
        Self::normalize_sticky(neg, q, -(shift as i64), !r.is_zero(), prec)
    }

    /// Round to a new precision.
    pub fn with_prec(&self, prec: u32) -> Self {
        if self.is_zero() {
            return BigFloat::zero(prec);
        }
        Self::normalize(self.neg, self.mant.clone(), self.exp - self.prec as i64, prec)
    }

    // ── Sign and scale ───────────────────────────────────────────────────────

    pub fn neg(&self) -> Self {
        let mut r = self.clone();
        if !r.is_zero() {
            r.neg = !r.neg;
        }
        r
    }

    pub fn abs(&self) -> Self {
        let mut r = self.clone();
        r.neg = false;
        r
    }

    /// Multiply by `2^k`.
    pub fn scalb(&self, k: i64) -> Self {
        let mut r = self.clone();
        if !r.is_zero() {
            r.exp += k;
        }
        r
    }

    /// Split into `(m, e)` with `v = m · 2^e` and `0.5 ≤ |m| < 1`.
    pub fn mant_exp(&self) -> (Self, i64) {
        if self.is_zero() {
            return (self.clone(), 0);
        }
        (self.scalb(-self.exp), self.exp)
    }

    // ── Arithmetic ───────────────────────────────────────────────────────────

    pub fn add(&self, rhs: &Self) -> Self {
        self.add_signed(rhs, false)
    }

    pub fn sub(&self, rhs: &Self) -> Self {
        self.add_signed(rhs, true)
    }

    fn add_signed(&self, rhs: &Self, flip: bool) -> Self {
        let prec = self.prec.max(rhs.prec);
        let rneg = rhs.neg != flip;
        if rhs.is_zero() {
            return self.with_prec(prec);
        }
        if self.is_zero() {
            let mut r = rhs.with_prec(prec);
            r.neg = rneg && !r.is_zero();
            return r;
        }
        let s1 = self.exp - self.prec as i64;
        let s2 = rhs.exp - rhs.prec as i64;
        // When the operands are many orders of magnitude apart, the smaller
        // one only influences the sticky bit.
        let gap_limit = prec as i64 + 4;
        if self.exp - rhs.exp > gap_limit || rhs.exp - self.exp > gap_limit {
            let (hi_neg, hi, shi, lo_neg) = if self.exp > rhs.exp {
                (self.neg, self, s1, rneg)
            } else {
                (rneg, rhs, s2, self.neg)
            };
            let widened: BigUint = (&hi.mant) << 2usize;
            let nudged = if hi_neg == lo_neg {
                widened + BigUint::one()
            } else {
                widened - BigUint::one()
            };
            return Self::normalize_sticky(hi_neg, nudged, shi - 2, true, prec);
        }
        let smin = s1.min(s2);
        let m1: BigUint = (&self.mant) << ((s1 - smin) as usize);
        let m2: BigUint = (&rhs.mant) << ((s2 - smin) as usize);
        let a = BigInt::from_biguint(if self.neg { Sign::Minus } else { Sign::Plus }, m1);
        let b = BigInt::from_biguint(if rneg { Sign::Minus } else { Sign::Plus }, m2);
        let sum = a + b;
        if sum.is_zero() {
            return BigFloat::zero(prec);
        }
        Self::normalize(sum.is_negative(), sum.magnitude().clone(), smin, prec)
    }

    pub fn mul(&self, rhs: &Self) -> Self {
        let prec = self.prec.max(rhs.prec);
        if self.is_zero() || rhs.is_zero() {
            return BigFloat::zero(prec);
        }
        let m = &self.mant * &rhs.mant;
        let e = (self.exp - self.prec as i64) + (rhs.exp - rhs.prec as i64);
        Self::normalize(self.neg != rhs.neg, m, e, prec)
    }

    pub fn div(&self, rhs: &Self) -> Result<Self> {
        let prec = self.prec.max(rhs.prec);
        if rhs.is_zero() {
            return Err(EvalError::domain("division by zero"));
        }
        if self.is_zero() {
            return Ok(BigFloat::zero(prec));
        }
        let shift = prec as usize + 2;
        let n: BigUint = (&self.mant) << shift;
        let q = &n / &rhs.mant;
        let r = n - &q * &rhs.mant;
        let e = (self.exp - self.prec as i64) - (rhs.exp - rhs.prec as i64) - shift as i64;
        Ok(Self::normalize_sticky(
            self.neg != rhs.neg,
            q,
            e,
            !r.is_zero(),
            prec,
        ))
    }

    // ── Comparison ───────────────────────────────────────────────────────────

    pub fn cmp(&self, rhs: &Self) -> Ordering {
        match (self.is_zero(), rhs.is_zero()) {
            (true, true) => return Ordering::Equal,
            (true, false) => {
                return if rhs.neg {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (false, true) => {
                return if self.neg {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (false, false) => {}
        }
        match (self.neg, rhs.neg) {
            (false, true) => return Ordering::Greater,
            (true, false) => return Ordering::Less,
            _ => {}
        }
        let mag = if self.exp != rhs.exp {
            self.exp.cmp(&rhs.exp)
        } else {
            let a: BigUint = (&self.mant) << (rhs.prec as usize);
            let b: BigUint = (&rhs.mant) << (self.prec as usize);
            a.cmp(&b)
        };
        if self.neg {
            mag.reverse()
        } else {
            mag
        }
    }

    pub fn cmp_abs(&self, rhs: &Self) -> Ordering {
        self.abs().cmp(&rhs.abs())
    }

    // ── Integer views ────────────────────────────────────────────────────────

    /// True when the value is mathematically an integer.
    pub fn is_integer(&self) -> bool {
        if self.is_zero() {
            return true;
        }
        let frac_bits = self.prec as i64 - self.exp;
        if frac_bits <= 0 {
            return true;
        }
        if self.exp <= 0 {
            return false;
        }
        match self.mant.trailing_zeros() {
            Some(tz) => tz as i64 >= frac_bits,
            None => true,
        }
    }

    /// Integer part, truncated toward zero.
    pub fn trunc(&self) -> BigInt {
        if self.is_zero() || self.exp <= 0 {
            return BigInt::zero();
        }
        let frac_bits = self.prec as i64 - self.exp;
        let mag = if frac_bits <= 0 {
            (&self.mant) << ((-frac_bits) as usize)
        } else {
            (&self.mant) >> (frac_bits as usize)
        };
        BigInt::from_biguint(if self.neg { Sign::Minus } else { Sign::Plus }, mag)
    }

    pub fn floor_int(&self) -> BigInt {
        let t = self.trunc();
        if self.neg && !self.is_integer() {
            t - 1
        } else {
            t
        }
    }

    pub fn ceil_int(&self) -> BigInt {
        let t = self.trunc();
        if !self.neg && !self.is_integer() {
            t + 1
        } else {
            t
        }
    }

    /// Exact integer value, when there is one.
    pub fn to_bigint_exact(&self) -> Option<BigInt> {
        if self.is_integer() {
            Some(self.trunc())
        } else {
            None
        }
    }
}

impl PartialEq for BigFloat {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BigFloat {}
