/// The formatting bridge: value display, program-source text, and the `text`
/// operator's verb-driven formatter.
///
/// Number-to-string is bit-exact: float rendering goes through exact big
/// integer scaling, never through machine floating point.
use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed, ToPrimitive};

use crate::conf::Config;
use crate::core::arith;
use crate::core::bigfloat::BigFloat;
use crate::core::value::Value;
use crate::errors::{EvalError, Result};
use crate::vector::Vector;

/// Significant digits used when no explicit format is configured.
const DEFAULT_DIGITS: usize = 12;

// ── Display ──────────────────────────────────────────────────────────────────

/// Render a value for the REPL, honoring the output base, the max-digits
/// switch, and the configured format verb.
pub fn sprint(conf: &Config, v: &Value) -> String {
    if !conf.format().is_empty() && is_formattable_number(v) {
        if let Ok(spec) = parse_spec(conf.format()) {
            if let Ok(s) = format_scalar(conf, &spec, v) {
                return s;
            }
        }
    }
    sprint_plain(conf, v)
}

fn is_formattable_number(v: &Value) -> bool {
    matches!(
        v,
        Value::Int(_) | Value::Big(_) | Value::Rat(_) | Value::Float(_)
    )
}

fn sprint_plain(conf: &Config, v: &Value) -> String {
    match v {
        Value::Int(i) => int_text(conf, &BigInt::from(*i)),
        Value::Big(b) => int_text(conf, b),
        Value::Rat(r) => format!(
            "{}/{}",
            int_text(conf, r.numer()),
            int_text(conf, r.denom())
        ),
        Value::Float(f) => format_float(f, 'g', DEFAULT_DIGITS),
        Value::Complex(c) => format!(
            "{}j{}",
            sprint_plain(conf, &c.re),
            sprint_plain(conf, &c.im)
        ),
        Value::Char(c) => c.to_string(),
        Value::Vector(vec) => sprint_vector(conf, vec),
        Value::Matrix(m) => sprint_matrix(conf, m.shape(), &m.ravel()),
    }
}

fn sprint_vector(conf: &Config, vec: &Vector) -> String {
    if !vec.is_empty() && vec.all_chars() {
        return vec
            .iter()
            .map(|c| sprint_plain(conf, &c))
            .collect::<String>();
    }
    vec.iter()
        .map(|e| match &e {
            Value::Vector(_) | Value::Matrix(_) => format!("({})", sprint_plain(conf, &e)),
            scalar => sprint_plain(conf, scalar),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn sprint_matrix(conf: &Config, shape: &[usize], data: &Vector) -> String {
    if shape.len() <= 1 {
        let row: Vec<Value> = data.iter().collect();
        return sprint_vector(conf, &Vector::from_values(row));
    }
    let plane: usize = shape[1..].iter().product();
    let mut parts = Vec::with_capacity(shape[0]);
    for p in 0..shape[0] {
        let slice: Vec<Value> = (0..plane).map(|i| data.at(p * plane + i)).collect();
        parts.push(sprint_matrix(conf, &shape[1..], &Vector::from_values(slice)));
    }
    let sep = if shape.len() > 2 { "\n\n" } else { "\n" };
    parts.join(sep)
}

/// The maximum-digits switch: a huge integer displays as a float.
fn int_text(conf: &Config, b: &BigInt) -> String {
    let base = match conf.output_base() {
        0 => 10,
        b => b,
    };
    let s = b.to_str_radix(base);
    let digits = s.len() - usize::from(b.is_negative());
    if base == 10 && conf.max_digits() != 0 && digits > conf.max_digits() {
        return format_float(&BigFloat::from_bigint(b, conf.float_prec()), 'e', DEFAULT_DIGITS);
    }
    s
}

// ── Program-source text ──────────────────────────────────────────────────────

/// Unambiguous source form: re-parsing the text recreates the value.
pub fn prog_string(v: &Value) -> String {
    match v {
        Value::Int(i) => i.to_string(),
        Value::Big(b) => b.to_string(),
        Value::Rat(r) => format!("{}/{}", r.numer(), r.denom()),
        Value::Float(f) => {
            // Full precision: every mantissa bit survives the round trip.
            let digits = (f.precision() as usize * 30103) / 100000 + 2;
            format_float(f, 'e', digits)
        }
        Value::Complex(c) => format!("{}j{}", prog_string(&c.re), prog_string(&c.im)),
        Value::Char(c) => format!("{:?}", c).replace('"', "'"),
        Value::Vector(vec) => {
            if !vec.is_empty() && vec.all_chars() {
                let text: String = vec
                    .iter()
                    .map(|c| match c {
                        Value::Char(ch) => ch,
                        _ => ' ',
                    })
                    .collect();
                return format!("{:?}", text);
            }
            vec.iter()
                .map(|e| match &e {
                    Value::Vector(_) | Value::Matrix(_) => format!("({})", prog_string(&e)),
                    scalar => prog_string(scalar),
                })
                .collect::<Vec<_>>()
                .join(" ")
        }
        Value::Matrix(m) => {
            let dims: Vec<String> = m.shape().iter().map(|d| d.to_string()).collect();
            format!(
                "{} rho {}",
                dims.join(" "),
                prog_string(&Value::Vector(m.ravel()))
            )
        }
    }
}

// ── Exact float rendering ────────────────────────────────────────────────────

/// Decompose into `±0.digits × 10^dec_exp` with `sig` significant digits.
/// Exact: the mantissa is scaled by big powers of two and ten, then rounded
/// once.
fn float_digits(f: &BigFloat, sig: usize) -> (bool, String, i64) {
    if f.is_zero() {
        return (false, "0".repeat(sig.max(1)), 1);
    }
    let (neg, mant, exp, prec) = f.parts();
    let e2 = exp - prec as i64;
    // First guess via log10(2); corrected below if off by one.
    let mut dex = (exp as i128 * 30103).div_euclid(100_000) as i64 + 1;
    loop {
        let k = sig as i64 - dex;
        let mut num: BigUint = mant.clone();
        let mut den = BigUint::one();
        if e2 >= 0 {
            num <<= e2 as usize;
        } else {
            den <<= (-e2) as usize;
        }
        let ten = BigUint::from(10u32);
        if k >= 0 {
            num *= ten.pow(k as u32);
        } else {
            den *= ten.pow((-k) as u32);
        }
        let d = (&num + (&den >> 1usize)) / &den;
        let lo = ten.pow(sig.saturating_sub(1) as u32);
        let hi = ten.pow(sig as u32);
        if sig > 0 && d < lo {
            dex -= 1;
            continue;
        }
        if d >= hi {
            dex += 1;
            continue;
        }
        return (neg, d.to_str_radix(10), dex);
    }
}

/// Render with a C-style float verb: `f` fixed, `e` scientific, `g` shortest
/// of the two with trailing zeros stripped.
pub fn format_float(f: &BigFloat, verb: char, prec: usize) -> String {
    match verb {
        'f' | 'F' => {
            if f.is_zero() {
                return fixed_zero(prec);
            }
            // Significant digits needed to cover `prec` decimals.
            let (neg, _, dex) = float_digits(f, 1);
            let sig = (dex + prec as i64).max(0) as usize;
            if sig == 0 {
                let s = fixed_zero(prec);
                return if neg { format!("-{}", s) } else { s };
            }
            let (neg, digits, dex) = float_digits(f, sig);
            let s = place_point(&digits, dex, prec);
            if neg {
                format!("-{}", s)
            } else {
                s
            }
        }
        'e' | 'E' => {
            let (neg, digits, dex) = float_digits(f, prec.max(1));
            let mut s = String::new();
            if neg {
                s.push('-');
            }
            s.push_str(&digits[..1]);
            if digits.len() > 1 {
                s.push('.');
                s.push_str(&digits[1..]);
            }
            let e = dex - 1;
            s.push(if verb == 'E' { 'E' } else { 'e' });
            s.push(if e < 0 { '-' } else { '+' });
            s.push_str(&format!("{:02}", e.abs()));
            s
        }
        'g' | 'G' => {
            if f.is_zero() {
                return "0".to_string();
            }
            let sig = prec.max(1);
            let (_, _, dex) = float_digits(f, sig);
            if dex < -3 || dex > sig as i64 {
                let mut s = format_float(f, if verb == 'G' { 'E' } else { 'e' }, sig);
                s = strip_g_zeros(s);
                s
            } else {
                let decimals = (sig as i64 - dex).max(0) as usize;
                let s = format_float(f, 'f', decimals);
                strip_g_zeros(s)
            }
        }
        _ => format_float(f, 'g', prec),
    }
}

fn fixed_zero(prec: usize) -> String {
    if prec == 0 {
        "0".to_string()
    } else {
        format!("0.{}", "0".repeat(prec))
    }
}

/// Place the decimal point for `f`-style output: `digits` are significant
/// digits of `0.digits × 10^dex`, printed with exactly `prec` decimals.
fn place_point(digits: &str, dex: i64, prec: usize) -> String {
    let mut s = String::new();
    if dex <= 0 {
        s.push('0');
        if prec > 0 {
            s.push('.');
            for _ in 0..(-dex).min(prec as i64) {
                s.push('0');
            }
            let room = prec as i64 + dex;
            if room > 0 {
                s.push_str(&digits[..digits.len().min(room as usize)]);
            }
            while s.split('.').nth(1).map(|t| t.len()).unwrap_or(0) < prec {
                s.push('0');
            }
        }
    } else {
        let whole = dex as usize;
        if digits.len() >= whole {
            s.push_str(&digits[..whole]);
        } else {
            s.push_str(digits);
            for _ in 0..whole - digits.len() {
                s.push('0');
            }
        }
        if prec > 0 {
            s.push('.');
            let frac = if digits.len() > whole {
                &digits[whole..]
            } else {
                ""
            };
            s.push_str(&frac[..frac.len().min(prec)]);
            while s.split('.').nth(1).map(|t| t.len()).unwrap_or(0) < prec {
                s.push('0');
            }
        }
    }
    s
}

fn strip_g_zeros(s: String) -> String {
    if let Some(epos) = s.find(['e', 'E']) {
        let (mant, exp) = s.split_at(epos);
        if mant.contains('.') {
            let stripped = mant.trim_end_matches('0').trim_end_matches('.');
            return format!("{}{}", stripped, exp);
        }
        return s;
    }
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

// ── The text operator ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Spec {
    minus: bool,
    zero: bool,
    plus: bool,
    width: Option<usize>,
    prec: Option<usize>,
    verb: char,
}

const VERBS: &str = "bdoOxXcUsqtveEfFgG";

fn parse_spec(text: &str) -> Result<Spec> {
    let bytes: Vec<char> = text.chars().collect();
    let pct = text
        .find('%')
        .ok_or_else(|| EvalError::domain(format!("bad format string {:?}", text)))?;
    let mut i = pct + 1;
    let mut spec = Spec::default();
    while i < bytes.len() && "-0+ #".contains(bytes[i]) {
        match bytes[i] {
            '-' => spec.minus = true,
            '0' => spec.zero = true,
            '+' => spec.plus = true,
            _ => {}
        }
        i += 1;
    }
    let mut width = String::new();
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        width.push(bytes[i]);
        i += 1;
    }
    if !width.is_empty() {
        spec.width = width.parse().ok();
    }
    if i < bytes.len() && bytes[i] == '.' {
        i += 1;
        let mut prec = String::new();
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            prec.push(bytes[i]);
            i += 1;
        }
        spec.prec = Some(prec.parse().unwrap_or(0));
    }
    if i >= bytes.len() || !VERBS.contains(bytes[i]) {
        return Err(EvalError::domain(format!("bad format verb in {:?}", text)));
    }
    spec.verb = bytes[i];
    Ok(spec)
}

fn pad(spec: &Spec, s: String) -> String {
    let Some(width) = spec.width else {
        return s;
    };
    if s.chars().count() >= width {
        return s;
    }
    let fill = width - s.chars().count();
    if spec.minus {
        format!("{}{}", s, " ".repeat(fill))
    } else if spec.zero && s.starts_with('-') {
        format!("-{}{}", "0".repeat(fill), &s[1..])
    } else if spec.zero {
        format!("{}{}", "0".repeat(fill), s)
    } else {
        format!("{}{}", " ".repeat(fill), s)
    }
}

/// Coerce to an integer for the integer verbs: floats and rationals truncate
/// toward zero.
fn coerce_int(v: &Value) -> Result<BigInt> {
    match v {
        Value::Int(i) => Ok(BigInt::from(*i)),
        Value::Big(b) => Ok(b.clone()),
        Value::Rat(r) => Ok(r.trunc().to_integer()),
        Value::Float(f) => Ok(f.trunc()),
        Value::Char(c) => Ok(BigInt::from(*c as u32)),
        _ => Err(EvalError::type_err(format!(
            "cannot format {} as integer",
            v.type_name()
        ))),
    }
}

fn format_scalar(conf: &Config, spec: &Spec, v: &Value) -> Result<String> {
    let body = match spec.verb {
        'd' => {
            let i = coerce_int(v)?;
            let s = i.to_str_radix(10);
            if spec.plus && !i.is_negative() {
                format!("+{}", s)
            } else {
                s
            }
        }
        'b' => coerce_int(v)?.to_str_radix(2),
        'o' => coerce_int(v)?.to_str_radix(8),
        'O' => {
            let i = coerce_int(v)?;
            if i.is_negative() {
                format!("-0o{}", (-i).to_str_radix(8))
            } else {
                format!("0o{}", i.to_str_radix(8))
            }
        }
        'x' => coerce_int(v)?.to_str_radix(16),
        'X' => coerce_int(v)?.to_str_radix(16).to_uppercase(),
        'c' => {
            let code = coerce_int(v)?
                .to_u32()
                .and_then(char::from_u32)
                .ok_or_else(|| EvalError::domain("invalid code point"))?;
            code.to_string()
        }
        'U' => format!("U+{:04X}", coerce_int(v)?.to_u32().unwrap_or(0xFFFD)),
        's' | 'v' | 't' => match (spec.verb, v) {
            ('t', _) => if v.is_true()? { "true" } else { "false" }.to_string(),
            (_, other) => sprint_plain(conf, other),
        },
        'q' => format!("{:?}", sprint_plain(conf, v)),
        'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
            let f = arith::as_float(conf, v)?;
            let default = if matches!(spec.verb, 'e' | 'E' | 'f' | 'F') {
                6
            } else {
                DEFAULT_DIGITS
            };
            let mut s = format_float(&f, spec.verb, spec.prec.unwrap_or(default));
            if spec.plus && !f.is_negative() {
                s = format!("+{}", s);
            }
            s
        }
        other => {
            return Err(EvalError::domain(format!("bad format verb %{}", other)));
        }
    };
    Ok(pad(spec, body))
}

/// `u text v`: the left operand describes the format.
pub fn text_op(conf: &Config, u: &Value, v: &Value) -> Result<Value> {
    let spec = spec_from_value(u)?;
    let out = apply_spec(conf, &spec, v)?;
    Ok(Value::Vector(Vector::from_chars(&out)))
}

fn spec_from_value(u: &Value) -> Result<Spec> {
    match u {
        Value::Int(p) => Ok(Spec {
            prec: Some((*p).max(0) as usize),
            verb: 'f',
            ..Spec::default()
        }),
        Value::Vector(v) if !v.is_empty() && v.all_chars() => {
            let text: String = v
                .iter()
                .map(|c| match c {
                    Value::Char(ch) => ch,
                    _ => ' ',
                })
                .collect();
            parse_spec(&text)
        }
        Value::Vector(v) if v.len() == 1 => spec_from_value(&v.at(0)),
        Value::Vector(v) if v.len() == 2 || v.len() == 3 => {
            let width = v.at(0).small_int("format width")?;
            let prec = v.at(1).small_int("format precision")?;
            let verb = if v.len() == 3 {
                match v.at(2) {
                    Value::Char(c) if "efg".contains(c) => c,
                    other => {
                        return Err(EvalError::domain(format!(
                            "bad format verb {}",
                            other.type_name()
                        )))
                    }
                }
            } else {
                'f'
            };
            Ok(Spec {
                minus: width < 0,
                width: Some(width.unsigned_abs() as usize),
                prec: Some(prec.max(0) as usize),
                verb,
                ..Spec::default()
            })
        }
        other => Err(EvalError::type_err(format!(
            "bad format specification of type {}",
            other.type_name()
        ))),
    }
}

fn apply_spec(conf: &Config, spec: &Spec, v: &Value) -> Result<String> {
    match v {
        Value::Vector(vec) => {
            // A character row under a string-like verb formats as one string.
            if vec.all_chars() && "sqvoObxX".contains(spec.verb) {
                let s: String = vec
                    .iter()
                    .map(|c| match c {
                        Value::Char(ch) => ch,
                        _ => ' ',
                    })
                    .collect();
                return format_scalar(conf, spec, &Value::Vector(Vector::from_chars(&s)));
            }
            let parts: Result<Vec<String>> =
                vec.iter().map(|e| apply_spec(conf, spec, &e)).collect();
            Ok(parts?.join(" "))
        }
        Value::Matrix(m) => {
            let width = *m.shape().last().unwrap_or(&0);
            let data = m.ravel();
            if width == 0 {
                return Ok(String::new());
            }
            let mut rows = Vec::new();
            for r in 0..data.len() / width {
                let row: Vec<Value> = (0..width).map(|c| data.at(r * width + c)).collect();
                rows.push(apply_spec(
                    conf,
                    spec,
                    &Value::Vector(Vector::from_values(row)),
                )?);
            }
            Ok(rows.join("\n"))
        }
        scalar => format_scalar(conf, spec, scalar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_rational::BigRational;

    fn conf() -> Config {
        Config::new()
    }

    fn float(n: i64, d: i64) -> BigFloat {
        BigFloat::from_ratio(&BigInt::from(n), &BigInt::from(d), 256)
    }

    #[test]
    fn plain_scalars() {
        let c = conf();
        assert_eq!(sprint(&c, &Value::Int(42)), "42");
        assert_eq!(
            sprint(&c, &Value::Rat(BigRational::new(1.into(), 3.into()))),
            "1/3"
        );
        assert_eq!(sprint(&c, &Value::Char('x')), "x");
        assert_eq!(
            sprint(&c, &Value::complex(Value::Int(1), Value::Int(-2))),
            "1j-2"
        );
    }

    #[test]
    fn float_rendering() {
        let c = conf();
        assert_eq!(sprint(&c, &Value::Float(float(3, 2))), "1.5");
        assert_eq!(sprint(&c, &Value::Float(float(1, 4))), "0.25");
        assert_eq!(format_float(&float(1, 3), 'f', 4), "0.3333");
        assert_eq!(format_float(&float(2, 3), 'f', 4), "0.6667");
        assert_eq!(format_float(&float(1234, 1), 'e', 3), "1.23e+03");
        assert_eq!(format_float(&float(0, 1), 'g', 6), "0");
    }

    #[test]
    fn sqrt_two_prints_short() {
        let c = conf();
        let two = BigFloat::from_i64(2, 256);
        let root = crate::transcend::sqrt(&c, &two).unwrap();
        assert_eq!(sprint(&c, &Value::Float(root)), "1.41421356237");
    }

    #[test]
    fn output_base() {
        let mut c = conf();
        c.set_base(0, 16).unwrap();
        assert_eq!(sprint(&c, &Value::Int(255)), "ff");
        c.set_base(0, 2).unwrap();
        assert_eq!(sprint(&c, &Value::Int(5)), "101");
    }

    #[test]
    fn vectors_and_strings() {
        let c = conf();
        let v = Value::Vector(Vector::from_ints([1, 2, 3]));
        assert_eq!(sprint(&c, &v), "1 2 3");
        let s = Value::Vector(Vector::from_chars("abc"));
        assert_eq!(sprint(&c, &s), "abc");
        assert_eq!(prog_string(&s), "\"abc\"");
    }

    #[test]
    fn matrix_layout() {
        let c = conf();
        let m = crate::matrix::reshape(
            &[2, 3],
            &Value::Vector(Vector::from_ints([1, 2, 3, 4, 5, 6])),
        )
        .unwrap();
        assert_eq!(sprint(&c, &m), "1 2 3\n4 5 6");
    }

    #[test]
    fn text_operator_specs() {
        let c = conf();
        // Single integer: decimal precision with verb f.
        let out = text_op(&c, &Value::Int(2), &Value::Float(float(1, 3))).unwrap();
        assert_eq!(sprint(&c, &out), "0.33");
        // Width and precision.
        let wp = Value::Vector(Vector::from_ints([8, 3]));
        let out = text_op(&c, &wp, &Value::Int(5)).unwrap();
        assert_eq!(sprint(&c, &out), "   5.000");
        // A %-string with a hex verb.
        let fmt = Value::Vector(Vector::from_chars("%04x"));
        let out = text_op(&c, &fmt, &Value::Int(255)).unwrap();
        assert_eq!(sprint(&c, &out), "00ff");
        // Arrays format element by element.
        let out = text_op(
            &c,
            &Value::Int(1),
            &Value::Vector(Vector::from_ints([1, 2])),
        )
        .unwrap();
        assert_eq!(sprint(&c, &out), "1.0 2.0");
    }

    #[test]
    fn prog_string_round_trips() {
        let c = conf();
        for text in ["42", "1/3", "1j2"] {
            let v = crate::core::value::parse_number(&c, text);
            if let Ok(v) = v {
                assert_eq!(prog_string(&v), text);
            }
        }
        assert_eq!(prog_string(&Value::Char('a')), "'a'");
    }
}
