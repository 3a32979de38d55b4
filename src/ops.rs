/// Operator dispatch: two tables keyed by symbol, one descriptor per
/// operator, a function per operand type.
///
/// `eval_unary`/`eval_binary` look up the descriptor, promote the operands
/// with the operator's `whichType`, and call the typed function. A miss on a
/// vector or matrix lifts elementwise (in parallel when the operator is
/// safe). The tables are built once, on first use.
use std::collections::HashMap;

use num_traits::Zero;
use once_cell::sync::Lazy;

use crate::conf::Config;
use crate::core::arith;
use crate::core::value::{
    at_least_vector_type, binary_arith_type, div_type, euclid_divmod, rational_type, Type, Value,
    WhichType,
};
use crate::errors::{EvalError, Result};
use crate::format;
use crate::matrix::{self, Matrix};
use crate::parallel;
use crate::sets;
use crate::transcend;
use crate::tree::Transient;
use crate::vector::Vector;

pub type UnaryFn = fn(&Config, &Value) -> Result<Value>;
pub type BinaryFn = fn(&Config, &Value, &Value) -> Result<Value>;

pub struct UnaryOp {
    pub elementwise: bool,
    fns: HashMap<Type, UnaryFn>,
}

impl UnaryOp {
    fn on(&mut self, types: &[Type], f: UnaryFn) -> &mut Self {
        for &t in types {
            self.fns.insert(t, f);
        }
        self
    }
}

pub struct BinaryOp {
    pub elementwise: bool,
    pub which: Option<WhichType>,
    fns: HashMap<Type, BinaryFn>,
    passthrough: Option<BinaryFn>,
}

impl BinaryOp {
    fn on(&mut self, types: &[Type], f: BinaryFn) -> &mut Self {
        for &t in types {
            self.fns.insert(t, f);
        }
        self
    }
}

const REALS: &[Type] = &[Type::Int, Type::Big, Type::Rat, Type::Float];
const NUMS: &[Type] = &[Type::Int, Type::Big, Type::Rat, Type::Float, Type::Complex];
const SCALARS: &[Type] = &[
    Type::Int,
    Type::Char,
    Type::Big,
    Type::Rat,
    Type::Float,
    Type::Complex,
];
const ORDERED: &[Type] = &[Type::Int, Type::Char, Type::Big, Type::Rat, Type::Float];
const INTS: &[Type] = &[Type::Int, Type::Big];
const ARRAYS: &[Type] = &[Type::Vector, Type::Matrix];

struct UTable(HashMap<&'static str, UnaryOp>);

impl UTable {
    fn op(&mut self, name: &'static str, elementwise: bool) -> &mut UnaryOp {
        self.0.entry(name).or_insert(UnaryOp {
            elementwise,
            fns: HashMap::new(),
        })
    }
}

struct BTable(HashMap<&'static str, BinaryOp>);

impl BTable {
    fn op(&mut self, name: &'static str, which: WhichType, elementwise: bool) -> &mut BinaryOp {
        self.0.entry(name).or_insert(BinaryOp {
            elementwise,
            which: Some(which),
            fns: HashMap::new(),
            passthrough: None,
        })
    }

    fn passthrough(&mut self, name: &'static str, f: BinaryFn) {
        self.0.insert(
            name,
            BinaryOp {
                elementwise: false,
                which: None,
                fns: HashMap::new(),
                passthrough: Some(f),
            },
        );
    }
}

// ── Table construction ───────────────────────────────────────────────────────

static UNARY: Lazy<HashMap<&'static str, UnaryOp>> = Lazy::new(build_unary);
static BINARY: Lazy<HashMap<&'static str, BinaryOp>> = Lazy::new(build_binary);

/// Binary operators whose reductions may be computed in any association
/// order, and therefore in parallel.
pub const ASSOCIATIVE: &[&str] = &["+", "*", "min", "max", "or", "and", "xor", "|", "&", "^"];

pub fn is_unary_op(name: &str) -> bool {
    UNARY.contains_key(name) || matches!(name, "print" | "ivy")
}

pub fn is_binary_op(name: &str) -> bool {
    BINARY.contains_key(name)
}

/// The roll operator consumes the shared random stream; everything else in
/// the unary table is pure. User-defined operators never reach the tables.
pub fn safe_unary(name: &str) -> bool {
    name != "?" && UNARY.contains_key(name)
}

pub fn safe_binary(name: &str) -> bool {
    BINARY.contains_key(name)
}

fn build_unary() -> HashMap<&'static str, UnaryOp> {
    let mut t = UTable(HashMap::new());

    t.op("+", true).on(NUMS, |_, v| Ok(v.clone()));
    t.op("-", true).on(NUMS, arith::neg);
    t.op("abs", true)
        .on(REALS, |_, v| arith::abs(v))
        .on(&[Type::Complex], |c, v| match v {
            Value::Complex(z) => transcend::complex_abs(c, z),
            _ => Err(EvalError::Internal("abs dispatch".into())),
        });
    t.op("sgn", true).on(REALS, |_, v| arith::sgn(v));
    t.op("floor", true).on(NUMS, arith::floor);
    t.op("ceil", true).on(NUMS, arith::ceil);
    t.op("not", true)
        .on(SCALARS, |_, v| Ok(Value::bool(!v.is_true()?)));
    t.op("^", true).on(INTS, |_, v| {
        let b = arith::as_bigint(v)?;
        Ok(Value::from_big(-b - 1))
    });
    t.op("conj", true)
        .on(REALS, |_, v| Ok(v.clone()))
        .on(&[Type::Complex], |c, v| match v {
            Value::Complex(z) => z.conj(c),
            _ => Err(EvalError::Internal("conj dispatch".into())),
        });
    t.op("real", true)
        .on(REALS, |_, v| Ok(v.clone()))
        .on(&[Type::Complex], |_, v| match v {
            Value::Complex(z) => Ok(z.re.clone()),
            _ => Err(EvalError::Internal("real dispatch".into())),
        });
    t.op("imag", true)
        .on(REALS, |_, _| Ok(Value::zero()))
        .on(&[Type::Complex], |_, v| match v {
            Value::Complex(z) => Ok(z.im.clone()),
            _ => Err(EvalError::Internal("imag dispatch".into())),
        });
    t.op("phase", true).on(NUMS, transcend::complex_phase);

    // Inverse: reciprocal scalar, reciprocal vector, Gaussian matrix inverse.
    t.op("/", false)
        .on(NUMS, |c, v| arith::quo(c, &Value::one(), v))
        .on(&[Type::Vector], |c, v| {
            Ok(Value::Vector(v.as_vector()?.inverse(c)?))
        })
        .on(&[Type::Matrix], |c, v| match v {
            Value::Matrix(m) => Ok(Value::Matrix(m.inverse(c)?)),
            _ => Err(EvalError::Internal("inverse dispatch".into())),
        });

    t.op("iota", false).on(&[Type::Int], |c, v| {
        let n = v.small_int("iota count")?;
        if n < 0 {
            return Err(EvalError::domain(format!("iota of negative count {}", n)));
        }
        Ok(Value::Vector(Vector::from_ints(
            (0..n).map(|i| i + c.origin()),
        )))
    });

    t.op("rho", false)
        .on(SCALARS, |_, _| Ok(Value::Vector(Vector::empty())))
        .on(&[Type::Vector], |_, v| {
            Ok(Value::Vector(Vector::from_ints([v.as_vector()?.len() as i64])))
        })
        .on(&[Type::Matrix], |_, v| match v {
            Value::Matrix(m) => Ok(Value::Vector(Vector::from_ints(
                m.shape().iter().map(|&d| d as i64),
            ))),
            _ => Err(EvalError::Internal("rho dispatch".into())),
        });

    t.op(",", false)
        .on(SCALARS, |_, v| {
            Ok(Value::Vector(Vector::from_values(vec![v.clone()])))
        })
        .on(&[Type::Vector], |_, v| Ok(v.clone()))
        .on(&[Type::Matrix], |_, v| match v {
            Value::Matrix(m) => Ok(Value::Vector(m.ravel())),
            _ => Err(EvalError::Internal("ravel dispatch".into())),
        });

    t.op("?", true).on(&[Type::Int], |c, v| {
        let n = v.small_int("roll count")?;
        if n <= 0 {
            return Err(EvalError::domain(format!("illegal roll value {}", n)));
        }
        Ok(Value::from_i64(c.origin() + c.random_u64(n as u64) as i64))
    });

    t.op("!", true)
        .on(INTS, |c, v| {
            Ok(Value::from_big(transcend::factorial(c, &arith::as_bigint(v)?)?))
        })
        .on(&[Type::Rat, Type::Float], |c, v| {
            let x = arith::as_float(c, v)?.add(&crate::core::bigfloat::BigFloat::from_i64(
                1,
                c.float_prec(),
            ));
            Ok(Value::Float(transcend::gamma(c, &x)?).shrink())
        });

    // Transcendentals: the float kernel for reals, the documented lifts for
    // complex.
    t.op("sqrt", true).on(NUMS, |c, v| transcend::sqrt_value(c, v));
    t.op("exp", true)
        .on(REALS, |c, v| {
            Ok(Value::Float(transcend::exp(c, &arith::as_float(c, v)?)?).shrink())
        })
        .on(&[Type::Complex], transcend::complex_exp);
    t.op("log", true)
        .on(REALS, |c, v| {
            Ok(Value::Float(transcend::log(c, &arith::as_float(c, v)?)?).shrink())
        })
        .on(&[Type::Complex], transcend::complex_log);
    t.op("sin", true)
        .on(REALS, |c, v| {
            Ok(Value::Float(transcend::sin(c, &arith::as_float(c, v)?)?).shrink())
        })
        .on(&[Type::Complex], transcend::complex_sin);
    t.op("cos", true)
        .on(REALS, |c, v| {
            Ok(Value::Float(transcend::cos(c, &arith::as_float(c, v)?)?).shrink())
        })
        .on(&[Type::Complex], transcend::complex_cos);
    t.op("tan", true)
        .on(REALS, |c, v| {
            Ok(Value::Float(transcend::tan(c, &arith::as_float(c, v)?)?).shrink())
        })
        .on(&[Type::Complex], transcend::complex_tan);
    t.op("asin", true).on(REALS, |c, v| {
        Ok(Value::Float(transcend::asin(c, &arith::as_float(c, v)?)?).shrink())
    });
    t.op("acos", true).on(REALS, |c, v| {
        Ok(Value::Float(transcend::acos(c, &arith::as_float(c, v)?)?).shrink())
    });
    t.op("atan", true).on(REALS, |c, v| {
        Ok(Value::Float(transcend::atan(c, &arith::as_float(c, v)?)?).shrink())
    });
    t.op("sinh", true)
        .on(REALS, |c, v| {
            Ok(Value::Float(transcend::sinh(c, &arith::as_float(c, v)?)?).shrink())
        })
        .on(&[Type::Complex], transcend::complex_sinh);
    t.op("cosh", true)
        .on(REALS, |c, v| {
            Ok(Value::Float(transcend::cosh(c, &arith::as_float(c, v)?)?).shrink())
        })
        .on(&[Type::Complex], transcend::complex_cosh);
    t.op("tanh", true)
        .on(REALS, |c, v| {
            Ok(Value::Float(transcend::tanh(c, &arith::as_float(c, v)?)?).shrink())
        })
        .on(&[Type::Complex], transcend::complex_tanh);
    t.op("asinh", true).on(REALS, |c, v| {
        Ok(Value::Float(transcend::asinh(c, &arith::as_float(c, v)?)?).shrink())
    });
    t.op("acosh", true).on(REALS, |c, v| {
        Ok(Value::Float(transcend::acosh(c, &arith::as_float(c, v)?)?).shrink())
    });
    t.op("atanh", true).on(REALS, |c, v| {
        Ok(Value::Float(transcend::atanh(c, &arith::as_float(c, v)?)?).shrink())
    });

    t.op("first", false)
        .on(SCALARS, |_, v| Ok(v.clone()))
        .on(ARRAYS, |_, v| {
            let data = match v {
                Value::Vector(vec) => vec.clone(),
                Value::Matrix(m) => m.ravel(),
                _ => return Err(EvalError::Internal("first dispatch".into())),
            };
            if data.is_empty() {
                return Err(EvalError::domain("first of empty vector"));
            }
            Ok(data.at(0))
        });

    t.op("count", false)
        .on(SCALARS, |_, _| Ok(Value::one()))
        .on(&[Type::Vector], |_, v| {
            Ok(Value::from_i64(v.as_vector()?.len() as i64))
        })
        .on(&[Type::Matrix], |_, v| match v {
            Value::Matrix(m) => Ok(Value::from_i64(m.elems() as i64)),
            _ => Err(EvalError::Internal("count dispatch".into())),
        });

    t.op("flatten", false)
        .on(SCALARS, |_, v| {
            Ok(Value::Vector(Vector::from_values(vec![v.clone()])))
        })
        .on(ARRAYS, |_, v| {
            let mut out = Vec::new();
            flatten_into(v, &mut out);
            Ok(Value::Vector(Vector::from_values(out)))
        });

    t.op("up", false)
        .on(&[Type::Vector], |c, v| {
            Ok(Value::Vector(v.as_vector()?.grade(c, true)))
        })
        .on(&[Type::Matrix], |c, v| match v {
            Value::Matrix(m) => Ok(Value::Vector(m.grade(c, true)?)),
            _ => Err(EvalError::Internal("up dispatch".into())),
        });
    t.op("down", false)
        .on(&[Type::Vector], |c, v| {
            Ok(Value::Vector(v.as_vector()?.grade(c, false)))
        })
        .on(&[Type::Matrix], |c, v| match v {
            Value::Matrix(m) => Ok(Value::Vector(m.grade(c, false)?)),
            _ => Err(EvalError::Internal("down dispatch".into())),
        });

    t.op("rev", false)
        .on(SCALARS, |_, v| Ok(v.clone()))
        .on(&[Type::Vector], |_, v| {
            Ok(Value::Vector(v.as_vector()?.reverse()))
        })
        .on(&[Type::Matrix], |_, v| match v {
            Value::Matrix(m) => Ok(Value::Matrix(reverse_last(m)?)),
            _ => Err(EvalError::Internal("rev dispatch".into())),
        });
    t.op("flip", false)
        .on(SCALARS, |_, v| Ok(v.clone()))
        .on(&[Type::Vector], |_, v| {
            Ok(Value::Vector(v.as_vector()?.reverse()))
        })
        .on(&[Type::Matrix], |_, v| match v {
            Value::Matrix(m) => Ok(Value::Matrix(reverse_first(m)?)),
            _ => Err(EvalError::Internal("flip dispatch".into())),
        });

    t.op("transp", false)
        .on(SCALARS, |_, v| Ok(v.clone()))
        .on(&[Type::Vector], |_, v| Ok(v.clone()))
        .on(&[Type::Matrix], |_, v| match v {
            Value::Matrix(m) => Ok(Value::Matrix(m.transpose()?)),
            _ => Err(EvalError::Internal("transp dispatch".into())),
        });

    t.op("split", false).on(ARRAYS, |_, v| matrix::split(v));
    t.op("mix", false).on(ARRAYS, |_, v| matrix::mix(v));
    t.op("box", false).on(
        &[
            Type::Int,
            Type::Char,
            Type::Big,
            Type::Rat,
            Type::Float,
            Type::Complex,
            Type::Vector,
            Type::Matrix,
        ],
        |_, v| Ok(Value::Vector(Vector::from_values(vec![v.clone()]))),
    );

    t.op("unique", false).on(&[Type::Vector], |_, v| {
        Ok(Value::Vector(sets::unique(v.as_vector()?)))
    });

    t.op("char", true).on(INTS, |_, v| {
        let code = v.small_int("character code")?;
        u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .map(Value::Char)
            .ok_or_else(|| EvalError::domain(format!("invalid code point {}", code)))
    });
    t.op("code", true)
        .on(&[Type::Char], |_, v| match v {
            Value::Char(c) => Ok(Value::from_i64(*c as i64)),
            _ => Err(EvalError::Internal("code dispatch".into())),
        })
        .on(INTS, |_, v| Ok(v.clone()));

    t.op("float", true).on(REALS, |c, v| {
        Ok(Value::Float(arith::as_float(c, v)?))
    });

    t.op("text", false).on(
        &[
            Type::Int,
            Type::Char,
            Type::Big,
            Type::Rat,
            Type::Float,
            Type::Complex,
            Type::Vector,
            Type::Matrix,
        ],
        |c, v| Ok(Value::Vector(Vector::from_chars(&format::sprint(c, v)))),
    );

    t.0
}

fn build_binary() -> HashMap<&'static str, BinaryOp> {
    let mut t = BTable(HashMap::new());

    t.op("+", binary_arith_type, true).on(NUMS, arith::add);
    t.op("-", binary_arith_type, true).on(NUMS, arith::sub);
    t.op("*", binary_arith_type, true).on(NUMS, arith::mul);
    t.op("/", rational_type, true)
        .on(&[Type::Rat, Type::Float, Type::Complex], arith::quo);

    t.op("idiv", div_type, true).on(&[Type::Big], |_, u, v| {
        let (a, b) = (arith::as_bigint(u)?, arith::as_bigint(v)?);
        if b.is_zero() {
            return Err(EvalError::domain("division by zero"));
        }
        Ok(Value::from_big(&a / &b))
    });
    t.op("imod", div_type, true).on(&[Type::Big], |_, u, v| {
        let (a, b) = (arith::as_bigint(u)?, arith::as_bigint(v)?);
        if b.is_zero() {
            return Err(EvalError::domain("division by zero"));
        }
        Ok(Value::from_big(&a % &b))
    });
    t.op("div", div_type, true).on(&[Type::Big], |_, u, v| {
        let (a, b) = (arith::as_bigint(u)?, arith::as_bigint(v)?);
        if b.is_zero() {
            return Err(EvalError::domain("division by zero"));
        }
        Ok(Value::from_big(euclid_divmod(&a, &b).0))
    });
    t.op("mod", div_type, true).on(&[Type::Big], |_, u, v| {
        let (a, b) = (arith::as_bigint(u)?, arith::as_bigint(v)?);
        if b.is_zero() {
            return Err(EvalError::domain("division by zero"));
        }
        Ok(Value::from_big(euclid_divmod(&a, &b).1))
    });

    t.op("**", div_type, true).on(
        &[Type::Big, Type::Rat, Type::Float, Type::Complex],
        transcend::power,
    );

    t.op("log", binary_arith_type, true)
        .on(NUMS, |c, u, v| {
            // u log v: log v in base u.
            if matches!(u, Value::Complex(_)) || matches!(v, Value::Complex(_)) {
                let (lu, lv) = (transcend::complex_log(c, u)?, transcend::complex_log(c, v)?);
                return arith::quo(c, &lv, &lu);
            }
            let base = transcend::log(c, &arith::as_float(c, u)?)?;
            if base.is_zero() {
                return Err(EvalError::domain("division by zero"));
            }
            let x = transcend::log(c, &arith::as_float(c, v)?)?;
            Ok(Value::Float(x.div(&base)?).shrink())
        });

    t.op("&", binary_arith_type, true)
        .on(&[Type::Int], |_, u, v| {
            Ok(Value::from_i64(u.small_int("operand")? & v.small_int("operand")?))
        })
        .on(&[Type::Big], |_, u, v| {
            Ok(Value::from_big(arith::as_bigint(u)? & arith::as_bigint(v)?))
        });
    t.op("|", binary_arith_type, true)
        .on(&[Type::Int], |_, u, v| {
            Ok(Value::from_i64(u.small_int("operand")? | v.small_int("operand")?))
        })
        .on(&[Type::Big], |_, u, v| {
            Ok(Value::from_big(arith::as_bigint(u)? | arith::as_bigint(v)?))
        });
    t.op("^", binary_arith_type, true)
        .on(&[Type::Int], |_, u, v| {
            Ok(Value::from_i64(u.small_int("operand")? ^ v.small_int("operand")?))
        })
        .on(&[Type::Big], |_, u, v| {
            Ok(Value::from_big(arith::as_bigint(u)? ^ arith::as_bigint(v)?))
        });

    t.op("<<", div_type, true).on(&[Type::Big], |c, u, v| {
        let count = arith::shift_count(v)?;
        let b = arith::as_bigint(u)?;
        c.must_fit(b.bits() + count)?;
        Ok(Value::from_big(b << count as usize))
    });
    t.op(">>", div_type, true).on(&[Type::Big], |_, u, v| {
        let count = arith::shift_count(v)?;
        let b = arith::as_bigint(u)?;
        Ok(Value::from_big(b >> count as usize))
    });

    t.op("==", binary_arith_type, true)
        .on(SCALARS, |c, u, v| Ok(Value::bool(arith::eq(c, u, v)?)));
    t.op("!=", binary_arith_type, true)
        .on(SCALARS, |c, u, v| Ok(Value::bool(!arith::eq(c, u, v)?)));
    t.op("<", binary_arith_type, true).on(ORDERED, |c, u, v| {
        Ok(Value::bool(arith::cmp(c, u, v)? == std::cmp::Ordering::Less))
    });
    t.op("<=", binary_arith_type, true).on(ORDERED, |c, u, v| {
        Ok(Value::bool(arith::cmp(c, u, v)? != std::cmp::Ordering::Greater))
    });
    t.op(">", binary_arith_type, true).on(ORDERED, |c, u, v| {
        Ok(Value::bool(arith::cmp(c, u, v)? == std::cmp::Ordering::Greater))
    });
    t.op(">=", binary_arith_type, true).on(ORDERED, |c, u, v| {
        Ok(Value::bool(arith::cmp(c, u, v)? != std::cmp::Ordering::Less))
    });

    t.op("and", binary_arith_type, true)
        .on(SCALARS, |_, u, v| Ok(Value::bool(u.is_true()? & v.is_true()?)));
    t.op("or", binary_arith_type, true)
        .on(SCALARS, |_, u, v| Ok(Value::bool(u.is_true()? | v.is_true()?)));
    t.op("xor", binary_arith_type, true)
        .on(SCALARS, |_, u, v| Ok(Value::bool(u.is_true()? != v.is_true()?)));
    t.op("nand", binary_arith_type, true)
        .on(SCALARS, |_, u, v| Ok(Value::bool(!(u.is_true()? & v.is_true()?))));
    t.op("nor", binary_arith_type, true)
        .on(SCALARS, |_, u, v| Ok(Value::bool(!(u.is_true()? | v.is_true()?))));

    t.op("min", binary_arith_type, true).on(ORDERED, |c, u, v| {
        Ok(if arith::cmp(c, u, v)? != std::cmp::Ordering::Greater {
            u.clone().shrink()
        } else {
            v.clone().shrink()
        })
    });
    t.op("max", binary_arith_type, true).on(ORDERED, |c, u, v| {
        Ok(if arith::cmp(c, u, v)? != std::cmp::Ordering::Less {
            u.clone().shrink()
        } else {
            v.clone().shrink()
        })
    });

    t.op("iota", at_least_vector_type, false)
        .on(ARRAYS, |c, u, v| {
            let hay = match u {
                Value::Vector(vec) => vec.clone(),
                _ => {
                    return Err(EvalError::type_err(
                        "left operand of binary iota must be a vector",
                    ))
                }
            };
            let miss = c.origin() + hay.len() as i64;
            let (shape, needles) = array_parts(v)?;
            let found: Vec<Value> = needles
                .iter()
                .map(|n| {
                    let pos = (0..hay.len()).find(|&i| {
                        sets::ordered_compare(&hay.at(i), &n) == std::cmp::Ordering::Equal
                    });
                    Value::from_i64(match pos {
                        Some(i) => i as i64 + c.origin(),
                        None => miss,
                    })
                })
                .collect();
            matrix::demote(shape, Vector::from_values(found))
        });

    t.op("rho", at_least_vector_type, false)
        .on(ARRAYS, |_, u, v| {
            let dims = match u {
                Value::Vector(vec) => vec.to_ints("shape dimension")?,
                _ => return Err(EvalError::type_err("left operand of rho must be a vector")),
            };
            matrix::reshape(&dims, v)
        });

    t.op(",", at_least_vector_type, false)
        .on(ARRAYS, |_, u, v| matrix::catenate(u, v, false));
    t.op("catfirst", at_least_vector_type, false)
        .on(ARRAYS, |_, u, v| matrix::catenate(u, v, true));

    t.op("take", at_least_vector_type, false)
        .on(ARRAYS, |_, u, v| {
            matrix::take(&left_ints(u, "take count")?, v)
        });
    t.op("drop", at_least_vector_type, false)
        .on(ARRAYS, |_, u, v| {
            matrix::drop(&left_ints(u, "drop count")?, v)
        });
    t.op("sel", at_least_vector_type, false)
        .on(ARRAYS, |_, u, v| matrix::sel(&left_ints(u, "sel count")?, v));
    t.op("part", at_least_vector_type, false)
        .on(&[Type::Vector], |_, u, v| {
            let scores = left_ints(u, "partition score")?;
            Ok(Value::Vector(v.as_vector()?.partition(&scores)?))
        });

    t.op("rot", at_least_vector_type, false)
        .on(&[Type::Vector], |_, u, v| {
            Ok(Value::Vector(v.as_vector()?.rotate(single_int(u, "rotation count")?)))
        })
        .on(&[Type::Matrix], |_, u, v| match v {
            Value::Matrix(m) => Ok(Value::Matrix(m.rotate(single_int(u, "rotation count")?)?)),
            _ => Err(EvalError::Internal("rot dispatch".into())),
        });
    t.op("flip", at_least_vector_type, false)
        .on(&[Type::Vector], |_, u, v| {
            Ok(Value::Vector(v.as_vector()?.rotate(single_int(u, "rotation count")?)))
        })
        .on(&[Type::Matrix], |_, u, v| match v {
            Value::Matrix(m) => Ok(Value::Matrix(m.vrotate(single_int(u, "rotation count")?)?)),
            _ => Err(EvalError::Internal("flip dispatch".into())),
        });

    t.op("transp", at_least_vector_type, false)
        .on(&[Type::Vector], |c, u, v| {
            let axes = left_ints(u, "transpose axis")?;
            if axes != [c.origin()] {
                return Err(EvalError::shape("transpose: length mismatch"));
            }
            Ok(v.clone())
        })
        .on(&[Type::Matrix], |c, u, v| match v {
            Value::Matrix(m) => {
                let axes: Vec<i64> = left_ints(u, "transpose axis")?
                    .iter()
                    .map(|a| a - c.origin())
                    .collect();
                m.transpose_map(&axes)
            }
            _ => Err(EvalError::Internal("transp dispatch".into())),
        });

    t.op("in", at_least_vector_type, false).on(ARRAYS, |_, u, v| {
        let (shape, uvals) = array_parts(u)?;
        let vvals = match v {
            Value::Vector(vec) => vec.clone(),
            Value::Matrix(m) => m.ravel(),
            _ => return Err(EvalError::Internal("in dispatch".into())),
        };
        let hits = sets::membership(&uvals, &vvals);
        matrix::demote(
            shape,
            Vector::from_values(hits.into_iter().map(Value::bool).collect()),
        )
    });

    // Base conversion: `radices encode n` represents, `radices decode digits`
    // evaluates, both weighted right to left.
    t.op("encode", at_least_vector_type, false).on(ARRAYS, |_, u, v| {
        let radices = left_ints(u, "encode radix")?;
        let digits_of = |n: &Value| -> Result<Vec<Value>> {
            let mut rest = arith::as_bigint(n)?;
            let mut digits = vec![Value::zero(); radices.len()];
            for (i, &b) in radices.iter().enumerate().rev() {
                if b <= 0 {
                    return Err(EvalError::domain(format!("illegal radix {}", b)));
                }
                let (q, r) = euclid_divmod(&rest, &num_bigint::BigInt::from(b));
                digits[i] = Value::from_big(r);
                rest = q;
            }
            Ok(digits)
        };
        match v {
            Value::Vector(vec) if vec.len() == 1 => {
                Ok(Value::Vector(Vector::from_values(digits_of(&vec.at(0))?)))
            }
            Value::Vector(vec) => {
                // One column of digits per element.
                let cols: Vec<Vec<Value>> =
                    vec.iter().map(|n| digits_of(&n)).collect::<Result<_>>()?;
                let mut data = Vec::with_capacity(radices.len() * cols.len());
                for r in 0..radices.len() {
                    for col in &cols {
                        data.push(col[r].clone());
                    }
                }
                matrix::demote(vec![radices.len(), cols.len()], Vector::from_values(data))
            }
            _ => Err(EvalError::type_err("encode needs an integer")),
        }
    });
    t.op("decode", at_least_vector_type, false).on(ARRAYS, |c, u, v| {
        let radices = left_ints(u, "decode radix")?;
        let digits = match v {
            Value::Vector(vec) => vec.clone(),
            Value::Matrix(m) => m.ravel(),
            _ => return Err(EvalError::type_err("decode needs a vector")),
        };
        if radices.len() != digits.len() && radices.len() != 1 {
            return Err(EvalError::shape(format!(
                "decode: {} radices for {} digits",
                radices.len(),
                digits.len()
            )));
        }
        let radix_at = |i: usize| radices[if radices.len() == 1 { 0 } else { i }];
        let mut acc = Value::zero();
        let mut weight = Value::one();
        for i in (0..digits.len()).rev() {
            let term = arith::mul(c, &digits.at(i), &weight)?;
            acc = arith::add(c, &acc, &term)?;
            weight = arith::mul(c, &weight, &Value::from_i64(radix_at(i)))?;
        }
        Ok(acc)
    });

    t.op("union", at_least_vector_type, false)
        .on(&[Type::Vector], |_, u, v| {
            Ok(Value::Vector(sets::union(u.as_vector()?, v.as_vector()?)))
        });
    t.op("intersect", at_least_vector_type, false)
        .on(&[Type::Vector], |_, u, v| {
            Ok(Value::Vector(sets::intersect(u.as_vector()?, v.as_vector()?)))
        });

    t.passthrough("text", format::text_op);

    t.0
}

// ── Shared helpers ───────────────────────────────────────────────────────────

fn left_ints(u: &Value, what: &str) -> Result<Vec<i64>> {
    match u {
        Value::Vector(v) => v.to_ints(what),
        _ => Err(EvalError::type_err(format!("{} must be a vector", what))),
    }
}

fn single_int(u: &Value, what: &str) -> Result<i64> {
    let ints = left_ints(u, what)?;
    if ints.len() != 1 {
        return Err(EvalError::type_err(format!("{} must be a single integer", what)));
    }
    Ok(ints[0])
}

fn array_parts(v: &Value) -> Result<(Vec<usize>, Vector)> {
    match v {
        Value::Vector(vec) => Ok((vec![vec.len()], vec.clone())),
        Value::Matrix(m) => Ok((m.shape().to_vec(), m.ravel())),
        scalar => Ok((vec![], Vector::from_values(vec![scalar.clone()]))),
    }
}

fn flatten_into(v: &Value, out: &mut Vec<Value>) {
    match v {
        Value::Vector(vec) => {
            for e in vec.iter() {
                flatten_into(&e, out);
            }
        }
        Value::Matrix(m) => {
            for e in m.data().iter() {
                flatten_into(&e, out);
            }
        }
        scalar => out.push(scalar.clone()),
    }
}

fn reverse_last(m: &Matrix) -> Result<Matrix> {
    let width = *m.shape().last().unwrap_or(&1);
    let data = m.data();
    let mut out = Vec::with_capacity(data.len());
    if width > 0 {
        for r in 0..data.len() / width {
            for c in 0..width {
                out.push(data.at(r * width + (width - 1 - c)));
            }
        }
    }
    Matrix::new(m.shape().to_vec(), Vector::from_values(out))
}

fn reverse_first(m: &Matrix) -> Result<Matrix> {
    let planes = m.shape()[0];
    let data = m.data();
    let mut out = Vec::with_capacity(data.len());
    if planes > 0 {
        let size = data.len() / planes;
        for p in 0..planes {
            let src = planes - 1 - p;
            for i in 0..size {
                out.push(data.at(src * size + i));
            }
        }
    }
    Matrix::new(m.shape().to_vec(), Vector::from_values(out))
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

pub fn eval_unary(conf: &Config, op: &str, v: &Value) -> Result<Value> {
    let desc = UNARY
        .get(op)
        .ok_or_else(|| EvalError::type_err(format!("unknown unary operator {}", op)))?;
    let t = v.type_of();
    if let Some(f) = desc.fns.get(&t) {
        return f(conf, v);
    }
    if desc.elementwise {
        match v {
            Value::Vector(vec) => {
                return Ok(Value::Vector(unary_map(conf, op, vec.len(), |i| vec.at(i))?))
            }
            Value::Matrix(m) => {
                let data = unary_map(conf, op, m.elems(), |i| m.data().at(i))?;
                return Ok(Value::Matrix(Matrix::new(m.shape().to_vec(), data)?));
            }
            _ => {}
        }
    }
    Err(EvalError::unary_not_implemented(op, t.name()))
}

pub fn eval_binary(conf: &Config, u: &Value, op: &str, v: &Value) -> Result<Value> {
    let desc = BINARY
        .get(op)
        .ok_or_else(|| EvalError::type_err(format!("unknown binary operator {}", op)))?;
    if let Some(f) = desc.passthrough {
        return f(conf, u, v);
    }
    let which = desc
        .which
        .ok_or_else(|| EvalError::Internal(format!("operator {} has no type rule", op)))?;
    let (tu, tv) = which(u.type_of(), v.type_of());
    if let Some(f) = desc.fns.get(&tv) {
        let pu = u.to_type(conf, tu)?;
        let pv = v.to_type(conf, tv)?;
        return f(conf, &pu, &pv);
    }
    if desc.elementwise && (tu >= Type::Vector || tv >= Type::Vector) {
        return binary_array_op(conf, op, u, v);
    }
    Err(EvalError::binary_not_implemented(op, tv.name()))
}

fn unary_map(
    conf: &Config,
    op: &str,
    n: usize,
    get: impl Fn(usize) -> Value + Send + Sync,
) -> Result<Vector> {
    let out = Transient::with_len(n);
    parallel::try_pfor(safe_unary(op), 1, n, |lo, hi| {
        for i in lo..hi {
            out.set(i, eval_unary(conf, op, &get(i))?);
        }
        Ok(())
    })?;
    Ok(Vector::from_slice(out.persist()))
}

fn binary_map(
    conf: &Config,
    op: &str,
    n: usize,
    get_u: impl Fn(usize) -> Value + Send + Sync,
    get_v: impl Fn(usize) -> Value + Send + Sync,
) -> Result<Vector> {
    let out = Transient::with_len(n);
    parallel::try_pfor(safe_binary(op), 1, n, |lo, hi| {
        for i in lo..hi {
            out.set(i, eval_binary(conf, &get_u(i), op, &get_v(i))?);
        }
        Ok(())
    })?;
    Ok(Vector::from_slice(out.persist()))
}

/// Elementwise lifting with the broadcast rules: one-element vectors act as
/// scalars, a vector matching a matrix's last axis broadcasts along it, and
/// an all-ones-shape matrix acts as a scalar.
fn binary_array_op(conf: &Config, op: &str, u: &Value, v: &Value) -> Result<Value> {
    match (u, v) {
        (Value::Vector(a), Value::Vector(b)) => {
            if a.len() == b.len() {
                Ok(Value::Vector(binary_map(conf, op, a.len(), |i| a.at(i), |i| b.at(i))?))
            } else if a.len() == 1 {
                let s = a.at(0);
                Ok(Value::Vector(binary_map(conf, op, b.len(), |_| s.clone(), |i| b.at(i))?))
            } else if b.len() == 1 {
                let s = b.at(0);
                Ok(Value::Vector(binary_map(conf, op, a.len(), |i| a.at(i), |_| s.clone())?))
            } else {
                Err(EvalError::shape(format!(
                    "length mismatch {} vs {}",
                    a.len(),
                    b.len()
                )))
            }
        }
        (Value::Matrix(a), Value::Matrix(b)) => {
            if a.shape() == b.shape() {
                let data = binary_map(conf, op, a.elems(), |i| a.data().at(i), |i| b.data().at(i))?;
                Ok(Value::Matrix(Matrix::new(a.shape().to_vec(), data)?))
            } else if a.elems() == 1 {
                let s = a.data().at(0);
                binary_array_op(conf, op, &s, v)
            } else if b.elems() == 1 {
                let s = b.data().at(0);
                binary_array_op(conf, op, u, &s)
            } else {
                Err(EvalError::shape(format!(
                    "shape mismatch {:?} vs {:?}",
                    a.shape(),
                    b.shape()
                )))
            }
        }
        (Value::Vector(a), Value::Matrix(m)) => broadcast_vector_matrix(conf, op, a, m, true),
        (Value::Matrix(m), Value::Vector(a)) => broadcast_vector_matrix(conf, op, a, m, false),
        (scalar, Value::Vector(b)) => {
            let s = scalar.clone();
            Ok(Value::Vector(binary_map(conf, op, b.len(), |_| s.clone(), |i| b.at(i))?))
        }
        (Value::Vector(a), scalar) => {
            let s = scalar.clone();
            Ok(Value::Vector(binary_map(conf, op, a.len(), |i| a.at(i), |_| s.clone())?))
        }
        (scalar, Value::Matrix(m)) => {
            let s = scalar.clone();
            let data = binary_map(conf, op, m.elems(), |_| s.clone(), |i| m.data().at(i))?;
            Ok(Value::Matrix(Matrix::new(m.shape().to_vec(), data)?))
        }
        (Value::Matrix(m), scalar) => {
            let s = scalar.clone();
            let data = binary_map(conf, op, m.elems(), |i| m.data().at(i), |_| s.clone())?;
            Ok(Value::Matrix(Matrix::new(m.shape().to_vec(), data)?))
        }
        _ => Err(EvalError::Internal("array lift on scalars".into())),
    }
}

fn broadcast_vector_matrix(
    conf: &Config,
    op: &str,
    vec: &Vector,
    m: &Matrix,
    vector_left: bool,
) -> Result<Value> {
    if vec.len() == 1 {
        let s = vec.at(0);
        return if vector_left {
            binary_array_op(conf, op, &s, &Value::Matrix(m.clone()))
        } else {
            binary_array_op(conf, op, &Value::Matrix(m.clone()), &s)
        };
    }
    let width = *m.shape().last().unwrap_or(&0);
    if vec.len() != width {
        return Err(EvalError::shape(format!(
            "vector length {} does not match last axis of {:?}",
            vec.len(),
            m.shape()
        )));
    }
    let data = if vector_left {
        binary_map(conf, op, m.elems(), |i| vec.at(i % width), |i| m.data().at(i))?
    } else {
        binary_map(conf, op, m.elems(), |i| m.data().at(i), |i| vec.at(i % width))?
    };
    Ok(Value::Matrix(Matrix::new(m.shape().to_vec(), data)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf() -> Config {
        Config::new()
    }

    fn ints(ns: &[i64]) -> Value {
        Value::Vector(Vector::from_ints(ns.iter().copied()))
    }

    #[test]
    fn scalar_dispatch() {
        let c = conf();
        assert_eq!(eval_binary(&c, &Value::Int(2), "+", &Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(eval_unary(&c, "-", &Value::Int(2)).unwrap(), Value::Int(-2));
        assert_eq!(
            eval_binary(&c, &Value::Int(7), "mod", &Value::Int(-3)).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            eval_binary(&c, &Value::Int(7), "imod", &Value::Int(-3)).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            eval_binary(&c, &Value::Int(-7), "imod", &Value::Int(3)).unwrap(),
            Value::Int(-1)
        );
    }

    #[test]
    fn elementwise_lifts() {
        let c = conf();
        assert_eq!(
            eval_binary(&c, &ints(&[1, 2, 3]), "+", &ints(&[10, 20, 30])).unwrap(),
            ints(&[11, 22, 33])
        );
        assert_eq!(
            eval_binary(&c, &Value::Int(10), "*", &ints(&[1, 2, 3])).unwrap(),
            ints(&[10, 20, 30])
        );
        assert_eq!(
            eval_binary(&c, &ints(&[5]), "+", &ints(&[1, 2])).unwrap(),
            ints(&[6, 7])
        );
        assert_eq!(eval_unary(&c, "-", &ints(&[1, -2])).unwrap(), ints(&[-1, 2]));
        assert!(eval_binary(&c, &ints(&[1, 2]), "+", &ints(&[1, 2, 3])).is_err());
    }

    #[test]
    fn vector_broadcasts_along_matrix_last_axis() {
        let c = conf();
        let m = matrix::reshape(&[2, 3], &ints(&[1, 2, 3, 4, 5, 6])).unwrap();
        let r = eval_binary(&c, &m, "+", &ints(&[10, 20, 30])).unwrap();
        match r {
            Value::Matrix(out) => {
                assert_eq!(out.data(), &Vector::from_ints([11, 22, 33, 14, 25, 36]));
            }
            other => panic!("expected matrix, got {:?}", other),
        }
    }

    #[test]
    fn relational_and_boolean() {
        let c = conf();
        assert_eq!(
            eval_binary(&c, &ints(&[1, 5, 3]), "<", &Value::Int(3)).unwrap(),
            ints(&[1, 0, 0])
        );
        assert_eq!(
            eval_binary(&c, &Value::Int(1), "nand", &Value::Int(1)).unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            eval_binary(&c, &Value::Char('a'), "==", &Value::Char('a')).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn shifts_and_guards() {
        let c = conf();
        assert_eq!(
            eval_binary(&c, &Value::Int(1), "<<", &Value::Int(10)).unwrap(),
            Value::Int(1024)
        );
        assert_eq!(
            eval_binary(&c, &Value::Int(1024), ">>", &Value::Int(3)).unwrap(),
            Value::Int(128)
        );
        let err = eval_binary(&c, &Value::Int(1), "<<", &Value::Int(-1)).unwrap_err();
        assert_eq!(err.to_string(), "illegal shift count");
    }

    #[test]
    fn iota_and_rho() {
        let c = conf();
        assert_eq!(eval_unary(&c, "iota", &Value::Int(5)).unwrap(), ints(&[1, 2, 3, 4, 5]));
        assert_eq!(
            eval_unary(&c, "iota", &Value::Int(0)).unwrap(),
            Value::Vector(Vector::empty())
        );
        let m = eval_binary(&c, &ints(&[2, 2]), "rho", &ints(&[1, 2, 3, 4])).unwrap();
        assert_eq!(eval_unary(&c, "rho", &m).unwrap(), ints(&[2, 2]));
        assert_eq!(
            eval_binary(&c, &ints(&[1, 2, 3]), "iota", &Value::Int(2)).unwrap(),
            ints(&[2])
        );
    }

    #[test]
    fn type_misses_report_cleanly() {
        let c = conf();
        let err = eval_binary(&c, &Value::Char('a'), "+", &Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "binary + not implemented on type char");
        let err = eval_unary(&c, "sqrt", &Value::Char('a')).unwrap_err();
        assert_eq!(err.to_string(), "unary sqrt not implemented on type char");
    }

    #[test]
    fn roll_respects_range_and_origin() {
        let mut c = conf();
        c.set_random_seed(7);
        for _ in 0..50 {
            match eval_unary(&c, "?", &Value::Int(6)).unwrap() {
                Value::Int(i) => assert!((1..=6).contains(&i)),
                other => panic!("roll gave {:?}", other),
            }
        }
        c.set_origin(0).unwrap();
        for _ in 0..50 {
            match eval_unary(&c, "?", &Value::Int(6)).unwrap() {
                Value::Int(i) => assert!((0..6).contains(&i)),
                other => panic!("roll gave {:?}", other),
            }
        }
    }

    #[test]
    fn char_code_roundtrip() {
        let c = conf();
        let ch = Value::Char('Ω');
        let code = eval_unary(&c, "code", &ch).unwrap();
        assert_eq!(eval_unary(&c, "char", &code).unwrap(), ch);
    }
}
