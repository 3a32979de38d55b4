/// Error taxonomy for the aplite evaluation engine.
///
/// Every failure is surfaced to the driver as a single `EvalError` carrying a
/// printable message; the driver reports it at the statement boundary and
/// moves on. Early return from a user-defined operator is not an error and
/// travels through `exec::Flow` instead.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvalError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Malformed number, unterminated string, bad literal.
    #[error("parse error: {0}")]
    Parse(String),

    /// Argument outside the mathematical domain of the operation.
    #[error("{0}")]
    Domain(String),

    /// Rank or length mismatch between array operands.
    #[error("{0}")]
    Shape(String),

    /// Index outside `[origin, origin+size)`.
    #[error("index {index} out of range for shape {shape}")]
    Index { index: i64, shape: String },

    /// A size or bit-length limit was exceeded.
    #[error("{0}")]
    Overflow(String),

    /// A series failed to settle within its iteration budget.
    #[error("{name} {arg}: did not converge after {iters} iterations")]
    Convergence {
        name: &'static str,
        arg: String,
        iters: usize,
    },

    /// Reference to a variable with no binding.
    #[error("undefined variable {0:?}")]
    Name(String),

    /// Operator not implemented for the type of its operand(s).
    #[error("{0}")]
    Type(String),

    /// Broken invariant. Should never fire.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EvalError {
    pub fn domain(msg: impl Into<String>) -> Self {
        EvalError::Domain(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        EvalError::Shape(msg.into())
    }

    pub fn overflow(msg: impl Into<String>) -> Self {
        EvalError::Overflow(msg.into())
    }

    pub fn type_err(msg: impl Into<String>) -> Self {
        EvalError::Type(msg.into())
    }

    pub fn unary_not_implemented(op: &str, ty: &str) -> Self {
        EvalError::Type(format!("unary {} not implemented on type {}", op, ty))
    }

    pub fn binary_not_implemented(op: &str, ty: &str) -> Self {
        EvalError::Type(format!("binary {} not implemented on type {}", op, ty))
    }
}
