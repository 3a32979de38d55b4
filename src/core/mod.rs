/// Numeric tower: value representation, promotion, scalar arithmetic.
pub mod arith;
pub mod bigfloat;
pub mod complex;
pub mod value;

pub use bigfloat::BigFloat;
pub use complex::Complex;
pub use value::{Type, Value, MAX_INT, MIN_INT};
