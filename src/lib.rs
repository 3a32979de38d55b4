/// aplite — the evaluation engine of an APL-derived calculator.
///
/// Module layout:
///   - conf      — runtime configuration (bases, precision, limits, origin, RNG)
///   - errors    — the error taxonomy surfaced to the driver
///   - core      — numeric tower: value sum, bigfloat, complex, scalar arithmetic
///   - tree      — persistent 16-way trie backing vectors, transient editor
///   - vector    — 1-D container and vector operations
///   - matrix    — rank-N container: reshape, transpose, take/drop, catenate, …
///   - sets      — ordered compare, union/intersect/unique, membership
///   - ops       — operator dispatch tables and elementwise lifting
///   - fold      — reduction, scan, inner and outer products
///   - index     — N-axis indexing and indexed assignment
///   - transcend — convergence loop and the series kernel
///   - parallel  — work-splitting for elementwise operations
///   - format    — value display, program text, the `text` operator
///   - scan / parse / ast — front-end producing the expression tree
///   - exec      — Context, frames, Eval, user-defined operators

// ── Engine core ──────────────────────────────────────────────────────────────
pub mod conf;
pub mod core;
pub mod errors;
pub mod tree;

// ── Containers ───────────────────────────────────────────────────────────────
pub mod matrix;
pub mod sets;
pub mod vector;

// ── Operators and evaluation ─────────────────────────────────────────────────
pub mod fold;
pub mod index;
pub mod ops;
pub mod parallel;
pub mod transcend;

// ── Front end, formatting, execution ─────────────────────────────────────────
pub mod ast;
pub mod exec;
pub mod format;
pub mod parse;
pub mod scan;

// ── Re-exports for convenience ───────────────────────────────────────────────
pub use conf::Config;
pub use crate::core::value::{Type, Value};
pub use errors::{EvalError, Result};
pub use exec::{Context, Flow};
pub use format::{prog_string, sprint};
pub use matrix::Matrix;
pub use vector::Vector;
