/// Runtime configuration for the evaluation engine.
///
/// The driver owns a `Config` inside the `Context` and is responsible for
/// serializing changes with evaluation. Settings follow the engine defaults:
/// C-style input base, 256-bit float mantissa, one-million-bit size guard,
/// index origin 1.
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{EvalError, Result};

/// Shared handle to an output sink. Stdout and stderr by default; tests
/// substitute buffers.
pub type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

pub struct Config {
    input_base: u32,
    output_base: u32,
    float_prec: u32,
    max_bits: u64,
    max_digits: usize,
    max_stack: usize,
    origin: i64,
    format: String,
    prompt: String,
    seed: u64,
    rng: Mutex<StdRng>,
    out: Sink,
    err_out: Sink,
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

impl Config {
    pub fn new() -> Self {
        let seed = 0;
        Config {
            input_base: 0,
            output_base: 0,
            float_prec: 256,
            max_bits: 1_000_000,
            max_digits: 10_000,
            max_stack: 100_000,
            origin: 1,
            format: String::new(),
            prompt: String::new(),
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            out: Arc::new(Mutex::new(Box::new(io::stdout()))),
            err_out: Arc::new(Mutex::new(Box::new(io::stderr()))),
        }
    }

    // ── Bases ────────────────────────────────────────────────────────────────

    pub fn input_base(&self) -> u32 {
        self.input_base
    }

    pub fn output_base(&self) -> u32 {
        self.output_base
    }

    pub fn set_base(&mut self, input: u32, output: u32) -> Result<()> {
        for b in [input, output] {
            if !matches!(b, 0 | 2 | 8 | 10 | 16) {
                return Err(EvalError::domain(format!("illegal base {}", b)));
            }
        }
        self.input_base = input;
        self.output_base = output;
        Ok(())
    }

    // ── Precision and limits ─────────────────────────────────────────────────

    pub fn float_prec(&self) -> u32 {
        self.float_prec
    }

    pub fn set_float_prec(&mut self, bits: u32) -> Result<()> {
        if bits == 0 {
            return Err(EvalError::domain("float precision must be positive"));
        }
        self.float_prec = bits;
        Ok(())
    }

    pub fn max_bits(&self) -> u64 {
        self.max_bits
    }

    pub fn set_max_bits(&mut self, bits: u64) {
        self.max_bits = bits;
    }

    /// Guard for any operation that may inflate the size of an integer.
    pub fn must_fit(&self, bits: u64) -> Result<()> {
        if self.max_bits != 0 && bits > self.max_bits {
            return Err(EvalError::overflow(format!("result too large ({} bits)", bits)));
        }
        Ok(())
    }

    pub fn max_digits(&self) -> usize {
        self.max_digits
    }

    pub fn set_max_digits(&mut self, digits: usize) {
        self.max_digits = digits;
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    pub fn set_max_stack(&mut self, depth: usize) -> Result<()> {
        if depth == 0 {
            return Err(EvalError::domain("stack limit must be positive"));
        }
        self.max_stack = depth;
        Ok(())
    }

    // ── Origin ───────────────────────────────────────────────────────────────

    pub fn origin(&self) -> i64 {
        self.origin
    }

    pub fn set_origin(&mut self, origin: i64) -> Result<()> {
        if origin != 0 && origin != 1 {
            return Err(EvalError::domain(format!("illegal origin {}", origin)));
        }
        self.origin = origin;
        Ok(())
    }

    // ── Display ──────────────────────────────────────────────────────────────

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn set_format(&mut self, format: impl Into<String>) {
        self.format = format.into();
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    // ── Random source ────────────────────────────────────────────────────────

    /// Uniform integer in `[0, n)` from the process-wide stream. The roll
    /// operator is marked unsafe for parallel execution, so callers are
    /// sequential; the lock is for the occasional cross-thread reader.
    pub fn random_u64(&self, n: u64) -> u64 {
        self.rng.lock().gen_range(0..n)
    }

    pub fn set_random_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
    }

    pub fn random_seed(&self) -> u64 {
        self.seed
    }

    // ── Output sinks ─────────────────────────────────────────────────────────

    pub fn output(&self) -> Sink {
        Arc::clone(&self.out)
    }

    pub fn error_output(&self) -> Sink {
        Arc::clone(&self.err_out)
    }

    pub fn set_output(&mut self, sink: Sink) {
        self.out = sink;
    }

    pub fn set_error_output(&mut self, sink: Sink) {
        self.err_out = sink;
    }
}
