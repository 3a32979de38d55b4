/// Work-splitting for elementwise operations.
///
/// `pfor` tiles `[0, n)` across the rayon pool with ~4× oversubscription so
/// uneven tiles even out. It degrades to a plain sequential call when the
/// operation is unsafe to parallelize, the work is too small, or only one
/// worker exists. A worker panic propagates to the caller after the join.
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::errors::{EvalError, Result};

/// Minimum element·size product worth splitting. Exposed so tests can force
/// the parallel path on small inputs.
pub static MIN_WORK: AtomicUsize = AtomicUsize::new(100);

pub fn min_work() -> usize {
    MIN_WORK.load(Ordering::Relaxed)
}

pub fn set_min_work(n: usize) {
    MIN_WORK.store(n, Ordering::Relaxed);
}

/// Run `f(lo, hi)` over contiguous ranges tiling `[0, n)`.
pub fn pfor<F>(safe: bool, size: usize, n: usize, f: F)
where
    F: Fn(usize, usize) + Send + Sync,
{
    let workers = rayon::current_num_threads();
    if !safe || n.saturating_mul(size) < 2 * min_work() || workers <= 1 {
        f(0, n);
        return;
    }
    let tiles = 4 * workers;
    let chunk = n.div_ceil(tiles).max(1);
    let ranges: Vec<(usize, usize)> = (0..n)
        .step_by(chunk)
        .map(|lo| (lo, (lo + chunk).min(n)))
        .collect();
    ranges.into_par_iter().for_each(|(lo, hi)| f(lo, hi));
}

/// As `pfor`, but the body is fallible; the first error wins and is returned
/// after every tile has finished.
pub fn try_pfor<F>(safe: bool, size: usize, n: usize, f: F) -> Result<()>
where
    F: Fn(usize, usize) -> Result<()> + Send + Sync,
{
    let failure: Mutex<Option<EvalError>> = Mutex::new(None);
    pfor(safe, size, n, |lo, hi| {
        if failure.lock().is_some() {
            return;
        }
        if let Err(e) = f(lo, hi) {
            let mut slot = failure.lock();
            if slot.is_none() {
                *slot = Some(e);
            }
        }
    });
    match failure.into_inner() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    #[test]
    fn covers_range_exactly_once() {
        let hits: Vec<AtomicUsize> = (0..1000).map(|_| AtomicUsize::new(0)).collect();
        pfor(true, 1000, 1000, |lo, hi| {
            for i in lo..hi {
                hits[i].fetch_add(1, Ordering::Relaxed);
            }
        });
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn unsafe_work_runs_in_one_tile() {
        let calls = AtomicUsize::new(0);
        pfor(false, 1_000_000, 1_000_000, |lo, hi| {
            calls.fetch_add(1, Ordering::Relaxed);
            assert_eq!((lo, hi), (0, 1_000_000));
        });
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn small_work_stays_sequential() {
        let calls = AtomicUsize::new(0);
        pfor(true, 1, 10, |_, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn sums_agree_with_sequential() {
        let total = AtomicI64::new(0);
        pfor(true, 100, 10_000, |lo, hi| {
            let part: i64 = (lo as i64..hi as i64).sum();
            total.fetch_add(part, Ordering::Relaxed);
        });
        assert_eq!(total.load(Ordering::Relaxed), (0..10_000i64).sum::<i64>());
    }

    #[test]
    fn first_error_propagates_after_join() {
        let r = try_pfor(true, 100, 10_000, |lo, _| {
            if lo == 0 {
                Err(EvalError::domain("boom"))
            } else {
                Ok(())
            }
        });
        assert_eq!(r.unwrap_err().to_string(), "boom");
    }
}
