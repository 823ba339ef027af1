//! Parallelism configuration and thread pool setup.

use rayon::prelude::*;
use rayon::ThreadPoolBuildError;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// Passed down to per-sample loops. When `Parallel`, they may use `rayon`
/// parallel iterators; when `Sequential`, they iterate in order on the calling
/// thread. The thread pool itself is set up by [`run_with_threads`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if rayon pool has multiple threads, sequential otherwise)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }

    /// Order-preserving map with per-thread initialization.
    ///
    /// The `init` closure is called once per rayon work split (in parallel mode)
    /// or once total (in sequential mode). The resulting value is passed to `f`
    /// and reused across items processed by the same split.
    #[inline]
    pub fn maybe_par_map_init<T, B, I, INIT, S, F>(self, iter: I, init: INIT, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        INIT: Fn() -> S + Sync + Send,
        F: Fn(&mut S, T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map_init(init, f).collect()
        } else {
            let mut state = init();
            iter.into_iter().map(|item| f(&mut state, item)).collect()
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (use all available cores)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
///
/// # Errors
///
/// Returns the rayon error if a dedicated pool cannot be created.
///
/// # Example
///
/// ```
/// use treeshap::{run_with_threads, Parallelism};
///
/// let squares = run_with_threads(2, |par| par.maybe_par_map(0..4usize, |i| i * i)).unwrap();
/// assert_eq!(squares, vec![0, 1, 4, 9]);
///
/// let mode = run_with_threads(1, |par| par).unwrap();
/// assert_eq!(mode, Parallelism::Sequential);
/// ```
#[inline]
pub fn run_with_threads<T: Send>(
    n_threads: usize,
    f: impl FnOnce(Parallelism) -> T + Send,
) -> Result<T, ThreadPoolBuildError> {
    let parallelism = Parallelism::from_threads(n_threads);

    match parallelism {
        Parallelism::Sequential => Ok(f(Parallelism::Sequential)),
        Parallelism::Parallel => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()?;
            Ok(pool.install(|| f(Parallelism::Parallel)))
        }
    }
}
