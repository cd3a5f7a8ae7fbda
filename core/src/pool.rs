//! Worker Pool (§4.G): bounded parallelism across independent size buckets.
//!
//! Each bucket is handed to exactly one worker and never split; ownership
//! of a bucket's `Vec<Medium>` is moved into the closure that processes it,
//! so the "a bucket is exclusively mutated by one worker" invariant is
//! enforced by the borrow checker rather than by convention. Cancellation is
//! cooperative: callers check [`CancellationToken::is_cancelled`] between
//! pairwise comparisons and the pool itself skips any bucket not yet started
//! once cancellation is observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::medium::Medium;

/// A shared, cheaply-cloneable flag used to request cooperative cancellation
/// of an in-progress scan.
#[derive(Clone)]
pub struct CancellationToken(Arc<AtomicBool>);

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs `work` over each `(size, media)` bucket with parallelism capped at
/// `min(bucket_count, available_parallelism)`, per §4.G. Results are
/// returned in the same order as `buckets` regardless of completion order.
pub fn run_size_buckets<F, T>(
    buckets: Vec<(u64, Vec<Medium>)>,
    cancel: &CancellationToken,
    work: F,
) -> Vec<T>
where
    F: Fn(u64, Vec<Medium>, &CancellationToken) -> T + Sync,
    T: Send + Default,
{
    run_size_buckets_with_threads(buckets, None, cancel, work)
}

/// Same as [`run_size_buckets`], but `threads` overrides the hardware
/// parallelism figure when set (the CLI's `--threads`/config knob); the
/// bound is still `min(bucket_count, threads)` since a bucket is never
/// split across workers.
pub fn run_size_buckets_with_threads<F, T>(
    buckets: Vec<(u64, Vec<Medium>)>,
    threads: Option<usize>,
    cancel: &CancellationToken,
    work: F,
) -> Vec<T>
where
    F: Fn(u64, Vec<Medium>, &CancellationToken) -> T + Sync,
    T: Send + Default,
{
    if buckets.is_empty() {
        return Vec::new();
    }

    let hw_parallelism = threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let workers = buckets.len().min(hw_parallelism.max(1)).max(1);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .expect("failed to build worker pool");

    pool.install(|| {
        buckets
            .into_par_iter()
            .map(|(size, media)| {
                if cancel.is_cancelled() {
                    return T::default();
                }
                work(size, media, cancel)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_never_exceeds_bucket_count() {
        let buckets: Vec<(u64, Vec<Medium>)> = vec![(1, Vec::new())];
        let cancel = CancellationToken::new();
        let results: Vec<usize> = run_size_buckets(buckets, &cancel, |_, media, _| media.len());
        assert_eq!(results, vec![0]);
    }

    #[test]
    fn cancellation_short_circuits_remaining_buckets() {
        let buckets: Vec<(u64, Vec<Medium>)> = vec![(1, Vec::new()), (2, Vec::new())];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let results: Vec<usize> = run_size_buckets(buckets, &cancel, |_, _, _| 99);
        assert_eq!(results, vec![0, 0]);
    }
}
