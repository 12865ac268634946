use tracing::warn;

/// Run `f` on a rayon pool bounded to `jobs` threads, or on the global pool
/// when no bound is configured.
pub fn install<R, F>(jobs: Option<usize>, f: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    let Some(jobs) = jobs else {
        return f();
    };
    match rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
    {
        Ok(pool) => pool.install(f),
        Err(e) => {
            warn!(error = %e, jobs, "failed to build worker pool, using the global pool");
            f()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_bounded_pool_runs_work() {
        let threads = install(Some(2), rayon::current_num_threads);
        assert_eq!(threads, 2);

        let sum: u64 = install(Some(3), || (1..=100u64).into_par_iter().sum());
        assert_eq!(sum, 5050);
    }

    #[test]
    fn test_zero_jobs_is_clamped() {
        assert_eq!(install(Some(0), rayon::current_num_threads), 1);
    }

    #[test]
    fn test_unbounded_uses_caller_pool() {
        assert_eq!(install(None, || 7), 7);
    }
}
