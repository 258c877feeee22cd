use crate::error;
use crate::util::Result;
use rayon::{ThreadPool, ThreadPoolBuilder};
use snafu::ResultExt;

/// Create a rayon thread pool with the given number of threads.
/// Use `num_threads = 0` for auto number of threads.
pub fn create_rayon_thread_pool(num_threads: usize, name: &str) -> Result<ThreadPool> {
    let name = name.to_string();

    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(move |index| format!("{name}-{index}"))
        .build()
        .context(error::WorkerThreadPool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_and_names() {
        let pool = create_rayon_thread_pool(3, "test-worker").unwrap();

        assert_eq!(pool.current_num_threads(), 3);

        let name = pool.install(|| std::thread::current().name().map(str::to_string));
        assert!(name.unwrap().starts_with("test-worker-"));
    }

    #[test]
    fn automatic_pool_size() {
        let pool = create_rayon_thread_pool(0, "auto").unwrap();

        assert!(pool.current_num_threads() >= 1);
    }
}
