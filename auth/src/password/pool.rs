use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use super::argon2::PasswordHasher;
use super::errors::PasswordError;

/// Bounded worker pool for password hashing.
///
/// Hashing and verification are deliberately expensive, so they run on the
/// blocking thread pool and never on the async executor. At most `workers`
/// jobs run at once; each call is bounded by `timeout`.
///
/// The concurrency permit travels with the blocking job rather than with the
/// caller: a caller that times out stops waiting, but the slot stays taken
/// until the job really finishes.
#[derive(Debug, Clone)]
pub struct HashingPool {
    hasher: Arc<PasswordHasher>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl HashingPool {
    /// Create a pool around a configured hasher.
    ///
    /// # Arguments
    /// * `hasher` - Configured password hasher
    /// * `workers` - Maximum concurrent hashing jobs (at least one)
    /// * `timeout` - Upper bound for a single call, including time spent
    ///   waiting for a free worker
    pub fn new(hasher: PasswordHasher, workers: usize, timeout: Duration) -> Self {
        Self {
            hasher: Arc::new(hasher),
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    /// Hash a password off the async executor.
    ///
    /// # Errors
    /// * `HashingFailed` - Argon2 failed
    /// * `Timeout` - No result within the configured timeout
    /// * `WorkerUnavailable` - The worker panicked or the pool was closed
    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let password = password.to_owned();
        self.run(move |hasher| hasher.hash(&password)).await
    }

    /// Verify a password off the async executor.
    ///
    /// # Errors
    /// * `CorruptDigest` - Stored digest cannot be parsed
    /// * `Timeout` - No result within the configured timeout
    /// * `WorkerUnavailable` - The worker panicked or the pool was closed
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        self.run(move |hasher| hasher.verify(&password, &hash)).await
    }

    /// Jobs currently allowed to start without waiting.
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    async fn run<T, F>(&self, job: F) -> Result<T, PasswordError>
    where
        T: Send + 'static,
        F: FnOnce(&PasswordHasher) -> Result<T, PasswordError> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let hasher = Arc::clone(&self.hasher);

        let work = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|e| PasswordError::WorkerUnavailable(e.to_string()))?;

            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job(&hasher)
            })
            .await
            .map_err(|e| PasswordError::WorkerUnavailable(e.to_string()))?
        };

        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| PasswordError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(workers: usize, timeout: Duration) -> HashingPool {
        let hasher = PasswordHasher::with_cost(1, PasswordHasher::MIN_MEMORY_KIB).unwrap();
        HashingPool::new(hasher, workers, timeout)
    }

    #[tokio::test]
    async fn test_hash_and_verify_on_pool() {
        let pool = pool(2, Duration::from_secs(10));

        let hash = pool.hash("pooled_password").await.unwrap();

        assert!(pool.verify("pooled_password", &hash).await.unwrap());
        assert!(!pool.verify("other_password", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_digest_propagates() {
        let pool = pool(1, Duration::from_secs(10));

        let result = pool.verify("password", "not-a-phc-string").await;

        assert!(matches!(result, Err(PasswordError::CorruptDigest(_))));
    }

    #[tokio::test]
    async fn test_permits_released_after_jobs() {
        let pool = pool(3, Duration::from_secs(10));

        let jobs: Vec<_> = (0..6)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.hash(&format!("password-{i}")).await })
            })
            .collect();

        for job in jobs {
            assert!(job.await.unwrap().is_ok());
        }

        assert_eq!(pool.available_workers(), 3);
    }

    #[tokio::test]
    async fn test_timeout_while_waiting_for_worker() {
        let pool = pool(1, Duration::from_millis(50));

        // Hold the only worker so the next call has to wait.
        let held = Arc::clone(&pool.permits).acquire_owned().await.unwrap();

        let result = pool.hash("password").await;
        assert!(matches!(result, Err(PasswordError::Timeout(_))));

        drop(held);
        assert!(pool.hash("password").await.is_ok());
    }

    #[test]
    fn test_zero_workers_rounds_up() {
        let pool = pool(0, Duration::from_secs(1));
        assert_eq!(pool.available_workers(), 1);
    }
}
