//! Retry and timeout wrappers for async operations.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use fork_types::ForkError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry schedule: `delay`, then `delay * backoff_multiplier`, and so on,
/// capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryOptions {
	pub max_retries: u32,
	pub delay: Duration,
	pub backoff_multiplier: f64,
	pub max_delay: Duration,
}

impl Default for RetryOptions {
	fn default() -> Self {
		Self {
			max_retries: 3,
			delay: Duration::from_millis(1_000),
			backoff_multiplier: 2.0,
			max_delay: Duration::from_millis(30_000),
		}
	}
}

impl RetryOptions {
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;
		self
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	/// Deterministic backoff; attempts are bounded by `max_retries`, not time.
	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.delay)
			.with_multiplier(self.backoff_multiplier)
			.with_max_interval(self.max_delay)
			.with_randomization_factor(0.0)
			.with_max_elapsed_time(None)
			.build()
	}
}

/// Runs `operation` until it succeeds, at most `max_retries + 1` times.
///
/// Returns the last error once every attempt has failed.
pub async fn retry_with_backoff<T, E, F, Fut>(options: &RetryOptions, mut operation: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: Display,
{
	let mut backoff = options.backoff();
	let mut attempts: u32 = 0;

	loop {
		match operation().await {
			Ok(result) => return Ok(result),
			Err(e) => {
				attempts += 1;

				if attempts > options.max_retries {
					warn!(
						"Operation failed after {} attempts, giving up: {}",
						attempts, e
					);
					return Err(e);
				}

				let delay = backoff.next_backoff().unwrap_or(options.max_delay);
				warn!(
					"Operation failed, attempt {}/{}, retrying in {:?}: {}",
					attempts,
					options.max_retries + 1,
					delay,
					e
				);
				tokio::time::sleep(delay).await;
			}
		}
	}
}

/// Resolves with the result of `future`, or a timeout error if it does not
/// finish within `timeout`.
pub async fn with_timeout<T, F>(future: F, timeout: Duration, message: Option<&str>) -> Result<T, ForkError>
where
	F: Future<Output = Result<T, ForkError>>,
{
	match tokio::time::timeout(timeout, future).await {
		Ok(result) => result,
		Err(_) => Err(ForkError::timeout(timeout.as_millis() as u64, message)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;

	fn quick(max_retries: u32) -> RetryOptions {
		RetryOptions::default()
			.with_max_retries(max_retries)
			.with_delay(Duration::from_millis(1))
	}

	#[test]
	fn test_backoff_schedule() {
		let options = RetryOptions {
			max_retries: 5,
			delay: Duration::from_millis(1_000),
			backoff_multiplier: 2.0,
			max_delay: Duration::from_millis(5_000),
		};
		let mut backoff = options.backoff();

		let delays: Vec<u128> = (0..5)
			.map(|_| backoff.next_backoff().unwrap().as_millis())
			.collect();
		assert_eq!(delays, vec![1_000, 2_000, 4_000, 5_000, 5_000]);
	}

	#[tokio::test]
	async fn test_gives_up_after_max_retries() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = attempts.clone();

		let result: Result<(), String> = retry_with_backoff(&quick(3), || {
			let counter = counter.clone();
			async move {
				let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
				Err(format!("failure {}", n))
			}
		})
		.await;

		assert_eq!(attempts.load(Ordering::SeqCst), 4);
		assert_eq!(result.unwrap_err(), "failure 4");
	}

	#[tokio::test]
	async fn test_stops_on_success() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = attempts.clone();

		let result = retry_with_backoff(&quick(5), || {
			let counter = counter.clone();
			async move {
				let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
				if n < 3 {
					Err(ForkError::network("amoy", "connection refused"))
				} else {
					Ok(n)
				}
			}
		})
		.await;

		assert_eq!(result.unwrap(), 3);
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_zero_retries_runs_once() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = attempts.clone();

		let result: Result<(), &str> = retry_with_backoff(&quick(0), || {
			counter.fetch_add(1, Ordering::SeqCst);
			async { Err("nope") }
		})
		.await;

		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_with_timeout_passes_result_through() {
		let ok = with_timeout(async { Ok::<_, ForkError>(7) }, Duration::from_secs(1), None).await;
		assert_eq!(ok.unwrap(), 7);

		let err = with_timeout::<(), _>(
			async { Err(ForkError::Deployment("reverted".to_string())) },
			Duration::from_secs(1),
			None,
		)
		.await
		.unwrap_err();
		assert!(matches!(err, ForkError::Deployment(_)));
	}

	#[tokio::test]
	async fn test_with_timeout_expires() {
		let err = with_timeout::<(), _>(
			async {
				tokio::time::sleep(Duration::from_secs(5)).await;
				Ok::<(), ForkError>(())
			},
			Duration::from_millis(20),
			None,
		)
		.await
		.unwrap_err();

		assert!(err.is_timeout());
		assert_eq!(err.to_string(), "Operation timed out after 20ms");

		let err = with_timeout::<(), _>(
			std::future::pending::<Result<(), ForkError>>(),
			Duration::from_millis(10),
			Some("Deployment to amoy timed out"),
		)
		.await
		.unwrap_err();
		assert_eq!(err.to_string(), "Deployment to amoy timed out");
	}
}
