//! Teardown tasks run on exit.

use fork_types::ForkError;
use futures::future::{join_all, BoxFuture};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A teardown action, run at most once.
pub type CleanupTask = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ForkError>> + Send>;

/// Collects cleanup tasks and runs them together.
#[derive(Default)]
pub struct CleanupRegistry {
	tasks: Mutex<Vec<(String, CleanupTask)>>,
}

impl CleanupRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn register<F>(&self, name: impl Into<String>, task: F)
	where
		F: FnOnce() -> BoxFuture<'static, Result<(), ForkError>> + Send + 'static,
	{
		self.tasks.lock().await.push((name.into(), Box::new(task)));
	}

	pub async fn len(&self) -> usize {
		self.tasks.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.tasks.lock().await.is_empty()
	}

	/// Runs every registered task concurrently and empties the registry.
	///
	/// A failing task is logged and does not stop the others.
	pub async fn execute_all(&self) {
		let tasks = std::mem::take(&mut *self.tasks.lock().await);
		if tasks.is_empty() {
			return;
		}

		info!("Running {} cleanup tasks", tasks.len());

		let results = join_all(tasks.into_iter().map(|(name, task)| async move {
			(name, task().await)
		}))
		.await;

		for (name, result) in results {
			if let Err(e) = result {
				error!("Cleanup task {} failed: {}", name, e);
			}
		}
	}

	/// Runs every task and exits with status 0 on SIGINT, SIGTERM or SIGHUP.
	pub fn install_signal_handlers(self: &Arc<Self>) -> Result<JoinHandle<()>, ForkError> {
		let mut interrupt = signal(SignalKind::interrupt())?;
		let mut terminate = signal(SignalKind::terminate())?;
		let mut hangup = signal(SignalKind::hangup())?;
		let registry = Arc::clone(self);

		Ok(tokio::spawn(async move {
			let received = tokio::select! {
				_ = interrupt.recv() => "SIGINT",
				_ = terminate.recv() => "SIGTERM",
				_ = hangup.recv() => "SIGHUP",
			};

			warn!("Received {}, cleaning up...", received);
			registry.execute_all().await;
			std::process::exit(0);
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::FutureExt;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[tokio::test]
	async fn test_runs_all_tasks_despite_failures() {
		let registry = CleanupRegistry::new();
		let ran = Arc::new(AtomicU32::new(0));

		for i in 0..3 {
			let ran = ran.clone();
			registry
				.register(format!("task-{}", i), move || {
					async move {
						ran.fetch_add(1, Ordering::SeqCst);
						if i == 1 {
							Err(ForkError::Process("already gone".to_string()))
						} else {
							Ok(())
						}
					}
					.boxed()
				})
				.await;
		}

		assert_eq!(registry.len().await, 3);
		registry.execute_all().await;

		assert_eq!(ran.load(Ordering::SeqCst), 3);
		assert!(registry.is_empty().await);
	}

	#[tokio::test]
	async fn test_execute_all_is_idempotent() {
		let registry = CleanupRegistry::new();
		let ran = Arc::new(AtomicU32::new(0));

		let counter = ran.clone();
		registry
			.register("once", move || {
				async move {
					counter.fetch_add(1, Ordering::SeqCst);
					Ok(())
				}
				.boxed()
			})
			.await;

		registry.execute_all().await;
		registry.execute_all().await;
		assert_eq!(ran.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_install_signal_handlers() {
		let registry = Arc::new(CleanupRegistry::new());
		let handle = registry.install_signal_handlers().unwrap();
		assert!(!handle.is_finished());
		handle.abort();
	}
}
