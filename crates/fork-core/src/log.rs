//! Per-fork log files.

use chrono::{Local, NaiveDateTime};
use fork_types::ForkError;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
	Info,
	Error,
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LogLevel::Info => write!(f, "info"),
			LogLevel::Error => write!(f, "error"),
		}
	}
}

/// Appends timestamped lines to `{log_dir}/{name}-node.log` and mirrors them
/// to tracing.
#[derive(Debug)]
pub struct ForkLog {
	name: String,
	path: PathBuf,
	file: Mutex<File>,
}

impl ForkLog {
	pub async fn create(log_dir: &Path, name: &str) -> Result<Self, ForkError> {
		tokio::fs::create_dir_all(log_dir).await?;

		let path = log_dir.join(format!("{}-node.log", name));
		let file = OpenOptions::new()
			.create(true)
			.append(true)
			.open(&path)
			.await?;

		Ok(Self {
			name: name.to_string(),
			path,
			file: Mutex::new(file),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub async fn info(&self, message: &str) {
		info!(chain = %self.name, "{}", message);
		self.append(LogLevel::Info, message).await;
	}

	pub async fn error(&self, message: &str) {
		error!(chain = %self.name, "{}", message);
		self.append(LogLevel::Error, message).await;
	}

	async fn append(&self, level: LogLevel, message: &str) {
		let line = format_line(Local::now().naive_local(), level, message);
		let mut file = self.file.lock().await;

		let written = match file.write_all(line.as_bytes()).await {
			Ok(()) => file.flush().await,
			Err(e) => Err(e),
		};
		if let Err(e) = written {
			warn!("Failed to write to {}: {}", self.path.display(), e);
		}
	}
}

fn format_line(timestamp: NaiveDateTime, level: LogLevel, message: &str) -> String {
	format!(
		"[{}] [{}] {}\n",
		timestamp.format("%Y-%m-%d %H:%M:%S"),
		level,
		message.trim_end()
	)
}
