//! A spawned fork node and its output forwarding.

use crate::command::NodeCommand;
use crate::log::ForkLog;
use fork_types::ForkError;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tracing::{debug, info, warn};

/// A running fork node.
///
/// The node runs in its own process group so stopping it also reaches the
/// processes it starts (`npx` runs hardhat as a child). Dropping a
/// `ForkProcess` kills the whole group.
#[derive(Debug)]
pub struct ForkProcess {
	name: String,
	pid: u32,
	child: Child,
}

impl ForkProcess {
	/// Spawns `command`, forwarding stdout to the log at info level and
	/// stderr at error level.
	pub fn spawn(name: &str, command: &NodeCommand, log: Arc<ForkLog>) -> Result<Self, ForkError> {
		let mut cmd = command.to_command();
		cmd.process_group(0);

		debug!("Executing fork command: {}", command.program);

		let mut child = cmd
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| {
				ForkError::Process(format!(
					"Failed to start {} fork with {}: {}",
					name, command.program, e
				))
			})?;

		let pid = child
			.id()
			.ok_or_else(|| ForkError::Process(format!("{} fork exited immediately", name)))?;

		info!("Fork {} started with PID {}", name, pid);

		if let Some(stdout) = child.stdout.take() {
			let log = log.clone();
			tokio::spawn(async move {
				let mut lines = BufReader::new(stdout).lines();
				while let Ok(Some(line)) = lines.next_line().await {
					log.info(&line).await;
				}
			});
		}

		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(async move {
				let mut lines = BufReader::new(stderr).lines();
				while let Ok(Some(line)) = lines.next_line().await {
					log.error(&line).await;
				}
			});
		}

		Ok(Self {
			name: name.to_string(),
			pid,
			child,
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn pid(&self) -> u32 {
		self.pid
	}

	pub fn is_running(&mut self) -> bool {
		matches!(self.child.try_wait(), Ok(None))
	}

	/// Resolves once the node exits on its own.
	pub async fn exited(&mut self) -> Result<ExitStatus, ForkError> {
		Ok(self.child.wait().await?)
	}

	/// Sends SIGINT to the process group, waits up to `grace`, then kills.
	///
	/// A node that has already exited is not an error. Anything left in its
	/// group once the leader is gone is killed as well.
	pub async fn stop(&mut self, grace: Duration) -> Result<(), ForkError> {
		match self.child.try_wait() {
			Ok(Some(status)) => {
				info!("Fork {} (PID {}) already exited with {}", self.name, self.pid, status);
				return self.signal_group(Signal::SIGKILL);
			}
			Ok(None) => info!("Stopping fork {} (PID {}) with SIGINT", self.name, self.pid),
			Err(e) => {
				return Err(ForkError::Process(format!(
					"Failed to check status of {} fork: {}",
					self.name, e
				)))
			}
		}

		let deadline = Instant::now() + grace;
		self.signal_group(Signal::SIGINT)?;

		match tokio::time::timeout(grace, self.child.wait()).await {
			Ok(Ok(status)) => info!("Fork {} exited with {}", self.name, status),
			Ok(Err(e)) => debug!("Error waiting for {} fork to exit: {}", self.name, e),
			Err(_) => {
				warn!(
					"Fork {} did not exit within {:?}, killing it",
					self.name, grace
				);
				self.signal_group(Signal::SIGKILL)?;
				return self.child.kill().await.or_else(|e| match self.child.try_wait() {
					Ok(Some(_)) => Ok(()),
					_ => Err(ForkError::Process(format!(
						"Failed to kill {} fork: {}",
						self.name, e
					))),
				});
			}
		}

		while group_exists(self.pid) && Instant::now() < deadline {
			tokio::time::sleep(Duration::from_millis(50)).await;
		}
		if group_exists(self.pid) {
			debug!("Killing leftover processes of {} fork", self.name);
			self.signal_group(Signal::SIGKILL)?;
		}

		Ok(())
	}

	fn signal_group(&self, signal: Signal) -> Result<(), ForkError> {
		signal_group(self.pid, signal).map_err(|e| {
			ForkError::Process(format!(
				"Failed to send {:?} to {} fork: {}",
				signal, self.name, e
			))
		})
	}
}

impl Drop for ForkProcess {
	fn drop(&mut self) {
		// kill_on_drop only reaches the group leader
		if let Err(e) = self.signal_group(Signal::SIGKILL) {
			warn!("{}", e);
		}
	}
}

/// Sends `signal` to the process group led by `pid`. A group that no longer
/// exists is not an error.
pub(crate) fn signal_group(pid: u32, signal: Signal) -> nix::Result<()> {
	// Negative pid addresses the whole process group.
	match kill(Pid::from_raw(-(pid as i32)), signal) {
		Err(nix::errno::Errno::ESRCH) => {
			debug!("Process group {} has already exited", pid);
			Ok(())
		}
		result => result,
	}
}

fn group_exists(pid: u32) -> bool {
	kill(Pid::from_raw(-(pid as i32)), None::<Signal>).is_ok()
}

/// Waits up to five seconds for `pid` to disappear. Zombies count as gone.
#[cfg(test)]
pub(crate) async fn wait_until_gone(pid: i32) -> bool {
	for _ in 0..100 {
		let alive = kill(Pid::from_raw(pid), None::<Signal>).is_ok()
			&& std::fs::read_to_string(format!("/proc/{}/stat", pid))
				.map(|stat| !stat.rsplit(')').next().unwrap_or_default().trim_start().starts_with('Z'))
				.unwrap_or(false);
		if !alive {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	false
}

/// Reads the pid a test node wrote to `path`, waiting for it to appear.
#[cfg(test)]
pub(crate) async fn read_pid_file(path: &std::path::Path) -> i32 {
	for _ in 0..100 {
		if let Ok(contents) = tokio::fs::read_to_string(path).await {
			if let Ok(pid) = contents.trim().parse() {
				return pid;
			}
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	panic!("{} was never written", path.display());
}
