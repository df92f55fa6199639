//! Multi-fork lifecycle management.

use crate::command::NodeCommand;
use crate::log::ForkLog;
use crate::process::{signal_group, ForkProcess};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::transports::http::reqwest::Url;
use fork_config::Config;
use fork_network::{wait_for_network, CleanupRegistry, ReadinessOptions};
use fork_types::{ChainId, ForkError, ForkSpec};
use futures::future::join_all;
use futures::FutureExt;
use nix::sys::signal::Signal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// How long a fork gets to exit after SIGINT before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// A ready fork: its local endpoint and a provider connected to it.
#[derive(Clone)]
pub struct ForkHandle {
	pub name: String,
	/// Local JSON-RPC URL of the fork.
	pub rpc_url: String,
	pub port: u16,
	/// Chain id the fork reported when it became ready.
	pub chain_id: ChainId,
	/// Chain id the fork was configured with.
	pub expected_chain_id: ChainId,
	/// Block the fork is pinned to, `None` for latest.
	pub block_number: Option<u64>,
	pub provider: DynProvider,
}

impl fmt::Debug for ForkHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ForkHandle")
			.field("name", &self.name)
			.field("rpc_url", &self.rpc_url)
			.field("chain_id", &self.chain_id)
			.field("block_number", &self.block_number)
			.finish_non_exhaustive()
	}
}

/// Spawns, tracks and tears down one fork per chain name.
pub struct ChainManager {
	config: Config,
	chains: RwLock<HashMap<String, ForkHandle>>,
	processes: Mutex<HashMap<String, ForkProcess>>,
	/// Process groups of forks that are still starting.
	starting: Mutex<HashMap<String, u32>>,
	/// Serializes setups so two callers never spawn the same chain.
	setup_lock: Mutex<()>,
}

impl ChainManager {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			chains: RwLock::new(HashMap::new()),
			processes: Mutex::new(HashMap::new()),
			starting: Mutex::new(HashMap::new()),
			setup_lock: Mutex::new(()),
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Starts forks for `names` and returns a handle for each.
	///
	/// Every name is resolved before anything is spawned, so configuration
	/// errors leave no processes behind. Chains that are already running
	/// are reused.
	pub async fn setup_chains<S: AsRef<str>>(
		&self,
		names: &[S],
	) -> Result<BTreeMap<String, ForkHandle>, ForkError> {
		let specs = names
			.iter()
			.map(|name| self.config.resolve_fork(name.as_ref()))
			.collect::<Result<Vec<_>, _>>()?;

		self.setup_specs(specs).await
	}

	/// Starts forks from already resolved specs.
	///
	/// New forks start concurrently. If any of them fails, every process
	/// started by this call is stopped and the first error is returned.
	pub async fn setup_specs(
		&self,
		specs: Vec<ForkSpec>,
	) -> Result<BTreeMap<String, ForkHandle>, ForkError> {
		let _guard = self.setup_lock.lock().await;

		let mut seen = HashSet::new();
		let specs: Vec<ForkSpec> = specs
			.into_iter()
			.filter(|spec| seen.insert(spec.name.clone()))
			.collect();

		let pending = {
			let chains = self.chains.read().await;
			check_ports(&specs, &chains)?;
			specs
				.iter()
				.filter(|spec| {
					let running = chains.contains_key(&spec.name);
					if running {
						info!("Chain {} is already running, reusing it", spec.name);
					}
					!running
				})
				.cloned()
				.collect::<Vec<_>>()
		};

		if !pending.is_empty() {
			let results = join_all(pending.iter().map(|spec| self.start_fork(spec))).await;

			let mut started = Vec::new();
			let mut first_error = None;
			for result in results {
				match result {
					Ok(fork) => started.push(fork),
					Err(e) => {
						error!("Failed to start fork: {}", e);
						first_error.get_or_insert(e);
					}
				}
			}

			let mut starting = self.starting.lock().await;
			// a cleanup that ran meanwhile has already killed these
			let cancelled = started
				.iter()
				.any(|(handle, _)| !starting.contains_key(&handle.name));
			for (handle, _) in &started {
				starting.remove(&handle.name);
			}

			let first_error = first_error.or_else(|| {
				cancelled.then(|| ForkError::Process("Fork setup was cancelled by cleanup".to_string()))
			});
			if let Some(e) = first_error {
				drop(starting);
				join_all(started.into_iter().map(|(_, mut process)| async move {
					if let Err(stop_err) = process.stop(STOP_GRACE).await {
						warn!("Failed to stop {} fork: {}", process.name(), stop_err);
					}
				}))
				.await;
				return Err(e);
			}

			let mut chains = self.chains.write().await;
			let mut processes = self.processes.lock().await;
			for (handle, process) in started {
				processes.insert(handle.name.clone(), process);
				chains.insert(handle.name.clone(), handle);
			}
		}

		let chains = self.chains.read().await;
		specs
			.iter()
			.map(|spec| {
				chains
					.get(&spec.name)
					.cloned()
					.map(|handle| (spec.name.clone(), handle))
					.ok_or_else(|| ForkError::Process(format!("Fork {} is not running", spec.name)))
			})
			.collect()
	}

	async fn start_fork(&self, spec: &ForkSpec) -> Result<(ForkHandle, ForkProcess), ForkError> {
		let node = &self.config.node;
		let log = Arc::new(ForkLog::create(&node.log_dir, &spec.name).await?);
		log.info(&format!("Starting fork: {}", spec.name)).await;

		let command = NodeCommand::for_fork(node, spec);
		let mut process = ForkProcess::spawn(&spec.name, &command, log.clone())?;
		self.starting
			.lock()
			.await
			.insert(spec.name.clone(), process.pid());

		match self.await_ready(spec, &mut process, &log).await {
			Ok(handle) => Ok((handle, process)),
			Err(e) => {
				self.starting.lock().await.remove(&spec.name);
				if let Err(stop_err) = process.stop(STOP_GRACE).await {
					warn!("Failed to stop {} fork: {}", spec.name, stop_err);
				}
				Err(e)
			}
		}
	}

	async fn await_ready(
		&self,
		spec: &ForkSpec,
		process: &mut ForkProcess,
		log: &ForkLog,
	) -> Result<ForkHandle, ForkError> {
		let node = &self.config.node;
		tokio::time::sleep(Duration::from_millis(node.startup_delay_ms)).await;

		let rpc_url = spec.local_url(&node.host);
		let options = ReadinessOptions {
			timeout: Duration::from_millis(node.ready_timeout_ms),
			interval: Duration::from_millis(node.poll_interval_ms),
		};

		let ready = tokio::select! {
			ready = wait_for_network(&rpc_url, &options) => ready,
			status = process.exited() => Err(match status {
				Ok(status) => ForkError::Process(format!(
					"{} fork exited before becoming ready ({})",
					spec.name, status
				)),
				Err(e) => e,
			}),
		};

		let chain_id = match ready {
			Ok(chain_id) => chain_id,
			Err(e) => {
				log.error(&format!("Network validation failed for {}: {}", rpc_url, e))
					.await;
				return Err(e);
			}
		};
		log.info(&format!("Network at {} is ready.", rpc_url)).await;

		if chain_id != spec.chain_id {
			warn!(
				"Fork {} reports chain id {}, expected {}",
				spec.name, chain_id, spec.chain_id
			);
		}

		let url = rpc_url.parse::<Url>().map_err(|e| {
			ForkError::configuration_field(format!("Invalid fork URL {}: {}", rpc_url, e), "host")
		})?;
		let provider = ProviderBuilder::new().connect_http(url).erased();

		Ok(ForkHandle {
			name: spec.name.clone(),
			rpc_url,
			port: spec.port,
			chain_id,
			expected_chain_id: spec.chain_id,
			block_number: spec.block_number,
			provider,
		})
	}

	/// Returns the cached handle for `name`, starting the fork if needed.
	pub async fn get_chain(&self, name: &str) -> Result<ForkHandle, ForkError> {
		if let Some(handle) = self.chains.read().await.get(name) {
			return Ok(handle.clone());
		}

		self.setup_chains(&[name])
			.await?
			.remove(name)
			.ok_or_else(|| ForkError::Process(format!("Fork {} is not running", name)))
	}

	pub async fn providers(&self) -> BTreeMap<String, DynProvider> {
		self.chains
			.read()
			.await
			.iter()
			.map(|(name, handle)| (name.clone(), handle.provider.clone()))
			.collect()
	}

	pub async fn running_chains(&self) -> Vec<String> {
		let mut names: Vec<String> = self.chains.read().await.keys().cloned().collect();
		names.sort();
		names
	}

	pub async fn is_running(&self, name: &str) -> bool {
		self.processes
			.lock()
			.await
			.get_mut(name)
			.is_some_and(|process| process.is_running())
	}

	/// Stops every tracked fork and forgets all handles. Safe to call more
	/// than once.
	///
	/// Forks that are still starting are killed outright; the setup waiting
	/// on them fails.
	pub async fn cleanup(&self) {
		let (starting, processes) = {
			let mut starting = self.starting.lock().await;
			let processes = std::mem::take(&mut *self.processes.lock().await);
			(std::mem::take(&mut *starting), processes)
		};
		self.chains.write().await.clear();

		for (name, pid) in starting {
			info!("Killing fork {} (PID {}) before it became ready", name, pid);
			if let Err(e) = signal_group(pid, Signal::SIGKILL) {
				error!("Failed to kill {} fork: {}", name, e);
			}
		}

		if processes.is_empty() {
			return;
		}

		info!("Stopping {} forks...", processes.len());
		join_all(processes.into_values().map(|mut process| async move {
			match process.stop(STOP_GRACE).await {
				Ok(()) => info!("Fork {} stopped.", process.name()),
				Err(e) => error!("Failed to stop {} fork: {}", process.name(), e),
			}
		}))
		.await;
	}

	/// Registers [`ChainManager::cleanup`] with `registry`.
	pub async fn register_cleanup(self: &Arc<Self>, registry: &CleanupRegistry) {
		let manager = Arc::clone(self);
		registry
			.register("chain-manager", move || {
				async move {
					manager.cleanup().await;
					Ok(())
				}
				.boxed()
			})
			.await;
	}
}

/// Rejects specs that would bind a port another fork uses.
fn check_ports(specs: &[ForkSpec], running: &HashMap<String, ForkHandle>) -> Result<(), ForkError> {
	let mut ports: HashMap<u16, &str> = running
		.values()
		.map(|handle| (handle.port, handle.name.as_str()))
		.collect();

	for spec in specs {
		match ports.get(&spec.port) {
			Some(owner) if *owner != spec.name => {
				return Err(ForkError::configuration_field(
					format!(
						"Chains {} and {} both use port {}",
						owner, spec.name, spec.port
					),
					"fork_port",
				));
			}
			_ => {
				ports.insert(spec.port, &spec.name);
			}
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::process::{read_pid_file, wait_until_gone};
	use fork_config::{ChainConfig, NodeBackend};
	use serde_json::json;
	use std::os::unix::fs::PermissionsExt;
	use wiremock::matchers::method;
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn chain(rpc_url: &str, fork_port: Option<u16>) -> ChainConfig {
		ChainConfig {
			rpc_url: Some(rpc_url.to_string()),
			fork_port,
			..Default::default()
		}
	}

	fn config(dir: &tempfile::TempDir, program: &str) -> Config {
		let mut config = Config::default();
		config.node.backend = NodeBackend::Anvil;
		config.node.program = Some(program.to_string());
		config.node.startup_delay_ms = 0;
		config.node.ready_timeout_ms = 5_000;
		config.node.poll_interval_ms = 20;
		config.node.log_dir = dir.path().join("log");
		config
	}

	/// Writes an executable that ignores its arguments.
	fn fake_node(dir: &tempfile::TempDir, body: &str) -> String {
		let path = dir.path().join("fake-node");
		std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
		std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
		path.display().to_string()
	}

	#[tokio::test]
	async fn test_unknown_chain_spawns_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let manager = ChainManager::new(config(&dir, "false"));

		let err = manager.setup_chains(&["gnosis"]).await.unwrap_err();
		assert!(err.is_configuration());
		assert!(manager.running_chains().await.is_empty());
		assert!(!dir.path().join("log").exists());
	}

	#[tokio::test]
	async fn test_duplicate_ports_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = config(&dir, "false");
		config
			.chains
			.insert("amoy".to_string(), chain("https://amoy.example.com", None));
		config
			.chains
			.insert("devnet".to_string(), chain("http://10.0.0.5:8545", Some(8548)));
		let manager = ChainManager::new(config);

		let err = manager.setup_chains(&["amoy", "devnet"]).await.unwrap_err();
		assert!(err.is_configuration());
		assert!(err.to_string().contains("port 8548"));
	}

	#[tokio::test]
	async fn test_node_exiting_early_fails_setup() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = config(&dir, "false");
		config
			.chains
			.insert("amoy".to_string(), chain("https://amoy.example.com", None));
		let manager = ChainManager::new(config);

		let err = manager.setup_chains(&["amoy"]).await.unwrap_err();
		assert!(matches!(err, ForkError::Process(msg) if msg.contains("exited before becoming ready")));
		assert!(!manager.is_running("amoy").await);
		assert!(manager.providers().await.is_empty());
	}

	#[tokio::test]
	async fn test_setup_get_and_cleanup() {
		let rpc = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "0x13882"})),
			)
			.mount(&rpc)
			.await;

		let dir = tempfile::tempdir().unwrap();
		let program = fake_node(&dir, "echo fork started\nexec sleep 30");
		let mut config = config(&dir, &program);
		config.chains.insert(
			"amoy".to_string(),
			chain("https://amoy.example.com", Some(rpc.address().port())),
		);
		let manager = Arc::new(ChainManager::new(config));

		let handles = manager.setup_chains(&["amoy", "amoy"]).await.unwrap();
		assert_eq!(handles.len(), 1);
		assert_eq!(handles["amoy"].chain_id, ChainId::AMOY);
		assert_eq!(
			handles["amoy"].rpc_url,
			format!("http://127.0.0.1:{}", rpc.address().port())
		);
		assert!(manager.is_running("amoy").await);

		// cached handle, no second process
		let handle = manager.get_chain("amoy").await.unwrap();
		assert_eq!(handle.port, rpc.address().port());
		assert_eq!(manager.running_chains().await, vec!["amoy"]);
		assert_eq!(manager.providers().await.len(), 1);

		let registry = CleanupRegistry::new();
		manager.register_cleanup(&registry).await;
		registry.execute_all().await;

		assert!(!manager.is_running("amoy").await);
		assert!(manager.providers().await.is_empty());
		manager.cleanup().await;

		let log = std::fs::read_to_string(dir.path().join("log").join("amoy-node.log")).unwrap();
		assert!(log.contains("[info] Starting fork: amoy"));
	}

	#[tokio::test]
	async fn test_cleanup_kills_forks_still_starting() {
		// nothing listens here, so the fork never becomes ready
		let port = std::net::TcpListener::bind("127.0.0.1:0")
			.unwrap()
			.local_addr()
			.unwrap()
			.port();

		let dir = tempfile::tempdir().unwrap();
		let pid_file = dir.path().join("node.pid");
		let program = fake_node(
			&dir,
			&format!("sleep 300 & echo $! > {}\nwait", pid_file.display()),
		);
		let mut config = config(&dir, &program);
		config.node.ready_timeout_ms = 60_000;
		config
			.chains
			.insert("amoy".to_string(), chain("https://amoy.example.com", Some(port)));
		let manager = Arc::new(ChainManager::new(config));

		let setup = tokio::spawn({
			let manager = manager.clone();
			async move { manager.setup_chains(&["amoy"]).await }
		});

		let node_pid = read_pid_file(&pid_file).await;
		while !manager.starting.lock().await.contains_key("amoy") {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		manager.cleanup().await;

		assert!(wait_until_gone(node_pid).await, "node {} survived cleanup", node_pid);
		let err = tokio::time::timeout(Duration::from_secs(15), setup)
			.await
			.expect("setup still pending after cleanup")
			.unwrap()
			.unwrap_err();
		assert!(matches!(err, ForkError::Process(_)));
		assert!(manager.running_chains().await.is_empty());
	}

	#[test]
	fn test_check_ports_allows_same_chain() {
		let spec = ForkSpec {
			name: "amoy".to_string(),
			rpc_url: "https://amoy.example.com".to_string(),
			port: 8548,
			block_number: None,
			chain_id: ChainId::AMOY,
		};

		assert!(check_ports(&[spec.clone(), spec], &HashMap::new()).is_ok());
	}
}
