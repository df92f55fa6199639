//! Lifecycle management for local chain forks.
//!
//! [`ChainManager`] spawns one node process per chain, waits until each
//! answers JSON-RPC, and keeps the provider and process handles until
//! [`ChainManager::cleanup`] tears everything down. [`MultichainHarness`]
//! builds on it to deploy the chain-identity contract everywhere and check
//! what each fork reports.

pub mod command;
pub mod harness;
pub mod log;
pub mod manager;
pub mod process;

pub use command::NodeCommand;
pub use harness::{ChainReport, MultichainHarness};
pub use log::{ForkLog, LogLevel};
pub use manager::{ChainManager, ForkHandle};
pub use process::ForkProcess;
