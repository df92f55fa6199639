//! Contract deployment onto running forks.

pub mod artifact;
pub mod contract;
pub mod deployer;

pub use artifact::ContractArtifact;
pub use contract::{query_chain_identity, ChainIdentity, Multichain};
pub use deployer::{DeployOptions, DeployOverrides, DeployedContract, Deployer};
