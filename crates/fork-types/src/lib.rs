//! Shared types for the multifork workspace.
//!
//! Every other crate depends on this one for chain identifiers, the resolved
//! description of a fork, the common error type and TOML schema validation.

pub mod chains;
pub mod errors;
pub mod validation;

pub use chains::*;
pub use errors::*;
pub use validation::*;
