//! De Bruijn graph and primer-anchored micro-assembly.

pub mod consensus;
pub mod debruijn;
pub mod primer;

pub use consensus::{consensus, micro_assemble, ConsensusOptions};
pub use debruijn::{DeBruijnGraph, DEFAULT_PATH_BUDGET};
pub use primer::{locate, PrimerMatch};
