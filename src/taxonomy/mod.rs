//! In-memory taxonomy: tree, `Taxon` cursors, weighted LCA, loaders and
//! the record helpers built on them.
//!
//! A taxonomy is loaded once and shared read-only, usually behind an `Arc`.

pub mod annotate;
pub mod lca;
pub mod loader;
pub mod taxon;
pub mod tree;

pub use annotate::{annotate_lca, lca_annotate, MERGED_TAXID};
pub use lca::{weighted_lca, LcaResult};
pub use loader::{load_csv, load_ncbi_dump, load_taxonomy};
pub use taxon::Taxon;
pub use tree::{TaxNode, Taxonomy, DEFAULT_CODE, NO_RANK};
