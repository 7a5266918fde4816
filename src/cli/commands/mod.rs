pub mod consensus;
pub mod convert;
pub mod lca;
pub mod taxonomy;
