pub mod config;
pub mod context;

pub use config::{load_config, save_config, Config};
pub use context::Context;
