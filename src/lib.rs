pub mod assembly;
pub mod bio;
pub mod cli;
pub mod core;
pub mod formats;
pub mod kmer;
pub mod pipeline;
pub mod taxonomy;
pub mod utils;

pub use crate::bio::{AnnotationValue, BioSequence, BioSequenceBatch, ValueHistogram};
pub use crate::pipeline::BioSequenceIter;
pub use crate::taxonomy::{Taxon, Taxonomy};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {source_name} at byte {offset}: {message}")]
    Parse {
        source_name: String,
        offset: usize,
        message: String,
    },

    #[error("Format error: {0}")]
    Format(String),

    #[error("Taxonomy error: {0}")]
    Taxonomy(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ObiError {
    pub fn parse(source_name: &str, offset: usize, message: impl Into<String>) -> Self {
        ObiError::Parse {
            source_name: source_name.to_string(),
            offset,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ObiError {
    fn from(err: serde_json::Error) -> Self {
        ObiError::Format(format!("JSON: {}", err))
    }
}

impl From<csv::Error> for ObiError {
    fn from(err: csv::Error) -> Self {
        ObiError::Format(format!("CSV: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ObiError>;
