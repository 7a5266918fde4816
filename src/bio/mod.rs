pub mod annotation;
pub mod arena;
pub mod batch;
pub mod iupac;
pub mod pool;
pub mod sequence;

pub use annotation::{AnnotationValue, Annotations, ValueHistogram};
pub use arena::{RecordId, SequenceArena};
pub use batch::BioSequenceBatch;
pub use pool::BufferPool;
pub use sequence::{BioSequence, Composition};
