//! k-mer fingerprints, k-mer index and suffix array.

pub mod encoding;
pub mod index;
pub mod suffix_array;

pub use encoding::{canonical, decode, encode, reverse_complement, Kmer, KmerIter, KmerWord};
pub use index::{KmerMap, KmerMatch, Locator, Matches};
pub use suffix_array::{longest_repeat, Suffix, SuffixArray};
