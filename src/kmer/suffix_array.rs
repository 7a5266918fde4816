use rayon::prelude::*;
use std::cmp::Ordering;

/// One suffix: record index and start position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Suffix {
    pub record: u32,
    pub position: u32,
}

/// Suffixes of a set of sequences sorted lexicographically.
///
/// `common[i]` is the length of the longest common prefix of suffixes `i`
/// and `i + 1`.
#[derive(Debug, Clone, Default)]
pub struct SuffixArray {
    pub suffixes: Vec<Suffix>,
    pub common: Vec<usize>,
}

fn suffix<'a>(sequences: &[&'a [u8]], s: Suffix) -> &'a [u8] {
    &sequences[s.record as usize][s.position as usize..]
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

impl SuffixArray {
    pub fn build(sequences: &[&[u8]]) -> Self {
        let mut suffixes: Vec<Suffix> = sequences
            .iter()
            .enumerate()
            .flat_map(|(record, seq)| {
                (0..seq.len()).map(move |position| Suffix {
                    record: record as u32,
                    position: position as u32,
                })
            })
            .collect();
        suffixes.par_sort_by(|&a, &b| match suffix(sequences, a).cmp(suffix(sequences, b)) {
            Ordering::Equal => a.cmp(&b),
            other => other,
        });
        let common = suffixes
            .windows(2)
            .map(|pair| common_prefix(suffix(sequences, pair[0]), suffix(sequences, pair[1])))
            .collect();
        Self { suffixes, common }
    }

    pub fn len(&self) -> usize {
        self.suffixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }

    /// Length of the longest substring occurring at least twice.
    pub fn max_common(&self) -> usize {
        self.common.iter().copied().max().unwrap_or(0)
    }
}

/// Length of the longest repeat inside any single sequence.
pub fn longest_repeat(sequences: &[&[u8]]) -> usize {
    sequences
        .par_iter()
        .map(|seq| SuffixArray::build(&[*seq]).max_common())
        .max()
        .unwrap_or(0)
}
