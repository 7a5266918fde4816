use crate::bio::BioSequence;
use crate::kmer::encoding::{check_k, KmerIter, KmerWord};
use crate::Result;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

/// Occurrence of a k-mer in a reference record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    pub record: u32,
    pub position: u32,
    /// The reference window is the canonical form itself.
    pub forward: bool,
}

type Locators = SmallVec<[Locator; 4]>;

/// Shared k-mers between a query and one reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KmerMatch {
    pub record: usize,
    /// Diagonal offsets (`reference position - query position`) of k-mers
    /// shared on the forward strand.
    pub forward: Vec<i64>,
    /// Offsets of k-mers shared by the reverse complement of the query,
    /// measured on the reverse-complemented query.
    pub reverse: Vec<i64>,
}

impl KmerMatch {
    pub fn count(&self) -> usize {
        self.forward.len() + self.reverse.len()
    }

    /// Whether most shared k-mers align on the reverse strand.
    pub fn is_reverse(&self) -> bool {
        self.reverse.len() > self.forward.len()
    }

    /// Most frequent offset on the dominant strand.
    pub fn best_offset(&self) -> Option<i64> {
        let offsets = if self.is_reverse() { &self.reverse } else { &self.forward };
        let mut counts: FxHashMap<i64, usize> = FxHashMap::default();
        for &o in offsets {
            *counts.entry(o).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(offset, _)| offset)
    }
}

/// Result of a query, keyed by reference index.
#[derive(Debug, Clone, Default)]
pub struct Matches {
    matches: FxHashMap<usize, KmerMatch>,
}

impl Matches {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn get(&self, record: usize) -> Option<&KmerMatch> {
        self.matches.get(&record)
    }

    /// Drops references sharing fewer than `min_count` k-mers.
    pub fn filter_min_count(&mut self, min_count: usize) {
        self.matches.retain(|_, m| m.count() >= min_count);
    }

    /// Reference with the most shared k-mers; lowest index on ties.
    pub fn best(&self) -> Option<&KmerMatch> {
        self.matches
            .values()
            .max_by(|a, b| a.count().cmp(&b.count()).then(b.record.cmp(&a.record)))
    }

    /// Matches sorted by decreasing shared k-mer count.
    pub fn sorted(&self) -> Vec<&KmerMatch> {
        let mut all: Vec<&KmerMatch> = self.matches.values().collect();
        all.sort_by(|a, b| b.count().cmp(&a.count()).then(a.record.cmp(&b.record)));
        all
    }
}

/// Index from canonical k-mer to its occurrences in a reference set.
///
/// K-mers seen more than `max_occurrence` times over the whole reference set
/// are removed once every reference has been indexed.
pub struct KmerMap<W: KmerWord = u64> {
    k: usize,
    sparse: bool,
    max_occurrence: usize,
    references: usize,
    index: FxHashMap<W, Locators>,
}

impl<W: KmerWord> KmerMap<W> {
    /// Indexes `references` in parallel. A `max_occurrence` of 0 keeps every k-mer.
    pub fn build(
        references: &[BioSequence],
        k: usize,
        sparse: bool,
        max_occurrence: usize,
    ) -> Result<Self> {
        check_k::<W>(k)?;
        let chunk = crate::utils::parallel::chunk_size_for_parallelism(references.len(), 0);
        let locals: Vec<FxHashMap<W, Locators>> = references
            .par_chunks(chunk)
            .enumerate()
            .map(|(c, records)| -> Result<FxHashMap<W, Locators>> {
                let mut local: FxHashMap<W, Locators> = FxHashMap::default();
                for (i, record) in records.iter().enumerate() {
                    let index = (c * chunk + i) as u32;
                    for kmer in KmerIter::<W>::new(record.sequence(), k, sparse)? {
                        local.entry(kmer.canonical()).or_default().push(Locator {
                            record: index,
                            position: kmer.position as u32,
                            forward: kmer.is_forward(),
                        });
                    }
                }
                Ok(local)
            })
            .collect::<Result<_>>()?;

        let mut index: FxHashMap<W, Locators> = FxHashMap::default();
        for local in locals {
            for (kmer, locators) in local {
                index.entry(kmer).or_default().extend(locators);
            }
        }
        for locators in index.values_mut() {
            locators.sort_unstable_by_key(|l| (l.record, l.position));
        }
        let distinct = index.len();
        if max_occurrence > 0 {
            index.retain(|_, locators| locators.len() <= max_occurrence);
        }
        debug!(
            "indexed {} references: {} distinct {}-mers, {} over the occurrence cap",
            references.len(),
            distinct,
            k,
            distinct - index.len()
        );
        Ok(Self {
            k,
            sparse,
            max_occurrence,
            references: references.len(),
            index,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    pub fn max_occurrence(&self) -> usize {
        self.max_occurrence
    }

    pub fn references(&self) -> usize {
        self.references
    }

    /// Number of distinct canonical k-mers kept.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn occurrences(&self, canonical: W) -> &[Locator] {
        self.index.get(&canonical).map(|l| l.as_slice()).unwrap_or(&[])
    }

    /// References sharing k-mers with `query`, in both orientations.
    ///
    /// Queries are always scanned densely so that sparse references still
    /// meet every indexed window.
    pub fn query(&self, query: &BioSequence) -> Matches {
        let mut matches: FxHashMap<usize, KmerMatch> = FxHashMap::default();
        let len = query.len() as i64;
        let Ok(kmers) = KmerIter::<W>::new(query.sequence(), self.k, false) else {
            return Matches::default();
        };
        for kmer in kmers {
            let Some(locators) = self.index.get(&kmer.canonical()) else {
                continue;
            };
            let query_forward = kmer.is_forward();
            for l in locators {
                let m = matches.entry(l.record as usize).or_insert_with(|| KmerMatch {
                    record: l.record as usize,
                    ..Default::default()
                });
                if l.forward == query_forward {
                    m.forward.push(l.position as i64 - kmer.position as i64);
                } else {
                    let rc_position = len - kmer.position as i64 - self.k as i64;
                    m.reverse.push(l.position as i64 - rc_position);
                }
            }
        }
        Matches { matches }
    }
}
