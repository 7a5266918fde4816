//! 2-bit packed k-mer fingerprints.
//!
//! Residues map to `a→0, c→1, g→2, t/u→3`; the first residue of a window
//! occupies the most significant bits, so shifting left appends a residue.
//! Any other byte invalidates every window that covers it.

use crate::bio::iupac::{code_nucleotide, nucleotide_code};
use crate::{ObiError, Result};
use std::fmt::Debug;
use std::hash::Hash;

/// Integer word able to hold a packed k-mer.
pub trait KmerWord: Copy + Eq + Ord + Hash + Default + Debug + Send + Sync + 'static {
    /// Largest supported `k`.
    const MAX_K: usize;

    /// Mask keeping the `2k` low bits.
    fn mask(k: usize) -> Self;

    /// Appends a residue code on the right, dropping what falls off `mask`.
    fn push(self, code: u8, mask: Self) -> Self;

    /// Prepends the complement of `code` to a reverse-complement word of size `k`.
    fn push_complement(self, code: u8, k: usize) -> Self;

    /// Residue code at index `i` of a `k`-mer, 0 being the leftmost.
    fn code_at(self, i: usize, k: usize) -> u8;

    /// Drops the rightmost residue.
    fn shift_right(self) -> Self;

    fn low_code(self) -> u8;
}

macro_rules! impl_kmer_word {
    ($word:ty, $max_k:expr) => {
        impl KmerWord for $word {
            const MAX_K: usize = $max_k;

            #[inline]
            fn mask(k: usize) -> Self {
                if 2 * k >= <$word>::BITS as usize {
                    <$word>::MAX
                } else {
                    (1 << (2 * k)) - 1
                }
            }

            #[inline]
            fn push(self, code: u8, mask: Self) -> Self {
                ((self << 2) | code as $word) & mask
            }

            #[inline]
            fn push_complement(self, code: u8, k: usize) -> Self {
                (self >> 2) | (((3 - code) as $word) << (2 * (k - 1)))
            }

            #[inline]
            fn code_at(self, i: usize, k: usize) -> u8 {
                ((self >> (2 * (k - 1 - i))) & 3) as u8
            }

            #[inline]
            fn shift_right(self) -> Self {
                self >> 2
            }

            #[inline]
            fn low_code(self) -> u8 {
                (self & 3) as u8
            }
        }
    };
}

impl_kmer_word!(u64, 31);
impl_kmer_word!(u128, 63);

/// Checks that `k` fits the word type.
pub fn check_k<W: KmerWord>(k: usize) -> Result<()> {
    if k == 0 || k > W::MAX_K {
        return Err(ObiError::Other(format!(
            "k-mer size {} out of range 1..={}",
            k,
            W::MAX_K
        )));
    }
    Ok(())
}

/// Packs a window; `None` when it holds a non-ACGT residue.
pub fn encode<W: KmerWord>(window: &[u8]) -> Option<W> {
    let mask = W::mask(window.len());
    window
        .iter()
        .try_fold(W::default(), |w, &b| Some(w.push(nucleotide_code(b)?, mask)))
}

/// Unpacks a `k`-mer into lowercase residues.
pub fn decode<W: KmerWord>(kmer: W, k: usize) -> Vec<u8> {
    (0..k).map(|i| code_nucleotide(kmer.code_at(i, k))).collect()
}

pub fn reverse_complement<W: KmerWord>(kmer: W, k: usize) -> W {
    let mask = W::mask(k);
    let mut rest = kmer;
    let mut out = W::default();
    for _ in 0..k {
        out = out.push(3 - rest.low_code(), mask);
        rest = rest.shift_right();
    }
    out
}

/// Smaller of a k-mer and its reverse complement.
pub fn canonical<W: KmerWord>(kmer: W, k: usize) -> W {
    kmer.min(reverse_complement(kmer, k))
}

/// One window of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kmer<W> {
    pub position: usize,
    pub forward: W,
    pub reverse: W,
}

impl<W: KmerWord> Kmer<W> {
    pub fn canonical(&self) -> W {
        self.forward.min(self.reverse)
    }

    /// Whether the forward strand carries the canonical form.
    pub fn is_forward(&self) -> bool {
        self.forward <= self.reverse
    }
}

/// Rolling iterator over the valid windows of a sequence.
pub struct KmerIter<'a, W> {
    sequence: &'a [u8],
    k: usize,
    mask: W,
    next: usize,
    valid: usize,
    forward: W,
    reverse: W,
    sparse: bool,
}

impl<'a, W: KmerWord> KmerIter<'a, W> {
    /// In sparse mode only windows starting at even positions are produced.
    pub fn new(sequence: &'a [u8], k: usize, sparse: bool) -> Result<Self> {
        check_k::<W>(k)?;
        Ok(Self {
            sequence,
            k,
            mask: W::mask(k),
            next: 0,
            valid: 0,
            forward: W::default(),
            reverse: W::default(),
            sparse,
        })
    }
}

impl<W: KmerWord> Iterator for KmerIter<'_, W> {
    type Item = Kmer<W>;

    fn next(&mut self) -> Option<Kmer<W>> {
        while self.next < self.sequence.len() {
            let residue = self.sequence[self.next];
            self.next += 1;
            let Some(code) = nucleotide_code(residue) else {
                self.valid = 0;
                continue;
            };
            self.forward = self.forward.push(code, self.mask);
            self.reverse = self.reverse.push_complement(code, self.k);
            self.valid += 1;
            if self.valid < self.k {
                continue;
            }
            let position = self.next - self.k;
            if self.sparse && position % 2 == 1 {
                continue;
            }
            return Some(Kmer {
                position,
                forward: self.forward,
                reverse: self.reverse,
            });
        }
        None
    }
}
