use crate::bio::sequence::BioSequence;
use crate::{ObiError, Result};

/// Unit of scheduling in the pipeline: an ordered slice of records tagged
/// with the stream it came from and its serial number within a stage.
///
/// A paired batch also carries `mates`, where `mates[i]` is the mate of
/// `slice[i]` and each record's `paired_with` is that shared index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BioSequenceBatch {
    pub source: String,
    pub order: usize,
    pub slice: Vec<BioSequence>,
    pub mates: Option<Vec<BioSequence>>,
}

impl BioSequenceBatch {
    pub fn new(source: impl Into<String>, order: usize, slice: Vec<BioSequence>) -> Self {
        Self {
            source: source.into(),
            order,
            slice,
            mates: None,
        }
    }

    /// Builds a paired batch, linking `slice[i]` and `mates[i]`.
    pub fn paired(
        source: impl Into<String>,
        order: usize,
        mut slice: Vec<BioSequence>,
        mut mates: Vec<BioSequence>,
    ) -> Result<Self> {
        if slice.len() != mates.len() {
            return Err(ObiError::Format(format!(
                "cannot pair batch {}: {} forward reads for {} reverse reads",
                order,
                slice.len(),
                mates.len()
            )));
        }
        for (i, (fwd, rev)) in slice.iter_mut().zip(mates.iter_mut()).enumerate() {
            fwd.set_paired_with(Some(i));
            rev.set_paired_with(Some(i));
        }
        Ok(Self {
            source: source.into(),
            order,
            slice,
            mates: Some(mates),
        })
    }

    pub fn len(&self) -> usize {
        self.slice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }

    pub fn is_paired(&self) -> bool {
        self.mates.is_some()
    }

    pub fn reorder(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    /// Total residue count over the forward slice.
    pub fn residues(&self) -> usize {
        self.slice.iter().map(BioSequence::len).sum()
    }

    /// Splits a paired batch into its forward and reverse halves, keeping the
    /// batch identity on both.
    pub fn unpair(self) -> (BioSequenceBatch, Option<BioSequenceBatch>) {
        let BioSequenceBatch {
            source,
            order,
            mut slice,
            mates,
        } = self;
        for seq in slice.iter_mut() {
            seq.set_paired_with(None);
        }
        let reverse = mates.map(|mut mates| {
            for seq in mates.iter_mut() {
                seq.set_paired_with(None);
            }
            BioSequenceBatch::new(source.clone(), order, mates)
        });
        (BioSequenceBatch::new(source, order, slice), reverse)
    }

    /// Iterates over `(forward, mate)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&BioSequence, Option<&BioSequence>)> {
        self.slice
            .iter()
            .enumerate()
            .map(move |(i, s)| (s, self.mates.as_ref().and_then(|m| m.get(i))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paired_batch_links_indices() {
        let fwd = vec![BioSequence::new("r1", "acgt", ""), BioSequence::new("r2", "gg", "")];
        let rev = vec![BioSequence::new("r1", "acgt", ""), BioSequence::new("r2", "cc", "")];
        let batch = BioSequenceBatch::paired("lib", 3, fwd, rev).unwrap();
        assert!(batch.is_paired());
        assert_eq!(batch.slice[1].paired_with(), Some(1));
        assert_eq!(batch.mates.as_ref().unwrap()[1].paired_with(), Some(1));

        let (f, r) = batch.unpair();
        let r = r.unwrap();
        assert_eq!(f.order, 3);
        assert_eq!(r.order, 3);
        assert_eq!(r.slice[1].sequence(), b"cc");
        assert!(!f.slice[0].is_paired());
    }

    #[test]
    fn test_paired_batch_rejects_uneven_sides() {
        let fwd = vec![BioSequence::new("r1", "acgt", "")];
        assert!(BioSequenceBatch::paired("lib", 0, fwd, vec![]).is_err());
    }
}
