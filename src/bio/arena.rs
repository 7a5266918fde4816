use crate::bio::batch::BioSequenceBatch;
use crate::bio::sequence::BioSequence;

/// Stable handle on a record stored in a [`SequenceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub usize);

/// Owns records and the symmetric pairing relation between them.
///
/// Pairing is a cycle (`a → b → a`) so it is expressed with arena indices
/// rather than references: each record's `paired_with` is the index of its mate.
#[derive(Debug, Default, Clone)]
pub struct SequenceArena {
    records: Vec<BioSequence>,
}

impl SequenceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    /// Flattens a paired batch: forward records first, then their mates.
    pub fn from_batch(batch: BioSequenceBatch) -> Self {
        let mut arena = Self::with_capacity(batch.len() * 2);
        let n = batch.slice.len();
        for mut seq in batch.slice {
            seq.set_paired_with(None);
            arena.push(seq);
        }
        if let Some(mates) = batch.mates {
            for (i, mut mate) in mates.into_iter().enumerate() {
                mate.set_paired_with(None);
                let id = arena.push(mate);
                arena.pair(RecordId(i), id);
            }
        }
        debug_assert!(arena.len() >= n);
        arena
    }

    pub fn push(&mut self, mut record: BioSequence) -> RecordId {
        record.set_paired_with(None);
        self.records.push(record);
        RecordId(self.records.len() - 1)
    }

    pub fn get(&self, id: RecordId) -> Option<&BioSequence> {
        self.records.get(id.0)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut BioSequence> {
        self.records.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &BioSequence)> {
        self.records.iter().enumerate().map(|(i, s)| (RecordId(i), s))
    }

    /// Establishes `a ↔ b`, breaking any previous pairing of either side.
    pub fn pair(&mut self, a: RecordId, b: RecordId) {
        self.unpair(a);
        self.unpair(b);
        if let Some(rec) = self.records.get_mut(a.0) {
            rec.set_paired_with(Some(b.0));
        }
        if let Some(rec) = self.records.get_mut(b.0) {
            rec.set_paired_with(Some(a.0));
        }
    }

    pub fn unpair(&mut self, id: RecordId) {
        let mate = self.records.get(id.0).and_then(BioSequence::paired_with);
        if let Some(mate) = mate {
            if let Some(rec) = self.records.get_mut(mate) {
                rec.set_paired_with(None);
            }
        }
        if let Some(rec) = self.records.get_mut(id.0) {
            rec.set_paired_with(None);
        }
    }

    pub fn paired_with(&self, id: RecordId) -> Option<RecordId> {
        self.records
            .get(id.0)
            .and_then(BioSequence::paired_with)
            .map(RecordId)
    }

    /// Reverse complements a record. In place, the pairing is untouched; otherwise
    /// the unpaired copy is appended and its id returned.
    pub fn reverse_complement(&mut self, id: RecordId, in_place: bool) -> Option<RecordId> {
        if in_place {
            self.records.get_mut(id.0)?.reverse_complement_in_place();
            Some(id)
        } else {
            let rc = self.records.get(id.0)?.reverse_complement();
            Some(self.push(rc))
        }
    }

    pub fn into_records(self) -> Vec<BioSequence> {
        self.records
    }
}
