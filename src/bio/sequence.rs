use crate::bio::annotation::{AnnotationValue, Annotations, ValueHistogram};
use crate::bio::iupac;
use crate::bio::pool::BufferPool;
use crate::{ObiError, Result};
use indexmap::IndexMap;

/// Annotation key holding the per-position mismatches observed while pairing reads.
pub const PAIRING_MISMATCHES: &str = "pairing_mismatches";

/// A biological sequence record.
///
/// Residues are always stored lowercase. When present, qualities are raw
/// Phred scores and have exactly one entry per residue.
#[derive(Debug, Clone, Default)]
pub struct BioSequence {
    id: String,
    definition: String,
    sequence: Vec<u8>,
    qualities: Option<Vec<u8>>,
    features: Option<Vec<u8>>,
    annotations: Annotations,
    source: String,
    paired_with: Option<usize>,
}

/// Nucleotide composition of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Composition {
    pub a: usize,
    pub c: usize,
    pub g: usize,
    pub t: usize,
    pub other: usize,
}

impl BioSequence {
    pub fn new(
        id: impl Into<String>,
        sequence: impl Into<Vec<u8>>,
        definition: impl Into<String>,
    ) -> Self {
        let mut sequence = sequence.into();
        iupac::lowercase_in_place(&mut sequence);
        Self {
            id: id.into(),
            definition: definition.into(),
            sequence,
            ..Default::default()
        }
    }

    pub fn with_qualities(
        id: impl Into<String>,
        sequence: impl Into<Vec<u8>>,
        qualities: Vec<u8>,
        definition: impl Into<String>,
    ) -> Result<Self> {
        let mut seq = Self::new(id, sequence, definition);
        seq.set_qualities(qualities)?;
        Ok(seq)
    }

    /// An empty record, typically filled in by a parser.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn has_definition(&self) -> bool {
        !self.definition.is_empty()
    }

    pub fn set_definition(&mut self, definition: impl Into<String>) {
        self.definition = definition.into();
    }

    /// Strips surrounding whitespace from the definition.
    pub fn trim_definition(&mut self) {
        let trimmed = self.definition.trim();
        if trimmed.len() != self.definition.len() {
            self.definition = trimmed.to_string();
        }
    }

    /// Deep copy detached from any mate.
    pub fn copy(&self) -> BioSequence {
        let mut copy = self.clone();
        copy.paired_with = None;
        copy
    }

    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub fn has_sequence(&self) -> bool {
        !self.sequence.is_empty()
    }

    pub fn string(&self) -> String {
        String::from_utf8_lossy(&self.sequence).into_owned()
    }

    /// Replaces the residues. Qualities that no longer match the new length are dropped.
    pub fn set_sequence(&mut self, sequence: impl Into<Vec<u8>>) {
        let mut sequence = sequence.into();
        iupac::lowercase_in_place(&mut sequence);
        if self.qualities.as_ref().is_some_and(|q| q.len() != sequence.len()) {
            self.qualities = None;
        }
        self.sequence = sequence;
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn qualities(&self) -> Option<&[u8]> {
        self.qualities.as_deref()
    }

    pub fn has_qualities(&self) -> bool {
        self.qualities.is_some()
    }

    pub fn set_qualities(&mut self, qualities: Vec<u8>) -> Result<()> {
        if qualities.len() != self.sequence.len() {
            return Err(ObiError::Format(format!(
                "sequence {}: {} qualities for {} residues",
                self.id,
                qualities.len(),
                self.sequence.len()
            )));
        }
        self.qualities = Some(qualities);
        Ok(())
    }

    pub fn clear_qualities(&mut self) {
        self.qualities = None;
    }

    pub fn mean_quality(&self) -> Option<f64> {
        let q = self.qualities.as_ref()?;
        if q.is_empty() {
            return None;
        }
        Some(q.iter().map(|&v| v as f64).sum::<f64>() / q.len() as f64)
    }

    pub fn features(&self) -> Option<&[u8]> {
        self.features.as_deref()
    }

    pub fn has_features(&self) -> bool {
        self.features.as_ref().is_some_and(|f| !f.is_empty())
    }

    pub fn set_features(&mut self, features: Vec<u8>) {
        self.features = Some(features);
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_source(&self) -> bool {
        !self.source.is_empty()
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    /// Index of the mate record in the owning arena or paired batch.
    pub fn paired_with(&self) -> Option<usize> {
        self.paired_with
    }

    pub fn is_paired(&self) -> bool {
        self.paired_with.is_some()
    }

    pub(crate) fn set_paired_with(&mut self, mate: Option<usize>) {
        self.paired_with = mate;
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }

    pub fn has_annotations(&self) -> bool {
        !self.annotations.is_empty()
    }

    pub fn set_annotations(&mut self, annotations: Annotations) {
        self.annotations = annotations;
    }

    pub fn get_attribute(&self, key: &str) -> Option<&AnnotationValue> {
        self.annotations.get(key)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.annotations.contains_key(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AnnotationValue>) {
        self.annotations.insert(key.into(), value.into());
    }

    pub fn delete_attribute(&mut self, key: &str) -> Option<AnnotationValue> {
        self.annotations.shift_remove(key)
    }

    pub fn get_int_attribute(&self, key: &str) -> Option<i64> {
        self.annotations.get(key).and_then(AnnotationValue::as_int)
    }

    pub fn get_float_attribute(&self, key: &str) -> Option<f64> {
        self.annotations.get(key).and_then(AnnotationValue::as_float)
    }

    pub fn get_bool_attribute(&self, key: &str) -> Option<bool> {
        self.annotations.get(key).and_then(AnnotationValue::as_bool)
    }

    pub fn get_string_attribute(&self, key: &str) -> Option<String> {
        self.annotations.get(key).map(AnnotationValue::as_string)
    }

    pub fn get_int_map_attribute(&self, key: &str) -> Option<IndexMap<String, i64>> {
        self.annotations.get(key).and_then(AnnotationValue::as_int_map)
    }

    pub fn get_string_map_attribute(&self, key: &str) -> Option<IndexMap<String, String>> {
        self.annotations.get(key).and_then(AnnotationValue::as_string_map)
    }

    pub fn get_int_slice_attribute(&self, key: &str) -> Option<Vec<i64>> {
        self.annotations.get(key).and_then(AnnotationValue::as_int_slice)
    }

    /// Observation count, 1 unless a `count` annotation says otherwise.
    pub fn count(&self) -> u64 {
        self.get_int_attribute("count")
            .filter(|c| *c >= 0)
            .map(|c| c as u64)
            .unwrap_or(1)
    }

    pub fn set_count(&mut self, count: u64) {
        self.set_attribute("count", AnnotationValue::Int(count as i64));
    }

    /// Raw taxid annotation, `NA` when absent.
    pub fn taxid(&self) -> String {
        self.get_string_attribute("taxid")
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "NA".to_string())
    }

    pub fn md5(&self) -> [u8; 16] {
        md5::compute(&self.sequence).0
    }

    pub fn md5_hex(&self) -> String {
        self.md5().iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn composition(&self) -> Composition {
        let mut comp = Composition::default();
        for &b in &self.sequence {
            match b.to_ascii_lowercase() {
                b'a' => comp.a += 1,
                b'c' => comp.c += 1,
                b'g' => comp.g += 1,
                b't' => comp.t += 1,
                _ => comp.other += 1,
            }
        }
        comp
    }

    /// Closed-open slice `[from, to)`. With `circular` set and `from > to`,
    /// the slice wraps around the end of the sequence.
    pub fn subsequence(&self, from: usize, to: usize, circular: bool) -> Result<BioSequence> {
        let len = self.sequence.len();
        if to > len || from > len {
            return Err(ObiError::Format(format!(
                "subsequence [{}, {}) out of range for {} ({} residues)",
                from, to, self.id, len
            )));
        }
        if from > to && !circular {
            return Err(ObiError::Format(format!(
                "subsequence start {} after end {} on linear sequence {}",
                from, to, self.id
            )));
        }
        let wraps = from > to;
        if wraps && from == len {
            return self.subsequence(0, to, false);
        }

        let (sequence, qualities) = if wraps {
            let mut s = self.sequence[from..].to_vec();
            s.extend_from_slice(&self.sequence[..to]);
            let q = self.qualities.as_ref().map(|q| {
                let mut v = q[from..].to_vec();
                v.extend_from_slice(&q[..to]);
                v
            });
            (s, q)
        } else {
            (
                self.sequence[from..to].to_vec(),
                self.qualities.as_ref().map(|q| q[from..to].to_vec()),
            )
        };

        let mut sub = BioSequence {
            id: format!("{}_sub[{}..{}]", self.id, from + 1, to),
            definition: self.definition.clone(),
            sequence,
            qualities,
            features: None,
            annotations: self.annotations.clone(),
            source: self.source.clone(),
            paired_with: None,
        };

        if let Some(mismatches) = self.get_int_map_attribute(PAIRING_MISMATCHES) {
            let shifted: IndexMap<String, i64> = mismatches
                .into_iter()
                .filter_map(|(key, pos)| {
                    let index = usize::try_from(pos - 1).ok()?;
                    let new_index = if wraps {
                        if index >= from {
                            index - from
                        } else if index < to {
                            len - from + index
                        } else {
                            return None;
                        }
                    } else if index >= from && index < to {
                        index - from
                    } else {
                        return None;
                    };
                    Some((key, new_index as i64 + 1))
                })
                .collect();
            sub.set_attribute(PAIRING_MISMATCHES, AnnotationValue::IntMap(shifted));
        }

        Ok(sub)
    }

    /// Reverse complements the record in place using the IUPAC table.
    pub fn reverse_complement_in_place(&mut self) {
        self.apply_reverse_complement(iupac::complement);
    }

    /// Returns a reverse-complemented copy; `self` is untouched.
    pub fn reverse_complement(&self) -> BioSequence {
        let mut rc = self.clone();
        rc.reverse_complement_in_place();
        rc
    }

    /// DNA-only variant: every ambiguity code becomes `n`.
    pub fn reverse_complement_dna(&self) -> BioSequence {
        let mut rc = self.clone();
        rc.apply_reverse_complement(iupac::complement_dna);
        rc
    }

    fn apply_reverse_complement(&mut self, complement: fn(u8) -> u8) {
        self.sequence.reverse();
        for b in self.sequence.iter_mut() {
            *b = complement(*b);
        }
        if let Some(q) = self.qualities.as_mut() {
            q.reverse();
        }

        if let Some(mismatches) = self.get_int_map_attribute(PAIRING_MISMATCHES) {
            let len = self.sequence.len() as i64;
            let rewritten: IndexMap<String, i64> = mismatches
                .into_iter()
                .map(|(key, pos)| (complement_mismatch_key(&key, complement), len - pos + 1))
                .collect();
            self.set_attribute(PAIRING_MISMATCHES, AnnotationValue::IntMap(rewritten));
        }
    }

    /// Concatenates `other` after `self`. Qualities survive only when both sides
    /// carry them; annotations of `self` are kept when `copy_annotations` is set.
    pub fn join(&self, other: &BioSequence, copy_annotations: bool) -> BioSequence {
        let mut sequence = Vec::with_capacity(self.len() + other.len());
        sequence.extend_from_slice(&self.sequence);
        sequence.extend_from_slice(&other.sequence);

        let qualities = match (&self.qualities, &other.qualities) {
            (Some(a), Some(b)) => {
                let mut q = Vec::with_capacity(a.len() + b.len());
                q.extend_from_slice(a);
                q.extend_from_slice(b);
                Some(q)
            }
            _ => None,
        };

        BioSequence {
            id: self.id.clone(),
            definition: self.definition.clone(),
            sequence,
            qualities,
            features: None,
            annotations: if copy_annotations {
                self.annotations.clone()
            } else {
                Annotations::new()
            },
            source: self.source.clone(),
            paired_with: None,
        }
    }

    /// Histogram stored under `merged_<key>`, created from this record's own
    /// value (or `na`) weighted by its count when it does not exist yet.
    pub fn stats_on(&mut self, key: &str, na: &str) -> &ValueHistogram {
        let merged_key = format!("merged_{}", key);
        let needs_init = !matches!(
            self.annotations.get(&merged_key),
            Some(AnnotationValue::Histogram(_))
        );
        if needs_init {
            let histogram = match self.annotations.get(&merged_key) {
                Some(existing) => match existing.as_int_map() {
                    Some(map) => ValueHistogram::from_counts(
                        map.into_iter().map(|(k, v)| (k, v.max(0) as u64)),
                    ),
                    None => self.own_histogram(key, na),
                },
                None => self.own_histogram(key, na),
            };
            self.annotations
                .insert(merged_key.clone(), AnnotationValue::Histogram(histogram));
        }
        match self.annotations.get(&merged_key) {
            Some(AnnotationValue::Histogram(h)) => h,
            _ => unreachable!("histogram inserted above"),
        }
    }

    fn own_histogram(&self, key: &str, na: &str) -> ValueHistogram {
        let value = self
            .get_string_attribute(key)
            .unwrap_or_else(|| na.to_string());
        ValueHistogram::from_counts(std::iter::once((value, self.count())))
    }

    fn stats_snapshot(&self, key: &str, na: &str) -> ValueHistogram {
        let merged_key = format!("merged_{}", key);
        match self.annotations.get(&merged_key).and_then(AnnotationValue::as_int_map) {
            Some(map) => {
                ValueHistogram::from_counts(map.into_iter().map(|(k, v)| (k, v.max(0) as u64)))
            }
            None => self.own_histogram(key, na),
        }
    }

    /// Merges `other` into `self`: counts add up, qualities are dropped,
    /// `merged_<key>` histograms accumulate for each key in `stats_on`, and only
    /// annotations identical on both sides survive.
    pub fn merge(&mut self, other: &BioSequence, na: &str, stats_on: &[String]) {
        self.qualities = None;
        let count = self.count() + other.count();

        for key in stats_on {
            let theirs = other.stats_snapshot(key, na);
            self.stats_on(key, na).merge_from(&theirs);
        }

        let kept_merged: Vec<String> = stats_on.iter().map(|k| format!("merged_{}", k)).collect();
        self.annotations.retain(|key, value| {
            key == "count"
                || kept_merged.iter().any(|k| k == key)
                || other.annotations.get(key) == Some(value)
        });
        self.set_count(count);
    }

    /// Non in-place variant of [`merge`](Self::merge).
    pub fn merged(&self, other: &BioSequence, na: &str, stats_on: &[String]) -> BioSequence {
        let mut copy = self.clone();
        copy.merge(other, na, stats_on);
        copy
    }

    /// Releases the record's byte buffers back into `pool`.
    pub fn recycle(self, pool: &BufferPool) {
        pool.put(self.sequence);
        if let Some(q) = self.qualities {
            pool.put(q);
        }
        if let Some(f) = self.features {
            pool.put(f);
        }
    }
}

/// Two records are equal when their content is; `source` and pairing are
/// transport metadata and do not take part in the comparison.
impl PartialEq for BioSequence {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.definition == other.definition
            && self.sequence == other.sequence
            && self.qualities == other.qualities
            && self.features == other.features
            && self.annotations == other.annotations
    }
}

/// Complements both nucleotides of a `(x:qq)->(y:qq)` mismatch key.
fn complement_mismatch_key(key: &str, complement: fn(u8) -> u8) -> String {
    let mut out = Vec::with_capacity(key.len());
    let mut after_paren = false;
    for &b in key.as_bytes() {
        if after_paren && b.is_ascii_alphabetic() {
            out.push(complement(b));
        } else {
            out.push(b);
        }
        after_paren = b == b'(';
    }
    String::from_utf8(out).unwrap_or_else(|_| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_lowercases() {
        let seq = BioSequence::new("s1", "ACgtN", "first");
        assert_eq!(seq.sequence(), b"acgtn");
        assert_eq!(seq.definition(), "first");
        assert_eq!(seq.count(), 1);
        assert_eq!(seq.taxid(), "NA");
    }

    #[test]
    fn test_qualities_length_checked() {
        let mut seq = BioSequence::new("s1", "acgt", "");
        assert!(seq.set_qualities(vec![30, 30, 30]).is_err());
        assert!(seq.set_qualities(vec![30, 30, 30, 10]).is_ok());
        seq.set_sequence("acg");
        assert!(!seq.has_qualities());
    }

    #[test]
    fn test_composition() {
        let seq = BioSequence::new("s1", "AacgTTn-", "");
        assert_eq!(
            seq.composition(),
            Composition { a: 2, c: 1, g: 1, t: 2, other: 2 }
        );
    }

    #[test]
    fn test_md5_matches_residues() {
        let seq = BioSequence::new("s1", "ACGT", "");
        assert_eq!(seq.md5(), md5::compute(b"acgt").0);
        assert_eq!(seq.md5_hex().len(), 32);
    }

    #[test]
    fn test_subsequence_linear() {
        let qualities = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let mut seq = BioSequence::with_qualities("s1", "acgtacgt", qualities, "d").unwrap();
        seq.set_attribute("sample", "x");
        let sub = seq.subsequence(2, 5, false).unwrap();
        assert_eq!(sub.sequence(), b"gta");
        assert_eq!(sub.qualities(), Some(&[3u8, 4, 5][..]));
        assert_eq!(sub.id(), "s1_sub[3..5]");
        assert_eq!(sub.get_string_attribute("sample").as_deref(), Some("x"));

        assert!(seq.subsequence(5, 2, false).is_err());
        assert!(seq.subsequence(0, 9, false).is_err());
    }

    #[test]
    fn test_subsequence_circular() {
        let seq = BioSequence::new("s1", "acgtacgg", "");
        let sub = seq.subsequence(6, 2, true).unwrap();
        assert_eq!(sub.sequence(), b"ggac");
    }

    #[test]
    fn test_subsequence_shifts_pairing_mismatches() {
        let mut seq = BioSequence::new("s1", "acgtacgt", "");
        let mut mm = IndexMap::new();
        mm.insert("(a:30)->(g:12)".to_string(), 2i64);
        mm.insert("(c:30)->(t:12)".to_string(), 6i64);
        seq.set_attribute(PAIRING_MISMATCHES, AnnotationValue::IntMap(mm));

        let sub = seq.subsequence(3, 8, false).unwrap();
        let shifted = sub.get_int_map_attribute(PAIRING_MISMATCHES).unwrap();
        assert_eq!(shifted.len(), 1);
        assert_eq!(shifted["(c:30)->(t:12)"], 3);
    }

    #[test]
    fn test_reverse_complement() {
        let seq = BioSequence::with_qualities("s1", "aacg", vec![1, 2, 3, 4], "").unwrap();
        let rc = seq.reverse_complement();
        assert_eq!(rc.sequence(), b"cgtt");
        assert_eq!(rc.qualities(), Some(&[4u8, 3, 2, 1][..]));
        assert_eq!(seq.sequence(), b"aacg");
        assert_eq!(rc.reverse_complement(), seq);
    }

    #[test]
    fn test_reverse_complement_rewrites_mismatches() {
        let mut seq = BioSequence::new("s1", "aacgt", "");
        let mut mm = IndexMap::new();
        mm.insert("(a:30)->(g:12)".to_string(), 2i64);
        seq.set_attribute(PAIRING_MISMATCHES, AnnotationValue::IntMap(mm));
        seq.reverse_complement_in_place();
        let rewritten = seq.get_int_map_attribute(PAIRING_MISMATCHES).unwrap();
        assert_eq!(rewritten["(t:30)->(c:12)"], 4);
    }

    #[test]
    fn test_join() {
        let mut a = BioSequence::with_qualities("a", "ac", vec![1, 2], "").unwrap();
        a.set_attribute("k", 1i64);
        let b = BioSequence::with_qualities("b", "gt", vec![3, 4], "").unwrap();
        let joined = a.join(&b, true);
        assert_eq!(joined.sequence(), b"acgt");
        assert_eq!(joined.qualities(), Some(&[1u8, 2, 3, 4][..]));
        assert!(joined.has_attribute("k"));
        assert!(!a.join(&b, false).has_attribute("k"));
    }

    #[test]
    fn test_merge() {
        let mut a = BioSequence::with_qualities("a", "acgt", vec![1; 4], "").unwrap();
        a.set_attribute("sample", "s1");
        a.set_attribute("primer", "p");
        a.set_attribute("run", "r1");
        let mut b = BioSequence::new("b", "acgt", "");
        b.set_attribute("sample", "s2");
        b.set_attribute("primer", "p");
        b.set_attribute("run", "r2");
        b.set_count(3);

        a.merge(&b, "NA", &["sample".to_string()]);
        assert_eq!(a.count(), 4);
        assert!(!a.has_qualities());
        assert!(a.has_attribute("primer"));
        assert!(!a.has_attribute("run"));
        let merged = a.get_int_map_attribute("merged_sample").unwrap();
        assert_eq!(merged["s1"], 1);
        assert_eq!(merged["s2"], 3);

        let c = BioSequence::new("c", "acgt", "");
        a.merge(&c, "NA", &["sample".to_string()]);
        let merged = a.get_int_map_attribute("merged_sample").unwrap();
        assert_eq!(merged["NA"], 1);
        assert_eq!(a.count(), 5);
    }

    #[test]
    fn test_recycle_returns_buffers() {
        let pool = BufferPool::new();
        let seq = BioSequence::with_qualities("a", "acgt", vec![1; 4], "").unwrap();
        seq.recycle(&pool);
        assert_eq!(pool.len(), 2);
        let buf = pool.get(16);
        assert!(buf.is_empty());
    }
}
