use crate::bio::{AnnotationValue, BioSequence};
use crate::pipeline::BioSequenceIter;
use crate::taxonomy::{weighted_lca, Taxon, Taxonomy};
use crate::{ObiError, Result};
use std::sync::Arc;
use tracing::warn;

/// Annotation holding the taxid histogram of merged observations.
pub const MERGED_TAXID: &str = "merged_taxid";

impl BioSequence {
    /// Resolves the `taxid` annotation; `None` when absent or unknown.
    pub fn taxon<'a>(&self, taxonomy: &'a Taxonomy) -> Option<Taxon<'a>> {
        let taxid = self.taxid();
        if taxid == "NA" {
            return None;
        }
        taxonomy.taxon(&taxid).ok().map(|(t, _)| t)
    }

    /// Stores the canonical form of `taxid`.
    ///
    /// An unknown identifier is an error when `strict` is set; otherwise it
    /// is logged and the record is tagged `NA`.
    pub fn set_taxid(&mut self, taxid: &str, taxonomy: &Taxonomy, strict: bool) -> Result<()> {
        match taxonomy.taxon(taxid) {
            Ok((taxon, _)) => {
                self.set_attribute("taxid", taxon.string());
                Ok(())
            }
            Err(err) if strict => Err(err),
            Err(err) => {
                warn!("{}: {}", self.id(), err);
                self.set_attribute("taxid", "NA");
                Ok(())
            }
        }
    }

    /// Writes the `taxonomic_path` annotation, root first.
    pub fn set_path(&mut self, taxonomy: &Taxonomy) -> Result<()> {
        let taxon = self.require_taxon(taxonomy)?;
        let path: Vec<String> = taxon.path().iter().map(Taxon::string).collect();
        self.set_attribute("taxonomic_path", path);
        Ok(())
    }

    /// Writes `<rank>_taxid` and `<rank>_name` for the ancestor at `rank`,
    /// `NA` when the lineage has no such rank.
    pub fn set_taxid_at_rank(&mut self, taxonomy: &Taxonomy, rank: &str) -> Result<Option<String>> {
        let taxon = self.require_taxon(taxonomy)?;
        let ancestor = taxon.taxon_at_rank(rank);
        let (taxid, name) = match ancestor {
            Some(a) => (a.string(), a.scientific_name().unwrap_or("NA").to_string()),
            None => ("NA".to_string(), "NA".to_string()),
        };
        self.set_attribute(format!("{}_taxid", rank), taxid);
        self.set_attribute(format!("{}_name", rank), name);
        Ok(ancestor.map(|a| a.string()))
    }

    fn require_taxon<'a>(&self, taxonomy: &'a Taxonomy) -> Result<Taxon<'a>> {
        let taxid = self.taxid();
        taxonomy
            .taxon(&taxid)
            .map(|(t, _)| t)
            .map_err(|_| ObiError::Taxonomy(format!("{}: taxid {} is unknown", self.id(), taxid)))
    }
}

/// Replaces the `merged_taxid` histogram of `record` by its weighted LCA.
///
/// Writes `taxid`, `lca_purity` and `lca_weight`. Records without the
/// histogram pass through unchanged.
pub fn annotate_lca(
    record: &mut BioSequence,
    taxonomy: &Taxonomy,
    threshold: f64,
    strict: bool,
) -> Result<()> {
    let Some(histogram) = record.get_int_map_attribute(MERGED_TAXID) else {
        return Ok(());
    };
    let mut weights = Vec::with_capacity(histogram.len());
    for (taxid, count) in histogram {
        if taxid == "NA" {
            continue;
        }
        match taxonomy.taxon(&taxid) {
            Ok((taxon, _)) => weights.push((taxon, count.max(0) as u64)),
            Err(err) if strict => return Err(err),
            Err(err) => warn!("{}: {}", record.id(), err),
        }
    }

    let lca = weighted_lca(&weights, threshold);
    let taxid = lca.taxon.map_or_else(|| "NA".to_string(), |t| t.string());
    record.set_attribute("taxid", taxid);
    record.set_attribute("lca_purity", AnnotationValue::Float(lca.purity));
    record.set_attribute("lca_weight", AnnotationValue::Int(lca.weight as i64));
    Ok(())
}

/// Stage running [`annotate_lca`] over every record.
pub fn lca_annotate(
    input: BioSequenceIter,
    taxonomy: Arc<Taxonomy>,
    threshold: f64,
    strict: bool,
    workers: usize,
) -> BioSequenceIter {
    input.make_worker(
        move |mut record| {
            annotate_lca(&mut record, &taxonomy, threshold, strict)?;
            Ok(vec![record])
        },
        strict,
        workers,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::ValueHistogram;
    use crate::taxonomy::testing::sample;
    use pretty_assertions::assert_eq;

    fn record(taxid: &str) -> BioSequence {
        let mut s = BioSequence::new("r1", b"acgt".to_vec(), "");
        s.set_attribute("taxid", taxid);
        s
    }

    #[test]
    fn test_taxon_resolution() {
        let t = sample();
        assert_eq!(record("3").taxon(&t).unwrap().id(), "3");
        assert!(record("42").taxon(&t).is_none());
        assert!(BioSequence::new("x", b"a".to_vec(), "").taxon(&t).is_none());
    }

    #[test]
    fn test_set_taxid_lenient_and_strict() {
        let t = sample();
        let mut s = record("3");
        s.set_taxid("2", &t, false).unwrap();
        assert_eq!(s.taxid(), "taxon:2 [A]@genus");

        s.set_taxid("42", &t, false).unwrap();
        assert_eq!(s.taxid(), "NA");
        assert!(matches!(s.set_taxid("42", &t, true), Err(ObiError::Taxonomy(_))));
    }

    #[test]
    fn test_path_and_rank() {
        let t = sample();
        let mut s = record("4");
        s.set_path(&t).unwrap();
        assert_eq!(
            s.get_attribute("taxonomic_path"),
            Some(&AnnotationValue::StrVec(vec![
                "taxon:1@no rank".to_string(),
                "taxon:2 [A]@genus".to_string(),
                "taxon:4@species".to_string(),
            ]))
        );

        let genus = s.set_taxid_at_rank(&t, "genus").unwrap();
        assert_eq!(genus.as_deref(), Some("taxon:2 [A]@genus"));
        assert_eq!(s.get_string_attribute("genus_name").as_deref(), Some("A"));
        assert_eq!(s.set_taxid_at_rank(&t, "family").unwrap(), None);
        assert_eq!(s.get_string_attribute("family_taxid").as_deref(), Some("NA"));

        assert!(record("42").set_path(&t).is_err());
    }

    #[test]
    fn test_annotate_lca() {
        let t = sample();
        let mut s = BioSequence::new("r1", b"acgt".to_vec(), "");
        s.set_attribute(
            MERGED_TAXID,
            ValueHistogram::from_counts([
                ("3".to_string(), 7),
                ("4".to_string(), 2),
                ("5".to_string(), 1),
            ]),
        );
        annotate_lca(&mut s, &t, 0.8, false).unwrap();
        assert_eq!(s.taxid(), "taxon:2 [A]@genus");
        assert_eq!(s.get_int_attribute("lca_weight"), Some(10));
        assert!((s.get_float_attribute("lca_purity").unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_lca_stage() {
        let taxonomy = Arc::new(sample());
        let mut records = Vec::new();
        for i in 0..5 {
            let mut s = BioSequence::new(format!("r{}", i), b"acgt".to_vec(), "");
            s.set_attribute(
                MERGED_TAXID,
                ValueHistogram::from_counts([("3".to_string(), 1), ("42".to_string(), 3)]),
            );
            records.push(s);
        }
        let input = BioSequenceIter::from_records(records, 2, "test");
        let out = lca_annotate(input, taxonomy, 0.9, false, 2).load();
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|s| s.taxid() == "taxon:3@species"));
    }
}
