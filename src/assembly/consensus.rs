//! Primer-anchored micro-assembly of amplicon reads.
//!
//! Paired reads are brought onto the forward strand, cut between their
//! primers and threaded into a de Bruijn graph. The heaviest path between
//! the primer-anchored nodes spells the consensus. When the graph keeps a
//! cycle the k-mer size grows until it does not.

use crate::assembly::debruijn::{DeBruijnGraph, DEFAULT_PATH_BUDGET};
use crate::assembly::primer::{locate, PrimerMatch};
use crate::bio::iupac::reverse_complement;
use crate::bio::{BioSequence, BioSequenceBatch};
use crate::kmer::longest_repeat;
use crate::pipeline::distribute::AnnotationClassifier;
use crate::pipeline::{spawn_closer, BioSequenceIter};
use crate::{ObiError, Result};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

pub const CONSENSUS: &str = "obiconsensus_consensus";
pub const WEIGHT: &str = "obiconsensus_weight";
pub const KMER_SIZE: &str = "obiconsensus_kmer_size";
pub const KMER_MAX_OCCUR: &str = "obiconsensus_kmer_max_occur";
pub const FILTERED_GRAPH_SIZE: &str = "obiconsensus_filtered_graph_size";
pub const FULL_GRAPH_SIZE: &str = "obiconsensus_full_graph_size";
pub const FORWARD_MATCH: &str = "obiconsensus_forward_match";
pub const FORWARD_ERROR: &str = "obiconsensus_forward_error";
pub const REVERSE_MATCH: &str = "obiconsensus_reverse_match";
pub const REVERSE_ERROR: &str = "obiconsensus_reverse_error";

/// Largest k-mer size tried on the 64-bit code path.
pub const MAX_KMER_SIZE: usize = 31;

#[derive(Debug, Clone)]
pub struct ConsensusOptions {
    pub forward_primer: Vec<u8>,
    pub reverse_primer: Vec<u8>,
    /// Edits allowed when matching primers, also used as the mismatch
    /// bound when anchoring graph nodes.
    pub max_primer_errors: usize,
    /// Initial k-mer size; derived from the longest read repeat when `None`.
    pub kmer_size: Option<usize>,
    pub max_kmer_size: usize,
    /// Length of the bridge primers cut from the consensus ends.
    pub bridge_length: usize,
    pub path_budget: usize,
    /// Identifier given to the consensus record.
    pub id: String,
}

impl Default for ConsensusOptions {
    fn default() -> Self {
        Self {
            forward_primer: Vec::new(),
            reverse_primer: Vec::new(),
            max_primer_errors: 2,
            kmer_size: None,
            max_kmer_size: MAX_KMER_SIZE,
            bridge_length: 12,
            path_budget: DEFAULT_PATH_BUDGET,
            id: "consensus".to_string(),
        }
    }
}

impl ConsensusOptions {
    pub fn new(forward_primer: &str, reverse_primer: &str) -> Self {
        Self {
            forward_primer: forward_primer.to_ascii_lowercase().into_bytes(),
            reverse_primer: reverse_primer.to_ascii_lowercase().into_bytes(),
            ..Default::default()
        }
    }
}

/// Forward-strand residues of a read with the count it stands for.
#[derive(Debug, Clone)]
struct Read {
    residues: Vec<u8>,
    weight: u32,
}

fn oriented_reads(pairs: &[(BioSequence, Option<BioSequence>)]) -> Vec<Read> {
    let mut reads = Vec::with_capacity(pairs.len() * 2);
    for (forward, reverse) in pairs {
        let weight = forward.count().min(u32::MAX as u64) as u32;
        reads.push(Read {
            residues: forward.sequence().to_vec(),
            weight,
        });
        if let Some(reverse) = reverse {
            reads.push(Read {
                residues: reverse_complement(reverse.sequence()),
                weight,
            });
        }
    }
    reads
}

/// Region of `read` between the primer matches, primers included.
fn cut(read: &[u8], forward: &[u8], reverse_rc: &[u8], max_errors: usize) -> Option<Vec<u8>> {
    let f = locate(forward, read, max_errors);
    let r = locate(reverse_rc, read, max_errors);
    let region = match (f, r) {
        (Some(f), Some(r)) if f.start < r.end => &read[f.start..r.end],
        (Some(f), None) => &read[f.start..],
        (None, Some(r)) => &read[..r.end],
        _ => return None,
    };
    Some(region.to_vec())
}

struct Assembly {
    residues: Vec<u8>,
    k: usize,
    max_occurrence: u32,
    filtered_size: usize,
    full_size: usize,
}

/// Builds the graph at `k`, filters it and returns `None` when a cycle remains.
fn assemble_at(
    reads: &IndexMap<Vec<u8>, u32>,
    k: usize,
    forward: &[u8],
    reverse_rc: &[u8],
    options: &ConsensusOptions,
) -> Result<Option<Assembly>> {
    let mut graph = DeBruijnGraph::new(k)?;
    for (residues, &weight) in reads {
        graph.push_weighted(residues, weight);
    }
    let full_size = graph.len();
    let min_weight = graph.mean_weight().ceil() as u32;
    let max_weight = graph.max_weight().saturating_mul(2);
    graph.filter_min_weight(min_weight);
    graph.filter_max_weight(max_weight);
    if graph.has_cycle() {
        debug!("k={}: cycle left after filtering {} edges down to {}", k, full_size, graph.len());
        return Ok(None);
    }
    let mut starts = graph.search(forward, options.max_primer_errors);
    if starts.is_empty() {
        starts = graph.sources();
    }
    let mut stops = graph.back_search(reverse_rc, options.max_primer_errors);
    if stops.is_empty() {
        stops = graph.sinks();
    }
    let path = graph.heaviest_path(&starts, &stops, false, options.path_budget)?;
    Ok(Some(Assembly {
        residues: graph.decode(&path),
        k,
        max_occurrence: graph.max_weight(),
        filtered_size: graph.len(),
        full_size,
    }))
}

/// Reads overlapping the ends of `consensus`, cut from the bridge match to
/// the reverse primer or the read end.
fn regather(
    all_reads: &[Read],
    consensus: &[u8],
    reverse_rc: &[u8],
    options: &ConsensusOptions,
) -> Vec<(Vec<u8>, u32)> {
    let n = options.bridge_length.min(consensus.len());
    let bridges = [&consensus[..n], &consensus[consensus.len() - n..]];
    let mut gathered = Vec::new();
    for read in all_reads {
        let Some(start) = bridges
            .iter()
            .filter_map(|b| locate(b, &read.residues, options.max_primer_errors))
            .map(|m| m.start)
            .min()
        else {
            continue;
        };
        let end = locate(reverse_rc, &read.residues, options.max_primer_errors)
            .map(|m| m.end)
            .filter(|&end| end > start)
            .unwrap_or(read.residues.len());
        gathered.push((read.residues[start..end].to_vec(), read.weight));
    }
    gathered
}

fn annotate_primer(
    record: &mut BioSequence,
    residues: &[u8],
    found: Option<PrimerMatch>,
    key: &str,
    error_key: &str,
) {
    if let Some(m) = found {
        record.set_attribute(key, String::from_utf8_lossy(&residues[m.start..m.end]).into_owned());
        record.set_attribute(error_key, m.errors);
    }
}

/// Runs the micro-assembly over forward reads and their optional mates.
pub fn micro_assemble(
    pairs: &[(BioSequence, Option<BioSequence>)],
    options: &ConsensusOptions,
) -> Result<BioSequence> {
    let forward = options.forward_primer.as_slice();
    let reverse_rc = reverse_complement(&options.reverse_primer);
    let all_reads = oriented_reads(pairs);

    let mut reads: IndexMap<Vec<u8>, u32> = IndexMap::new();
    for read in &all_reads {
        if let Some(region) = cut(&read.residues, forward, &reverse_rc, options.max_primer_errors) {
            *reads.entry(region).or_default() += read.weight;
        }
    }
    if reads.is_empty() {
        return Err(ObiError::Graph(format!("{}: no read carries a primer", options.id)));
    }

    let mut k = match options.kmer_size {
        Some(k) => k,
        None => {
            let residues: Vec<&[u8]> = reads.keys().map(|r| r.as_slice()).collect();
            longest_repeat(&residues) + 1
        }
    }
    .max(2);
    let mut bridged = false;

    loop {
        if k > options.max_kmer_size {
            return Err(ObiError::Graph(format!(
                "{}: cycles remain up to k={}",
                options.id, options.max_kmer_size
            )));
        }
        let Some(assembly) = assemble_at(&reads, k, forward, &reverse_rc, options)? else {
            k += 1;
            bridged = false;
            continue;
        };

        let forward_match = locate(forward, &assembly.residues, options.max_primer_errors);
        let reverse_match = locate(&reverse_rc, &assembly.residues, options.max_primer_errors);
        if forward_match.is_some() && reverse_match.is_none() && !bridged {
            bridged = true;
            let before = reads.len();
            for (residues, weight) in
                regather(&all_reads, &assembly.residues, &reverse_rc, options)
            {
                reads.entry(residues).or_insert(weight);
            }
            if reads.len() > before {
                debug!("k={}: bridge primers gathered {} new reads", k, reads.len() - before);
                continue;
            }
        }

        let weight: u64 = reads.values().map(|&w| w as u64).sum();
        let mut record = BioSequence::new(options.id.clone(), assembly.residues.clone(), "");
        record.set_count(weight);
        record.set_attribute(CONSENSUS, true);
        record.set_attribute(WEIGHT, weight as i64);
        record.set_attribute(KMER_SIZE, assembly.k);
        record.set_attribute(KMER_MAX_OCCUR, assembly.max_occurrence as i64);
        record.set_attribute(FILTERED_GRAPH_SIZE, assembly.filtered_size);
        record.set_attribute(FULL_GRAPH_SIZE, assembly.full_size);
        annotate_primer(
            &mut record,
            &assembly.residues,
            forward_match,
            FORWARD_MATCH,
            FORWARD_ERROR,
        );
        annotate_primer(
            &mut record,
            &assembly.residues,
            reverse_match,
            REVERSE_MATCH,
            REVERSE_ERROR,
        );
        debug!("{}: consensus of {} residues at k={}", options.id, record.len(), assembly.k);
        return Ok(record);
    }
}

fn collect_pairs(input: BioSequenceIter) -> Vec<(BioSequence, Option<BioSequence>)> {
    let mut pairs = Vec::new();
    for batch in input {
        pairs.extend(batch.pairs().map(|(f, r)| (f.clone(), r.cloned())));
    }
    pairs
}

/// Builds one consensus per value of `group_by`, or a single one over the
/// whole stream. Groups that cannot be assembled are skipped with a warning.
pub fn consensus(
    input: BioSequenceIter,
    group_by: Option<&str>,
    options: &ConsensusOptions,
) -> BioSequenceIter {
    let Some(key) = group_by else {
        let out = BioSequenceIter::new();
        let producer = out.split();
        producer.add(1);
        let options = options.clone();
        thread::spawn(move || {
            match micro_assemble(&collect_pairs(input), &options) {
                Ok(record) => producer.push(BioSequenceBatch::new("consensus", 0, vec![record])),
                Err(err) => warn!("{}", err),
            }
            producer.done();
        });
        spawn_closer(&out);
        return out;
    };

    let dist = input.distribute(Box::new(AnnotationClassifier::new(key, "NA")));
    let out = BioSequenceIter::new();
    let counter = Arc::new(AtomicUsize::new(0));
    out.add(1);
    spawn_closer(&out);
    let producer = out.split();
    let options = options.clone();
    thread::spawn(move || {
        let mut groups = 0usize;
        for code in dist.news().iter() {
            let Some(group) = dist.outputs(code) else {
                continue;
            };
            groups += 1;
            let mut options = options.clone();
            options.id = dist.value(code);
            producer.add(1);
            let handler = producer.split();
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                match micro_assemble(&collect_pairs(group), &options) {
                    Ok(record) => {
                        let order = counter.fetch_add(1, Ordering::SeqCst);
                        handler.push(BioSequenceBatch::new("consensus", order, vec![record]));
                    }
                    Err(err) => warn!("{}", err),
                }
                handler.done();
            });
        }
        info!("{} consensus groups", groups);
        producer.done();
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FORWARD: &str = "gggcaatcctgagccaa";
    const REVERSE: &str = "ccattgagtctctgcacc";
    const INSERT: &str = "tgcaagtcgatcctgaaacgttagcctacggatttcaggcatgaca";

    fn amplicon() -> String {
        let reverse_site = String::from_utf8(reverse_complement(REVERSE.as_bytes())).unwrap();
        format!("{}{}{}", FORWARD, INSERT, reverse_site)
    }

    fn pair(id: &str, forward: &str, reverse: &str) -> (BioSequence, Option<BioSequence>) {
        (BioSequence::new(id, forward, ""), Some(BioSequence::new(id, reverse, "")))
    }

    #[test]
    fn test_cut_between_primers() {
        let read = format!("tt{}aa", amplicon());
        let rc = reverse_complement(REVERSE.as_bytes());
        let region = cut(read.as_bytes(), FORWARD.as_bytes(), &rc, 0).unwrap();
        assert_eq!(region, amplicon().into_bytes());
        assert!(cut(b"cccccccccc", FORWARD.as_bytes(), &rc, 0).is_none());
    }

    #[test]
    fn test_micro_assembly_recovers_amplicon() {
        let amplicon = amplicon();
        let mate = String::from_utf8(reverse_complement(amplicon.as_bytes())).unwrap();
        let r1 = format!("ac{}tt", amplicon);
        let r2 = format!("ga{}cc", mate);
        let mut pairs: Vec<_> = (0..5).map(|i| pair(&format!("r{}", i), &r1, &r2)).collect();
        // one read with a substitution, filtered out by weight
        let mut faulty = amplicon.clone().into_bytes();
        faulty[40] = if faulty[40] == b'a' { b'c' } else { b'a' };
        pairs.push((BioSequence::new("e", faulty, ""), None));

        let record = micro_assemble(&pairs, &ConsensusOptions::new(FORWARD, REVERSE)).unwrap();
        assert_eq!(record.string(), amplicon);
        assert_eq!(record.get_bool_attribute(CONSENSUS), Some(true));
        assert_eq!(record.get_int_attribute(WEIGHT), Some(11));
        assert_eq!(record.count(), 11);
        assert_eq!(record.get_int_attribute(FORWARD_ERROR), Some(0));
        assert_eq!(record.get_int_attribute(REVERSE_ERROR), Some(0));
        assert_eq!(record.get_string_attribute(FORWARD_MATCH).as_deref(), Some(FORWARD));
        assert_eq!(record.get_int_attribute(KMER_SIZE), Some(9));
        let full = record.get_int_attribute(FULL_GRAPH_SIZE);
        assert!(full > record.get_int_attribute(FILTERED_GRAPH_SIZE));
    }

    #[test]
    fn test_reads_without_primers() {
        let pairs = vec![pair("r", "cccccccccc", "gggggggggg")];
        let err = micro_assemble(&pairs, &ConsensusOptions::new(FORWARD, REVERSE)).unwrap_err();
        assert!(matches!(err, ObiError::Graph(_)));
    }

    #[test]
    fn test_grouped_consensus() {
        let amplicon = amplicon();
        let mut records = Vec::new();
        for (i, sample) in ["s1", "s2", "s1"].iter().enumerate() {
            let mut r = BioSequence::new(format!("r{}", i), amplicon.clone(), "");
            r.set_attribute("sample", *sample);
            records.push(r);
        }
        let out = consensus(
            BioSequenceIter::from_records(records, 2, "m"),
            Some("sample"),
            &ConsensusOptions::new(FORWARD, REVERSE),
        );
        let mut ids: Vec<String> = out.load().iter().map(|r| r.id().to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["s1", "s2"]);
    }
}
