//! K-mer indexing, suffix arrays and micro-assembly.

use obikit::assembly::{consensus, ConsensusOptions, DeBruijnGraph, DEFAULT_PATH_BUDGET};
use obikit::formats::{read_paired, ReaderOptions};
use obikit::kmer::{encode, KmerMap, SuffixArray};
use obikit::BioSequence;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

const REFERENCES: [&str; 3] = [
    "gcaggtggcgtgaagagtactcggcaaacatgacggggactagacgactggaagcagttgcgactttagtgccatacgtccttggcataggatgcgcatacagggcatgagatccctaca",
    "agaattagcgtgggaggcgtagagcgtgttgacgtccaaatattaaatggtcgaacgttggggccctaactagcgaggcagcggtggcggccttcgggcactgcaagttaggatgtgtat",
    "tttgattccctgacgctttacgtgctttcgcgttcactattcagaccccgcgccgctgactgcctttcttagtgcaggttatccctaactttgacctcgtctcaggcacccaaggcacac",
];

fn references() -> Vec<BioSequence> {
    REFERENCES
        .iter()
        .enumerate()
        .map(|(i, s)| BioSequence::new(format!("ref{}", i), *s, ""))
        .collect()
}

#[test]
fn test_kmer_map_finds_source_and_offset() {
    let map = KmerMap::<u64>::build(&references(), 11, false, 10).unwrap();

    let query = BioSequence::new("q", &REFERENCES[1][30..90], "");
    let matches = map.query(&query);
    assert_eq!(matches.len(), 1);
    let best = matches.best().unwrap();
    assert_eq!(best.record, 1);
    assert_eq!(best.count(), 50);
    assert!(!best.is_reverse());
    assert_eq!(best.best_offset(), Some(30));

    let query = BioSequence::new("q", &REFERENCES[2][10..70], "").reverse_complement();
    let best_match = map.query(&query);
    let best = best_match.best().unwrap();
    assert_eq!(best.record, 2);
    assert!(best.is_reverse());
    assert_eq!(best.best_offset(), Some(10));
}

#[test]
fn test_heaviest_path_through_repeat() {
    let mut graph = DeBruijnGraph::new(4).unwrap();
    graph.push(b"acgtacgtg");
    assert_eq!(graph.weight(encode::<u64>(b"acgt").unwrap()), 2);
    let starts = [encode::<u64>(b"acg").unwrap()];
    let stops = [encode::<u64>(b"gtg").unwrap()];
    let path = graph.heaviest_path(&starts, &stops, false, DEFAULT_PATH_BUDGET).unwrap();
    assert_eq!(graph.decode(&path), b"acgtacgtg");
}

proptest! {
    #[test]
    fn suffix_array_is_sorted(seqs in prop::collection::vec("[acgt]{0,40}", 1..5)) {
        let bytes: Vec<&[u8]> = seqs.iter().map(|s| s.as_bytes()).collect();
        let sa = SuffixArray::build(&bytes);
        let total: usize = bytes.iter().map(|s| s.len()).sum();
        prop_assert_eq!(sa.len(), total);
        for (i, pair) in sa.suffixes.windows(2).enumerate() {
            let a = &bytes[pair[0].record as usize][pair[0].position as usize..];
            let b = &bytes[pair[1].record as usize][pair[1].position as usize..];
            prop_assert!(a <= b);
            let lcp = a.iter().zip(b).take_while(|(x, y)| x == y).count();
            prop_assert_eq!(sa.common[i], lcp);
        }
    }
}

const FORWARD: &str = "gggcaatcctgagccaa";
const REVERSE: &str = "ccattgagtctctgcacc";
const INSERT: &str = "tgcaagtcgatcctgaaacgttagcctacggatttcaggcatgaca";

#[test]
fn test_consensus_from_paired_files() {
    let reverse_site = BioSequence::new("p", REVERSE, "").reverse_complement();
    let amplicon = format!("{}{}{}", FORWARD, INSERT, reverse_site.string());
    let mate = BioSequence::new("m", amplicon.clone(), "").reverse_complement().string();

    let dir = TempDir::new().unwrap();
    let forward_path = dir.path().join("reads_R1.fasta");
    let reverse_path = dir.path().join("reads_R2.fasta");
    let mut r1 = String::new();
    let mut r2 = String::new();
    for i in 0..4 {
        r1.push_str(&format!(">r{}\nac{}tt\n", i, amplicon));
        r2.push_str(&format!(">r{}\nga{}cc\n", i, mate));
    }
    fs::write(&forward_path, r1).unwrap();
    fs::write(&reverse_path, r2).unwrap();

    let input = read_paired(
        forward_path.to_str().unwrap(),
        reverse_path.to_str().unwrap(),
        &ReaderOptions::default(),
    )
    .unwrap();
    let out = consensus(input, None, &ConsensusOptions::new(FORWARD, REVERSE)).load();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].string(), amplicon);
    assert_eq!(out[0].count(), 8);
    assert_eq!(out[0].get_int_attribute("obiconsensus_kmer_size"), Some(9));
}
