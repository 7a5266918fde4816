//! Stream runtime: ordering, workers, distribution and dereplication.

use obikit::pipeline::{dereplicate, AnnotationClassifier, UniqueOptions};
use obikit::{BioSequence, BioSequenceIter};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::thread;

fn numbered(n: usize) -> Vec<BioSequence> {
    (0..n)
        .map(|i| BioSequence::new(format!("r{}", i), "acgt", ""))
        .collect()
}

#[test]
fn test_sorted_stream_orders_are_contiguous() {
    let shuffled = BioSequenceIter::from_records(numbered(100), 3, "input")
        .make_worker(|s| Ok(vec![s]), false, 4)
        .sort_batches();
    let orders: Vec<usize> = shuffled.map(|b| b.order).collect();
    let expected: Vec<usize> = (0..orders.len()).collect();
    assert_eq!(orders, expected);
}

#[test]
fn test_worker_keeps_order_and_source() {
    let out = BioSequenceIter::from_records(numbered(30), 4, "input")
        .make_worker(
            |mut s| {
                s.set_attribute("seen", true);
                Ok(vec![s])
            },
            false,
            3,
        );
    let mut batches: Vec<_> = out.collect();
    batches.sort_by_key(|b| b.order);
    assert_eq!(batches.len(), 8);
    for (i, batch) in batches.iter().enumerate() {
        assert_eq!(batch.order, i);
        assert_eq!(batch.source, "input");
        assert!(batch.slice.iter().all(|s| s.get_bool_attribute("seen") == Some(true)));
    }
    assert_eq!(batches[1].slice[0].id(), "r4");
}

#[test]
fn test_distribute_by_tag() {
    let records: Vec<BioSequence> = (0..40)
        .map(|i| {
            let mut s = BioSequence::new(format!("r{}", i), "acgt", "");
            s.set_attribute("tag", if i % 3 == 0 { "x" } else { "y" });
            s
        })
        .collect();
    let dist = BioSequenceIter::from_records(records, 4, "input")
        .distribute(Box::new(AnnotationClassifier::new("tag", "NA")));

    let mut handles = Vec::new();
    let mut announced = Vec::new();
    for code in dist.news().iter() {
        let value = dist.value(code);
        announced.push(value.clone());
        let output = dist.outputs(code).unwrap();
        handles.push(thread::spawn(move || (value, output.load())));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let (tag, records) = handle.join().unwrap();
        assert!(seen.insert(tag.clone()));
        assert!(records
            .iter()
            .all(|s| s.get_string_attribute("tag").as_deref() == Some(tag.as_str())));
        let numbers: Vec<usize> = records.iter().map(|s| s.id()[1..].parse().unwrap()).collect();
        let mut sorted = numbers.clone();
        sorted.sort_unstable();
        assert_eq!(numbers, sorted);
        let expected = if tag == "x" { 14 } else { 26 };
        assert_eq!(records.len(), expected);
    }
    announced.sort();
    assert_eq!(announced, vec!["x".to_string(), "y".to_string()]);
}

#[test]
fn test_dereplicate_sums_counts() {
    let mut records = Vec::new();
    for i in 0..12 {
        let residues = if i % 2 == 0 { "acgtacgt" } else { "ttttgggg" };
        let mut s = BioSequence::new(format!("r{}", i), residues, "");
        s.set_attribute("sample", if i < 6 { "a" } else { "b" });
        records.push(s);
    }
    let options = UniqueOptions {
        stats_on: vec!["sample".to_string()],
        ..UniqueOptions::default()
    };
    let input = BioSequenceIter::from_records(records, 5, "input");
    let mut unique = dereplicate(input, &options).load();
    unique.sort_by(|a, b| a.sequence().cmp(b.sequence()));

    assert_eq!(unique.len(), 2);
    assert_eq!(unique[0].sequence(), b"acgtacgt");
    assert_eq!(unique[0].count(), 6);
    assert_eq!(unique[1].count(), 6);
    let samples = unique[0].get_int_map_attribute("merged_sample").unwrap();
    assert_eq!(samples.get("a"), Some(&3));
    assert_eq!(samples.get("b"), Some(&3));
}
