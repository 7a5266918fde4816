use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use obikit::formats::{parse_bytes, Format, ParseOptions};
use obikit::kmer::KmerMap;
use obikit::BioSequence;
use std::hint::black_box;

fn residues(i: usize, len: usize) -> String {
    let bases = b"acgt";
    (0..len)
        .map(|j| bases[(i * 7 + j * j + j / 3) % 4] as char)
        .collect()
}

fn generate_fasta(num_sequences: usize, seq_length: usize) -> Vec<u8> {
    let mut content = String::new();
    for i in 0..num_sequences {
        content.push_str(&format!(">seq_{} count={}; sample=s{};\n", i, i % 10 + 1, i % 3));
        let seq = residues(i, seq_length);
        for line in seq.as_bytes().chunks(60) {
            content.push_str(std::str::from_utf8(line).unwrap_or_default());
            content.push('\n');
        }
    }
    content.into_bytes()
}

fn generate_fastq(num_sequences: usize, seq_length: usize) -> Vec<u8> {
    let mut content = String::new();
    for i in 0..num_sequences {
        content.push_str(&format!("@read_{} sample=s{};\n", i, i % 3));
        content.push_str(&residues(i, seq_length));
        content.push_str("\n+\n");
        content.push_str(&"I".repeat(seq_length));
        content.push('\n');
    }
    content.into_bytes()
}

fn bench_fasta_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing/fasta");
    let options = ParseOptions::default();
    for num_seqs in [100, 1000, 10000] {
        let content = generate_fasta(num_seqs, 250);
        group.throughput(Throughput::Bytes(content.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(num_seqs), &content, |b, content| {
            b.iter(|| black_box(parse_bytes(Format::Fasta, content, &options).unwrap()));
        });
    }
    group.finish();
}

fn bench_fastq_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing/fastq");
    let options = ParseOptions::default();
    for num_seqs in [100, 1000, 10000] {
        let content = generate_fastq(num_seqs, 150);
        group.throughput(Throughput::Bytes(content.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(num_seqs), &content, |b, content| {
            b.iter(|| black_box(parse_bytes(Format::Fastq, content, &options).unwrap()));
        });
    }
    group.finish();
}

fn bench_kmer_indexing(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmer/index");
    let references: Vec<BioSequence> = (0..500)
        .map(|i| BioSequence::new(format!("ref{}", i), residues(i, 400), ""))
        .collect();
    for k in [11, 21, 31] {
        group.bench_with_input(BenchmarkId::from_parameter(k), &k, |b, &k| {
            b.iter(|| black_box(KmerMap::<u64>::build(&references, k, false, 100).unwrap()));
        });
    }

    let map = KmerMap::<u64>::build(&references, 15, false, 100).unwrap();
    let query = BioSequence::new("q", residues(42, 400), "");
    group.bench_function("query/15", |b| b.iter(|| black_box(map.query(&query))));
    group.finish();
}

criterion_group!(benches, bench_fasta_parsing, bench_fastq_parsing, bench_kmer_indexing);
criterion_main!(benches);
