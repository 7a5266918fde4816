use crate::bio::{AnnotationValue, BioSequence};
use crate::formats::ParseOptions;
use crate::{ObiError, Result};

/// Field count of an ecoPCR v1 line.
const V1_FIELDS: usize = 20;
/// Version 2 adds the melting temperatures of both primers.
const V2_FIELDS: usize = 22;

/// Placeholder of the tool for absent values.
const MISSING: &str = "###";

#[derive(Clone, Copy)]
enum Kind {
    Int,
    Float,
    Str,
}

const RANK_COLUMNS: [(&str, Kind); 12] = [
    ("taxid", Kind::Int),
    ("rank", Kind::Str),
    ("species_taxid", Kind::Int),
    ("species_name", Kind::Str),
    ("genus_taxid", Kind::Int),
    ("genus_name", Kind::Str),
    ("family_taxid", Kind::Int),
    ("family_name", Kind::Str),
    ("superkingdom_taxid", Kind::Int),
    ("superkingdom_name", Kind::Str),
    ("strand", Kind::Str),
    ("forward_match", Kind::Str),
];

fn typed(value: &str, kind: Kind) -> Option<AnnotationValue> {
    if value.is_empty() || value == MISSING {
        return None;
    }
    Some(match kind {
        Kind::Int => match value.parse::<i64>() {
            Ok(v) => AnnotationValue::Int(v),
            Err(_) => AnnotationValue::Str(value.to_string()),
        },
        Kind::Float => match value.parse::<f64>() {
            Ok(v) => AnnotationValue::Float(v),
            Err(_) => AnnotationValue::Str(value.to_string()),
        },
        Kind::Str => AnnotationValue::Str(value.to_string()),
    })
}

fn parse_line(line: &str, options: &ParseOptions, offset: usize) -> Result<BioSequence> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    let tail: Vec<(&str, Kind)> = match fields.len() {
        V1_FIELDS => vec![
            ("forward_error", Kind::Int),
            ("reverse_match", Kind::Str),
            ("reverse_error", Kind::Int),
            ("amplicon_length", Kind::Int),
        ],
        V2_FIELDS => vec![
            ("forward_error", Kind::Int),
            ("forward_tm", Kind::Float),
            ("reverse_match", Kind::Str),
            ("reverse_error", Kind::Int),
            ("reverse_tm", Kind::Float),
            ("amplicon_length", Kind::Int),
        ],
        n => {
            return Err(ObiError::parse(
                &options.source,
                offset,
                format!("ecoPCR line with {} fields, expected {} or {}", n, V1_FIELDS, V2_FIELDS),
            ))
        }
    };
    let id = fields[0];
    if id.is_empty() {
        return Err(ObiError::parse(&options.source, offset, "ecoPCR line without identifier"));
    }
    let n = fields.len();
    let mut record = BioSequence::new(id, fields[n - 2].as_bytes(), fields[n - 1]);

    // fields[1] is the length of the full source sequence
    let columns = RANK_COLUMNS.iter().chain(tail.iter());
    for ((key, kind), value) in columns.zip(fields[2..n - 2].iter()) {
        if let Some(v) = typed(value, *kind) {
            record.set_attribute(*key, v);
        }
    }
    record.set_source(options.source.clone());
    Ok(record)
}

/// Parses a chunk of ecoPCR result lines. Lines starting with `#` are comments.
pub fn parse(raw: &[u8], options: &ParseOptions) -> Result<Vec<BioSequence>> {
    let text = String::from_utf8_lossy(raw);
    let mut records = Vec::new();
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        records.push(parse_line(line, options, start)?);
    }
    Ok(records)
}
