use crate::bio::{AnnotationValue, BioSequence};
use crate::formats::header::DEFINITION_KEY;
use crate::formats::{FormatOptions, ParseOptions};
use crate::{ObiError, Result};
use serde_json::{Map, Value};
use std::io::Read;

/// Opening of a JSON output array.
pub const PREAMBLE: &[u8] = b"[\n";
/// Separator written before every record but the first.
pub const SEPARATOR: &[u8] = b",\n";
/// Closing of a JSON output array.
pub const POSTAMBLE: &[u8] = b"\n]\n";

fn record_from_json(value: Value, options: &ParseOptions, index: usize) -> Result<BioSequence> {
    let Value::Object(mut object) = value else {
        return Err(ObiError::parse(&options.source, index, "JSON record is not an object"));
    };
    let id = match object.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        _ => return Err(ObiError::parse(&options.source, index, "JSON record without identifier")),
    };
    let sequence = match object.remove("sequence") {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    let mut record = BioSequence::new(id, sequence, "");
    if let Some(Value::String(q)) = object.remove("qualities") {
        record.set_qualities(
            q.bytes()
                .map(|b| b.saturating_sub(options.quality_shift))
                .collect(),
        )?;
    }
    if let Some(Value::Object(annotations)) = object.remove("annotations") {
        for (key, value) in annotations {
            if key == DEFINITION_KEY {
                if let Value::String(definition) = value {
                    record.set_definition(definition);
                    continue;
                }
            }
            record.set_attribute(key.clone(), AnnotationValue::from_json_for_key(&key, value));
        }
    }
    record.set_source(options.source.clone());
    Ok(record)
}

/// Reads a whole JSON array of records.
pub fn parse<R: Read>(reader: R, options: &ParseOptions) -> Result<Vec<BioSequence>> {
    let values = match serde_json::from_reader(reader)? {
        Value::Array(values) => values,
        single => vec![single],
    };
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| record_from_json(v, options, i))
        .collect()
}

pub fn record_to_json(record: &BioSequence, options: &FormatOptions) -> Value {
    let mut object = Map::new();
    object.insert("id".to_string(), Value::String(record.id().to_string()));
    if record.has_sequence() {
        object.insert("sequence".to_string(), Value::String(record.string()));
    }
    if let Some(q) = record.qualities() {
        let text: String = q
            .iter()
            .map(|v| v.saturating_add(options.quality_shift) as char)
            .collect();
        object.insert("qualities".to_string(), Value::String(text));
    }
    let mut annotations = Map::new();
    for (key, value) in record.annotations() {
        annotations.insert(key.clone(), value.to_json());
    }
    if record.has_definition() {
        annotations.insert(
            DEFINITION_KEY.to_string(),
            Value::String(record.definition().to_string()),
        );
    }
    if !annotations.is_empty() {
        object.insert("annotations".to_string(), Value::Object(annotations));
    }
    Value::Object(object)
}

/// Formats `records` as array elements. `first` tells whether the first of
/// them opens the array, in which case no separator precedes it.
pub fn format_records(
    records: &[BioSequence],
    options: &FormatOptions,
    first: bool,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(records.len() * 256);
    for (i, record) in records.iter().enumerate() {
        if !(first && i == 0) {
            out.extend_from_slice(SEPARATOR);
        }
        serde_json::to_writer_pretty(&mut out, &record_to_json(record, options))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn document(records: &[BioSequence]) -> Vec<u8> {
        let mut doc = PREAMBLE.to_vec();
        doc.extend(format_records(records, &FormatOptions::default(), true).unwrap());
        doc.extend_from_slice(POSTAMBLE);
        doc
    }

    #[test]
    fn test_roundtrip_scalar_annotations() {
        let mut a =
            BioSequence::with_qualities("a", "acgt", vec![30, 31, 32, 33], "first").unwrap();
        a.set_attribute("count", 3i64);
        a.set_attribute("score", 2.0);
        a.set_attribute("ok", true);
        a.set_attribute("sample", "s1");
        let b = BioSequence::new("b", "", "");
        let doc = document(&[a.clone(), b.clone()]);
        let parsed = parse(doc.as_slice(), &ParseOptions::default()).unwrap();
        assert_eq!(parsed, vec![a, b]);
    }

    #[test]
    fn test_layout() {
        let doc = document(&[BioSequence::new("a", "ac", "")]);
        let text = String::from_utf8(doc).unwrap();
        assert!(text.starts_with("[\n{"));
        assert!(text.ends_with("}\n]\n"));
        assert!(!text.contains("annotations"));
    }

    #[test]
    fn test_single_object() {
        let text = r#"{"id":"x","sequence":"ACGT"}"#;
        let parsed = parse(text.as_bytes(), &ParseOptions::default()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].sequence(), b"acgt");
    }

    #[test]
    fn test_record_without_id() {
        assert!(parse(r#"[{"sequence":"acgt"}]"#.as_bytes(), &ParseOptions::default()).is_err());
    }
}
