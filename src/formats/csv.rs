use crate::bio::{AnnotationValue, BioSequence};
use crate::formats::header::decode_value;
use crate::formats::{FormatOptions, ParseOptions};
use crate::{ObiError, Result};
use std::io::Read;

/// Columns written when none are configured.
pub const DEFAULT_COLUMNS: [&str; 5] = ["id", "count", "taxid", "definition", "sequence"];

fn typed_taxid(value: &str) -> AnnotationValue {
    match value.parse::<i64>() {
        Ok(v) => AnnotationValue::Int(v),
        Err(_) => AnnotationValue::Str(value.to_string()),
    }
}

/// Reads a whole CSV stream. The first line names the columns.
pub fn parse<R: Read>(reader: R, options: &ParseOptions) -> Result<Vec<BioSequence>> {
    let mut csv = ::csv::ReaderBuilder::new()
        .delimiter(options.csv_separator)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers: Vec<String> = csv.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if !headers.iter().any(|h| h == "id") {
        return Err(ObiError::parse(&options.source, 0, "CSV header has no `id` column"));
    }

    let mut records = Vec::new();
    for row in csv.records() {
        let row = row?;
        let mut record = BioSequence::empty();
        let mut qualities: Option<Vec<u8>> = None;
        for (column, value) in headers.iter().zip(row.iter()) {
            if value.is_empty() || value == options.na {
                continue;
            }
            match column.as_str() {
                "id" => record.set_id(value),
                "sequence" => record.set_sequence(value.as_bytes().to_ascii_lowercase()),
                "qualities" | "quality" => {
                    qualities = Some(
                        value
                            .bytes()
                            .map(|q| q.saturating_sub(options.quality_shift))
                            .collect(),
                    )
                }
                "definition" => record.set_definition(value),
                "taxid" => record.set_attribute("taxid", typed_taxid(value)),
                key if key.ends_with("_taxid") => record.set_attribute(key, typed_taxid(value)),
                key => record.set_attribute(key, decode_value(key, value)),
            }
        }
        if record.id().is_empty() {
            let line = row.position().map_or(0, |p| p.line());
            return Err(ObiError::parse(
                &options.source,
                row.position().map_or(0, |p| p.byte() as usize),
                format!("CSV line {} without identifier", line),
            ));
        }
        if let Some(q) = qualities {
            record.set_qualities(q)?;
        }
        record.set_source(options.source.clone());
        records.push(record);
    }
    Ok(records)
}

fn cell(record: &BioSequence, column: &str, options: &FormatOptions) -> String {
    match column {
        "id" => record.id().to_string(),
        "sequence" => record.string(),
        "definition" if record.has_definition() => record.definition().to_string(),
        "count" => record.count().to_string(),
        "taxid" => record.taxid(),
        "quality" | "qualities" => match record.qualities() {
            Some(q) => q
                .iter()
                .map(|v| v.saturating_add(options.quality_shift) as char)
                .collect(),
            None => options.na.clone(),
        },
        key => record
            .get_attribute(key)
            .map(AnnotationValue::as_string)
            .unwrap_or_else(|| options.na.clone()),
    }
}

/// Columns used for output: the configured ones or the defaults.
pub fn columns(options: &FormatOptions) -> Vec<String> {
    if options.csv_columns.is_empty() {
        DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        options.csv_columns.clone()
    }
}

/// Formats `records` as CSV rows, preceded by the header row when
/// `with_header` is set.
pub fn format_records(
    records: &[BioSequence],
    options: &FormatOptions,
    with_header: bool,
) -> Result<Vec<u8>> {
    let columns = columns(options);
    let mut writer = ::csv::WriterBuilder::new()
        .delimiter(options.csv_separator)
        .from_writer(Vec::with_capacity(records.len() * 128));
    if with_header {
        writer.write_record(&columns)?;
    }
    for record in records {
        writer.write_record(columns.iter().map(|c| cell(record, c, options)))?;
    }
    writer
        .into_inner()
        .map_err(|e| ObiError::Format(format!("CSV: {}", e.error())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_columns() {
        let data = "id,sequence,qualities,taxid,genus_taxid,count,sample,definition\n\
                    r1,ACGT,IIII,9606,9605,3,s1,first\n\
                    r2,gg,NA,NA,NA,1,\"{\"\"a\"\":1}\",\n";
        let records = parse(data.as_bytes(), &ParseOptions::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence(), b"acgt");
        assert_eq!(records[0].qualities(), Some(&[40u8, 40, 40, 40][..]));
        assert_eq!(records[0].get_int_attribute("taxid"), Some(9606));
        assert_eq!(records[0].get_int_attribute("genus_taxid"), Some(9605));
        assert_eq!(records[0].count(), 3);
        assert_eq!(records[0].definition(), "first");
        assert!(!records[1].has_qualities());
        assert!(!records[1].has_attribute("taxid"));
        assert_eq!(records[1].get_int_map_attribute("sample").unwrap().get("a"), Some(&1));
    }

    #[test]
    fn test_missing_id_column() {
        assert!(parse("name,sequence\na,acgt\n".as_bytes(), &ParseOptions::default()).is_err());
    }

    #[test]
    fn test_format_records() {
        let mut r = BioSequence::new("r1", "acgt", "a, definition");
        r.set_attribute("count", 2i64);
        let records = [r, BioSequence::new("r2", "g", "")];
        let out = format_records(&records, &FormatOptions::default(), true).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "id,count,taxid,definition,sequence\nr1,2,NA,\"a, definition\",acgt\nr2,1,NA,NA,g\n"
        );
    }

    #[test]
    fn test_format_projects_annotations() {
        let mut r = BioSequence::new("r1", "ac", "");
        r.set_attribute("tags", vec!["x".to_string(), "y".to_string()]);
        let options = FormatOptions {
            csv_columns: vec!["id".into(), "tags".into(), "missing".into()],
            ..Default::default()
        };
        let out = format_records(&[r], &options, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "r1,\"[\"\"x\"\",\"\"y\"\"]\",NA\n");
    }
}
