use crate::bio::iupac::normalize_residue;
use crate::bio::{AnnotationValue, BioSequence};
use crate::formats::ParseOptions;
use crate::{ObiError, Result};

const TAXON_XREF: &str = "/db_xref=\"taxon:";

/// Taxid carried by a `/db_xref="taxon:N"` qualifier, if `line` has one.
pub(crate) fn taxon_xref(line: &str) -> Option<i64> {
    let start = line.find(TAXON_XREF)? + TAXON_XREF.len();
    let digits: String = line[start..].chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Fields collected while scanning one flat-file entry.
#[derive(Default)]
pub(crate) struct Entry {
    pub id: String,
    pub definition: String,
    pub scientific_name: String,
    pub features: Vec<u8>,
    pub sequence: Vec<u8>,
    pub taxid: Option<i64>,
}

impl Entry {
    pub(crate) fn push_definition(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.definition.is_empty() {
            self.definition.push(' ');
        }
        self.definition.push_str(text);
    }

    pub(crate) fn push_sequence_line(&mut self, line: &str) {
        self.sequence.extend(
            line.bytes()
                .filter(u8::is_ascii_alphabetic)
                .filter_map(normalize_residue),
        );
    }

    pub(crate) fn push_feature_line(&mut self, line: &str, keep: bool) {
        if self.taxid.is_none() {
            self.taxid = taxon_xref(line);
        }
        if keep {
            self.features.extend_from_slice(line.as_bytes());
            self.features.push(b'\n');
        }
    }

    pub(crate) fn into_record(self, options: &ParseOptions) -> BioSequence {
        let mut record = BioSequence::new(self.id, self.sequence, self.definition);
        if let Some(taxid) = self.taxid {
            record.set_attribute("taxid", AnnotationValue::Int(taxid));
        }
        if !self.scientific_name.is_empty() {
            record.set_attribute("scientific_name", self.scientific_name);
        }
        if options.with_features && !self.features.is_empty() {
            record.set_features(self.features);
        }
        record.set_source(options.source.clone());
        record
    }
}

/// Parses a chunk of EMBL entries, each closed by a `//` line.
pub fn parse(raw: &[u8], options: &ParseOptions) -> Result<Vec<BioSequence>> {
    let text = String::from_utf8_lossy(raw);
    let mut records = Vec::new();
    let mut entry: Option<Entry> = None;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with("//") {
            match entry.take() {
                Some(done) => records.push(done.into_record(options)),
                None => return Err(ObiError::parse(&options.source, start, "`//` without entry")),
            }
            continue;
        }
        let prefix = line.get(..2).unwrap_or(line);
        let content = line.get(5..).unwrap_or("");

        if prefix == "ID" {
            if entry.is_some() {
                return Err(ObiError::parse(&options.source, start, "entry not closed by `//`"));
            }
            let id = content
                .split(|c: char| c == ';' || c.is_whitespace())
                .next()
                .unwrap_or("");
            if id.is_empty() {
                return Err(ObiError::parse(&options.source, start, "entry without identifier"));
            }
            entry = Some(Entry {
                id: id.to_string(),
                ..Default::default()
            });
            continue;
        }
        let Some(current) = entry.as_mut() else {
            return Err(ObiError::parse(
                &options.source,
                start,
                format!("line outside of an entry: {:?}", line),
            ));
        };
        match prefix {
            "DE" => current.push_definition(content),
            "OS" if current.scientific_name.is_empty() => {
                current.scientific_name = content.trim().to_string();
            }
            "FT" | "FH" => current.push_feature_line(line, options.with_features),
            "  " => current.push_sequence_line(line),
            _ => {}
        }
    }

    if let Some(current) = entry {
        return Err(ObiError::parse(
            &options.source,
            offset,
            format!("entry {} not closed by `//`", current.id),
        ));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ENTRY: &str = "ID   AB000001; SV 1; linear; genomic DNA; STD; PLN; 12 BP.
XX
DE   Test entry
DE   on two lines.
OS   Homo sapiens
FH   Key             Location/Qualifiers
FT   source          1..12
FT                   /db_xref=\"taxon:9606\"
SQ   Sequence 12 BP;
     acgtacgtac gt                                                      12
//
";

    #[test]
    fn test_parse_entry() {
        let options = ParseOptions {
            source: "embl".into(),
            with_features: true,
            ..Default::default()
        };
        let records = parse(ENTRY.as_bytes(), &options).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id(), "AB000001");
        assert_eq!(r.definition(), "Test entry on two lines.");
        assert_eq!(r.sequence(), b"acgtacgtacgt");
        assert_eq!(r.get_int_attribute("taxid"), Some(9606));
        assert_eq!(r.get_string_attribute("scientific_name").as_deref(), Some("Homo sapiens"));
        assert!(String::from_utf8_lossy(r.features().unwrap()).contains("source"));
    }

    #[test]
    fn test_unterminated_entry() {
        let truncated = ENTRY.trim_end().trim_end_matches("//");
        assert!(parse(truncated.as_bytes(), &ParseOptions::default()).is_err());
    }

    #[test]
    fn test_taxon_xref() {
        assert_eq!(taxon_xref("   /db_xref=\"taxon:562\""), Some(562));
        assert_eq!(taxon_xref("   /db_xref=\"GI:1\""), None);
    }
}
