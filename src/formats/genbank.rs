use crate::bio::BioSequence;
use crate::formats::embl::Entry;
use crate::formats::ParseOptions;
use crate::{ObiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Definition,
    Source,
    Features,
    Origin,
}

/// Parses a chunk of GenBank entries, each closed by a `//` line.
pub fn parse(raw: &[u8], options: &ParseOptions) -> Result<Vec<BioSequence>> {
    let text = String::from_utf8_lossy(raw);
    let mut records = Vec::new();
    let mut entry: Option<Entry> = None;
    let mut section = Section::Header;
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
            section = Section::Header;
            continue;
        }
        if let Some(rest) = line.strip_prefix("LOCUS") {
            if entry.is_some() {
                return Err(ObiError::parse(&options.source, start, "entry not closed by `//`"));
            }
            let id = rest.split_whitespace().next().unwrap_or("");
            if id.is_empty() {
                return Err(ObiError::parse(&options.source, start, "entry without identifier"));
            }
            entry = Some(Entry {
                id: id.to_string(),
                ..Default::default()
            });
            section = Section::Header;
            continue;
        }
        let Some(current) = entry.as_mut() else {
            // text before the first LOCUS, such as a release banner
            continue;
        };

        let top_level = !line.starts_with(' ');
        if top_level {
            let keyword = line.split_whitespace().next().unwrap_or("");
            let content = line.get(12..).unwrap_or("");
            section = match keyword {
                "DEFINITION" => {
                    current.push_definition(content);
                    Section::Definition
                }
                "SOURCE" => {
                    if current.scientific_name.is_empty() {
                        current.scientific_name = content.trim().to_string();
                    }
                    Section::Source
                }
                "FEATURES" => {
                    current.push_feature_line(line, options.with_features);
                    Section::Features
                }
                "ORIGIN" => Section::Origin,
                _ => Section::Header,
            };
            continue;
        }

        match section {
            Section::Definition => current.push_definition(line),
            Section::Features => current.push_feature_line(line, options.with_features),
            Section::Origin => current.push_sequence_line(line),
            Section::Source | Section::Header => {}
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
