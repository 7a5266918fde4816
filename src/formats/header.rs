//! Annotation codecs for FASTA/FASTQ title lines.
//!
//! Two encodings follow the identifier:
//! - OBI key/values: `key=value; key={"a":1}; free definition`
//! - JSON: `{"key":value,...,"definition":"free definition"}`

use crate::bio::{AnnotationValue, BioSequence};
use nom::{
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    sequence::{delimited, terminated},
    IResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write;

/// Annotation key whose value becomes the record definition in JSON headers.
pub const DEFINITION_KEY: &str = "definition";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderFormat {
    #[default]
    Obi,
    Json,
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

/// Value text up to the next `;` outside brackets and quotes.
fn obi_value(input: &str) -> IResult<&str, &str> {
    let mut depth = 0i32;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if quoted {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => quoted = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => quoted = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            ';' if depth == 0 => {
                if i == 0 {
                    break;
                }
                return Ok((&input[i..], &input[..i]));
            }
            _ => {}
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::TakeUntil,
    )))
}

/// One `key=value;` pair followed by optional spaces.
fn obi_pair(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, key) = terminated(
        take_while1(is_key_char),
        delimited(multispace0, char('='), multispace0),
    )(input)?;
    let (input, value) = terminated(obi_value, char(';'))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, (key, value.trim())))
}

/// Interprets an OBI value: JSON when it parses, plain text otherwise.
pub fn decode_value(key: &str, text: &str) -> AnnotationValue {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return AnnotationValue::from_json_for_key(key, value);
    }
    if text.starts_with('{') || text.starts_with('[') {
        // python style literals
        let relaxed = text.replace('\'', "\"");
        if let Ok(value) = serde_json::from_str::<Value>(&relaxed) {
            return AnnotationValue::from_json_for_key(key, value);
        }
    }
    AnnotationValue::Str(text.to_string())
}

/// Length of the balanced JSON object at the start of `text`.
fn json_object_len(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if quoted {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => quoted = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => quoted = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_json_header(text: &str, record: &mut BioSequence) -> bool {
    let Some(len) = json_object_len(text) else {
        return false;
    };
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[..len]) else {
        return false;
    };
    let mut definition = text[len..].trim().to_string();
    for (key, value) in map {
        if key == DEFINITION_KEY {
            if let Value::String(s) = value {
                definition = s;
                continue;
            }
        }
        record.set_attribute(key.clone(), AnnotationValue::from_json_for_key(&key, value));
    }
    record.set_definition(definition);
    true
}

/// Decodes the text following the identifier into annotations and the
/// definition of `record`. The encoding is chosen from the first
/// non-space character.
pub fn parse_header(text: &str, record: &mut BioSequence) {
    let text = text.trim();
    if text.starts_with('{') && parse_json_header(text, record) {
        return;
    }
    let mut rest = text;
    while let Ok((next, (key, value))) = obi_pair(rest) {
        record.set_attribute(key, decode_value(key, value));
        rest = next;
    }
    record.set_definition(rest.trim());
}

/// True when `text` reads back from an OBI header as the same string.
fn is_bare_string(text: &str) -> bool {
    !text.is_empty()
        && text.trim() == text
        && !text.contains(|c| matches!(c, ';' | '"' | '{' | '}' | '[' | ']'))
        && serde_json::from_str::<Value>(text).is_err()
}

/// Renders an annotation the way OBI headers carry it: plain strings bare,
/// everything else as JSON.
fn obi_value_text(value: &AnnotationValue) -> String {
    match value {
        AnnotationValue::Str(s) if is_bare_string(s) => s.clone(),
        other => other.to_json().to_string(),
    }
}

/// Title-line text following the identifier (without leading space).
pub fn format_header(record: &BioSequence, format: HeaderFormat) -> String {
    match format {
        HeaderFormat::Obi => {
            let mut out = String::new();
            for (key, value) in record.annotations() {
                let _ = write!(out, "{}={}; ", key, obi_value_text(value));
            }
            if record.has_definition() {
                out.push_str(record.definition());
            }
            out.trim_end().to_string()
        }
        HeaderFormat::Json => {
            let mut map = Map::new();
            for (key, value) in record.annotations() {
                map.insert(key.clone(), value.to_json());
            }
            if record.has_definition() {
                map.insert(
                    DEFINITION_KEY.to_string(),
                    Value::String(record.definition().to_string()),
                );
            }
            if map.is_empty() {
                String::new()
            } else {
                Value::Object(map).to_string()
            }
        }
    }
}
