use csv::{ReaderBuilder, StringRecord};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{FIELD_NAMES, NULL_FIELD, StructuredRecord};

static BRACKET_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^【(.*?)】(.*)$").expect("Failed to compile bracket line regex"));

/// Layout of a model response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `【key】value` lines, one field per line
    Bracketed,
    /// A single CSV record with the six fields in order
    FlatCsv,
}

impl ResponseShape {
    /// Pick the parsing strategy from a structural probe of the text
    ///
    /// Any `【` marks the response as bracketed; otherwise a comma means CSV.
    pub fn detect(text: &str) -> Self {
        if !text.contains('【') && text.contains(',') {
            ResponseShape::FlatCsv
        } else {
            ResponseShape::Bracketed
        }
    }
}

/// Parse one model response into a six-field record
///
/// Never fails: fields the response does not provide stay `NULL`. A CSV
/// response is read from its first non-blank line, and a leading line that
/// only repeats the six column names is skipped in favour of the next one.
pub fn parse_structured_output(text: &str) -> StructuredRecord {
    match ResponseShape::detect(text) {
        ResponseShape::Bracketed => parse_bracketed(text),
        ResponseShape::FlatCsv => parse_flat_csv(text),
    }
}

fn parse_bracketed(text: &str) -> StructuredRecord {
    let mut record = StructuredRecord::default();

    for line in text.lines() {
        let Some(caps) = BRACKET_LINE.captures(line.trim()) else {
            continue;
        };
        let key = caps[1].trim().to_lowercase();
        if let Some(field) = record.field_mut(&key) {
            *field = caps[2].trim().to_string();
        }
    }

    record
}

fn parse_flat_csv(text: &str) -> StructuredRecord {
    // start at the first non-blank line; quoted fields may run past it
    let start = text
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.as_ptr() as usize - text.as_ptr() as usize)
        .unwrap_or(text.len());

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text[start..].as_bytes());

    let mut records = reader.records();
    let first = match records.next() {
        Some(Ok(record)) => record,
        _ => return StructuredRecord::default(),
    };
    let record = if is_header_record(&first) {
        match records.next() {
            Some(Ok(record)) => record,
            _ => return StructuredRecord::default(),
        }
    } else {
        first
    };

    let mut fields = record.iter().map(|f| f.trim().to_string());
    StructuredRecord::from_fields(std::array::from_fn(|_| {
        fields.next().unwrap_or_else(|| NULL_FIELD.to_string())
    }))
}

/// A record that just repeats the column names
fn is_header_record(record: &StringRecord) -> bool {
    record.len() >= FIELD_NAMES.len()
        && record
            .iter()
            .zip(FIELD_NAMES)
            .all(|(field, name)| field.trim().eq_ignore_ascii_case(name))
}
