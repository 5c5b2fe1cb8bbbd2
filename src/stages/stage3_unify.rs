use tracing::debug;

use crate::llm::parse_structured_output;
use crate::models::{OutputRow, StructuredRecord};
use crate::taxonomy::StanceCanonicalizer;

/// Separator between the two ends of a timestamp range
pub const RANGE_SEPARATOR: char = '〜';

/// Execute Stage 3: parse, filter, and normalize the raw responses of one transcript
///
/// Records without a headline or overview are dropped. The stance of every
/// kept record is canonicalized and its timestamp given explicit milliseconds.
pub fn execute_stage3(responses: &[String], canonicalizer: &StanceCanonicalizer) -> Vec<StructuredRecord> {
    responses
        .iter()
        .filter_map(|response| {
            let mut record = parse_structured_output(response);
            if record.is_empty_extraction() {
                debug!("Dropping response without headline/overview");
                return None;
            }
            record.stance = canonicalizer.normalize(&record.stance);
            record.timestamp = normalize_timestamp_range(&record.timestamp);
            Some(record)
        })
        .collect()
}

/// Tag every record with the transcript id
pub fn to_output_rows(id: &str, records: Vec<StructuredRecord>) -> Vec<OutputRow> {
    records
        .into_iter()
        .map(|record| OutputRow::new(id, record))
        .collect()
}

/// Give each end of a `start〜end` range (or a single time) a `,mmm` part
pub fn normalize_timestamp_range(timestamp: &str) -> String {
    match timestamp.split_once(RANGE_SEPARATOR) {
        Some((start, end)) => format!(
            "{}{}{}",
            ensure_milliseconds(start.trim()),
            RANGE_SEPARATOR,
            ensure_milliseconds(end.trim())
        ),
        None => ensure_milliseconds(timestamp.trim()),
    }
}

fn ensure_milliseconds(time: &str) -> String {
    if time.is_empty() || time.contains(',') {
        time.to_string()
    } else {
        format!("{},000", time)
    }
}

/// Non-blank lines across all responses of a transcript
pub fn count_output_lines(responses: &[String]) -> usize {
    responses
        .iter()
        .flat_map(|r| r.lines())
        .filter(|line| !line.trim().is_empty())
        .count()
}
