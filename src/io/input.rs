use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::models::SubtitleRecord;

/// Read an SRT file into subtitle records
///
/// Invalid UTF-8 is replaced rather than rejected.
pub fn read_srt_file(path: &Path) -> PipelineResult<Vec<SubtitleRecord>> {
    let bytes = std::fs::read(path)?;
    parse_srt(&String::from_utf8_lossy(&bytes))
}

/// Parse SRT text into subtitle records, in source order
///
/// Cues are separated by lines that are blank after trimming. Only the start
/// time and text of each cue are kept.
pub fn parse_srt(content: &str) -> PipelineResult<Vec<SubtitleRecord>> {
    let content = content.trim_start_matches('\u{feff}');
    let mut records = Vec::new();
    let mut next_index: u32 = 1;
    let mut block: Vec<&str> = Vec::new();

    for line in content.lines().chain(std::iter::once("")) {
        if !line.trim().is_empty() {
            block.push(line);
            continue;
        }
        if block.is_empty() {
            continue;
        }
        let record = parse_cue(&block, next_index)?;
        next_index = record.sequence_index.saturating_add(1);
        records.push(record);
        block.clear();
    }

    Ok(records)
}

fn parse_cue(block: &[&str], next_index: u32) -> PipelineResult<SubtitleRecord> {
    let mut lines = block.iter().copied();
    let header = lines.next().unwrap_or_default();

    // Index line is optional
    let (sequence_index, timing) = if header.contains("-->") {
        (next_index, header)
    } else if let Ok(index) = header.trim().parse::<u32>() {
        let timing = lines.next().ok_or_else(|| {
            PipelineError::Format(format!("subtitle {} has no timing line", index))
        })?;
        (index, timing)
    } else {
        return Err(PipelineError::Format(format!(
            "invalid subtitle header line: {:?}",
            header
        )));
    };

    let (start, _end) = timing.split_once("-->").ok_or_else(|| {
        PipelineError::Format(format!("invalid timing line: {:?}", timing))
    })?;
    let start_time = normalize_srt_timestamp(start)?;

    let text = lines.map(str::trim_end).collect::<Vec<_>>().join("\n");

    Ok(SubtitleRecord::new(sequence_index, start_time, text))
}

/// Rewrite an SRT timestamp as `HH:MM:SS,mmm` (accepts `.` as the millisecond separator)
fn normalize_srt_timestamp(raw: &str) -> PipelineResult<String> {
    let raw = raw.trim();
    let invalid = || PipelineError::Format(format!("invalid SRT timestamp: {:?}", raw));

    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }
    let (secs, millis) = parts[2]
        .split_once([',', '.'])
        .unwrap_or((parts[2], "0"));

    let hours: u32 = parts[0].trim().parse().map_err(|_| invalid())?;
    let minutes: u32 = parts[1].trim().parse().map_err(|_| invalid())?;
    let seconds: u32 = secs.trim().parse().map_err(|_| invalid())?;
    // fractional digits, so "3.5" reads as 500 ms
    let millis: String = millis.trim().chars().chain(std::iter::repeat('0')).take(3).collect();
    let millis: u32 = millis.parse().map_err(|_| invalid())?;

    Ok(format!(
        "{:02}:{:02}:{:02},{:03}",
        hours, minutes, seconds, millis
    ))
}
