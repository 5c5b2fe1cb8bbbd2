use crate::error::PipelineResult;
use crate::models::{Chunk, SubtitleRecord};

/// Stage 1: split a transcript into time-bounded chunks
///
/// A record starts a new chunk when it begins `max_span_minutes` or more after
/// the first record of the current chunk. The first record of a chunk is never
/// rejected, so a chunk always holds at least one record.
pub fn chunk_subtitles(
    subtitles: &[SubtitleRecord],
    max_span_minutes: f64,
) -> PipelineResult<Vec<Chunk>> {
    let max_span_secs = max_span_minutes * 60.0;

    let mut chunks = Vec::new();
    let mut text = String::new();
    let mut record_count = 0usize;
    let mut first: Option<(f64, &str)> = None;

    for record in subtitles {
        let start = record.start_seconds()?;

        match first {
            Some((first_start, first_timestamp))
                if record_count > 0 && start - first_start >= max_span_secs =>
            {
                chunks.push(Chunk {
                    text: std::mem::take(&mut text),
                    timestamp: first_timestamp.to_string(),
                    record_count,
                });
                record_count = 0;
                first = Some((start, record.start_time.as_str()));
            }
            Some(_) => {}
            None => first = Some((start, record.start_time.as_str())),
        }

        text.push_str(&record.chunk_line());
        record_count += 1;
    }

    if let Some((_, first_timestamp)) = first.filter(|_| record_count > 0) {
        chunks.push(Chunk {
            text,
            timestamp: first_timestamp.to_string(),
            record_count,
        });
    }

    Ok(chunks)
}
