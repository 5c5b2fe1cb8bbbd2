use crate::error::{PipelineError, PipelineResult};

/// A single subtitle entry as read from the source transcript
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleRecord {
    /// Source-assigned sequence number (not guaranteed contiguous)
    pub sequence_index: u32,
    /// Start time as written in the source, `HH:MM:SS,mmm`
    pub start_time: String,
    /// Subtitle text (may span several lines)
    pub text: String,
}

impl SubtitleRecord {
    pub fn new(sequence_index: u32, start_time: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sequence_index,
            start_time: start_time.into(),
            text: text.into(),
        }
    }

    /// Start time in seconds from the beginning of the meeting
    pub fn start_seconds(&self) -> PipelineResult<f64> {
        parse_timestamp_seconds(&self.start_time)
    }

    /// The line this record contributes to a chunk: `<startTime> <text>\n`
    pub fn chunk_line(&self) -> String {
        format!("{} {}\n", self.start_time, self.text)
    }
}

/// Parse an `HH:MM:SS,mmm` timestamp into fractional seconds
///
/// The millisecond part may be omitted (`HH:MM:SS`).
pub fn parse_timestamp_seconds(timestamp: &str) -> PipelineResult<f64> {
    let timestamp = timestamp.trim();
    let parts: Vec<&str> = timestamp.split(':').collect();
    if parts.len() != 3 {
        return Err(PipelineError::Format(format!(
            "timestamp must be in HH:MM:SS,mmm format: {:?}",
            timestamp
        )));
    }

    let (secs, millis) = match parts[2].split_once(',') {
        Some((secs, millis)) => (secs, millis),
        None => (parts[2], "0"),
    };

    let field = |value: &str, name: &str| -> PipelineResult<f64> {
        value.trim().parse::<u32>().map(f64::from).map_err(|_| {
            PipelineError::Format(format!("invalid {} in timestamp: {:?}", name, timestamp))
        })
    };

    let hours = field(parts[0], "hours")?;
    let minutes = field(parts[1], "minutes")?;
    let seconds = field(secs, "seconds")?;
    let millis = field(millis, "milliseconds")?;

    Ok(hours * 3600.0 + minutes * 60.0 + seconds + millis / 1000.0)
}

/// A time-bounded group of consecutive subtitle records sent to the model as one unit
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Concatenated `<startTime> <text>\n` lines
    pub text: String,
    /// Start time of the first record in the chunk
    pub timestamp: String,
    /// Number of subtitle records in the chunk
    pub record_count: usize,
}

impl Chunk {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}
