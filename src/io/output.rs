use std::io::Write;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, WriterBuilder};

use crate::error::{PipelineError, PipelineResult};
use crate::models::{OUTPUT_HEADER, OutputRow};

/// Write the digest table: header, then one fully quoted row per record
pub fn write_digest_csv<W: Write>(writer: W, rows: &[OutputRow]) -> PipelineResult<()> {
    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(writer);

    wtr.write_record(OUTPUT_HEADER)?;
    for row in rows {
        wtr.write_record(row.csv_fields())?;
    }
    wtr.flush()?;

    Ok(())
}

/// Render the digest table to a string
pub fn render_digest_csv(rows: &[OutputRow]) -> PipelineResult<String> {
    let mut buf = Vec::new();
    write_digest_csv(&mut buf, rows)?;
    String::from_utf8(buf).map_err(|e| PipelineError::Format(e.to_string()))
}

/// Write the digest table to `path`
///
/// Data goes to a temporary sibling first and is renamed into place, so a
/// reader never sees a half-written file.
pub fn write_digest_csv_file(path: &Path, rows: &[OutputRow]) -> PipelineResult<()> {
    let tmp = temp_sibling(path);
    let result = std::fs::File::create(&tmp)
        .map_err(PipelineError::from)
        .and_then(|file| write_digest_csv(std::io::BufWriter::new(file), rows))
        .and_then(|_| std::fs::rename(&tmp, path).map_err(PipelineError::from));

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
