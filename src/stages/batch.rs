use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{Instrument, error, info, info_span, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::io::{read_srt_file, write_digest_csv_file};
use crate::llm::{ChatModel, PromptTemplate};
use crate::models::{OutputRow, SubtitleRecord};
use crate::taxonomy::{StanceCanonicalizer, Taxonomy};

use super::{
    Stage2Config, chunk_subtitles, count_output_lines, execute_stage2, execute_stage3,
    to_output_rows,
};

/// Prompt template and taxonomy shared by every transcript in a run
#[derive(Debug, Clone)]
pub struct DigestContext {
    pub template: PromptTemplate,
    pub taxonomy: Taxonomy,
    pub canonicalizer: StanceCanonicalizer,
}

impl DigestContext {
    pub fn new(template: PromptTemplate, taxonomy: Taxonomy) -> Self {
        let canonicalizer = taxonomy.canonicalizer();
        Self {
            template,
            taxonomy,
            canonicalizer,
        }
    }
}

/// Configuration for a batch run
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum wall-clock span of one chunk, in minutes
    pub max_span_minutes: f64,
    /// Fewer non-blank response lines than this marks a transcript trivial
    pub trivial_line_threshold: usize,
    /// Where digest CSVs are written
    pub output_dir: PathBuf,
    pub summarize: Stage2Config,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_span_minutes: 10.0,
            trivial_line_threshold: 4,
            output_dir: PathBuf::from("output"),
            summarize: Stage2Config::default(),
        }
    }
}

/// A transcript waiting to be digested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// File name without extension; names the output CSV
    pub id: String,
    pub path: PathBuf,
}

impl InputFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let id = path.file_stem()?.to_str()?.to_string();
        Some(Self { id, path })
    }
}

/// List `*.srt` files in `dir`, sorted by file name
pub fn discover_inputs(dir: &Path) -> PipelineResult<Vec<InputFile>> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_srt = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("srt"));
        if !is_srt || !path.is_file() {
            continue;
        }
        if let Some(input) = InputFile::from_path(path) {
            inputs.push(input);
        }
    }
    inputs.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(inputs)
}

/// Which transcripts have been handled, and how to mark one handled
pub trait ProcessedLedger {
    /// Ids that already have a completed output
    fn completed_ids(&self) -> PipelineResult<HashSet<String>>;

    /// Re-check a single id right before claiming it
    fn is_completed(&self, id: &str) -> PipelineResult<bool>;

    /// Record that `input` needs no further processing
    fn mark_handled(&mut self, input: &InputFile) -> PipelineResult<()>;
}

/// Ledger backed by a completed-outputs directory and a done-inputs directory
#[derive(Debug, Clone)]
pub struct FsLedger {
    completed_dir: PathBuf,
    done_dir: PathBuf,
}

impl FsLedger {
    pub fn new(completed_dir: impl Into<PathBuf>, done_dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let ledger = Self {
            completed_dir: completed_dir.into(),
            done_dir: done_dir.into(),
        };
        std::fs::create_dir_all(&ledger.completed_dir)?;
        std::fs::create_dir_all(&ledger.done_dir)?;
        Ok(ledger)
    }
}

impl ProcessedLedger for FsLedger {
    fn completed_ids(&self) -> PipelineResult<HashSet<String>> {
        let mut ids = HashSet::new();
        for entry in std::fs::read_dir(&self.completed_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.insert(stem.to_string());
            }
        }
        Ok(ids)
    }

    fn is_completed(&self, id: &str) -> PipelineResult<bool> {
        Ok(self.completed_dir.join(format!("{}.csv", id)).is_file())
    }

    /// Move the transcript into the done directory (never deleted)
    fn mark_handled(&mut self, input: &InputFile) -> PipelineResult<()> {
        let file_name = input.path.file_name().ok_or_else(|| {
            PipelineError::Format(format!("input has no file name: {}", input.path.display()))
        })?;
        let target = unused_path(&self.done_dir, Path::new(file_name));

        if std::fs::rename(&input.path, &target).is_err() {
            // rename fails across filesystems
            std::fs::copy(&input.path, &target)?;
            std::fs::remove_file(&input.path)?;
        }
        Ok(())
    }
}

/// `dir/name`, or `dir/stem.N.ext` with the first free N if that is taken
fn unused_path(dir: &Path, name: &Path) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = name.file_stem().and_then(|s| s.to_str()).unwrap_or("input");
    let ext = name.extension().and_then(|e| e.to_str());
    (1u32..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{}.{}.{}", stem, n, ext)),
            None => dir.join(format!("{}.{}", stem, n)),
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// What happened to one transcript
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// CSV written
    Completed { rows: usize, path: PathBuf },
    /// Output was substantial but no record had a headline and overview
    NoRecords,
    /// Too little model output to be worth keeping
    SkippedTrivial { lines: usize },
    /// A completed output already exists
    SkippedAlreadyDone,
    /// Unreadable or malformed transcript; left in place
    Failed,
}

/// Result of digesting one transcript in memory
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptDigest {
    Trivial { lines: usize },
    Rows(Vec<OutputRow>),
}

/// Chunk, summarize, and unify one transcript without touching the filesystem
pub async fn digest_transcript<M: ChatModel>(
    model: &M,
    id: &str,
    subtitles: &[SubtitleRecord],
    context: &DigestContext,
    config: &BatchConfig,
) -> PipelineResult<TranscriptDigest> {
    let chunks = chunk_subtitles(subtitles, config.max_span_minutes)?;
    info!(
        "Loaded {} subtitles, {} chunks",
        subtitles.len(),
        chunks.len()
    );

    let stage2 = execute_stage2(
        model,
        &chunks,
        &context.template,
        &context.taxonomy,
        &config.summarize,
    )
    .await;
    info!(
        "Stage 2: {} summarized, {} failed, {} empty",
        stage2.chunks_summarized, stage2.chunks_failed, stage2.chunks_skipped_empty
    );

    let lines = count_output_lines(&stage2.responses);
    if lines < config.trivial_line_threshold {
        return Ok(TranscriptDigest::Trivial { lines });
    }

    let records = execute_stage3(&stage2.responses, &context.canonicalizer);
    info!(
        "Stage 3: {} of {} responses accepted",
        records.len(),
        stage2.responses.len()
    );

    Ok(TranscriptDigest::Rows(to_output_rows(id, records)))
}

/// Digest one transcript file and write its CSV
pub async fn process_file<M: ChatModel>(
    model: &M,
    input: &InputFile,
    context: &DigestContext,
    config: &BatchConfig,
) -> PipelineResult<FileOutcome> {
    let subtitles = read_srt_file(&input.path)?;

    match digest_transcript(model, &input.id, &subtitles, context, config).await? {
        TranscriptDigest::Trivial { lines } => Ok(FileOutcome::SkippedTrivial { lines }),
        TranscriptDigest::Rows(rows) if rows.is_empty() => Ok(FileOutcome::NoRecords),
        TranscriptDigest::Rows(rows) => {
            std::fs::create_dir_all(&config.output_dir)?;
            let path = config.output_dir.join(format!("{}.csv", input.id));
            write_digest_csv_file(&path, &rows)?;
            Ok(FileOutcome::Completed {
                rows: rows.len(),
                path,
            })
        }
    }
}

/// Counts per outcome for a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub rows_written: usize,
    pub no_records: usize,
    pub skipped_trivial: usize,
    pub skipped_already_done: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Completed { rows, .. } => {
                self.completed += 1;
                self.rows_written += rows;
            }
            FileOutcome::NoRecords => self.no_records += 1,
            FileOutcome::SkippedTrivial { .. } => self.skipped_trivial += 1,
            FileOutcome::SkippedAlreadyDone => self.skipped_already_done += 1,
            FileOutcome::Failed => self.failed += 1,
        }
    }
}

/// Digest every pending transcript, one file at a time
///
/// A file-level failure is logged and the batch moves on; the failed input is
/// left where it is so it can be retried.
pub async fn run_batch<M: ChatModel, L: ProcessedLedger>(
    model: &M,
    ledger: &mut L,
    inputs: &[InputFile],
    context: &DigestContext,
    config: &BatchConfig,
) -> PipelineResult<BatchSummary> {
    let completed = ledger.completed_ids()?;
    let mut summary = BatchSummary::default();

    info!(
        "Batch: {} inputs, {} already completed",
        inputs.len(),
        completed.len()
    );

    for input in inputs {
        let span = info_span!("transcript", id = %input.id);
        let outcome = handle_input(model, ledger, input, &completed, context, config)
            .instrument(span)
            .await;
        summary.record(&outcome);
    }

    info!(
        "Batch complete: {} completed ({} rows), {} without records, {} trivial, {} already done, {} failed",
        summary.completed,
        summary.rows_written,
        summary.no_records,
        summary.skipped_trivial,
        summary.skipped_already_done,
        summary.failed
    );

    Ok(summary)
}

async fn handle_input<M: ChatModel, L: ProcessedLedger>(
    model: &M,
    ledger: &mut L,
    input: &InputFile,
    completed: &HashSet<String>,
    context: &DigestContext,
    config: &BatchConfig,
) -> FileOutcome {
    let already_done = completed.contains(&input.id)
        || ledger.is_completed(&input.id).unwrap_or_else(|e| {
            warn!("Could not check completion state: {}", e);
            false
        });
    if already_done {
        info!("Skipping {} (already summarized)", input.id);
        return FileOutcome::SkippedAlreadyDone;
    }

    info!("Processing {:?}", input.path);
    let outcome = match process_file(model, input, context, config).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Failed to process {}: {}", input.id, e);
            return FileOutcome::Failed;
        }
    };

    match &outcome {
        FileOutcome::Completed { rows, path } => info!("Wrote {} rows to {:?}", rows, path),
        FileOutcome::NoRecords => warn!("No usable records for {}, no CSV written", input.id),
        FileOutcome::SkippedTrivial { lines } => {
            info!("Skipping {}: only {} line(s) of output", input.id, lines)
        }
        FileOutcome::SkippedAlreadyDone | FileOutcome::Failed => {}
    }

    if let Err(e) = ledger.mark_handled(input) {
        error!("Failed to mark {} as handled: {}", input.id, e);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    const FULL_RESPONSE: &str = "【headline】防災無線の更新\n【overview】老朽化した防災無線の更新について質疑。\n【category】防災・安全\n【tags】防災無線\n【stance】前向きに検討する\n【timestamp】00:10:00〜00:12:00";

    #[derive(Default)]
    struct MemoryLedger {
        completed: HashSet<String>,
        handled: Vec<String>,
    }

    impl ProcessedLedger for MemoryLedger {
        fn completed_ids(&self) -> PipelineResult<HashSet<String>> {
            Ok(self.completed.clone())
        }

        fn is_completed(&self, id: &str) -> PipelineResult<bool> {
            Ok(self.completed.contains(id))
        }

        fn mark_handled(&mut self, input: &InputFile) -> PipelineResult<()> {
            self.handled.push(input.id.clone());
            Ok(())
        }
    }

    fn context() -> DigestContext {
        DigestContext::new(PromptTemplate::default(), Taxonomy::builtin().unwrap())
    }

    fn subtitles() -> Vec<SubtitleRecord> {
        vec![
            SubtitleRecord::new(1, "00:10:00,000", "防災無線について伺います"),
            SubtitleRecord::new(2, "00:10:30,000", "更新を前向きに検討します"),
        ]
    }

    fn write_srt(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(
            &path,
            "1\n00:10:00,000 --> 00:10:05,000\n防災無線について伺います\n\n2\n00:10:30,000 --> 00:10:35,000\n更新を前向きに検討します\n",
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_digest_minimal_accept() {
        let model = ScriptedModel::new(|_| Ok(FULL_RESPONSE.to_string()));
        let digest = digest_transcript(
            &model,
            "council_0412",
            &subtitles(),
            &context(),
            &BatchConfig::default(),
        )
        .await
        .unwrap();

        let TranscriptDigest::Rows(rows) = digest else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "council_0412");
        assert_eq!(rows[0].record.stance, "検討中");
        assert_eq!(rows[0].record.timestamp, "00:10:00,000〜00:12:00,000");
    }

    #[tokio::test]
    async fn test_digest_trivial_output() {
        let model = ScriptedModel::new(|_| Ok("【headline】A\n【overview】B".to_string()));
        let digest = digest_transcript(&model, "m", &subtitles(), &context(), &BatchConfig::default())
            .await
            .unwrap();
        assert_eq!(digest, TranscriptDigest::Trivial { lines: 2 });
    }

    #[tokio::test]
    async fn test_digest_threshold_is_configurable() {
        let model = ScriptedModel::new(|_| Ok("【headline】A\n【overview】B".to_string()));
        let config = BatchConfig {
            trivial_line_threshold: 2,
            ..Default::default()
        };
        let digest = digest_transcript(&model, "m", &subtitles(), &context(), &config)
            .await
            .unwrap();
        assert!(matches!(digest, TranscriptDigest::Rows(ref rows) if rows.len() == 1));
    }

    #[tokio::test]
    async fn test_digest_malformed_timestamp_is_fatal() {
        let model = ScriptedModel::new(|_| Ok(FULL_RESPONSE.to_string()));
        let subs = vec![SubtitleRecord::new(1, "10:00", "x")];
        let err = digest_transcript(&model, "m", &subs, &context(), &BatchConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Format(_)));
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_run_batch_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("output");

        let inputs = vec![
            InputFile::from_path(write_srt(dir.path(), "a_full.srt")).unwrap(),
            InputFile::from_path(write_srt(dir.path(), "b_done.srt")).unwrap(),
            InputFile::from_path(write_srt(dir.path(), "c_trivial.srt")).unwrap(),
            InputFile::from_path(dir.path().join("d_missing.srt")).unwrap(),
        ];

        let model = ScriptedModel::new(|_| Ok(FULL_RESPONSE.to_string()));

        let mut ledger = MemoryLedger {
            completed: HashSet::from(["b_done".to_string()]),
            ..Default::default()
        };
        let config = BatchConfig {
            output_dir: output_dir.clone(),
            ..Default::default()
        };

        let summary = run_batch(&model, &mut ledger, &inputs[..2], &context(), &config)
            .await
            .unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.skipped_already_done, 1);

        let trivial_model = ScriptedModel::new(|_| Ok("NULL".to_string()));
        let summary = run_batch(&trivial_model, &mut ledger, &inputs[2..], &context(), &config)
            .await
            .unwrap();
        assert_eq!(summary.skipped_trivial, 1);
        assert_eq!(summary.failed, 1);

        assert_eq!(ledger.handled, vec!["a_full", "c_trivial"]);
        assert!(output_dir.join("a_full.csv").is_file());
        assert!(!output_dir.join("c_trivial.csv").exists());
        assert!(!output_dir.join("b_done.csv").exists());
    }

    #[tokio::test]
    async fn test_no_records_writes_nothing_but_marks_handled() {
        let dir = tempfile::tempdir().unwrap();
        let input = InputFile::from_path(write_srt(dir.path(), "m.srt")).unwrap();
        let model = ScriptedModel::new(|_| {
            Ok("【headline】NULL\n【overview】NULL\n【category】NULL\n【tags】NULL".to_string())
        });
        let mut ledger = MemoryLedger::default();
        let config = BatchConfig {
            output_dir: dir.path().join("output"),
            ..Default::default()
        };

        let summary = run_batch(&model, &mut ledger, &[input], &context(), &config)
            .await
            .unwrap();

        assert_eq!(summary.no_records, 1);
        assert_eq!(ledger.handled, vec!["m"]);
        assert!(!dir.path().join("output").join("m.csv").exists());
    }

    #[tokio::test]
    async fn test_end_to_end_with_fs_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let input_dir = dir.path().join("srt");
        let output_dir = dir.path().join("output");
        let done_dir = dir.path().join("done_srt");
        std::fs::create_dir_all(&input_dir).unwrap();
        write_srt(&input_dir, "council_0412.srt");
        write_srt(&input_dir, "council_0413.srt");
        std::fs::write(input_dir.join("notes.txt"), "ignored").unwrap();

        let mut ledger = FsLedger::new(&output_dir, &done_dir).unwrap();
        std::fs::write(output_dir.join("council_0413.csv"), "\"id\"\n").unwrap();

        let inputs = discover_inputs(&input_dir).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].id, "council_0412");

        let model = ScriptedModel::new(|_| Ok(FULL_RESPONSE.to_string()));
        let config = BatchConfig {
            output_dir: output_dir.clone(),
            ..Default::default()
        };
        let summary = run_batch(&model, &mut ledger, &inputs, &context(), &config)
            .await
            .unwrap();

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.rows_written, 1);
        assert_eq!(summary.skipped_already_done, 1);

        let csv = std::fs::read_to_string(output_dir.join("council_0412.csv")).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "\"id\",\"headline\",\"overview\",\"category\",\"tags\",\"stance\",\"timestamp\""
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"council_0412\",\"防災無線の更新\""));
        assert!(row.contains("\"検討中\""));
        assert!(lines.next().is_none());

        assert!(done_dir.join("council_0412.srt").is_file());
        assert!(!input_dir.join("council_0412.srt").exists());
        assert!(input_dir.join("council_0413.srt").is_file());

        // A second run finds nothing left to do
        let inputs = discover_inputs(&input_dir).unwrap();
        let summary = run_batch(&model, &mut ledger, &inputs, &context(), &config)
            .await
            .unwrap();
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.skipped_already_done, 1);
    }

    #[test]
    fn test_mark_handled_keeps_earlier_done_copy() {
        let dir = tempfile::tempdir().unwrap();
        let done_dir = dir.path().join("done");
        let mut ledger = FsLedger::new(dir.path().join("output"), &done_dir).unwrap();
        std::fs::write(done_dir.join("council_0412.srt"), "old").unwrap();
        std::fs::write(done_dir.join("council_0412.1.srt"), "older").unwrap();

        let path = dir.path().join("council_0412.srt");
        std::fs::write(&path, "new").unwrap();
        let input = InputFile::from_path(&path).unwrap();
        ledger.mark_handled(&input).unwrap();

        assert!(!path.exists());
        assert_eq!(std::fs::read_to_string(done_dir.join("council_0412.srt")).unwrap(), "old");
        assert_eq!(std::fs::read_to_string(done_dir.join("council_0412.1.srt")).unwrap(), "older");
        assert_eq!(std::fs::read_to_string(done_dir.join("council_0412.2.srt")).unwrap(), "new");
    }

    #[test]
    fn test_input_file_id() {
        let input = InputFile::from_path("/data/令和6年第1回定例会.srt").unwrap();
        assert_eq!(input.id, "令和6年第1回定例会");
    }
}
