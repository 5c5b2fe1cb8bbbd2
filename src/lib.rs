pub mod config;
pub mod error;
pub mod io;
pub mod llm;
pub mod models;
pub mod stages;
pub mod taxonomy;

pub use config::{Config, init_tracing};
pub use error::{PipelineError, PipelineResult};
pub use io::{parse_srt, read_srt_file, render_digest_csv, write_digest_csv_file};
pub use llm::{
    ChatModel, ClientConfig, GenerationParams, ModelClient, PromptTemplate, Provider,
    parse_structured_output,
};
pub use models::{Chunk, OutputRow, StructuredRecord, SubtitleRecord};
pub use stages::{
    BatchConfig, BatchSummary, DigestContext, FileOutcome, FsLedger, InputFile, ProcessedLedger,
    Stage2Config, chunk_subtitles, digest_transcript, discover_inputs, execute_stage2,
    execute_stage3, run_batch,
};
pub use taxonomy::{StanceCanonicalizer, Taxonomy};
