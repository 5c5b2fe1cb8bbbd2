use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use council_digest::{
    BatchConfig, Config, DigestContext, FsLedger, ModelClient, PromptTemplate, Stage2Config,
    Taxonomy, chunk_subtitles, discover_inputs, init_tracing, read_srt_file, run_batch,
};

#[derive(Parser)]
#[command(name = "council-digest")]
#[command(author, version, about = "Summarize council meeting subtitles into structured CSV digests", long_about = None)]
struct Cli {
    /// Path to config TOML (defaults to ./council-digest.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Digest every pending transcript in the input directory
    Run {
        /// Directory containing .srt transcripts
        #[arg(short, long)]
        input_dir: Option<PathBuf>,

        /// Directory for digest CSVs
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Directory handled transcripts are moved to
        #[arg(long)]
        done_dir: Option<PathBuf>,

        /// Maximum span of one chunk in minutes
        #[arg(long)]
        max_span_minutes: Option<f64>,

        /// Chunk requests in flight per transcript
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Chunk a transcript and print the chunk layout without calling the model
    Inspect {
        /// Input transcript (.srt)
        input: PathBuf,

        /// Maximum span of one chunk in minutes
        #[arg(long)]
        max_span_minutes: Option<f64>,
    },

    /// Print the canonical stance label for a phrase
    NormalizeStance {
        text: String,
    },

    /// Print the effective config as TOML and exit
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            input_dir,
            output_dir,
            done_dir,
            max_span_minutes,
            concurrency,
        } => {
            if let Some(dir) = input_dir {
                cfg.paths.input_dir = dir;
            }
            if let Some(dir) = output_dir {
                cfg.paths.output_dir = dir;
            }
            if let Some(dir) = done_dir {
                cfg.paths.done_dir = dir;
            }
            if let Some(minutes) = max_span_minutes {
                cfg.chunking.max_span_minutes = minutes;
            }
            if let Some(n) = concurrency {
                cfg.pipeline.concurrency = n;
            }
            cfg.validate()?;
            init_tracing(&cfg.logging, cli.log_level.as_deref())?;
            run(&cfg).await
        }
        Commands::Inspect {
            input,
            max_span_minutes,
        } => {
            if let Some(minutes) = max_span_minutes {
                cfg.chunking.max_span_minutes = minutes;
            }
            cfg.validate()?;
            init_tracing(&cfg.logging, cli.log_level.as_deref())?;
            inspect(&cfg, input)
        }
        Commands::NormalizeStance { text } => {
            let taxonomy = Taxonomy::load(cfg.prompt.taxonomy_path.as_deref())
                .context("Failed to load taxonomy")?;
            println!("{}", taxonomy.canonicalizer().normalize(&text));
            Ok(())
        }
        Commands::PrintConfig => {
            print!("{}", cfg.to_toml_pretty()?);
            Ok(())
        }
    }
}

async fn run(cfg: &Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "council-digest starting");

    let taxonomy = Taxonomy::load(cfg.prompt.taxonomy_path.as_deref())
        .context("Failed to load taxonomy")?;
    let template = PromptTemplate::load(cfg.prompt.template_path.as_deref())
        .context("Failed to load prompt template")?;
    info!(
        "Taxonomy {}: {} stance labels, {} categories",
        taxonomy.version,
        taxonomy.stance.labels.len(),
        taxonomy.categories.len()
    );

    let client = ModelClient::new(cfg.model.client_config()?)?;
    let context = DigestContext::new(template, taxonomy);

    let mut ledger = FsLedger::new(cfg.paths.completed_dir(), &cfg.paths.done_dir)
        .context("Failed to prepare completed/done directories")?;
    let inputs = discover_inputs(&cfg.paths.input_dir)
        .with_context(|| format!("Failed to list transcripts in {:?}", cfg.paths.input_dir))?;

    let batch_config = BatchConfig {
        max_span_minutes: cfg.chunking.max_span_minutes,
        trivial_line_threshold: cfg.pipeline.trivial_line_threshold,
        output_dir: cfg.paths.output_dir.clone(),
        summarize: Stage2Config {
            generation: cfg.model.generation_params(),
            concurrency: cfg.pipeline.concurrency,
            prefilter_empty_chunks: cfg.pipeline.prefilter_empty_chunks,
        },
    };

    let summary = run_batch(&client, &mut ledger, &inputs, &context, &batch_config).await?;

    if summary.failed > 0 {
        info!("{} transcript(s) failed and were left in place", summary.failed);
    }

    Ok(())
}

fn inspect(cfg: &Config, input: PathBuf) -> Result<()> {
    info!("Inspecting transcript {:?}", input);
    let subtitles = read_srt_file(&input).context("Failed to parse input transcript")?;
    let chunks = chunk_subtitles(&subtitles, cfg.chunking.max_span_minutes)?;

    println!("Transcript Inspection");
    println!("=====================");
    println!("Subtitles: {}", subtitles.len());
    println!(
        "Chunks: {} (max span {} min)",
        chunks.len(),
        cfg.chunking.max_span_minutes
    );
    println!();

    for (i, chunk) in chunks.iter().enumerate() {
        println!(
            "#{:<3} {}  {:>4} records  {:>6} chars",
            i + 1,
            chunk.timestamp,
            chunk.record_count,
            chunk.char_count()
        );
    }

    Ok(())
}
