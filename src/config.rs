use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::llm::{ClientConfig, GenerationParams, Provider};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "council-digest.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub chunking: ChunkingConfig,
    pub model: ModelSettings,
    pub pipeline: PipelineConfig,
    pub prompt: PromptConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path_opt: Option<&Path>) -> Result<Self> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        let path = if let Some(p) = path_opt {
            Some(p)
        } else if default_path.exists() {
            Some(default_path)
        } else {
            None
        };

        let mut cfg = Config::default();

        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed reading config file: {}", path.display()))?;
            cfg = toml::from_str(&raw)
                .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        }

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let span = self.chunking.max_span_minutes;
        if !span.is_finite() || span <= 0.0 {
            bail!(
                "chunking.max_span_minutes must be positive (got {})",
                span
            );
        }
        if self.pipeline.concurrency == 0 {
            bail!("pipeline.concurrency must be at least 1");
        }
        if self.pipeline.trivial_line_threshold == 0 {
            bail!("pipeline.trivial_line_threshold must be at least 1");
        }
        if self.model.max_tokens == 0 {
            bail!("model.max_tokens must be at least 1");
        }
        Ok(())
    }

    pub fn to_toml_pretty(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed serializing config as TOML")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory scanned for `*.srt` transcripts
    pub input_dir: PathBuf,
    /// Where digest CSVs are written
    pub output_dir: PathBuf,
    /// Directory whose `*.csv` stems mark transcripts as already summarized
    /// (defaults to `output_dir`)
    pub completed_dir: Option<PathBuf>,
    /// Handled transcripts are moved here
    pub done_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("output"),
            completed_dir: None,
            done_dir: PathBuf::from("done_srt"),
        }
    }
}

impl PathsConfig {
    pub fn completed_dir(&self) -> &Path {
        self.completed_dir.as_deref().unwrap_or(&self.output_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum wall-clock span of one chunk, in minutes
    pub max_span_minutes: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_span_minutes: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub provider: Provider,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    pub api_base: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            model: "gpt-4o-mini-2024-07-18".to_string(),
            max_tokens: 2000,
            temperature: 0.0,
            timeout_secs: 120,
            api_base: None,
        }
    }
}

impl ModelSettings {
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Client settings with the API key taken from the environment
    pub fn client_config(&self) -> Result<ClientConfig> {
        let config = ClientConfig::from_env(
            self.provider,
            self.model.clone(),
            Duration::from_secs(self.timeout_secs),
            self.api_base.clone(),
        )?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Transcripts whose combined model output has fewer non-blank lines than
    /// this are skipped without writing a CSV
    pub trivial_line_threshold: usize,
    /// Chunk requests in flight per transcript (1 = sequential)
    pub concurrency: usize,
    /// Ask the model whether a chunk has any discussion before summarizing it
    pub prefilter_empty_chunks: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            trivial_line_threshold: 4,
            concurrency: 1,
            prefilter_empty_chunks: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Summarization template file (built-in template if unset)
    pub template_path: Option<PathBuf>,
    /// Taxonomy TOML file (built-in taxonomy if unset)
    pub taxonomy_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

pub fn init_tracing(logging: &LoggingConfig, cli_override_level: Option<&str>) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = cli_override_level.unwrap_or(logging.level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let is_json = logging.format.eq_ignore_ascii_case("json");

    if is_json {
        fmt()
            .with_env_filter(filter)
            .event_format(fmt::format().json())
            .with_target(true)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .pretty()
            .init();
    }

    tracing::debug!(level = level, format = logging.format.as_str(), "logging initialized");

    Ok(())
}
