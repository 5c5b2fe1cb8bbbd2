use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::error::PipelineResult;
use crate::llm::{ChatModel, GenerationParams, PromptTemplate, build_prefilter_prompt};
use crate::models::Chunk;
use crate::taxonomy::Taxonomy;

/// Generation constraints for the yes/no empty-chunk probe
pub const PREFILTER_PARAMS: GenerationParams = GenerationParams {
    max_tokens: 5,
    temperature: 0.0,
};

/// Configuration for Stage 2
#[derive(Debug, Clone)]
pub struct Stage2Config {
    /// Constraints for the summarization call
    pub generation: GenerationParams,
    /// Chunk requests in flight at once (1 = strictly sequential)
    pub concurrency: usize,
    /// Probe each chunk for content before summarizing it
    pub prefilter_empty_chunks: bool,
}

impl Default for Stage2Config {
    fn default() -> Self {
        Self {
            generation: GenerationParams::default(),
            concurrency: 1,
            prefilter_empty_chunks: false,
        }
    }
}

/// Result of Stage 2 processing
#[derive(Debug, Default)]
pub struct Stage2Result {
    /// Raw responses of the chunks that succeeded, in chunk order
    pub responses: Vec<String>,
    pub chunks_summarized: usize,
    /// Chunks whose model call failed (dropped, not retried)
    pub chunks_failed: usize,
    /// Chunks the probe judged to contain no discussion
    pub chunks_skipped_empty: usize,
}

enum ChunkOutcome {
    Summary(String),
    Empty,
    Failed,
}

/// Summarize a single chunk
pub async fn summarize_chunk<M: ChatModel>(
    model: &M,
    chunk: &Chunk,
    template: &PromptTemplate,
    taxonomy: &Taxonomy,
    params: GenerationParams,
) -> PipelineResult<String> {
    let prompt = template.render(chunk, taxonomy);
    model.complete(&prompt, params).await
}

/// Execute Stage 2: summarization
///
/// Every chunk is sent to the model once. A failed chunk is logged and left
/// out; the rest still contribute. Responses come back in chunk order even
/// when several requests run concurrently.
pub async fn execute_stage2<M: ChatModel>(
    model: &M,
    chunks: &[Chunk],
    template: &PromptTemplate,
    taxonomy: &Taxonomy,
    config: &Stage2Config,
) -> Stage2Result {
    info!(
        "Stage 2: Summarizing {} chunks (concurrency {})",
        chunks.len(),
        config.concurrency
    );

    let outcomes: Vec<ChunkOutcome> = stream::iter(chunks)
        .map(|chunk| process_chunk(model, chunk, template, taxonomy, config))
        .buffered(config.concurrency.max(1))
        .collect()
        .await;

    let mut result = Stage2Result::default();
    for outcome in outcomes {
        match outcome {
            ChunkOutcome::Summary(text) => {
                result.chunks_summarized += 1;
                result.responses.push(text);
            }
            ChunkOutcome::Empty => result.chunks_skipped_empty += 1,
            ChunkOutcome::Failed => result.chunks_failed += 1,
        }
    }

    result
}

async fn process_chunk<M: ChatModel>(
    model: &M,
    chunk: &Chunk,
    template: &PromptTemplate,
    taxonomy: &Taxonomy,
    config: &Stage2Config,
) -> ChunkOutcome {
    if config.prefilter_empty_chunks {
        let probe = build_prefilter_prompt(chunk);
        match model.complete(&probe, PREFILTER_PARAMS).await {
            Ok(answer) if is_negative_answer(&answer) => {
                info!("Chunk {}: no discussion, skipped", chunk.timestamp);
                return ChunkOutcome::Empty;
            }
            Ok(_) => {}
            Err(e) => warn!(
                "Chunk {}: content probe failed ({}), summarizing anyway",
                chunk.timestamp, e
            ),
        }
    }

    match summarize_chunk(model, chunk, template, taxonomy, config.generation).await {
        Ok(text) => {
            info!(
                "Chunk {}: summarized ({} records, {} response lines)",
                chunk.timestamp,
                chunk.record_count,
                text.lines().count()
            );
            debug!("Chunk {} response:\n{}", chunk.timestamp, text);
            ChunkOutcome::Summary(text)
        }
        Err(e) if e.is_chunk_local() => {
            warn!("Chunk {} failed: {}", chunk.timestamp, e);
            ChunkOutcome::Failed
        }
        Err(e) => {
            error!("Chunk {} failed with unexpected error: {}", chunk.timestamp, e);
            ChunkOutcome::Failed
        }
    }
}

fn is_negative_answer(answer: &str) -> bool {
    answer
        .trim_start_matches(|c: char| c.is_whitespace() || c == '\'' || c == '"')
        .to_ascii_lowercase()
        .starts_with("no")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::PipelineError;
    use crate::llm::testing::ScriptedModel;

    fn chunk(timestamp: &str, text: &str) -> Chunk {
        Chunk {
            text: format!("{} {}\n", timestamp, text),
            timestamp: timestamp.to_string(),
            record_count: 1,
        }
    }

    fn taxonomy() -> Taxonomy {
        Taxonomy::builtin().unwrap()
    }

    #[test]
    fn test_stage2_config_default() {
        let config = Stage2Config::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.generation.max_tokens, 2000);
        assert!(!config.prefilter_empty_chunks);
    }

    #[tokio::test]
    async fn test_prompt_embeds_timestamp_and_text() {
        let model = ScriptedModel::new(|_| Ok("【headline】A".to_string()));
        let text = summarize_chunk(
            &model,
            &chunk("00:12:30,000", "子ども食堂について"),
            &PromptTemplate::default(),
            &taxonomy(),
            GenerationParams::default(),
        )
        .await
        .unwrap();

        assert_eq!(text, "【headline】A");
        let prompts = model.prompts();
        assert!(prompts[0].contains("Timestamp: 00:12:30,000"));
        assert!(prompts[0].contains("00:12:30,000 子ども食堂について"));
        assert_eq!(model.params()[0], GenerationParams::default());
    }

    #[tokio::test]
    async fn test_failed_chunk_is_dropped() {
        let model = ScriptedModel::new(|prompt| {
            if prompt.contains("Timestamp: 00:10:00,000") {
                Err(PipelineError::Api {
                    status: 429,
                    body: "rate limited".to_string(),
                })
            } else {
                Ok("ok".to_string())
            }
        });
        let chunks = vec![
            chunk("00:00:00,000", "a"),
            chunk("00:10:00,000", "b"),
            chunk("00:20:00,000", "c"),
        ];

        let result = execute_stage2(
            &model,
            &chunks,
            &PromptTemplate::default(),
            &taxonomy(),
            &Stage2Config::default(),
        )
        .await;

        assert_eq!(result.responses, vec!["ok", "ok"]);
        assert_eq!(result.chunks_summarized, 2);
        assert_eq!(result.chunks_failed, 1);
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_non_transport_error_still_drops_only_that_chunk() {
        let model = ScriptedModel::new(|prompt| {
            if prompt.contains("Timestamp: 00:00:00,000") {
                Err(PipelineError::Format("unexpected payload".to_string()))
            } else {
                Ok("ok".to_string())
            }
        });
        let chunks = vec![chunk("00:00:00,000", "a"), chunk("00:10:00,000", "b")];

        let result = execute_stage2(
            &model,
            &chunks,
            &PromptTemplate::default(),
            &taxonomy(),
            &Stage2Config::default(),
        )
        .await;

        assert_eq!(result.responses, vec!["ok"]);
        assert_eq!(result.chunks_failed, 1);
    }

    #[tokio::test]
    async fn test_prefilter_skips_empty_chunks() {
        let model = ScriptedModel::new(|prompt| {
            if prompt.starts_with("このテキストに") {
                Ok(if prompt.contains("(拍手)") { "No" } else { "Yes" }.to_string())
            } else {
                Ok("summary".to_string())
            }
        });
        let chunks = vec![chunk("00:00:00,000", "(拍手)"), chunk("00:10:00,000", "質疑")];
        let config = Stage2Config {
            prefilter_empty_chunks: true,
            ..Default::default()
        };

        let result = execute_stage2(
            &model,
            &chunks,
            &PromptTemplate::default(),
            &taxonomy(),
            &config,
        )
        .await;

        assert_eq!(result.responses, vec!["summary"]);
        assert_eq!(result.chunks_skipped_empty, 1);
        assert!(model.params().contains(&PREFILTER_PARAMS));
    }

    #[tokio::test]
    async fn test_prefilter_failure_still_summarizes() {
        let model = ScriptedModel::new(|prompt| {
            if prompt.starts_with("このテキストに") {
                Err(PipelineError::Transport("timeout".to_string()))
            } else {
                Ok("summary".to_string())
            }
        });
        let config = Stage2Config {
            prefilter_empty_chunks: true,
            ..Default::default()
        };

        let result = execute_stage2(
            &model,
            &[chunk("00:00:00,000", "質疑")],
            &PromptTemplate::default(),
            &taxonomy(),
            &config,
        )
        .await;

        assert_eq!(result.responses, vec!["summary"]);
        assert_eq!(result.chunks_failed, 0);
    }

    /// Answers later chunks faster so completion order is reversed
    struct SlowEarlyModel;

    impl ChatModel for SlowEarlyModel {
        async fn complete(&self, prompt: &str, _params: GenerationParams) -> PipelineResult<String> {
            let minute: u64 = prompt
                .split("Timestamp: 00:")
                .nth(1)
                .and_then(|rest| rest.get(..2))
                .and_then(|m| m.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(60u64.saturating_sub(minute))).await;
            if minute == 20 {
                return Err(PipelineError::Transport("connection reset".to_string()));
            }
            Ok(format!("minute {}", minute))
        }
    }

    #[tokio::test]
    async fn test_concurrent_results_keep_chunk_order() {
        let chunks: Vec<Chunk> = (0..6)
            .map(|i| chunk(&format!("00:{:02}:00,000", i * 10), "x"))
            .collect();
        let config = Stage2Config {
            concurrency: 4,
            ..Default::default()
        };

        let result = execute_stage2(
            &SlowEarlyModel,
            &chunks,
            &PromptTemplate::default(),
            &taxonomy(),
            &config,
        )
        .await;

        assert_eq!(
            result.responses,
            vec!["minute 0", "minute 10", "minute 30", "minute 40", "minute 50"]
        );
        assert_eq!(result.chunks_failed, 1);
    }

    #[test]
    fn test_is_negative_answer() {
        assert!(is_negative_answer("No"));
        assert!(is_negative_answer(" 'No'"));
        assert!(is_negative_answer("no."));
        assert!(!is_negative_answer("Yes"));
        assert!(!is_negative_answer(""));
    }
}
