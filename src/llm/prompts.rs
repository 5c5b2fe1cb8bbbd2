use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::models::Chunk;
use crate::taxonomy::Taxonomy;

/// Built-in summarization template (bracketed six-field output)
///
/// Placeholders: `{categories}`, `{stances}`, `{timestamp}`, `{text_chunk}`.
pub const DEFAULT_SUMMARY_TEMPLATE: &str = r#"あなたは議事録の要約に特化したAIです。次の要件を厳守してください。

【目的】
自治体関係者・民間事業者が「自分たちに関係ある話題かどうか」をヘッドラインと要約だけで判断できるようにすること。

【出力形式】
以下の6項目を順番通り、【項目名】とその内容をセットで1行ずつ出力してください（CSV形式にはしないでください）。

【headline】60文字以内で、議論の概要がすぐ分かる短いタイトル
【overview】700文字以上で、以下を網羅：
 - 背景（どんな問題意識があるのか）
 - 誰が何を提案・指摘・質問し、誰がどう答えたか
 - 今後の方向性（導入するのか、検討中なのか、否定されたのか）
 - 議論の中心や結論が述べられた時間帯（例: (00:23:45)）を文中に必ず含めること
【category】以下から該当するものを1つ以上（/区切りで複数可）：
{categories}
【tags】活発だった議論を示す最大3つのキーワード（ない場合は NULL）
【stance】以下のいずれかを1つ記入（日本語）：
{stances}
【timestamp】議論の結論や方向性が示された時間帯（例: 00:20:00〜00:25:00）

【禁止事項】
・冗長なあいさつ、定型表現（例：「よろしくお願いします」「賛成多数で可決」など）は含めない。
・推測、個人的な解釈は禁止。テキストに明記された事実だけをもとにする。

以下が対象テキストです：
Timestamp: {timestamp}

{text_chunk}"#;

/// Yes/no probe asking whether a chunk contains any discussion at all
pub const PREFILTER_TEMPLATE: &str = "このテキストに少しでも議論や問題提起、発言が含まれているなら 'Yes'、全く何も無いなら 'No' と答えてください。\n\n{text_chunk}";

const KNOWN_PLACEHOLDERS: [&str; 4] = ["categories", "stances", "timestamp", "text_chunk"];

/// A summarization prompt template with named `{placeholder}` slots
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_SUMMARY_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> PipelineResult<Self> {
        let text = text.into();
        if !text.contains("{text_chunk}") {
            return Err(PipelineError::Config(
                "prompt template has no {text_chunk} placeholder".to_string(),
            ));
        }
        Ok(Self { text })
    }

    /// Load from `path` if given, otherwise use the built-in template
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        match path {
            Some(path) => Self::new(std::fs::read_to_string(path)?),
            None => Ok(Self::default()),
        }
    }

    /// Build the prompt for one chunk
    pub fn render(&self, chunk: &Chunk, taxonomy: &Taxonomy) -> String {
        let categories = taxonomy.categories_prompt_list();
        let stances = taxonomy.stances_prompt_list();
        render_template(&self.text, |name| match name {
            "categories" => Some(categories.as_str()),
            "stances" => Some(stances.as_str()),
            "timestamp" => Some(chunk.timestamp.as_str()),
            "text_chunk" => Some(chunk.text.as_str()),
            _ => None,
        })
    }
}

/// Build the empty-chunk probe prompt
pub fn build_prefilter_prompt(chunk: &Chunk) -> String {
    render_template(PREFILTER_TEMPLATE, |name| {
        (name == "text_chunk").then_some(chunk.text.as_str())
    })
}

/// Substitute `{name}` placeholders in a single pass
///
/// Substituted values are never rescanned, so transcript text that happens to
/// contain `{timestamp}` stays verbatim. Unknown placeholders are left as-is.
fn render_template<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            if KNOWN_PLACEHOLDERS.contains(&name) {
                lookup(name).map(|value| (value, close))
            } else {
                None
            }
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    out
}
