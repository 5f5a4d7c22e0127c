use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    consts::{CODEGEN_MODEL, CODEGEN_PROMPT, LLM_URL, NOUN_CHUNK_MODEL, NOUN_CHUNK_PROMPT},
    engine::executor::CodeSynthesis,
    error::{CollaboratorRequestSnafu, FramelensError, JsonSnafu},
    nim::ensure_success,
};

/// OpenAI-compatible chat completion client for the hosted language
/// models.
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(client: reqwest::Client, api_key: &str) -> Self {
        Self::with_base_url(client, api_key, LLM_URL)
    }

    pub fn with_base_url(client: reqwest::Client, api_key: &str, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Runs one completion and returns the assistant message content.
    pub async fn complete(&self, model: &str, prompt: &str) -> Result<String, FramelensError> {
        let service = format!("llm:{model}");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0.1,
                "top_p": 1,
                "max_tokens": 1024,
            }))
            .send()
            .await
            .context(CollaboratorRequestSnafu {
                service: service.as_str(),
            })?;
        let response = ensure_success(&service, response).await?;

        let payload: serde_json::Value = response
            .json()
            .await
            .context(CollaboratorRequestSnafu {
                service: service.as_str(),
            })?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| FramelensError::CollaboratorResponse {
                service,
                field: "choices[0].message.content".to_string(),
            })
    }
}

/// Synthesizes the analysis function from one frame's fused records
/// and the user question.
pub struct CodegenNim {
    chat: ChatClient,
    model: String,
}

impl CodegenNim {
    pub fn new(chat: ChatClient) -> Self {
        Self {
            chat,
            model: CODEGEN_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl CodeSynthesis for CodegenNim {
    async fn synthesize(
        &self,
        sample_metadata: &serde_json::Value,
        question: &str,
    ) -> Result<String, FramelensError> {
        let prompt = CODEGEN_PROMPT
            .replace("{metadata}", &sample_metadata.to_string())
            .replace("{question}", question);
        let raw = self.chat.complete(&self.model, &prompt).await?;
        let source = extract_code_block(&raw);
        debug!("synthesized analysis source:\n{source}");
        Ok(source)
    }
}

/// Extraction collaborator turning a free-text question into the
/// ordered open-vocabulary detection phrases.
#[async_trait]
pub trait NounChunkExtraction: Send + Sync {
    async fn extract(&self, question: &str) -> Result<Vec<String>, FramelensError>;
}

pub struct NounChunkNim {
    chat: ChatClient,
    model: String,
}

impl NounChunkNim {
    pub fn new(chat: ChatClient) -> Self {
        Self {
            chat,
            model: NOUN_CHUNK_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl NounChunkExtraction for NounChunkNim {
    async fn extract(&self, question: &str) -> Result<Vec<String>, FramelensError> {
        let prompt = NOUN_CHUNK_PROMPT.replace("{question}", question);
        let raw = self.chat.complete(&self.model, &prompt).await?;
        parse_noun_chunks(&raw)
    }
}

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:javascript|js)?\s*(.*?)```").expect("static pattern")
});

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("static pattern"));

/// Pulls the function source out of a chat answer. Code models wrap
/// snippets in markdown fences and often add prose around them; the
/// first fenced block wins, otherwise the raw answer is handed to the
/// loader as-is and any junk fails there with a diagnostic.
pub fn extract_code_block(raw: &str) -> String {
    match CODE_FENCE.captures(raw) {
        Some(captures) => captures[1].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Parses the `{"noun_chunks": [...]}` answer, tolerating prose or
/// fences around the JSON object.
pub fn parse_noun_chunks(raw: &str) -> Result<Vec<String>, FramelensError> {
    let json_text = JSON_OBJECT
        .find(raw)
        .map(|m| m.as_str())
        .unwrap_or(raw.trim());
    let payload: serde_json::Value = serde_json::from_str(json_text).context(JsonSnafu {
        stage: "noun-chunks",
    })?;
    let chunks = payload
        .get("noun_chunks")
        .and_then(|c| c.as_array())
        .ok_or_else(|| FramelensError::CollaboratorResponse {
            service: "noun-chunks".to_string(),
            field: "noun_chunks".to_string(),
        })?;
    Ok(chunks
        .iter()
        .filter_map(|c| c.as_str())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced_javascript() {
        let raw = "Here is the function:\n```javascript\nfunction postprocessor(x) { return 1; }\n```\nHope this helps!";
        assert_eq!(
            extract_code_block(raw),
            "function postprocessor(x) { return 1; }"
        );
    }

    #[test]
    fn test_extract_anonymous_fence() {
        let raw = "```\nfunction postprocessor(x) { return 2; }\n```";
        assert_eq!(
            extract_code_block(raw),
            "function postprocessor(x) { return 2; }"
        );
    }

    #[test]
    fn test_extract_unfenced_source_passes_through() {
        let raw = "\nfunction postprocessor(x) { return 3; }\n";
        assert_eq!(
            extract_code_block(raw),
            "function postprocessor(x) { return 3; }"
        );
    }

    #[test]
    fn test_parse_noun_chunks_plain() {
        let chunks = parse_noun_chunks(r#"{"noun_chunks": ["the robot", "forklift"]}"#).unwrap();
        assert_eq!(chunks, vec!["the robot", "forklift"]);
    }

    #[test]
    fn test_parse_noun_chunks_with_surrounding_prose() {
        let raw = "Sure! ```json\n{\"noun_chunks\": [\"dog\"]}\n``` as requested.";
        assert_eq!(parse_noun_chunks(raw).unwrap(), vec!["dog"]);
    }

    #[test]
    fn test_parse_noun_chunks_missing_key() {
        assert!(parse_noun_chunks(r#"{"chunks": []}"#).is_err());
        assert!(parse_noun_chunks("not json at all").is_err());
    }
}
