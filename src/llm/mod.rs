//! LLM capability
//!
//! The agent only needs two operations from a language model: a single
//! completion and a streamed completion. Providers implement [`LlmClient`].

pub mod gemini;

pub use gemini::GeminiClient;

use crate::Result;
use futures::Stream;
use std::pin::Pin;

/// Text fragments of a streamed completion.
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Chunk size used when a provider has no native streaming.
const STREAM_CHUNK_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub format: ResponseFormat,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 2048,
            format: ResponseFormat::Text,
        }
    }
}

impl CompletionOptions {
    pub fn text(temperature: f32) -> Self {
        Self {
            temperature,
            ..Self::default()
        }
    }

    pub fn json(temperature: f32) -> Self {
        Self {
            temperature,
            format: ResponseFormat::Json,
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;

    async fn complete_stream(&self, prompt: &str, options: &CompletionOptions) -> Result<LlmStream> {
        let text = self.complete(prompt, options).await?;
        Ok(chunked(&text, STREAM_CHUNK_CHARS))
    }
}

/// Replay finished text as a stream of `size`-character pieces.
pub fn chunked(text: &str, size: usize) -> LlmStream {
    let chars: Vec<char> = text.chars().collect();
    let pieces: Vec<Result<String>> = chars
        .chunks(size.max(1))
        .map(|piece| Ok(piece.iter().collect()))
        .collect();

    Box::pin(futures::stream::iter(pieces))
}

/// Strip a surrounding Markdown code fence (```json ... ```) from model output.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (e.g. `json`) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches("json"),
    };

    body.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Echo;

    #[async_trait::async_trait]
    impl LlmClient for Echo {
        async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    #[tokio::test]
    async fn test_default_stream_replays_completion_in_chunks() {
        let prompt = "x".repeat(120);
        let stream = Echo
            .complete_stream(&prompt, &CompletionOptions::default())
            .await
            .unwrap();

        let pieces: Vec<String> = stream.map(|piece| piece.unwrap()).collect().await;
        assert_eq!(pieces.iter().map(String::len).collect::<Vec<_>>(), vec![50, 50, 20]);
        assert_eq!(pieces.concat(), prompt);
    }

    #[test]
    fn test_chunking_respects_char_boundaries() {
        let text = "€".repeat(3);
        let stream = chunked(&text, 2);
        let pieces: Vec<String> = tokio_test::block_on(stream.map(|p| p.unwrap()).collect());
        assert_eq!(pieces, vec!["€€".to_string(), "€".to_string()]);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[1]\n```\n"), "[1]");
        assert_eq!(strip_code_fence("  {\"plain\": true} "), "{\"plain\": true}");
        assert_eq!(strip_code_fence("```json{\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn test_json_options() {
        let options = CompletionOptions::json(0.2);
        assert_eq!(options.format, ResponseFormat::Json);
        assert_eq!(options.temperature, 0.2);
    }
}
