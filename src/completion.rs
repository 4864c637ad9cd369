//! Text-generation provider abstraction and implementations.
//!
//! The [`CompletionProvider`] trait is the second half of the model
//! boundary: given a question, ranked context passages, and an instruction,
//! it produces an answer. The OpenAI implementation builds a chat request
//! whose user message concatenates the passages with ordinal labels,
//! preserving the similarity ranking order.
//!
//! Providers return `Result`; the query layer converts failures into an
//! explicit error-message answer so they land in the query history instead
//! of propagating as a hard failure.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::ModelConfig;

/// Default persona used when a caller supplies no instruction of its own.
pub const ANALYST_INSTRUCTION: &str = "You are a professional financial analyst assistant. \
Answer the question based on the provided context. If calculations are needed, show your \
work step by step. Always provide specific numbers and dates when available. If the context \
doesn't contain enough information, clearly state what's missing.";

/// Trait for text-generation providers. Substitutable like the embedding
/// side; tests inject canned implementations.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate an answer for `query` grounded in `context` passages.
    async fn complete(
        &self,
        query: &str,
        context: &[String],
        instruction: &str,
        temperature: f32,
    ) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Build the user-message prompt: ordinal-labelled context passages in
/// ranking order, then the question.
pub fn build_user_prompt(query: &str, context: &[String]) -> String {
    let formatted_context = context
        .iter()
        .enumerate()
        .map(|(i, passage)| format!("Document excerpt {}:\n{}", i + 1, passage))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\nQuestion: {}\n\nPlease provide a comprehensive answer based on the above context.",
        formatted_context, query
    )
}

// ============ Disabled provider ============

/// A no-op completion provider that always returns errors.
pub struct DisabledCompletions;

#[async_trait]
impl CompletionProvider for DisabledCompletions {
    async fn complete(
        &self,
        _query: &str,
        _context: &[String],
        _instruction: &str,
        _temperature: f32,
    ) -> Result<String> {
        bail!("Completion provider is disabled")
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

// ============ OpenAI provider ============

/// Completion provider backed by the OpenAI chat API.
///
/// Calls `POST /v1/chat/completions` with the configured model. Requires
/// the `OPENAI_API_KEY` environment variable. Retries follow the same
/// bounded linear-backoff policy as the embedding side.
pub struct OpenAiCompletions {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl OpenAiCompletions {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.completion_model.clone(),
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }

    async fn request_completion(
        &self,
        query: &str,
        context: &[String],
        instruction: &str,
        temperature: f32,
    ) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": instruction},
                {"role": "user", "content": build_user_prompt(query, context)},
            ],
            "temperature": temperature,
            "max_tokens": 1000,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_completion_response(&json)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletions {
    async fn complete(
        &self,
        query: &str,
        context: &[String],
        instruction: &str,
        temperature: f32,
    ) -> Result<String> {
        let mut last_err = None;

        for attempt in 1..=self.max_retries {
            match self
                .request_completion(query, context, instruction, temperature)
                .await
            {
                Ok(answer) => return Ok(answer),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "completion attempt failed");
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Extract `choices[0].message.content` from a chat completion response.
fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
}

/// Create the [`CompletionProvider`] selected by configuration.
pub fn create_completion_provider(config: &ModelConfig) -> Result<Box<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledCompletions)),
        "openai" => Ok(Box::new(OpenAiCompletions::new(config)?)),
        other => bail!("Unknown model provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_labels_context_in_order() {
        let context = vec![
            "First passage.".to_string(),
            "Second passage.".to_string(),
            "Third passage.".to_string(),
        ];
        let prompt = build_user_prompt("What changed?", &context);

        let p1 = prompt.find("Document excerpt 1:\nFirst passage.").unwrap();
        let p2 = prompt.find("Document excerpt 2:\nSecond passage.").unwrap();
        let p3 = prompt.find("Document excerpt 3:\nThird passage.").unwrap();
        assert!(p1 < p2 && p2 < p3);
        assert!(prompt.contains("Question: What changed?"));
    }

    #[test]
    fn test_prompt_with_empty_context() {
        let prompt = build_user_prompt("Anything?", &[]);
        assert!(prompt.starts_with("\n\nQuestion: Anything?"));
    }

    #[test]
    fn test_parse_completion_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "The balance is $42."}}],
        });
        assert_eq!(
            parse_completion_response(&json).unwrap(),
            "The balance is $42."
        );
    }

    #[test]
    fn test_parse_completion_response_missing_choices() {
        let json = serde_json::json!({"error": {"message": "rate limited"}});
        assert!(parse_completion_response(&json).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let err = DisabledCompletions
            .complete("q", &[], ANALYST_INSTRUCTION, 0.3)
            .await;
        assert!(err.is_err());
    }
}
