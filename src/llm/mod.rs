pub mod gemini;
pub mod groq;
pub mod sse;

use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::Stream;
use reqwest::Client;

use crate::config::ProviderEndpoints;
use crate::models::{ChatMessage, ModelConfig, Provider};

pub use gemini::GeminiChat;
pub use groq::GroqChat;

/// Incremental reply text. Finite and not restartable.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream>;
}

/// Builds the concrete client for a provider/model/key triple.
pub trait ModelFactory: Send + Sync {
    fn build(&self, config: &ModelConfig) -> Result<Arc<dyn ChatModel>>;
}

#[derive(Clone)]
pub struct ProviderFactory {
    client: Client,
    endpoints: ProviderEndpoints,
}

impl ProviderFactory {
    pub fn new(endpoints: ProviderEndpoints) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build model http client")?;
        Ok(Self { client, endpoints })
    }
}

impl ModelFactory for ProviderFactory {
    fn build(&self, config: &ModelConfig) -> Result<Arc<dyn ChatModel>> {
        let model: Arc<dyn ChatModel> = match config.provider {
            Provider::Groq => Arc::new(GroqChat::new(
                self.client.clone(),
                &self.endpoints.groq_base_url,
                &config.model,
                &config.api_key,
            )),
            Provider::Gemini => Arc::new(GeminiChat::new(
                self.client.clone(),
                &self.endpoints.gemini_base_url,
                &config.model,
                &config.api_key,
            )),
        };
        Ok(model)
    }
}

pub(crate) fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let json = match json {
            serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        };
        if let Some(err) = json.get("error") {
            if let Some(message) = err.as_str() {
                return message.to_string();
            }
            if let Some(message) = err.get("message").and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_prefers_message() {
        assert_eq!(normalize_err_body(""), "<empty body>");
        assert_eq!(
            normalize_err_body(r#"{"error":{"message":"Invalid API Key","type":"invalid_request_error"}}"#),
            "Invalid API Key"
        );
        assert_eq!(
            normalize_err_body(r#"[{"error":{"code":400,"message":"API key not valid."}}]"#),
            "API key not valid."
        );
        assert_eq!(normalize_err_body(r#"{"error":"boom"}"#), "boom");
        assert_eq!(normalize_err_body("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn factory_dispatches_on_provider() {
        let factory = ProviderFactory::new(ProviderEndpoints::default()).unwrap();

        let groq = factory
            .build(&ModelConfig {
                provider: Provider::Groq,
                model: "gemma2-9b-it".to_string(),
                api_key: "k".to_string(),
            })
            .unwrap();
        assert_eq!(groq.name(), "groq:gemma2-9b-it");

        let gemini = factory
            .build(&ModelConfig {
                provider: Provider::Gemini,
                model: "models/gemini-1.5-flash".to_string(),
                api_key: "k".to_string(),
            })
            .unwrap();
        assert_eq!(gemini.name(), "gemini:models/gemini-1.5-flash");
    }
}
