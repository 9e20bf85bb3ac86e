use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::sse::spawn_text_stream;
use super::{normalize_err_body, ChatModel, TextStream};
use crate::models::{ChatMessage, Role};

/// Groq chat completions (OpenAI-compatible wire format).
pub struct GroqChat {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    name: String,
}

#[derive(Serialize)]
struct CompletionReq<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl GroqChat {
    pub fn new(client: Client, base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            name: format!("groq:{model}"),
        }
    }
}

fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|message| WireMessage {
            role: match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &message.content,
        })
        .collect()
}

fn delta_text(event: &Value) -> Result<Option<String>> {
    if let Some(err) = event.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        anyhow::bail!("groq stream error: {message}");
    }
    Ok(event["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string))
}

#[async_trait]
impl ChatModel for GroqChat {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&CompletionReq {
                model: &self.model,
                messages: wire_messages(&messages),
                stream: true,
            })
            .send()
            .await
            .context("failed to call groq chat completions endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "groq /chat/completions returned {status}: {}",
                normalize_err_body(&body)
            );
        }

        Ok(spawn_text_stream(response.bytes_stream(), delta_text))
    }
}
