use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::sse::spawn_text_stream;
use super::{normalize_err_body, ChatModel, TextStream};
use crate::models::{ChatMessage, Role};

/// Google Gemini `streamGenerateContent` over SSE.
pub struct GeminiChat {
    client: Client,
    base_url: String,
    model_path: String,
    api_key: String,
    name: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Part {
    text: String,
}

impl GeminiChat {
    pub fn new(client: Client, base_url: &str, model: &str, api_key: &str) -> Self {
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model_path,
            api_key: api_key.to_string(),
            name: format!("gemini:{model}"),
        }
    }
}

/// System messages are merged into `system_instruction`; assistant turns use
/// the `model` role.
fn build_request(messages: Vec<ChatMessage>) -> GenerateContentRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for message in messages {
        let part = Part {
            text: message.content,
        };
        match message.role {
            Role::System => system_parts.push(part),
            Role::User => contents.push(Content {
                role: Some("user"),
                parts: vec![part],
            }),
            Role::Assistant => contents.push(Content {
                role: Some("model"),
                parts: vec![part],
            }),
        }
    }

    GenerateContentRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then(|| Content {
            role: None,
            parts: system_parts,
        }),
    }
}

fn candidate_text(event: &Value) -> Result<Option<String>> {
    if let Some(err) = event.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        anyhow::bail!("gemini stream error: {message}");
    }

    let Some(parts) = event["candidates"][0]["content"]["parts"].as_array() else {
        return Ok(None);
    };

    let text = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<String>();
    Ok((!text.is_empty()).then_some(text))
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream> {
        let url = format!(
            "{}/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model_path
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(messages))
            .send()
            .await
            .context("failed to call gemini streamGenerateContent endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "gemini streamGenerateContent returned {status}: {}",
                normalize_err_body(&body)
            );
        }

        Ok(spawn_text_stream(response.bytes_stream(), candidate_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_path_is_prefixed_once() {
        let client = Client::new();
        let flash = GeminiChat::new(client.clone(), "https://x/v1beta/", "models/gemini-1.5-flash", "k");
        assert_eq!(flash.model_path, "models/gemini-1.5-flash");
        assert_eq!(flash.base_url, "https://x/v1beta");

        let pro = GeminiChat::new(client, "https://x/v1beta", "gemini-1.5-pro", "k");
        assert_eq!(pro.model_path, "models/gemini-1.5-pro");
    }

    #[test]
    fn request_maps_roles() {
        let request = build_request(vec![
            ChatMessage::system("prompt"),
            ChatMessage::user("oi"),
            ChatMessage::assistant("olá"),
            ChatMessage::user("tudo bem?"),
        ]);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "system_instruction": {"parts": [{"text": "prompt"}]},
                "contents": [
                    {"role": "user", "parts": [{"text": "oi"}]},
                    {"role": "model", "parts": [{"text": "olá"}]},
                    {"role": "user", "parts": [{"text": "tudo bem?"}]}
                ]
            })
        );
    }

    #[test]
    fn candidate_text_joins_parts() {
        let event = json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Bom "}, {"text": "dia"}]}}]
        });
        assert_eq!(candidate_text(&event).unwrap(), Some("Bom dia".to_string()));

        let finish = json!({"candidates": [{"finishReason": "STOP"}]});
        assert_eq!(candidate_text(&finish).unwrap(), None);

        let error = json!({"error": {"code": 429, "message": "quota"}});
        assert!(candidate_text(&error).is_err());
    }
}
