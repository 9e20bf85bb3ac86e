use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Site,
    Youtube,
    Pdf,
    Txt,
    Csv,
}

impl SourceType {
    pub const ALL: [SourceType; 5] = [
        SourceType::Site,
        SourceType::Youtube,
        SourceType::Pdf,
        SourceType::Txt,
        SourceType::Csv,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Site => "site",
            SourceType::Youtube => "youtube",
            SourceType::Pdf => "pdf",
            SourceType::Txt => "txt",
            SourceType::Csv => "csv",
        }
    }

    /// Name shown to the user and embedded in the system prompt.
    pub fn label(self) -> &'static str {
        match self {
            SourceType::Site => "Site",
            SourceType::Youtube => "Youtube",
            SourceType::Pdf => "PDF",
            SourceType::Txt => "TXT",
            SourceType::Csv => "CSV",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|source| {
            source.as_str().eq_ignore_ascii_case(value) || source.label().eq_ignore_ascii_case(value)
        })
    }

    pub fn is_upload(self) -> bool {
        matches!(self, SourceType::Pdf | SourceType::Txt | SourceType::Csv)
    }

    pub fn file_suffix(self) -> Option<&'static str> {
        match self {
            SourceType::Pdf => Some(".pdf"),
            SourceType::Txt => Some(".txt"),
            SourceType::Csv => Some(".csv"),
            SourceType::Site | SourceType::Youtube => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Groq,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Groq, Provider::Gemini];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::Gemini => "gemini",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Provider::Groq => "Groq",
            Provider::Gemini => "Google-Gemini",
        }
    }

    pub fn models(self) -> &'static [&'static str] {
        match self {
            Provider::Groq => &[
                "llama-3.3-70b-versatile",
                "meta-lhama/lhama-guarda-4-12B",
                "gemma2-9b-it",
            ],
            Provider::Gemini => &["models/gemini-1.5-flash", "models/gemini-1.5-pro"],
        }
    }

    pub fn offers(self, model: &str) -> bool {
        self.models().iter().any(|candidate| *candidate == model)
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|provider| {
            provider.as_str().eq_ignore_ascii_case(value)
                || provider.label().eq_ignore_ascii_case(value)
        })
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub chain_id: String,
    pub source_type: SourceType,
    pub document_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOption {
    pub id: Provider,
    pub label: String,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOption {
    pub id: SourceType,
    pub label: String,
    pub upload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsResponse {
    pub source_types: Vec<SourceOption>,
    pub providers: Vec<ProviderOption>,
}

impl OptionsResponse {
    pub fn catalogue() -> Self {
        Self {
            source_types: SourceType::ALL
                .into_iter()
                .map(|id| SourceOption {
                    id,
                    label: id.label().to_string(),
                    upload: id.is_upload(),
                })
                .collect(),
            providers: Provider::ALL
                .into_iter()
                .map(|id| ProviderOption {
                    id,
                    label: id.label().to_string(),
                    models: id.models().iter().map(|m| m.to_string()).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub ready: bool,
    pub chain_id: Option<String>,
    pub source_type: Option<SourceType>,
    pub model: Option<String>,
    pub initialized_at: Option<DateTime<Utc>>,
    pub messages: Vec<ChatMessage>,
    pub providers_with_keys: Vec<Provider>,
}
