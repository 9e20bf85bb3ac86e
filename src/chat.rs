use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::ChatError;
use crate::llm::{ChatModel, ModelFactory, TextStream};
use crate::loaders::{DocumentLoader, SourceInput};
use crate::models::{ChatMessage, InitializeResponse, ModelConfig, Provider, SessionState, SourceType};
use crate::prompt::{build_system_prompt, ChatTemplate};

/// Ordered user/assistant turns. Unbounded; only `clear` shrinks it.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    messages: Vec<ChatMessage>,
}

impl ConversationMemory {
    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Prompt template bound to a model client. The grounding document is baked
/// into the template; a new document means a new chain.
#[derive(Clone)]
pub struct Chain {
    id: String,
    source: SourceType,
    template: ChatTemplate,
    model: Arc<dyn ChatModel>,
    initialized_at: DateTime<Utc>,
}

impl Chain {
    pub fn new(source: SourceType, template: ChatTemplate, model: Arc<dyn ChatModel>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            template,
            model,
            initialized_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> SourceType {
        self.source
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn system_template(&self) -> &str {
        self.template.system_template()
    }

    pub async fn stream(&self, input: &str, history: &[ChatMessage]) -> anyhow::Result<TextStream> {
        let messages = self.template.render(input, history)?;
        self.model.stream(messages).await
    }
}

/// Everything one user's interaction cycle needs between requests.
#[derive(Default)]
pub struct Session {
    chain: Option<Chain>,
    memory: ConversationMemory,
    api_keys: HashMap<Provider, String>,
}

pub type SharedSession = Arc<Mutex<Session>>;

impl Session {
    pub fn from_config(config: &AppConfig) -> Self {
        let mut session = Self::default();
        if let Some(key) = &config.groq_api_key {
            session.remember_api_key(Provider::Groq, key);
        }
        if let Some(key) = &config.google_api_key {
            session.remember_api_key(Provider::Gemini, key);
        }
        session
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn is_ready(&self) -> bool {
        self.chain.is_some()
    }

    pub fn chain(&self) -> Option<&Chain> {
        self.chain.as_ref()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn remember_api_key(&mut self, provider: Provider, key: &str) {
        let key = key.trim();
        if !key.is_empty() {
            self.api_keys.insert(provider, key.to_string());
        }
    }

    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        self.api_keys.get(&provider).map(String::as_str)
    }

    /// Empties the conversation; the active chain stays bound.
    pub fn clear_history(&mut self) {
        self.memory.clear();
    }

    fn install(&mut self, chain: Chain) {
        if let Some(previous) = self.chain.replace(chain) {
            tracing::info!("replaced chain {}", previous.id);
        }
    }

    pub fn snapshot(&self) -> SessionState {
        let providers_with_keys = Provider::ALL
            .into_iter()
            .filter(|provider| self.api_keys.contains_key(provider))
            .collect();

        SessionState {
            ready: self.is_ready(),
            chain_id: self.chain.as_ref().map(|chain| chain.id.clone()),
            source_type: self.chain.as_ref().map(|chain| chain.source),
            model: self.chain.as_ref().map(|chain| chain.model_name().to_string()),
            initialized_at: self.chain.as_ref().map(|chain| chain.initialized_at),
            messages: self.memory.messages().to_vec(),
            providers_with_keys,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitializeRequest {
    pub source: SourceType,
    pub input: SourceInput,
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Clone)]
pub struct ChatService {
    loader: DocumentLoader,
    models: Arc<dyn ModelFactory>,
}

impl ChatService {
    pub fn new(loader: DocumentLoader, models: Arc<dyn ModelFactory>) -> Self {
        Self { loader, models }
    }

    /// Loads the document, builds a fresh chain and binds it to the session.
    /// On any failure the session keeps whatever chain it had.
    pub async fn initialize(
        &self,
        session: &SharedSession,
        request: InitializeRequest,
    ) -> Result<InitializeResponse, ChatError> {
        if !request.provider.offers(&request.model) {
            return Err(ChatError::UnknownModel {
                provider: request.provider,
                model: request.model,
            });
        }

        let (api_key, history) = {
            let mut guard = session.lock().await;
            if let Some(key) = request.api_key.as_deref() {
                guard.remember_api_key(request.provider, key);
            }
            let api_key = guard
                .api_key(request.provider)
                .ok_or(ChatError::MissingApiKey(request.provider))?
                .to_string();
            (api_key, guard.memory.messages().to_vec())
        };

        let document = self.loader.load(request.source, request.input).await?;

        let model = self
            .models
            .build(&ModelConfig {
                provider: request.provider,
                model: request.model.clone(),
                api_key,
            })
            .map_err(ChatError::Model)?;

        let template = ChatTemplate::new(build_system_prompt(
            &document.escaped(),
            request.source,
            &history,
        ));
        let chain = Chain::new(request.source, template, model);

        let response = InitializeResponse {
            chain_id: chain.id.clone(),
            source_type: request.source,
            document_chars: document.len(),
        };

        tracing::info!(
            "initialized chain {} ({} via {})",
            chain.id,
            request.source.label(),
            chain.model_name()
        );
        session.lock().await.install(chain);

        Ok(response)
    }

    /// Records the user turn once the model accepts the request, streams the
    /// reply, and records the full reply once the model finishes.
    pub async fn reply(&self, session: &SharedSession, input: &str) -> Result<TextStream, ChatError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let (chain, history) = {
            let mut guard = session.lock().await;
            let chain = guard.chain.clone().ok_or(ChatError::NotInitialized)?;
            let history = guard.memory.messages().to_vec();
            (chain, history)
        };

        let mut upstream = chain.stream(input, &history).await.map_err(ChatError::Model)?;
        session.lock().await.memory.add_user(input);

        let (sender, receiver) = mpsc::channel::<anyhow::Result<String>>(64);
        let session = Arc::clone(session);
        tokio::spawn(async move {
            let mut reply = String::new();
            let mut listening = true;

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(text) => {
                        reply.push_str(&text);
                        if listening && sender.send(Ok(text)).await.is_err() {
                            tracing::debug!("reply listener went away; draining model stream");
                            listening = false;
                        }
                    }
                    Err(err) => {
                        tracing::error!("model stream failed: {:#}", err);
                        if listening {
                            let _ = sender.send(Err(err)).await;
                        }
                        return;
                    }
                }
            }

            session.lock().await.memory.add_assistant(reply);
        });

        Ok(Box::pin(ReceiverStream::new(receiver)))
    }

    pub async fn clear_history(&self, session: &SharedSession) {
        session.lock().await.clear_history();
        tracing::info!("conversation history cleared");
    }
}
