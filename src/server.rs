use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::Result;
use askama::Template;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{stream, Stream, StreamExt};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::chat::{ChatService, InitializeRequest, SharedSession};
use crate::config::AppConfig;
use crate::error::ChatError;
use crate::loaders::SourceInput;
use crate::models::{
    ChatRequest, InitializeResponse, OptionsResponse, Provider, ProviderOption, SessionState,
    SourceOption, SourceType,
};

#[derive(Clone)]
struct AppState {
    chat: ChatService,
    session: SharedSession,
}

pub async fn run_server(config: AppConfig, chat: ChatService, session: SharedSession) -> Result<()> {
    let state = AppState { chat, session };

    let app = Router::new()
        .route("/", get(index_page))
        .route("/api/options", get(options))
        .route("/api/state", get(session_state))
        .route("/api/initialize", post(initialize))
        .route("/api/chat", post(chat_handler))
        .route("/api/history/clear", post(clear_history))
        .nest_service("/static", ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let catalogue = OptionsResponse::catalogue();
    let ready = state.session.lock().await.is_ready();

    let template = IndexTemplate {
        sources: catalogue.source_types,
        providers: catalogue.providers,
        ready,
    };
    let body = template.render()?;

    Ok(Html(body))
}

async fn options() -> Json<OptionsResponse> {
    Json(OptionsResponse::catalogue())
}

async fn session_state(State(state): State<AppState>) -> Json<SessionState> {
    Json(state.session.lock().await.snapshot())
}

async fn initialize(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<InitializeResponse>, ApiError> {
    let mut form = InitializeForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let chosen = field.file_name().is_some_and(|name| !name.is_empty());
                let bytes = field.bytes().await?;
                if chosen {
                    form.file = Some(bytes.to_vec());
                }
            }
            "source_type" => form.source_type = field.text().await?,
            "url" => form.url = field.text().await?,
            "provider" => form.provider = field.text().await?,
            "model" => form.model = field.text().await?,
            "api_key" => form.api_key = field.text().await?,
            other => tracing::debug!("ignoring form field {}", other),
        }
    }

    let request = form.into_request()?;
    let response = state.chat.initialize(&state.session, request).await?;
    Ok(Json(response))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let replies = state.chat.reply(&state.session, &request.message).await?;

    let events = replies
        .map(|item| {
            Ok::<_, Infallible>(match item {
                Ok(text) => json_event(None, serde_json::json!({ "text": text })),
                Err(err) => json_event(
                    Some("error"),
                    serde_json::json!({ "error": ChatError::Model(err).to_string() }),
                ),
            })
        })
        .chain(stream::once(async {
            Ok::<_, Infallible>(json_event(Some("done"), serde_json::json!({})))
        }));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn clear_history(State(state): State<AppState>) -> Json<SessionState> {
    state.chat.clear_history(&state.session).await;
    Json(state.session.lock().await.snapshot())
}

fn json_event(name: Option<&str>, payload: serde_json::Value) -> Event {
    let event = match name {
        Some(name) => Event::default().event(name),
        None => Event::default(),
    };
    event
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().event("error").data("{}"))
}

/// Raw multipart fields of the sidebar form.
#[derive(Debug, Default)]
struct InitializeForm {
    source_type: String,
    url: String,
    /// `None` when no file was chosen; `Some` even for a zero-byte file.
    file: Option<Vec<u8>>,
    provider: String,
    model: String,
    api_key: String,
}

impl InitializeForm {
    fn into_request(self) -> Result<InitializeRequest, ApiError> {
        let source = SourceType::parse(&self.source_type).ok_or_else(|| {
            ApiError::bad_request(format!("tipo de fonte inválido: {}", self.source_type))
        })?;
        let provider = Provider::parse(&self.provider).ok_or_else(|| {
            ApiError::bad_request(format!("provedor inválido: {}", self.provider))
        })?;

        let input = match (source.is_upload(), self.file) {
            (true, Some(bytes)) => SourceInput::Upload(bytes),
            (true, None) => SourceInput::Missing,
            (false, _) => SourceInput::Locator(self.url.trim().to_string()),
        };

        let api_key = self.api_key.trim();
        Ok(InitializeRequest {
            source,
            input,
            provider,
            model: self.model.trim().to_string(),
            api_key: (!api_key.is_empty()).then(|| api_key.to_string()),
        })
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    sources: Vec<SourceOption>,
    providers: Vec<ProviderOption>,
    ready: bool,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(value: ChatError) -> Self {
        let status = match &value {
            ChatError::Load(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ChatError::NotInitialized => StatusCode::CONFLICT,
            ChatError::EmptyMessage
            | ChatError::MissingApiKey(_)
            | ChatError::UnknownModel { .. } => StatusCode::BAD_REQUEST,
            ChatError::Model(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: value.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(value: MultipartError) -> Self {
        Self {
            status: value.status(),
            message: value.body_text(),
        }
    }
}

impl From<askama::Error> for ApiError {
    fn from(value: askama::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: value.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
