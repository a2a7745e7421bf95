//! Servidor HTTP (Axum) sobre o pipeline de anotação.
//!
//! O núcleo é síncrono: a anotação roda em `tokio::task::spawn_blocking` para não travar o
//! runtime. Escritas de vocabulário passam pelo [`VocabularyService`], então o índice em cache
//! acompanha cada mudança.

pub mod config;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use lector_core::{
    Annotator, EntryId, Language, LanguageId, LectorError, MemoryStore, NewVocabularyEntry, ParsedTextUnit,
    TokenizerRegistry, VocabularyEntry, VocabularyService, WordIndexCache,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::WebConfig;

/// Estado compartilhado da aplicação.
pub struct AppState {
    pub annotator: Annotator,
    pub vocabulary: VocabularyService,
}

impl AppState {
    /// Liga armazenamento, cache, registro e idiomas configurados.
    pub fn new(store: Arc<MemoryStore>, config: &WebConfig) -> lector_core::Result<Self> {
        let index = Arc::new(WordIndexCache::new(store.clone()));
        let annotator = Annotator::new(Arc::new(TokenizerRegistry::with_builtin()), index.clone())
            .with_config(config.annotator);
        for language in &config.languages {
            annotator.register_language(language.clone())?;
        }
        Ok(Self {
            annotator,
            vocabulary: VocabularyService::new(store, index),
        })
    }
}

#[derive(Deserialize)]
struct AnnotateRequest {
    text: String,
    language_id: LanguageId,
}

#[derive(Serialize)]
struct AnnotateResponse {
    units: Vec<ParsedTextUnit>,
    total_units: usize,
    processing_ms: u64,
}

#[derive(Serialize)]
struct ParserInfo {
    name: String,
    display_name: String,
}

/// Evento enviado pelo WebSocket: uma unidade por mensagem e um fechamento.
#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum StreamEvent {
    Unit(ParsedTextUnit),
    Done { total_units: usize, processing_ms: u64 },
    Error { message: String },
}

/// Erro de handler convertido em resposta JSON `{"error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Core(LectorError),
    Internal(String),
}

impl From<LectorError> for ApiError {
    fn from(err: LectorError) -> Self {
        ApiError::Core(err)
    }
}

/// Código HTTP de cada erro do núcleo.
pub fn status_for(err: &LectorError) -> StatusCode {
    match err {
        LectorError::UnrecognizedMarkdownNode { .. }
        | LectorError::UnknownSegmentKind { .. }
        | LectorError::InvalidEntry(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LectorError::UnknownLanguageId(_) | LectorError::EntryNotFound(_) => StatusCode::NOT_FOUND,
        LectorError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
        LectorError::ParserAlreadyRegistered(_) => StatusCode::CONFLICT,
        LectorError::Store(_) if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        LectorError::Store(_) | LectorError::MatcherOverflow { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Core(err) => (status_for(&err), err.to_string()),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        if status.is_server_error() {
            tracing::error!(%status, %message, "falha no handler");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Monta o roteador com todas as rotas.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/annotate", post(annotate_handler))
        .route("/ws", get(ws_handler))
        .route("/languages", get(list_languages_handler).post(register_language_handler))
        .route("/parsers", get(list_parsers_handler))
        .route("/words", post(create_word_handler).put(upsert_word_handler))
        .route(
            "/words/:id",
            get(get_word_handler).put(update_word_handler).delete(delete_word_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Roda a anotação fora do runtime assíncrono.
async fn annotate_blocking(
    state: &Arc<AppState>,
    text: String,
    language_id: LanguageId,
) -> ApiResult<Vec<ParsedTextUnit>> {
    let worker = Arc::clone(state);
    let units = tokio::task::spawn_blocking(move || worker.annotator.annotate(&text, language_id))
        .await
        .map_err(|e| ApiError::Internal(format!("tarefa de anotação abortada: {e}")))??;
    Ok(units)
}

/// Anotação via HTTP POST (sem streaming).
async fn annotate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnnotateRequest>,
) -> ApiResult<Json<AnnotateResponse>> {
    let start = Instant::now();
    info!(language_id = req.language_id, chars = req.text.len(), "anotando documento");
    let units = annotate_blocking(&state, req.text, req.language_id).await?;
    Ok(Json(AnnotateResponse {
        total_units: units.len(),
        units,
        processing_ms: start.elapsed().as_millis() as u64,
    }))
}

async fn list_languages_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Language>> {
    Json(state.annotator.languages())
}

async fn register_language_handler(
    State(state): State<Arc<AppState>>,
    Json(language): Json<Language>,
) -> ApiResult<(StatusCode, Json<Language>)> {
    state.annotator.register_language(language.clone())?;
    Ok((StatusCode::CREATED, Json(language)))
}

async fn list_parsers_handler(State(state): State<Arc<AppState>>) -> Json<Vec<ParserInfo>> {
    let registry = state.annotator.registry();
    let parsers = registry
        .languages()
        .into_iter()
        .map(|name| ParserInfo {
            display_name: registry.display_name(&name).unwrap_or_else(|| name.clone()),
            name,
        })
        .collect();
    Json(parsers)
}

async fn get_word_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntryId>,
) -> ApiResult<Json<VocabularyEntry>> {
    Ok(Json(state.vocabulary.get(id)?))
}

async fn create_word_handler(
    State(state): State<Arc<AppState>>,
    Json(entry): Json<NewVocabularyEntry>,
) -> ApiResult<(StatusCode, Json<VocabularyEntry>)> {
    let created = state.vocabulary.create(entry)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Cria ou atualiza pela superfície dentro do idioma.
async fn upsert_word_handler(
    State(state): State<Arc<AppState>>,
    Json(entry): Json<NewVocabularyEntry>,
) -> ApiResult<Json<VocabularyEntry>> {
    Ok(Json(state.vocabulary.create_or_update(entry)?))
}

async fn update_word_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntryId>,
    Json(entry): Json<NewVocabularyEntry>,
) -> ApiResult<Json<VocabularyEntry>> {
    Ok(Json(state.vocabulary.update(id, entry)?))
}

async fn delete_word_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntryId>,
) -> ApiResult<Json<VocabularyEntry>> {
    Ok(Json(state.vocabulary.delete(id)?))
}

/// Upgrade HTTP → WebSocket
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Recebe `{text, language_id}` e devolve cada unidade anotada numa mensagem própria.
async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket conectado");

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let events = match serde_json::from_str::<AnnotateRequest>(&text) {
                    Ok(req) => stream_events(&state, req).await,
                    Err(e) => vec![StreamEvent::Error {
                        message: format!("requisição inválida: {e}"),
                    }],
                };
                for event in &events {
                    let Ok(json) = serde_json::to_string(event) else {
                        continue;
                    };
                    if socket.send(Message::Text(json)).await.is_err() {
                        return; // cliente desconectou
                    }
                }
            }
            Message::Close(_) => {
                info!("WebSocket desconectado");
                return;
            }
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload)).await;
            }
            _ => {}
        }
    }
}

async fn stream_events(state: &Arc<AppState>, req: AnnotateRequest) -> Vec<StreamEvent> {
    let start = Instant::now();
    match annotate_blocking(state, req.text, req.language_id).await {
        Ok(units) => {
            let total_units = units.len();
            let mut events: Vec<StreamEvent> = units.into_iter().map(StreamEvent::Unit).collect();
            events.push(StreamEvent::Done {
                total_units,
                processing_ms: start.elapsed().as_millis() as u64,
            });
            events
        }
        Err(ApiError::Core(err)) => vec![StreamEvent::Error { message: err.to_string() }],
        Err(ApiError::Internal(message)) => vec![StreamEvent::Error { message }],
    }
}
