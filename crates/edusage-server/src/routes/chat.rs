//! Chat routes — retrieval-augmented answers from an external LLM.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use edusage_chat::providers::StreamChunk;
use edusage_chat::{ChatError, ChatRequest};
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/complete", post(complete))
}

fn error_status(err: &ChatError) -> StatusCode {
    match err {
        ChatError::MissingQuestion | ChatError::InvalidBody(_) => StatusCode::BAD_REQUEST,
        ChatError::NoProvider => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Retrieval(_) | ChatError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Malformed JSON gets the same error body as every other failure.
fn parse_request(body: Result<Json<ChatRequest>, JsonRejection>) -> Result<ChatRequest, Response> {
    body.map(|Json(req)| req)
        .map_err(|rejection| error_response(ChatError::InvalidBody(rejection.body_text())))
}

fn error_response(err: ChatError) -> Response {
    error!("Chat request failed: {}", err);
    (error_status(&err), Json(err.body())).into_response()
}

// ---------------------------------------------------------------
// Streaming chat (text/plain)
// ---------------------------------------------------------------

/// POST /api/chat — stream the answer as plain text.
///
/// Failures before the first token become a JSON error; the body is never a
/// partial stream followed by an error.
async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let req = match parse_request(body) {
        Ok(req) => req,
        Err(response) => return response,
    };

    let prepared = match state.chat.prepare(&req).await {
        Ok(p) => p,
        Err(e) => return error_response(e),
    };
    let mut llm_stream = match state.chat.stream(&prepared) {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    let first = match llm_stream.next().await {
        Some(StreamChunk::Token(text)) => Some(text),
        Some(StreamChunk::Done { .. }) | None => None,
        Some(StreamChunk::Error(e)) => return error_response(ChatError::Generation(e)),
    };

    let body = async_stream::stream! {
        let mut answer = String::new();
        if let Some(text) = first {
            answer.push_str(&text);
            yield Ok::<_, Infallible>(text);

            while let Some(chunk) = llm_stream.next().await {
                match chunk {
                    StreamChunk::Token(text) => {
                        answer.push_str(&text);
                        yield Ok(text);
                    }
                    StreamChunk::Done { .. } => break,
                    StreamChunk::Error(e) => {
                        error!("Generation stopped mid-answer: {}", e);
                        break;
                    }
                }
            }
        }

        let report = prepared.validate(&answer);
        if let Some(notice) = report.notice() {
            warn!(
                "Streamed answer has {}/{} practice items (missing {:?})",
                report.items_found, report.required, report.missing
            );
            yield Ok(notice);
        }
        info!(
            "Chat streamed: template={:?}, subject={}, {} chars, {}ms",
            prepared.template.kind,
            prepared.topic.subject,
            answer.chars().count(),
            start.elapsed().as_millis()
        );
    };

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

// ---------------------------------------------------------------
// Non-streaming chat
// ---------------------------------------------------------------

/// POST /api/chat/complete — whole answer plus its validation report.
async fn complete(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match parse_request(body) {
        Ok(req) => req,
        Err(response) => return response,
    };
    match state.chat.complete(&req).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}
