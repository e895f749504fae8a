//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for
//! conversations, quizzes and the dashboard. It uses `utoipa` doc comments to
//! generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use lingo_core::{turn::TurnTrackingError, weakness::weakness_profile};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    conversation::TurnError,
    models::{
        Conversation, ConversationDetail, CreateConversationPayload, CreateQuizPayload, Dashboard,
        ErrorResponse, Quiz, QuizScore, QuizSummary, ScoreQuizPayload, SubmitTurnPayload,
        TurnResult, WeaknessSummary,
    },
    quiz::{QuizError, score_quiz},
    state::AppState,
    store::StoreError,
};

/// Header carrying the identity resolved by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Conflict(String),
    BadGateway(anyhow::Error),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication is required.".to_string(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "You do not have access to this resource.".to_string(),
            ),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::BadGateway(err) => {
                error!("Language model error: {:?}", err);
                (
                    StatusCode::BAD_GATEWAY,
                    "The language model could not complete the request.".to_string(),
                )
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => {
                ApiError::NotFound(format!("{entity} not found"))
            }
            other => ApiError::InternalServerError(other.into()),
        }
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::EmptyInput => ApiError::BadRequest(err.to_string()),
            TurnError::MissingUser => ApiError::Unauthorized,
            TurnError::Forbidden { .. } => {
                warn!("{}", err);
                ApiError::Forbidden
            }
            TurnError::ConversationNotFound(_) => {
                ApiError::NotFound("Conversation not found".to_string())
            }
            TurnError::CorrectionNotFound(_) => {
                ApiError::NotFound("Correction not found".to_string())
            }
            TurnError::Tracking(TurnTrackingError::AlreadyInFlight(_)) => ApiError::Conflict(
                "A reply is still being prepared for this conversation.".to_string(),
            ),
            TurnError::Tracking(other) => ApiError::InternalServerError(other.into()),
            TurnError::Gateway(e) => ApiError::BadGateway(e.into()),
            TurnError::Store(e) => e.into(),
        }
    }
}

impl From<QuizError> for ApiError {
    fn from(err: QuizError) -> Self {
        match err {
            QuizError::MissingUser => ApiError::Unauthorized,
            QuizError::EmptyTopic => ApiError::BadRequest(err.to_string()),
            QuizError::NotFound(_) => ApiError::NotFound("Quiz not found".to_string()),
            QuizError::Forbidden { .. } => {
                warn!("{}", err);
                ApiError::Forbidden
            }
            QuizError::Gateway(e) => ApiError::BadGateway(e.into()),
            QuizError::Store(e) => e.into(),
        }
    }
}

/// Extracts the authenticated user from the request headers.
fn require_user(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthorized)
}

/// Start a new conversation.
#[utoipa::path(
    post,
    path = "/conversations",
    request_body = CreateConversationPayload,
    responses(
        (status = 201, description = "Conversation created", body = Conversation),
        (status = 401, description = "No authenticated user", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateConversationPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let conversation = state
        .conversations
        .start_conversation(user_id, payload.title.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// List all conversations for a user, newest first.
#[utoipa::path(
    get,
    path = "/conversations",
    responses(
        (status = 200, description = "List of conversations", body = [Conversation]),
        (status = 401, description = "No authenticated user", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let user_id = require_user(&headers)?;
    let conversations = state.store.list_conversations(user_id).await?;
    Ok(Json(conversations))
}

/// Get a conversation with its messages and grammar corrections.
#[utoipa::path(
    get,
    path = "/conversations/{id}",
    responses(
        (status = 200, description = "Conversation details", body = ConversationDetail),
        (status = 403, description = "Conversation belongs to another user", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Conversation ID"),
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let user_id = require_user(&headers)?;
    let detail = state.conversations.conversation_detail(user_id, id).await?;
    Ok(Json(detail))
}

/// Send a message and receive the partner's reply, with any grammar correction.
#[utoipa::path(
    post,
    path = "/conversations/{id}/turns",
    request_body = SubmitTurnPayload,
    responses(
        (status = 200, description = "Turn settled", body = TurnResult),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse),
        (status = 409, description = "A turn is already in progress", body = ErrorResponse),
        (status = 502, description = "Language model failure", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Conversation ID"),
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn submit_turn(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitTurnPayload>,
) -> Result<Json<TurnResult>, ApiError> {
    let user_id = require_user(&headers)?;
    let result = state
        .conversations
        .submit_turn(user_id, id, &payload.text)
        .await?;
    Ok(Json(result))
}

/// Delete a grammar correction. The message it was attached to is kept.
#[utoipa::path(
    delete,
    path = "/conversations/{id}/corrections/{correction_id}",
    responses(
        (status = 204, description = "Correction deleted"),
        (status = 404, description = "Correction not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Conversation ID"),
        ("correction_id" = Uuid, Path, description = "Correction ID (not the message ID)"),
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn delete_correction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, correction_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let user_id = require_user(&headers)?;
    state
        .conversations
        .delete_correction(user_id, id, correction_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get the quiz for a topic, generating it on first request.
#[utoipa::path(
    post,
    path = "/quizzes",
    request_body = CreateQuizPayload,
    responses(
        (status = 200, description = "The quiz for this topic", body = Quiz),
        (status = 400, description = "Empty topic", body = ErrorResponse),
        (status = 401, description = "No authenticated user", body = ErrorResponse),
        (status = 502, description = "Language model failure", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateQuizPayload>,
) -> Result<Json<Quiz>, ApiError> {
    let user_id = require_user(&headers)?;
    let quiz = state
        .quizzes
        .get_or_create_quiz(user_id, &payload.topic)
        .await?;
    Ok(Json(quiz))
}

/// List all quizzes for a user, newest first.
#[utoipa::path(
    get,
    path = "/quizzes",
    responses(
        (status = 200, description = "List of quizzes", body = [QuizSummary]),
        (status = 401, description = "No authenticated user", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn list_quizzes(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<QuizSummary>>, ApiError> {
    let user_id = require_user(&headers)?;
    Ok(Json(state.quizzes.list_quizzes(user_id).await?))
}

/// Get a quiz with its questions and answers.
#[utoipa::path(
    get,
    path = "/quizzes/{id}",
    responses(
        (status = 200, description = "Quiz details", body = Quiz),
        (status = 403, description = "Quiz belongs to another user", body = ErrorResponse),
        (status = 404, description = "Quiz not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Quiz ID"),
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Quiz>, ApiError> {
    let user_id = require_user(&headers)?;
    Ok(Json(state.quizzes.get_quiz(user_id, id).await?))
}

/// Score a set of chosen answers against a quiz.
#[utoipa::path(
    post,
    path = "/quizzes/{id}/score",
    request_body = ScoreQuizPayload,
    responses(
        (status = 200, description = "Score", body = QuizScore),
        (status = 404, description = "Quiz not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Quiz ID"),
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn score(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ScoreQuizPayload>,
) -> Result<Json<QuizScore>, ApiError> {
    let user_id = require_user(&headers)?;
    let quiz = state.quizzes.get_quiz(user_id, id).await?;
    Ok(Json(score_quiz(&quiz, &payload.selections)))
}

/// The user's quizzes, conversations with their message counts, and most
/// frequent grammar weaknesses.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard", body = Dashboard),
        (status = 401, description = "No authenticated user", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Dashboard>, ApiError> {
    let user_id = require_user(&headers)?;

    let quizzes = state.store.list_quizzes(user_id).await?;
    let conversations = state.store.list_conversation_summaries(user_id).await?;
    let weaknesses = state
        .store
        .find_user(user_id)
        .await?
        .map(|user| weakness_profile(&user.weaknesses))
        .unwrap_or_default()
        .into_iter()
        .take(state.config.max_weaknesses_shown)
        .map(WeaknessSummary::from)
        .collect();

    Ok(Json(Dashboard {
        quizzes,
        conversations,
        weaknesses,
    }))
}
