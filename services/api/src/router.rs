//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        Answer, Conversation, ConversationDetail, ConversationSummary, Correction,
        CreateConversationPayload, CreateQuizPayload, Dashboard, ErrorResponse, Message,
        MessageRole, Question, Quiz, QuizScore, QuizSummary, ScoreQuizPayload, SubmitTurnPayload,
        TurnResult, WeaknessSummary,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_conversation,
        handlers::list_conversations,
        handlers::get_conversation,
        handlers::submit_turn,
        handlers::delete_correction,
        handlers::create_quiz,
        handlers::list_quizzes,
        handlers::get_quiz,
        handlers::score,
        handlers::dashboard,
    ),
    components(
        schemas(
            Conversation, ConversationSummary, Message, MessageRole, Correction,
            ConversationDetail, TurnResult,
            Quiz, Question, Answer, QuizSummary, QuizScore, Dashboard, WeaknessSummary,
            CreateConversationPayload, SubmitTurnPayload, CreateQuizPayload, ScoreQuizPayload,
            ErrorResponse
        )
    ),
    tags(
        (name = "Lingo API", description = "Conversation practice, grammar corrections and quizzes for English learners")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route(
            "/conversations",
            get(handlers::list_conversations).post(handlers::create_conversation),
        )
        .route("/conversations/{id}", get(handlers::get_conversation))
        .route("/conversations/{id}/turns", post(handlers::submit_turn))
        .route(
            "/conversations/{id}/corrections/{correction_id}",
            delete(handlers::delete_correction),
        )
        .route(
            "/quizzes",
            get(handlers::list_quizzes).post(handlers::create_quiz),
        )
        .route("/quizzes/{id}", get(handlers::get_quiz))
        .route("/quizzes/{id}/score", post(handlers::score))
        .route("/dashboard", get(handlers::dashboard))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
