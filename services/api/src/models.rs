//! API and Database Models
//!
//! This module defines the core data structures used for both database mapping
//! with `sqlx` and for generating OpenAPI documentation with `utoipa`.

use chrono::{DateTime, Utc};
use lingo_core::{
    contract::{ChatRole, ChatTurn},
    weakness::WeaknessEntry,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "message_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl From<MessageRole> for ChatRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => ChatRole::User,
            MessageRole::Assistant => ChatRole::Assistant,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    /// Every focus label ever recorded for this user, oldest first.
    pub weaknesses: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct Conversation {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub user_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct Message {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(value_type = String, format = Uuid)]
    pub conversation_id: Uuid,
    #[schema(value_type = String, example = "user")]
    pub role: MessageRole,
    pub content: String,
    /// The grammar correction attached to this message, if any.
    #[schema(value_type = Option<String>, format = Uuid)]
    pub correction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The message as conversational context for the language model.
    pub fn to_chat_turn(&self) -> ChatTurn {
        ChatTurn::new(self.role.into(), self.content.clone())
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct Correction {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(value_type = String, format = Uuid)]
    pub message_id: Uuid,
    pub original: String,
    pub corrected: String,
    #[schema(example = "Subject-verb agreement")]
    pub focus: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Answer {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub position: i32,
    pub text: String,
    pub correct: bool,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Question {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub position: i32,
    pub text: String,
    pub answers: Vec<Answer>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Quiz {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub user_id: String,
    #[schema(example = "Past simple")]
    pub topic: String,
    pub created_at: DateTime<Utc>,
    pub questions: Vec<Question>,
}

/// A conversation as listed on the dashboard, with a glance at its messages.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub title: Option<String>,
    pub message_count: i64,
    /// Content of the most recent message, if any.
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A quiz as listed on the dashboard, without its questions.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone, PartialEq)]
pub struct QuizSummary {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub topic: String,
    pub question_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Quiz> for QuizSummary {
    fn from(quiz: &Quiz) -> Self {
        Self {
            id: quiz.id,
            topic: quiz.topic.clone(),
            question_count: quiz.questions.len() as i64,
            created_at: quiz.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct WeaknessSummary {
    pub topic: String,
    pub occurrences: usize,
}

impl From<WeaknessEntry> for WeaknessSummary {
    fn from(entry: WeaknessEntry) -> Self {
        Self {
            topic: entry.topic,
            occurrences: entry.occurrences,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub corrections: Vec<Correction>,
}

/// The outcome of one settled turn.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct TurnResult {
    pub user_message: Message,
    pub assistant_message: Message,
    pub correction: Option<Correction>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct Dashboard {
    pub quizzes: Vec<QuizSummary>,
    pub conversations: Vec<ConversationSummary>,
    pub weaknesses: Vec<WeaknessSummary>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizScore {
    pub correct: usize,
    pub total: usize,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct CreateConversationPayload {
    #[schema(example = "Weekend plans")]
    pub title: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitTurnPayload {
    #[schema(example = "I has a dog.")]
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateQuizPayload {
    #[schema(example = "Past simple")]
    pub topic: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ScoreQuizPayload {
    /// Identifiers of the chosen answers, at most one per question.
    #[schema(value_type = Vec<String>)]
    pub selections: Vec<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
