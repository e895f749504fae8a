//! Record Store
//!
//! The storage contract the orchestration code depends on. PostgreSQL backs
//! it in production ([`crate::db::Db`]); [`memory::MemoryStore`] backs it in
//! tests.

pub mod memory;

use crate::models::{
    Conversation, ConversationSummary, Correction, Message, MessageRole, Quiz, QuizSummary, User,
};
use async_trait::async_trait;
use lingo_core::contract::{GrammarCritique, QuizDraft};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Create, read and update operations over every persisted record.
///
/// Implementations must make [`RecordStore::create_quiz_with_questions_and_answers`]
/// all-or-nothing: readers never observe a quiz without all its questions and answers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates the user row if it does not exist yet.
    async fn ensure_user(&self, user_id: &str) -> StoreResult<User>;

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    /// Appends one focus label to the end of the user's weakness list.
    async fn append_user_weakness(&self, user_id: &str, focus: &str) -> StoreResult<User>;

    async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> StoreResult<Conversation>;

    async fn find_conversation(&self, conversation_id: Uuid) -> StoreResult<Option<Conversation>>;

    /// Lists a user's conversations, newest first.
    async fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<Conversation>>;

    /// Lists a user's conversations with their message counts, newest first.
    async fn list_conversation_summaries(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<ConversationSummary>>;

    async fn create_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> StoreResult<Message>;

    /// Lists a conversation's messages in creation order.
    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>>;

    /// Sets (or clears) the correction linked to a message.
    async fn update_message(
        &self,
        message_id: Uuid,
        correction_id: Option<Uuid>,
    ) -> StoreResult<Message>;

    async fn create_correction(
        &self,
        message_id: Uuid,
        critique: &GrammarCritique,
    ) -> StoreResult<Correction>;

    async fn find_correction(&self, correction_id: Uuid) -> StoreResult<Option<Correction>>;

    /// Lists the corrections attached to a conversation's messages.
    async fn list_corrections(&self, conversation_id: Uuid) -> StoreResult<Vec<Correction>>;

    /// Deletes a correction by its own identifier, unlinking it from its message.
    async fn delete_correction(&self, correction_id: Uuid) -> StoreResult<()>;

    async fn find_quiz_by_topic(&self, user_id: &str, topic: &str) -> StoreResult<Option<Quiz>>;

    async fn find_quiz(&self, quiz_id: Uuid) -> StoreResult<Option<Quiz>>;

    /// Lists a user's quizzes, newest first.
    async fn list_quizzes(&self, user_id: &str) -> StoreResult<Vec<QuizSummary>>;

    /// Persists a quiz with all its questions and answers as one unit.
    ///
    /// If a quiz for `(user_id, topic)` already exists, that quiz is returned
    /// and `draft` is discarded.
    async fn create_quiz_with_questions_and_answers(
        &self,
        user_id: &str,
        topic: &str,
        draft: &QuizDraft,
    ) -> StoreResult<Quiz>;
}
