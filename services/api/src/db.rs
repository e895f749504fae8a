//! Data Access Layer
//!
//! This module contains the PostgreSQL implementation of [`RecordStore`].
//! It uses `sqlx` for connection pooling, transactions and embedded migrations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lingo_core::contract::{GrammarCritique, QuizDraft};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    models::{
        Answer, Conversation, ConversationSummary, Correction, Message, MessageRole, Question,
        Quiz, QuizSummary, User,
    },
    store::{RecordStore, StoreError, StoreResult},
};

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, correction_id, created_at";
const CORRECTION_COLUMNS: &str = "id, message_id, original, corrected, focus, created_at";

#[derive(FromRow)]
struct QuizRow {
    id: Uuid,
    user_id: String,
    topic: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct QuestionRow {
    id: Uuid,
    position: i32,
    text: String,
}

#[derive(FromRow)]
struct AnswerRow {
    id: Uuid,
    question_id: Uuid,
    position: i32,
    text: String,
    correct: bool,
}

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Loads a quiz row together with its ordered questions and answers.
    async fn assemble_quiz(&self, row: QuizRow) -> StoreResult<Quiz> {
        let questions = sqlx::query_as::<_, QuestionRow>(
            "SELECT id, position, text FROM questions WHERE quiz_id = $1 ORDER BY position ASC",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let question_ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();
        let answers = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT id, question_id, position, text, correct
            FROM answers
            WHERE question_id = ANY($1)
            ORDER BY position ASC
            "#,
        )
        .bind(&question_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut answers_by_question: HashMap<Uuid, Vec<Answer>> = HashMap::new();
        for answer in answers {
            answers_by_question
                .entry(answer.question_id)
                .or_default()
                .push(Answer {
                    id: answer.id,
                    position: answer.position,
                    text: answer.text,
                    correct: answer.correct,
                });
        }

        Ok(Quiz {
            id: row.id,
            user_id: row.user_id,
            topic: row.topic,
            created_at: row.created_at,
            questions: questions
                .into_iter()
                .map(|q| Question {
                    answers: answers_by_question.remove(&q.id).unwrap_or_default(),
                    id: q.id,
                    position: q.position,
                    text: q.text,
                })
                .collect(),
        })
    }

    async fn insert_questions(
        tx: &mut Transaction<'_, Postgres>,
        quiz_id: Uuid,
        draft: &QuizDraft,
    ) -> StoreResult<()> {
        for (qi, question) in draft.questions.iter().enumerate() {
            let question_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO questions (id, quiz_id, position, text) VALUES ($1, $2, $3, $4)",
            )
            .bind(question_id)
            .bind(quiz_id)
            .bind(qi as i32)
            .bind(&question.question)
            .execute(&mut **tx)
            .await?;

            for (ai, answer) in question.answers.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO answers (id, question_id, position, text, correct) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(question_id)
                .bind(ai as i32)
                .bind(&answer.text)
                .bind(answer.correct)
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for Db {
    async fn ensure_user(&self, user_id: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id) VALUES ($1)
            ON CONFLICT (id) DO UPDATE SET id = EXCLUDED.id
            RETURNING id, weaknesses
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, weaknesses FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn append_user_weakness(&self, user_id: &str, focus: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, weaknesses) VALUES ($1, ARRAY[$2::TEXT])
            ON CONFLICT (id) DO UPDATE SET weaknesses = array_append(users.weaknesses, $2::TEXT)
            RETURNING id, weaknesses
            "#,
        )
        .bind(user_id)
        .bind(focus)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> StoreResult<Conversation> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (id, user_id, title)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, title, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn find_conversation(&self, conversation_id: Uuid) -> StoreResult<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, user_id, title, created_at FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, title, created_at
            FROM conversations
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(conversations)
    }

    async fn list_conversation_summaries(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<ConversationSummary>> {
        let summaries = sqlx::query_as::<_, ConversationSummary>(
            r#"
            SELECT
                c.id,
                c.title,
                c.created_at,
                COUNT(m.id) AS message_count,
                (
                    SELECT lm.content FROM messages lm
                    WHERE lm.conversation_id = c.id
                    ORDER BY lm.created_at DESC
                    LIMIT 1
                ) AS last_message
            FROM conversations c
            LEFT JOIN messages m ON m.conversation_id = c.id
            WHERE c.user_id = $1
            GROUP BY c.id
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }

    async fn create_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> StoreResult<Message> {
        let sql = format!(
            "INSERT INTO messages (id, conversation_id, role, content) \
             SELECT $1, id, $3, $4 FROM conversations WHERE id = $2 \
             RETURNING {MESSAGE_COLUMNS}"
        );
        sqlx::query_as::<_, Message>(&sql)
            .bind(Uuid::new_v4())
            .bind(conversation_id)
            .bind(role)
            .bind(content)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("conversation", conversation_id))
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC"
        );
        let messages = sqlx::query_as::<_, Message>(&sql)
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(messages)
    }

    async fn update_message(
        &self,
        message_id: Uuid,
        correction_id: Option<Uuid>,
    ) -> StoreResult<Message> {
        let sql = format!(
            "UPDATE messages SET correction_id = $1 WHERE id = $2 RETURNING {MESSAGE_COLUMNS}"
        );
        sqlx::query_as::<_, Message>(&sql)
            .bind(correction_id)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("message", message_id))
    }

    async fn create_correction(
        &self,
        message_id: Uuid,
        critique: &GrammarCritique,
    ) -> StoreResult<Correction> {
        let sql = format!(
            "INSERT INTO corrections (id, message_id, original, corrected, focus) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {CORRECTION_COLUMNS}"
        );
        let correction = sqlx::query_as::<_, Correction>(&sql)
            .bind(Uuid::new_v4())
            .bind(message_id)
            .bind(&critique.original)
            .bind(&critique.corrected)
            .bind(&critique.focus)
            .fetch_one(&self.pool)
            .await?;
        Ok(correction)
    }

    async fn find_correction(&self, correction_id: Uuid) -> StoreResult<Option<Correction>> {
        let sql = format!("SELECT {CORRECTION_COLUMNS} FROM corrections WHERE id = $1");
        let correction = sqlx::query_as::<_, Correction>(&sql)
            .bind(correction_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(correction)
    }

    async fn list_corrections(&self, conversation_id: Uuid) -> StoreResult<Vec<Correction>> {
        let correction = sqlx::query_as::<_, Correction>(
            r#"
            SELECT c.id, c.message_id, c.original, c.corrected, c.focus, c.created_at
            FROM corrections c
            JOIN messages m ON m.id = c.message_id
            WHERE m.conversation_id = $1
            ORDER BY c.created_at ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(correction)
    }

    async fn delete_correction(&self, correction_id: Uuid) -> StoreResult<()> {
        // messages.correction_id is ON DELETE SET NULL.
        let result = sqlx::query("DELETE FROM corrections WHERE id = $1")
            .bind(correction_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("correction", correction_id));
        }
        Ok(())
    }

    async fn find_quiz_by_topic(&self, user_id: &str, topic: &str) -> StoreResult<Option<Quiz>> {
        let row = sqlx::query_as::<_, QuizRow>(
            "SELECT id, user_id, topic, created_at FROM quizzes WHERE user_id = $1 AND topic = $2",
        )
        .bind(user_id)
        .bind(topic)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.assemble_quiz(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_quiz(&self, quiz_id: Uuid) -> StoreResult<Option<Quiz>> {
        let row = sqlx::query_as::<_, QuizRow>(
            "SELECT id, user_id, topic, created_at FROM quizzes WHERE id = $1",
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.assemble_quiz(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_quizzes(&self, user_id: &str) -> StoreResult<Vec<QuizSummary>> {
        let quizzes = sqlx::query_as::<_, QuizSummary>(
            r#"
            SELECT q.id, q.topic, q.created_at, COUNT(qs.id) AS question_count
            FROM quizzes q
            LEFT JOIN questions qs ON qs.quiz_id = q.id
            WHERE q.user_id = $1
            GROUP BY q.id
            ORDER BY q.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(quizzes)
    }

    /// Inserts the quiz, its questions and its answers in a single transaction.
    async fn create_quiz_with_questions_and_answers(
        &self,
        user_id: &str,
        topic: &str,
        draft: &QuizDraft,
    ) -> StoreResult<Quiz> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, QuizRow>(
            r#"
            INSERT INTO quizzes (id, user_id, topic)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, topic) DO NOTHING
            RETURNING id, user_id, topic, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(topic)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            // A concurrent request created this quiz first.
            tx.rollback().await?;
            return self
                .find_quiz_by_topic(user_id, topic)
                .await?
                .ok_or_else(|| StoreError::not_found("quiz", topic));
        };

        Self::insert_questions(&mut tx, row.id, draft).await?;
        tx.commit().await?;

        self.assemble_quiz(row).await
    }
}
