//! Quiz Generator
//!
//! Quizzes are cached forever by their natural key `(user, topic)`: the first
//! request for a topic asks the language model for a quiz and stores it, every
//! later request returns the stored quiz unchanged.

use crate::{
    models::{Quiz, QuizScore, QuizSummary},
    store::{RecordStore, StoreError},
};
use lingo_core::gateway::{GatewayError, LanguageModelGateway};
use std::{collections::HashSet, sync::Arc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("no authenticated user")]
    MissingUser,
    #[error("quiz topic must not be empty")]
    EmptyTopic,
    #[error("quiz {0} not found")]
    NotFound(Uuid),
    #[error("user '{user_id}' does not own quiz {quiz_id}")]
    Forbidden { user_id: String, quiz_id: Uuid },
    #[error("language model failure: {0}")]
    Gateway(#[from] GatewayError),
    #[error("record store failure: {0}")]
    Store(#[from] StoreError),
}

pub struct QuizGenerator {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn LanguageModelGateway>,
}

impl QuizGenerator {
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn LanguageModelGateway>) -> Self {
        Self { store, gateway }
    }

    /// Returns the user's quiz for `topic`, generating and storing it on first use.
    #[instrument(skip_all, fields(%user_id, %topic))]
    pub async fn get_or_create_quiz(&self, user_id: &str, topic: &str) -> Result<Quiz, QuizError> {
        if user_id.trim().is_empty() {
            return Err(QuizError::MissingUser);
        }
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(QuizError::EmptyTopic);
        }

        if let Some(existing) = self.store.find_quiz_by_topic(user_id, topic).await? {
            info!(quiz_id = %existing.id, "Returning existing quiz");
            return Ok(existing);
        }

        let draft = self.gateway.generate_quiz(topic).await?;
        if let Err(violation) = draft.validate() {
            warn!(%violation, "Generated quiz rejected");
            return Err(GatewayError::from(violation).into());
        }

        self.store.ensure_user(user_id).await?;
        let quiz = self
            .store
            .create_quiz_with_questions_and_answers(user_id, topic, &draft)
            .await?;
        info!(quiz_id = %quiz.id, questions = quiz.questions.len(), "Quiz created");
        Ok(quiz)
    }

    /// Loads a quiz, checking that `user_id` owns it.
    pub async fn get_quiz(&self, user_id: &str, quiz_id: Uuid) -> Result<Quiz, QuizError> {
        if user_id.trim().is_empty() {
            return Err(QuizError::MissingUser);
        }
        let quiz = self
            .store
            .find_quiz(quiz_id)
            .await?
            .ok_or(QuizError::NotFound(quiz_id))?;
        if quiz.user_id != user_id {
            return Err(QuizError::Forbidden {
                user_id: user_id.to_string(),
                quiz_id,
            });
        }
        Ok(quiz)
    }

    pub async fn list_quizzes(&self, user_id: &str) -> Result<Vec<QuizSummary>, QuizError> {
        if user_id.trim().is_empty() {
            return Err(QuizError::MissingUser);
        }
        Ok(self.store.list_quizzes(user_id).await?)
    }
}

/// Counts the questions answered correctly.
///
/// `selections` holds chosen answer ids. A question counts once at most, and
/// ids that belong to no question of this quiz are ignored.
pub fn score_quiz(quiz: &Quiz, selections: &[Uuid]) -> QuizScore {
    let chosen: HashSet<Uuid> = selections.iter().copied().collect();
    let correct = quiz
        .questions
        .iter()
        .filter(|question| {
            let picked: Vec<_> = question
                .answers
                .iter()
                .filter(|a| chosen.contains(&a.id))
                .collect();
            picked.len() == 1 && picked[0].correct
        })
        .count();
    QuizScore {
        correct,
        total: quiz.questions.len(),
    }
}
