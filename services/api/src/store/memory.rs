//! In-memory Record Store
//!
//! Holds every record in a single mutex-protected state, so each operation is
//! trivially atomic. Backs the orchestrator and quiz test suites.

use super::{RecordStore, StoreError, StoreResult};
use crate::models::{
    Answer, Conversation, ConversationSummary, Correction, Message, MessageRole, Question, Quiz,
    QuizSummary, User,
};
use async_trait::async_trait;
use chrono::Utc;
use lingo_core::contract::{GrammarCritique, QuizDraft};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    corrections: Vec<Correction>,
    quizzes: Vec<Quiz>,
}

impl MemoryState {
    fn user_mut(&mut self, user_id: &str) -> &mut User {
        self.users
            .entry(user_id.to_string())
            .or_insert_with(|| User {
                id: user_id.to_string(),
                weaknesses: Vec::new(),
            })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of persisted records of every kind.
    pub async fn record_count(&self) -> usize {
        let state = self.state.lock().await;
        let quiz_rows: usize = state
            .quizzes
            .iter()
            .map(|q| 1 + q.questions.iter().map(|qs| 1 + qs.answers.len()).sum::<usize>())
            .sum();
        state.users.len()
            + state.conversations.len()
            + state.messages.len()
            + state.corrections.len()
            + quiz_rows
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ensure_user(&self, user_id: &str) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        Ok(state.user_mut(user_id).clone())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(user_id).cloned())
    }

    async fn append_user_weakness(&self, user_id: &str, focus: &str) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        let user = state.user_mut(user_id);
        user.weaknesses.push(focus.to_string());
        Ok(user.clone())
    }

    async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> StoreResult<Conversation> {
        let mut state = self.state.lock().await;
        state.user_mut(user_id);
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: title.map(str::to_string),
            created_at: Utc::now(),
        };
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(&self, conversation_id: Uuid) -> StoreResult<Option<Conversation>> {
        let state = self.state.lock().await;
        Ok(state
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned())
    }

    async fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        let state = self.state.lock().await;
        Ok(state
            .conversations
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_conversation_summaries(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<ConversationSummary>> {
        let state = self.state.lock().await;
        Ok(state
            .conversations
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .map(|c| {
                let messages: Vec<&Message> = state
                    .messages
                    .iter()
                    .filter(|m| m.conversation_id == c.id)
                    .collect();
                ConversationSummary {
                    id: c.id,
                    title: c.title.clone(),
                    message_count: messages.len() as i64,
                    last_message: messages.last().map(|m| m.content.clone()),
                    created_at: c.created_at,
                }
            })
            .collect())
    }

    async fn create_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> StoreResult<Message> {
        let mut state = self.state.lock().await;
        if !state.conversations.iter().any(|c| c.id == conversation_id) {
            return Err(StoreError::not_found("conversation", conversation_id));
        }
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.to_string(),
            correction_id: None,
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn update_message(
        &self,
        message_id: Uuid,
        correction_id: Option<Uuid>,
    ) -> StoreResult<Message> {
        let mut state = self.state.lock().await;
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StoreError::not_found("message", message_id))?;
        message.correction_id = correction_id;
        Ok(message.clone())
    }

    async fn create_correction(
        &self,
        message_id: Uuid,
        critique: &GrammarCritique,
    ) -> StoreResult<Correction> {
        let mut state = self.state.lock().await;
        if !state.messages.iter().any(|m| m.id == message_id) {
            return Err(StoreError::not_found("message", message_id));
        }
        let correction = Correction {
            id: Uuid::new_v4(),
            message_id,
            original: critique.original.clone(),
            corrected: critique.corrected.clone(),
            focus: critique.focus.clone(),
            created_at: Utc::now(),
        };
        state.corrections.push(correction.clone());
        Ok(correction)
    }

    async fn find_correction(&self, correction_id: Uuid) -> StoreResult<Option<Correction>> {
        let state = self.state.lock().await;
        Ok(state
            .corrections
            .iter()
            .find(|c| c.id == correction_id)
            .cloned())
    }

    async fn list_corrections(&self, conversation_id: Uuid) -> StoreResult<Vec<Correction>> {
        let state = self.state.lock().await;
        let message_ids: Vec<Uuid> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.id)
            .collect();
        Ok(state
            .corrections
            .iter()
            .filter(|c| message_ids.contains(&c.message_id))
            .cloned()
            .collect())
    }

    async fn delete_correction(&self, correction_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let index = state
            .corrections
            .iter()
            .position(|c| c.id == correction_id)
            .ok_or_else(|| StoreError::not_found("correction", correction_id))?;
        state.corrections.remove(index);
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.correction_id == Some(correction_id))
        {
            message.correction_id = None;
        }
        Ok(())
    }

    async fn find_quiz_by_topic(&self, user_id: &str, topic: &str) -> StoreResult<Option<Quiz>> {
        let state = self.state.lock().await;
        Ok(state
            .quizzes
            .iter()
            .find(|q| q.user_id == user_id && q.topic == topic)
            .cloned())
    }

    async fn find_quiz(&self, quiz_id: Uuid) -> StoreResult<Option<Quiz>> {
        let state = self.state.lock().await;
        Ok(state.quizzes.iter().find(|q| q.id == quiz_id).cloned())
    }

    async fn list_quizzes(&self, user_id: &str) -> StoreResult<Vec<QuizSummary>> {
        let state = self.state.lock().await;
        Ok(state
            .quizzes
            .iter()
            .rev()
            .filter(|q| q.user_id == user_id)
            .map(QuizSummary::from)
            .collect())
    }

    async fn create_quiz_with_questions_and_answers(
        &self,
        user_id: &str,
        topic: &str,
        draft: &QuizDraft,
    ) -> StoreResult<Quiz> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .quizzes
            .iter()
            .find(|q| q.user_id == user_id && q.topic == topic)
        {
            return Ok(existing.clone());
        }

        let questions = draft
            .questions
            .iter()
            .enumerate()
            .map(|(qi, question)| Question {
                id: Uuid::new_v4(),
                position: qi as i32,
                text: question.question.clone(),
                answers: question
                    .answers
                    .iter()
                    .enumerate()
                    .map(|(ai, answer)| Answer {
                        id: Uuid::new_v4(),
                        position: ai as i32,
                        text: answer.text.clone(),
                        correct: answer.correct,
                    })
                    .collect(),
            })
            .collect();

        let quiz = Quiz {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            topic: topic.to_string(),
            created_at: Utc::now(),
            questions,
        };
        state.user_mut(user_id);
        state.quizzes.push(quiz.clone());
        Ok(quiz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingo_core::contract::{AnswerDraft, QuestionDraft};

    fn draft(questions: usize) -> QuizDraft {
        QuizDraft {
            questions: (0..questions)
                .map(|n| QuestionDraft {
                    question: format!("Question {n}"),
                    answers: (0..4)
                        .map(|i| AnswerDraft {
                            text: format!("Answer {i}"),
                            correct: i == 2,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_message_requires_conversation() {
        let store = MemoryStore::new();
        let err = store
            .create_message(Uuid::new_v4(), MessageRole::User, "Hello")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "conversation", .. }));
    }

    #[tokio::test]
    async fn test_conversation_summaries_count_messages() {
        let store = MemoryStore::new();
        let empty = store.create_conversation("u1", Some("Empty")).await.unwrap();
        let chatty = store.create_conversation("u1", None).await.unwrap();
        store.create_conversation("u2", None).await.unwrap();
        for (role, text) in [(MessageRole::User, "Hi!"), (MessageRole::Assistant, "Hello!")] {
            store.create_message(chatty.id, role, text).await.unwrap();
        }

        let summaries = store.list_conversation_summaries("u1").await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, chatty.id);
        assert_eq!(summaries[0].message_count, 2);
        assert_eq!(summaries[0].last_message.as_deref(), Some("Hello!"));
        assert_eq!(summaries[1].id, empty.id);
        assert_eq!(summaries[1].title.as_deref(), Some("Empty"));
        assert_eq!(summaries[1].message_count, 0);
        assert_eq!(summaries[1].last_message, None);
    }

    #[tokio::test]
    async fn test_messages_keep_creation_order() {
        let store = MemoryStore::new();
        let conversation = store.create_conversation("u1", None).await.unwrap();
        for text in ["one", "two", "three"] {
            store
                .create_message(conversation.id, MessageRole::User, text)
                .await
                .unwrap();
        }

        let contents: Vec<_> = store
            .list_messages(conversation.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_weaknesses_append_in_order() {
        let store = MemoryStore::new();
        store.append_user_weakness("u1", "Articles").await.unwrap();
        let user = store.append_user_weakness("u1", "Past simple").await.unwrap();
        assert_eq!(user.weaknesses, vec!["Articles", "Past simple"]);
    }

    #[tokio::test]
    async fn test_delete_correction_unlinks_message() {
        let store = MemoryStore::new();
        let conversation = store.create_conversation("u1", None).await.unwrap();
        let message = store
            .create_message(conversation.id, MessageRole::User, "I has a dog.")
            .await
            .unwrap();
        let critique = GrammarCritique {
            original: "I has a dog.".to_string(),
            corrected: "I have a dog.".to_string(),
            focus: "Subject-verb agreement".to_string(),
        };
        let correction = store.create_correction(message.id, &critique).await.unwrap();
        store
            .update_message(message.id, Some(correction.id))
            .await
            .unwrap();

        store.delete_correction(correction.id).await.unwrap();

        let messages = store.list_messages(conversation.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].correction_id, None);
        assert!(store.find_correction(correction.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_correction_by_message_id_is_not_found() {
        let store = MemoryStore::new();
        let conversation = store.create_conversation("u1", None).await.unwrap();
        let message = store
            .create_message(conversation.id, MessageRole::User, "I has a dog.")
            .await
            .unwrap();

        let err = store.delete_correction(message.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "correction", .. }));
    }

    #[tokio::test]
    async fn test_quiz_is_unique_per_user_and_topic() {
        let store = MemoryStore::new();
        let first = store
            .create_quiz_with_questions_and_answers("u1", "Articles", &draft(10))
            .await
            .unwrap();
        let second = store
            .create_quiz_with_questions_and_answers("u1", "Articles", &draft(10))
            .await
            .unwrap();
        let other_user = store
            .create_quiz_with_questions_and_answers("u2", "Articles", &draft(10))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other_user.id);
        assert_eq!(store.list_quizzes("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_quiz_preserves_question_and_answer_order() {
        let store = MemoryStore::new();
        let quiz = store
            .create_quiz_with_questions_and_answers("u1", "Articles", &draft(10))
            .await
            .unwrap();

        assert_eq!(quiz.questions.len(), 10);
        for (i, question) in quiz.questions.iter().enumerate() {
            assert_eq!(question.position, i as i32);
            assert_eq!(question.text, format!("Question {i}"));
            assert_eq!(question.answers.len(), 4);
            assert!(question.answers[2].correct);
        }

        let found = store.find_quiz_by_topic("u1", "Articles").await.unwrap();
        assert_eq!(found, Some(quiz));
    }
}
