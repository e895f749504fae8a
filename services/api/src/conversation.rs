//! Conversation Orchestrator
//!
//! Drives one user turn end to end:
//! 1.  Persist the user's message while the grammar critique runs alongside it.
//! 2.  Record a correction (and a new weakness) when the critique finds an issue.
//! 3.  Ask for the assistant's reply with the full history as context.
//! 4.  Persist the reply and hand both messages back to the caller.
//!
//! A failure at any step abandons the turn where it stands; records already
//! written are kept.

use crate::{
    models::{Conversation, ConversationDetail, Correction, Message, MessageRole, TurnResult},
    store::{RecordStore, StoreError},
};
use lingo_core::{
    contract::{ChatRole, ChatTurn},
    gateway::{GatewayError, LanguageModelGateway},
    turn::{TurnGuard, TurnState, TurnTracker, TurnTrackingError},
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("message text must not be empty")]
    EmptyInput,
    #[error("no authenticated user")]
    MissingUser,
    #[error("user '{user_id}' does not own conversation {conversation_id}")]
    Forbidden {
        user_id: String,
        conversation_id: Uuid,
    },
    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),
    #[error("correction {0} not found in this conversation")]
    CorrectionNotFound(Uuid),
    #[error(transparent)]
    Tracking(#[from] TurnTrackingError),
    #[error("language model failure: {0}")]
    Gateway(#[from] GatewayError),
    #[error("record store failure: {0}")]
    Store(#[from] StoreError),
}

pub struct ConversationOrchestrator {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn LanguageModelGateway>,
    turns: TurnTracker,
}

impl ConversationOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn LanguageModelGateway>) -> Self {
        Self {
            store,
            gateway,
            turns: TurnTracker::new(),
        }
    }

    /// State of the turn currently running for a conversation, if any.
    pub fn turn_state(&self, conversation_id: Uuid) -> TurnState {
        self.turns.state(conversation_id)
    }

    /// Resolves a conversation and checks that `user_id` owns it.
    async fn authorize(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<Conversation, TurnError> {
        if user_id.trim().is_empty() {
            return Err(TurnError::MissingUser);
        }
        let conversation = self
            .store
            .find_conversation(conversation_id)
            .await?
            .ok_or(TurnError::ConversationNotFound(conversation_id))?;
        if conversation.user_id != user_id {
            return Err(TurnError::Forbidden {
                user_id: user_id.to_string(),
                conversation_id,
            });
        }
        Ok(conversation)
    }

    /// Starts a new, empty conversation for a user.
    pub async fn start_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<Conversation, TurnError> {
        if user_id.trim().is_empty() {
            return Err(TurnError::MissingUser);
        }
        self.store.ensure_user(user_id).await?;
        let title = title.map(str::trim).filter(|t| !t.is_empty());
        let conversation = self.store.create_conversation(user_id, title).await?;
        info!(%user_id, conversation_id = %conversation.id, "Conversation started");
        Ok(conversation)
    }

    /// Loads a conversation with its ordered messages and their corrections.
    pub async fn conversation_detail(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<ConversationDetail, TurnError> {
        let conversation = self.authorize(user_id, conversation_id).await?;
        let messages = self.store.list_messages(conversation_id).await?;
        let corrections = self.store.list_corrections(conversation_id).await?;
        Ok(ConversationDetail {
            conversation,
            messages,
            corrections,
        })
    }

    /// Runs one user turn.
    ///
    /// The conversation so far is read only after the turn slot is claimed,
    /// so the reply context includes every message an earlier turn persisted.
    #[instrument(name = "turn", skip_all, fields(%user_id, %conversation_id))]
    pub async fn submit_turn(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        user_text: &str,
    ) -> Result<TurnResult, TurnError> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(TurnError::EmptyInput);
        }
        self.authorize(user_id, conversation_id).await?;

        let mut turn = self.turns.begin(conversation_id)?;
        match self.run_turn(&mut turn, user_id, conversation_id, text).await {
            Ok(result) => {
                turn.advance(TurnState::Settled)?;
                info!(corrected = result.correction.is_some(), "Turn settled");
                Ok(result)
            }
            Err(e) => {
                warn!(state = %turn.state(), error = %e, "Turn failed");
                turn.advance(TurnState::Failed)?;
                Err(e)
            }
        }
    }

    async fn run_turn(
        &self,
        turn: &mut TurnGuard,
        user_id: &str,
        conversation_id: Uuid,
        text: &str,
    ) -> Result<TurnResult, TurnError> {
        let prior_messages = self.store.list_messages(conversation_id).await?;

        turn.advance(TurnState::AwaitingCritiqueAndPersist)?;
        let (persisted, critique) = tokio::join!(
            self.store.create_message(conversation_id, MessageRole::User, text),
            self.gateway.critique(text),
        );
        let mut user_message = persisted?;
        let critique = critique?;

        let correction = if critique.is_actionable() {
            let correction = self.store.create_correction(user_message.id, &critique).await?;
            user_message = self
                .store
                .update_message(user_message.id, Some(correction.id))
                .await?;
            self.store.append_user_weakness(user_id, &critique.focus).await?;
            info!(
                focus = %critique.focus,
                correction_id = %correction.id,
                "Grammar correction recorded"
            );
            Some(correction)
        } else {
            None
        };

        turn.advance(TurnState::AwaitingReply)?;
        let history: Vec<ChatTurn> = prior_messages.iter().map(Message::to_chat_turn).collect();
        let reply = self.gateway.reply(&history, &user_message.content).await?;
        if reply.role != ChatRole::Assistant {
            warn!(
                role = ?reply.role,
                "Reply came back with a non-assistant role; storing as assistant"
            );
        }

        let assistant_message = self
            .store
            .create_message(conversation_id, MessageRole::Assistant, &reply.content)
            .await?;

        Ok(TurnResult {
            user_message,
            assistant_message,
            correction,
        })
    }

    /// Removes one correction from a conversation, leaving its message intact.
    ///
    /// The correction is addressed by its own identifier, never by the
    /// identifier of the message it is attached to.
    #[instrument(skip_all, fields(%user_id, %conversation_id, %correction_id))]
    pub async fn delete_correction(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        correction_id: Uuid,
    ) -> Result<(), TurnError> {
        self.authorize(user_id, conversation_id).await?;

        let correction: Correction = self
            .store
            .find_correction(correction_id)
            .await?
            .ok_or(TurnError::CorrectionNotFound(correction_id))?;
        let in_conversation = self
            .store
            .list_messages(conversation_id)
            .await?
            .iter()
            .any(|m| m.id == correction.message_id);
        if !in_conversation {
            return Err(TurnError::CorrectionNotFound(correction_id));
        }

        self.store.delete_correction(correction_id).await?;
        info!("Grammar correction deleted");
        Ok(())
    }
}
