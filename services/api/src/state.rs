//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the record store and the orchestration services.

use crate::{
    config::Config, conversation::ConversationOrchestrator, quiz::QuizGenerator,
    store::RecordStore,
};
use lingo_core::gateway::LanguageModelGateway;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub conversations: Arc<ConversationOrchestrator>,
    pub quizzes: Arc<QuizGenerator>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the orchestration services around one store and one gateway.
    pub fn new(
        store: Arc<dyn RecordStore>,
        gateway: Arc<dyn LanguageModelGateway>,
        config: Config,
    ) -> Self {
        Self {
            conversations: Arc::new(ConversationOrchestrator::new(
                store.clone(),
                gateway.clone(),
            )),
            quizzes: Arc::new(QuizGenerator::new(store.clone(), gateway)),
            store,
            config: Arc::new(config),
        }
    }
}
