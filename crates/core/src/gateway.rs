//! Language Model Gateway
//!
//! Sends a system instruction plus an ordered message list to an
//! OpenAI-compatible chat completion endpoint and asks for output that
//! conforms to a JSON schema. The response is parsed into one of the
//! contract types in [`crate::contract`]; anything that does not parse is a
//! [`GatewayError`], never a partial result.

use crate::{
    contract::{ChatReply, ChatRole, ChatTurn, ContractViolation, GrammarCritique, QuizDraft},
    prompts::Prompts,
};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Sampling temperature for conversation and grammar requests.
pub const CHAT_TEMPERATURE: f32 = 0.7;

pub const MESSAGE_SCHEMA: &str = "message";
pub const GRAMMAR_SCHEMA: &str = "grammar";
pub const QUIZ_SCHEMA: &str = "quiz-structure";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("language model request failed: {0}")]
    Transport(#[from] OpenAIError),
    #[error("language model returned no content")]
    EmptyResponse,
    #[error("language model refused the request: {0}")]
    Refusal(String),
    #[error("response did not match the '{schema}' schema: {reason}")]
    Schema { schema: &'static str, reason: String },
    #[error("quiz response broke its contract: {0}")]
    Contract(#[from] ContractViolation),
}

/// The three structured requests the application makes of a language model.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait LanguageModelGateway: Send + Sync {
    /// Critiques the grammar of a single learner message.
    async fn critique(&self, text: &str) -> Result<GrammarCritique, GatewayError>;

    /// Produces the conversation partner's next message.
    ///
    /// `history` is every earlier message in chronological order; the new
    /// user text is appended after it.
    async fn reply(
        &self,
        history: &[ChatTurn],
        new_user_text: &str,
    ) -> Result<ChatReply, GatewayError>;

    /// Drafts a multiple-choice quiz on a grammar topic.
    ///
    /// Only the JSON shape is checked here; counts are enforced by
    /// [`QuizDraft::validate`].
    async fn generate_quiz(&self, topic: &str) -> Result<QuizDraft, GatewayError>;
}

/// Derives the JSON schema the model is asked to conform to.
///
/// Draft metadata (`$schema`, `title`) is stripped because the structured
/// output endpoint only accepts the schema body.
pub fn response_schema<T: JsonSchema>() -> Value {
    let mut schema: Value = schemars::schema_for!(T).into();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}

fn response_format<T: JsonSchema>(name: &'static str) -> ResponseFormat {
    ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: None,
            name: name.to_string(),
            schema: Some(response_schema::<T>()),
            strict: Some(true),
        },
    }
}

/// Parses the raw completion content into a contract type.
pub fn parse_structured<T: DeserializeOwned>(
    schema: &'static str,
    content: Option<&str>,
) -> Result<T, GatewayError> {
    let content = content
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(GatewayError::EmptyResponse)?;
    serde_json::from_str(content).map_err(|e| GatewayError::Schema {
        schema,
        reason: e.to_string(),
    })
}

/// Turns a completion message into a contract type, treating a refusal as an error.
pub fn read_completion<T: DeserializeOwned>(
    schema: &'static str,
    refusal: Option<&str>,
    content: Option<&str>,
) -> Result<T, GatewayError> {
    if let Some(refusal) = refusal {
        warn!(schema, "Language model refused a structured request");
        return Err(GatewayError::Refusal(refusal.to_string()));
    }
    parse_structured(schema, content)
}

/// A critique must name a focus, even if it is only the "no mistakes" sentinel.
pub fn check_critique(critique: GrammarCritique) -> Result<GrammarCritique, GatewayError> {
    if critique.focus.trim().is_empty() {
        return Err(GatewayError::Schema {
            schema: GRAMMAR_SCHEMA,
            reason: "focus is empty".to_string(),
        });
    }
    Ok(critique)
}

pub fn check_reply(reply: ChatReply) -> Result<ChatReply, GatewayError> {
    if reply.content.trim().is_empty() {
        return Err(GatewayError::EmptyResponse);
    }
    Ok(reply)
}

/// Builds the reply prompt: system instruction, prior history, then the new text.
pub fn conversation_messages(
    system_prompt: &str,
    history: &[ChatTurn],
    new_user_text: &str,
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 2);
    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()?
            .into(),
    );
    for turn in history {
        let message = match turn.role {
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.clone())
                .build()?
                .into(),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.clone())
                .build()?
                .into(),
        };
        messages.push(message);
    }
    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(new_user_text)
            .build()?
            .into(),
    );
    Ok(messages)
}

fn instruction_messages(
    system_prompt: &str,
    user_content: String,
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    Ok(vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(user_content)
            .build()?
            .into(),
    ])
}

/// An implementation of `LanguageModelGateway` for any OpenAI-compatible API.
pub struct OpenAICompatibleGateway {
    client: Client<OpenAIConfig>,
    model: String,
    prompts: Prompts,
}

impl OpenAICompatibleGateway {
    /// Creates a new gateway.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the completion service.
    /// * `model` - Model identifier, which must support JSON-schema output.
    /// * `prompts` - Instructions for each of the three request kinds.
    pub fn new(config: OpenAIConfig, model: String, prompts: Prompts) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            prompts,
        }
    }

    async fn complete<T: DeserializeOwned + JsonSchema>(
        &self,
        schema: &'static str,
        messages: Vec<ChatCompletionRequestMessage>,
        temperature: Option<f32>,
    ) -> Result<T, GatewayError> {
        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(&self.model)
            .messages(messages)
            .response_format(response_format::<T>(schema));
        if let Some(temperature) = temperature {
            request.temperature(temperature);
        }
        let request = request.build()?;

        let response = self.client.chat().create(request).await?;
        let message = &response
            .choices
            .first()
            .ok_or(GatewayError::EmptyResponse)?
            .message;

        debug!(schema, model = %self.model, "Received structured completion");
        read_completion(schema, message.refusal.as_deref(), message.content.as_deref())
    }
}

#[async_trait]
impl LanguageModelGateway for OpenAICompatibleGateway {
    async fn critique(&self, text: &str) -> Result<GrammarCritique, GatewayError> {
        let messages =
            instruction_messages(&self.prompts.grammar_system, format!("The message is {text}"))?;
        let critique = self
            .complete(GRAMMAR_SCHEMA, messages, Some(CHAT_TEMPERATURE))
            .await?;
        check_critique(critique)
    }

    async fn reply(
        &self,
        history: &[ChatTurn],
        new_user_text: &str,
    ) -> Result<ChatReply, GatewayError> {
        let messages =
            conversation_messages(&self.prompts.conversation_system, history, new_user_text)?;
        let reply = self
            .complete(MESSAGE_SCHEMA, messages, Some(CHAT_TEMPERATURE))
            .await?;
        check_reply(reply)
    }

    async fn generate_quiz(&self, topic: &str) -> Result<QuizDraft, GatewayError> {
        let messages =
            instruction_messages(&self.prompts.quiz_system, self.prompts.quiz_request_for(topic))?;
        self.complete(QUIZ_SCHEMA, messages, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_schema_is_closed_object() {
        let schema = response_schema::<GrammarCritique>();
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("title").is_none());
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["additionalProperties"], Value::Bool(false));

        let properties = schema["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 3);
        for field in ["original", "corrected", "focus"] {
            assert_eq!(properties[field]["type"], "string");
        }
        assert_eq!(schema["required"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_message_schema_constrains_role() {
        let schema = response_schema::<ChatReply>();
        let rendered = schema.to_string();
        assert!(rendered.contains("\"user\""));
        assert!(rendered.contains("\"assistant\""));
        assert!(!rendered.contains("\"system\""));
    }

    #[test]
    fn test_parse_structured_accepts_valid_json() {
        let critique: GrammarCritique = parse_structured(
            GRAMMAR_SCHEMA,
            Some(r#"{"original":"I has a dog.","corrected":"I have a dog.","focus":"Subject-verb agreement"}"#),
        )
        .unwrap();
        assert_eq!(critique.focus, "Subject-verb agreement");
    }

    #[test]
    fn test_parse_structured_rejects_missing_content() {
        let result: Result<ChatReply, _> = parse_structured(MESSAGE_SCHEMA, None);
        assert!(matches!(result, Err(GatewayError::EmptyResponse)));

        let result: Result<ChatReply, _> = parse_structured(MESSAGE_SCHEMA, Some("   "));
        assert!(matches!(result, Err(GatewayError::EmptyResponse)));
    }

    #[test]
    fn test_parse_structured_rejects_schema_violation() {
        let result: Result<ChatReply, _> =
            parse_structured(MESSAGE_SCHEMA, Some(r#"{"role":"system","content":"hi"}"#));
        match result {
            Err(GatewayError::Schema { schema, .. }) => assert_eq!(schema, MESSAGE_SCHEMA),
            other => panic!("Expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_refusal_wins_over_content() {
        let result: Result<ChatReply, _> = read_completion(
            MESSAGE_SCHEMA,
            Some("I can't help with that."),
            Some(r#"{"role":"assistant","content":"hi"}"#),
        );
        match result {
            Err(GatewayError::Refusal(reason)) => assert_eq!(reason, "I can't help with that."),
            other => panic!("Expected refusal, got {other:?}"),
        }

        let reply: ChatReply = read_completion(
            MESSAGE_SCHEMA,
            None,
            Some(r#"{"role":"assistant","content":"hi"}"#),
        )
        .unwrap();
        assert_eq!(reply.content, "hi");
    }

    #[test]
    fn test_critique_without_focus_is_schema_error() {
        let blank = GrammarCritique {
            original: "I has a dog.".to_string(),
            corrected: "I have a dog.".to_string(),
            focus: "  ".to_string(),
        };
        match check_critique(blank) {
            Err(GatewayError::Schema { schema, .. }) => assert_eq!(schema, GRAMMAR_SCHEMA),
            other => panic!("Expected schema error, got {other:?}"),
        }

        let sentinel = GrammarCritique {
            original: "I have a dog.".to_string(),
            corrected: "I have a dog.".to_string(),
            focus: crate::contract::NO_MISTAKES.to_string(),
        };
        assert_eq!(check_critique(sentinel.clone()).unwrap(), sentinel);
    }

    #[test]
    fn test_blank_reply_is_empty_response() {
        for content in ["", " \n\t "] {
            let reply = ChatReply {
                role: ChatRole::Assistant,
                content: content.to_string(),
            };
            assert!(matches!(check_reply(reply), Err(GatewayError::EmptyResponse)));
        }

        let reply = ChatReply {
            role: ChatRole::Assistant,
            content: "What's your dog's name?".to_string(),
        };
        assert!(check_reply(reply).is_ok());
    }

    #[test]
    fn test_conversation_messages_order() {
        let history = vec![
            ChatTurn::new(ChatRole::User, "Hello"),
            ChatTurn::new(ChatRole::Assistant, "Hi! How are you?"),
        ];
        let messages = conversation_messages("Be friendly.", &history, "I has a dog.").unwrap();

        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[3], ChatCompletionRequestMessage::User(_)));
    }
}
