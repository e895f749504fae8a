//! Response Contracts
//!
//! The structured shapes the language model is asked to produce. Each type
//! doubles as the JSON schema handed to the model (via `schemars`) and as the
//! target of deserialization, so the two can never drift apart.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The literal focus label the model returns when a message is grammatically sound.
pub const NO_MISTAKES: &str = "No grammar mistakes found";

/// Number of questions every generated quiz must contain.
pub const QUIZ_QUESTION_COUNT: usize = 10;

/// Number of answer options every quiz question must offer.
pub const ANSWERS_PER_QUESTION: usize = 4;

/// Speaker of a chat message as understood by the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One prior message handed to the model as conversational context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The `message` schema: the conversation partner's next utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ChatReply {
    pub role: ChatRole,
    pub content: String,
}

/// The `grammar` schema: a critique of a single learner message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GrammarCritique {
    /// The learner's text as the model understood it.
    pub original: String,
    /// The suggested rewrite.
    pub corrected: String,
    /// A short grammatical category such as "Past simple", or [`NO_MISTAKES`].
    pub focus: String,
}

impl GrammarCritique {
    /// Returns `true` when the critique names a real grammar issue worth recording.
    ///
    /// The sentinel comparison ignores case, surrounding whitespace and a
    /// trailing full stop.
    pub fn is_actionable(&self) -> bool {
        let focus = self.focus.trim().trim_end_matches('.').trim();
        !focus.is_empty() && !focus.eq_ignore_ascii_case(NO_MISTAKES)
    }
}

/// The `quiz-structure` schema: a full multiple-choice quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QuizDraft {
    pub questions: Vec<QuestionDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QuestionDraft {
    pub question: String,
    pub answers: Vec<AnswerDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AnswerDraft {
    pub text: String,
    pub correct: bool,
}

/// The ways a well-formed JSON quiz can still break the quiz contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("expected {expected} questions, found {found}")]
    QuestionCount { expected: usize, found: usize },
    #[error("question {index} has {found} answers, expected {expected}")]
    AnswerCount {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("question {index} has {found} correct answers, expected exactly one")]
    CorrectAnswerCount { index: usize, found: usize },
    #[error("question {index} has blank text")]
    BlankText { index: usize },
}

impl QuizDraft {
    /// Checks the counts the JSON schema alone cannot express.
    pub fn validate(&self) -> Result<(), ContractViolation> {
        if self.questions.len() != QUIZ_QUESTION_COUNT {
            return Err(ContractViolation::QuestionCount {
                expected: QUIZ_QUESTION_COUNT,
                found: self.questions.len(),
            });
        }

        for (index, question) in self.questions.iter().enumerate() {
            if question.question.trim().is_empty()
                || question.answers.iter().any(|a| a.text.trim().is_empty())
            {
                return Err(ContractViolation::BlankText { index });
            }
            if question.answers.len() != ANSWERS_PER_QUESTION {
                return Err(ContractViolation::AnswerCount {
                    index,
                    expected: ANSWERS_PER_QUESTION,
                    found: question.answers.len(),
                });
            }
            let correct = question.answers.iter().filter(|a| a.correct).count();
            if correct != 1 {
                return Err(ContractViolation::CorrectAnswerCount {
                    index,
                    found: correct,
                });
            }
        }

        Ok(())
    }
}
