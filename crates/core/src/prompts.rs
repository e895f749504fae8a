//! Prompt Templates
//!
//! Prompts live as Markdown files in a directory (one file per prompt, keyed
//! by file stem) so they can be tuned without recompiling the service.

use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::Path};

/// Placeholder substituted with the quiz topic in the `quiz_request` template.
pub const TOPIC_PLACEHOLDER: &str = "{topic}";

/// Reads every `*.md` file in `prompts_path` into a map keyed by file stem.
pub fn load_prompts(prompts_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    let entries = fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content.trim().to_string());
        }
    }
    Ok(prompts)
}

/// The full set of instructions the gateway needs.
#[derive(Debug, Clone)]
pub struct Prompts {
    /// System instruction for the conversation partner.
    pub conversation_system: String,
    /// System instruction for the grammar critic.
    pub grammar_system: String,
    /// System instruction for the quiz author.
    pub quiz_system: String,
    /// User request for a quiz, containing [`TOPIC_PLACEHOLDER`].
    pub quiz_request: String,
}

impl Prompts {
    /// Loads and checks all required templates from a directory.
    pub fn load(prompts_path: &Path) -> Result<Self> {
        let mut prompts = load_prompts(prompts_path)?;
        let mut take = |key: &str| {
            prompts
                .remove(key)
                .filter(|p| !p.is_empty())
                .with_context(|| format!("{key}.md not found in prompts directory"))
        };

        let loaded = Self {
            conversation_system: take("conversation_system")?,
            grammar_system: take("grammar_system")?,
            quiz_system: take("quiz_system")?,
            quiz_request: take("quiz_request")?,
        };

        if !loaded.quiz_request.contains(TOPIC_PLACEHOLDER) {
            anyhow::bail!("quiz_request.md must contain the {TOPIC_PLACEHOLDER} placeholder");
        }
        Ok(loaded)
    }

    /// Renders the quiz request for a specific topic.
    pub fn quiz_request_for(&self, topic: &str) -> String {
        self.quiz_request.replace(TOPIC_PLACEHOLDER, topic)
    }
}
