//! Panel settings. Persisted by the host (or a TOML file for the CLI); the
//! core never reads ambient state — a settings value is passed into each
//! call. `#[serde(default)]` keeps missing keys at their defaults, matching
//! the host-side settings-merge convention.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GenerateError;
use crate::parser::ParserOptions;
use crate::sources::SourceKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    pub enabled: bool,
    pub source: SourceKind,

    /// Base URL of the local Ollama-style server.
    pub local_url: String,
    pub local_model: String,
    /// Response deadline for the local server, in seconds. `None` disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_timeout_secs: Option<u64>,

    /// Base URL of the OpenAI-compatible endpoint (including any `/v1`).
    pub openai_url: String,
    pub openai_model: String,

    /// Saved connection profile name, for `source = "profile"`.
    pub profile: String,

    /// How many reactions to render per generation.
    pub reaction_count: usize,
    /// Natural-language style instructions steering tone and format.
    pub style_prompt: String,
    /// Single-voice styles ignore `reaction_count` and always produce one.
    pub narrator_style: bool,

    pub include_user_input: bool,
    pub context_depth: usize,

    /// Quiet period before a triggered generation actually starts.
    pub debounce_ms: u64,

    pub fallback_name: String,
    /// Show a wholly-unparseable completion verbatim instead of "no content".
    pub salvage_unparsed: bool,
}

impl Default for PanelSettings {
    fn default() -> Self {
        PanelSettings {
            enabled: true,
            source: SourceKind::Default,
            local_url: "http://localhost:11434".to_string(),
            local_model: String::new(),
            local_timeout_secs: Some(45),
            openai_url: "http://localhost:1234/v1".to_string(),
            openai_model: "local-model".to_string(),
            profile: String::new(),
            reaction_count: 5,
            style_prompt: "Generate chat messages. Output: username: message".to_string(),
            narrator_style: false,
            include_user_input: false,
            context_depth: 2,
            debounce_ms: 500,
            fallback_name: "User".to_string(),
            salvage_unparsed: false,
        }
    }
}

impl PanelSettings {
    pub fn load(path: &Path) -> Result<Self, GenerateError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GenerateError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| GenerateError::Config(format!("bad settings in {}: {e}", path.display())))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn local_timeout(&self) -> Option<Duration> {
        self.local_timeout_secs.map(Duration::from_secs)
    }

    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            fallback_name: self.fallback_name.clone(),
            salvage_unparsed: self.salvage_unparsed,
        }
    }
}
