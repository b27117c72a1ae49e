use std::path::PathBuf;

use clap::Parser;

use crate::config::PanelSettings;
use crate::error::GenerateError;
use crate::sources::SourceKind;

#[derive(Parser)]
#[command(name = "peanut-gallery")]
#[command(version)]
#[command(about = "Generate peanut-gallery chat reactions to a conversation transcript")]
pub struct Args {
    /// Transcript file with one `Name: message` entry per line, or `-` for stdin
    pub transcript: String,

    /// Settings file (TOML); flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Which backend to use
    #[arg(long, value_enum)]
    pub source: Option<SourceKind>,

    /// Base URL of the local Ollama-style server
    #[arg(long)]
    pub local_url: Option<String>,

    /// Model name on the local server
    #[arg(long)]
    pub local_model: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint (including any /v1)
    #[arg(long)]
    pub openai_url: Option<String>,

    /// Model name for the OpenAI-compatible endpoint
    #[arg(long)]
    pub openai_model: Option<String>,

    /// How many reactions to ask for
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Style instructions steering tone and format
    #[arg(long)]
    pub style: Option<String>,

    /// Single-voice narrator mode (always one reaction)
    #[arg(long)]
    pub narrator: bool,

    /// Include the user's side of the conversation in the prompt
    #[arg(long)]
    pub include_user_input: bool,

    /// How many transcript entries to include (clamped to 2..=8)
    #[arg(long)]
    pub depth: Option<usize>,

    /// Show a wholly-unparseable completion verbatim instead of "no content"
    #[arg(long)]
    pub salvage: bool,

    /// Speaker name treated as the user in the transcript
    #[arg(long, default_value = "You")]
    pub user_name: String,

    /// Plain output without colors
    #[arg(long)]
    pub no_color: bool,

    /// Verbose logging (repeat for more)
    #[arg(long, short, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Load the config file (if any) and fold the CLI overrides into it.
    pub fn resolve_settings(&self) -> Result<PanelSettings, GenerateError> {
        let mut settings = match &self.config {
            Some(path) => PanelSettings::load(path)?,
            None => PanelSettings::default(),
        };
        if let Some(source) = self.source {
            settings.source = source;
        }
        if let Some(url) = &self.local_url {
            settings.local_url = url.clone();
        }
        if let Some(model) = &self.local_model {
            settings.local_model = model.clone();
        }
        if let Some(url) = &self.openai_url {
            settings.openai_url = url.clone();
        }
        if let Some(model) = &self.openai_model {
            settings.openai_model = model.clone();
        }
        if let Some(count) = self.count {
            settings.reaction_count = count;
        }
        if let Some(style) = &self.style {
            settings.style_prompt = style.clone();
        }
        if self.narrator {
            settings.narrator_style = true;
        }
        if self.include_user_input {
            settings.include_user_input = true;
        }
        if let Some(depth) = self.depth {
            settings.context_depth = depth;
        }
        if self.salvage {
            settings.salvage_unparsed = true;
        }
        // A one-shot run has no keystrokes to coalesce.
        settings.debounce_ms = 0;
        Ok(settings)
    }
}
