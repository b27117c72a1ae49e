use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use colored::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use peanut_gallery::cli::Args;
use peanut_gallery::host::{
    ActiveProfileSlot, CompletionHost, ProfileHandle, ProfileRegistry, ProfileRequestService,
};
use peanut_gallery::sources::{ChatMessage, ProfileResponse};
use peanut_gallery::{
    ConversationMessage, Dispatcher, GenerateError, PanelEvent, ParsedReaction, ReactionPanel,
};

// ---------------------------------------------------------------------------
// Standalone host stubs
// ---------------------------------------------------------------------------

// The `default` and `profile` sources exist for embedding hosts that provide
// these capabilities. The standalone binary has neither, so both resolve to
// configuration errors pointing the user at `local` or `openai`.

struct StandaloneHost;

#[async_trait]
impl CompletionHost for StandaloneHost {
    async fn raw_completion(
        &self,
        _system: &str,
        _prompt: &str,
        _cancel: &CancellationToken,
    ) -> Result<String, GenerateError> {
        Err(GenerateError::Config(
            "the default source needs an embedding host; use --source local or --source openai"
                .to_string(),
        ))
    }
}

struct StandaloneRegistry;

#[async_trait]
impl ProfileRegistry for StandaloneRegistry {
    async fn resolve(&self, _name: &str) -> Option<ProfileHandle> {
        None
    }
}

struct StandaloneService;

#[async_trait]
impl ProfileRequestService for StandaloneService {
    async fn send_request(
        &self,
        _profile_id: &str,
        _messages: &[ChatMessage],
        _max_tokens: u32,
        _cancel: &CancellationToken,
    ) -> Result<ProfileResponse, GenerateError> {
        Err(GenerateError::Config(
            "saved profiles need an embedding host".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Transcript parsing and output
// ---------------------------------------------------------------------------

/// Parse `Name: message` lines; bare lines continue the previous message.
fn parse_transcript(text: &str, user_name: &str) -> Vec<ConversationMessage> {
    let mut out: Vec<ConversationMessage> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if let Some((name, body)) = line.split_once(':') {
            let name = name.trim();
            if !name.is_empty() && !name.contains(char::is_whitespace) {
                out.push(ConversationMessage {
                    speaker_name: name.to_string(),
                    body: body.trim().to_string(),
                    is_user: name == user_name,
                });
                continue;
            }
        }
        if let Some(last) = out.last_mut() {
            last.body.push('\n');
            last.body.push_str(line.trim());
        }
    }
    out
}

const NAME_COLORS: [Color; 7] = [
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::Blue,
    Color::BrightRed,
    Color::BrightGreen,
];

/// Stable per-name color, so the same speaker always renders the same.
fn name_color(name: &str) -> Color {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    NAME_COLORS[(hasher.finish() as usize) % NAME_COLORS.len()]
}

fn print_reactions(reactions: &[ParsedReaction]) {
    println!();
    for r in reactions {
        println!(
            "{} {}",
            format!("{}:", r.display_name).color(name_color(&r.display_name)).bold(),
            r.body
        );
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);
    if args.no_color {
        colored::control::set_override(false);
    }

    let settings = args.resolve_settings()?;

    let text = if args.transcript == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.transcript)
            .map_err(|e| format!("cannot read {}: {e}", args.transcript))?
    };
    let transcript = parse_transcript(&text, &args.user_name);
    if transcript.is_empty() {
        return Err("transcript contains no `Name: message` lines".into());
    }

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(StandaloneHost),
        Arc::new(StandaloneRegistry),
        Arc::new(StandaloneService),
        ActiveProfileSlot::default(),
    ));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let panel = ReactionPanel::new(dispatcher, tx);
    panel
        .trigger(transcript, settings)
        .ok_or("panel is disabled in the settings file")?;

    while let Some(event) = rx.recv().await {
        match event {
            PanelEvent::Started { .. } => {
                eprintln!("{}", "thinking...".dimmed());
            }
            PanelEvent::Reactions { reactions, .. } => {
                print_reactions(&reactions);
                break;
            }
            PanelEvent::Empty { .. } => {
                eprintln!("{}", "no usable reactions in the completion".yellow());
                break;
            }
            PanelEvent::Cancelled { .. } => {
                eprintln!("{}", "generation cancelled".yellow());
                break;
            }
            PanelEvent::Failed { error, .. } => {
                eprintln!("{} {error}", "error:".red().bold());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transcript_basic() {
        let t = parse_transcript("Ann: hello\nBot: hi back\n", "Ann");
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].speaker_name, "Ann");
        assert!(t[0].is_user);
        assert!(!t[1].is_user);
    }

    #[test]
    fn test_parse_transcript_continuation_lines() {
        let t = parse_transcript("Bot: first line\nsecond line\n", "You");
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].body, "first line\nsecond line");
    }

    #[test]
    fn test_parse_transcript_skips_blank_lines() {
        let t = parse_transcript("\nAnn: hi\n\nBot: yo\n", "Ann");
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_parse_transcript_multiword_prefix_is_continuation() {
        // "He said: x" has whitespace in the would-be name, so it continues.
        let t = parse_transcript("Bot: quote follows\nHe said: x\n", "You");
        assert_eq!(t.len(), 1);
        assert!(t[0].body.contains("He said: x"));
    }

    #[test]
    fn test_name_color_is_stable() {
        assert_eq!(name_color("Alice"), name_color("Alice"));
    }
}
