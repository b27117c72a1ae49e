//! Turns a conversation transcript into the prompt handed to a backend.

use once_cell::sync::Lazy;
use regex::Regex;

/// One entry of the host's chat log. Read-only to this crate.
#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub speaker_name: String,
    pub body: String,
    pub is_user: bool,
}

/// Reaction counts are clamped to this range before prompting.
pub const MIN_COUNT: usize = 1;
pub const MAX_COUNT: usize = 20;

/// Context depth (number of transcript entries) is clamped to this range.
pub const MIN_DEPTH: usize = 2;
pub const MAX_DEPTH: usize = 8;

// Reasoning blocks some models leak into their chat output.
static THOUGHT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(thought|think|reasoning)>.*?</(thought|think|reasoning)>")
        .expect("thought regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

/// Strip reasoning blocks and any remaining markup from a transcript entry.
pub fn clean_message(text: &str) -> String {
    let without_thoughts = THOUGHT_RE.replace_all(text, "");
    TAG_RE.replace_all(&without_thoughts, "").trim().to_string()
}

/// Pick which suffix of the transcript goes into the prompt.
///
/// With `include_user_input` off, only the newest entry (the assistant's
/// reply) is used. On, we clamp `context_depth`, walk back to the nearest
/// user message so the window opens on the user's side of an exchange, and
/// keep at most `context_depth` entries.
pub fn select_history(
    transcript: &[ConversationMessage],
    include_user_input: bool,
    context_depth: usize,
) -> &[ConversationMessage] {
    if transcript.is_empty() {
        return transcript;
    }
    if !include_user_input {
        return &transcript[transcript.len() - 1..];
    }

    let depth = context_depth.clamp(MIN_DEPTH, MAX_DEPTH);
    let mut start = transcript.len().saturating_sub(depth);
    while start > 0 && !transcript[start].is_user {
        start -= 1;
    }
    let window = &transcript[start..];
    if window.len() > depth {
        &window[window.len() - depth..]
    } else {
        window
    }
}

/// Render the history window as `speaker: cleaned body` lines.
pub fn format_history(window: &[ConversationMessage]) -> String {
    window
        .iter()
        .map(|m| format!("{}: {}", m.speaker_name, clean_message(&m.body)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Clamp the configured reaction count; narrator styles always use one voice.
pub fn effective_count(requested: usize, narrator: bool) -> usize {
    if narrator {
        1
    } else {
        requested.clamp(MIN_COUNT, MAX_COUNT)
    }
}

/// Compose the full user-role prompt for the backends.
pub fn compose_prompt(history: &str, style: &str, count: usize, narrator: bool) -> String {
    let count_instruction = if narrator {
        String::new()
    } else {
        format!(
            "IMPORTANT: You MUST generate EXACTLY {count} chat messages. \
             Not fewer, not more - exactly {count}.\n\n"
        )
    };
    let count_task = if narrator {
        String::new()
    } else {
        format!("Output exactly {count} messages.\n")
    };

    format!(
        "[STORY CONTEXT]\n{history}\n\n\
         [INSTRUCTION]\n{count_instruction}{style}\n\n\
         [TASK]\n\
         React to the story context above.\n\
         STRICTLY follow the format defined in the instruction.\n\
         {count_task}\
         Do NOT continue the story or roleplay as the characters.\n\
         Do NOT output preamble like \"Here are the messages\". Just output the content directly."
    )
}
