//! Best-effort parser that splits a model's free-text completion into
//! `username: message` records. Inherently heuristic — the rules below are
//! load-bearing compatibility behavior, not something to make smarter.

use once_cell::sync::Lazy;
use regex::Regex;

/// Wrapper tag some styles instruct the model to emit around its output.
pub const WRAPPER_TAG: &str = "chatroom";

/// Display names are truncated to this many characters. Doubles as the bound
/// that keeps mid-sentence colons from being mistaken for name delimiters.
pub const MAX_NAME_LEN: usize = 40;

/// Reactions whose trimmed body is shorter than this are dropped.
pub const MIN_BODY_LEN: usize = 2;

/// One synthesized chat participant's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReaction {
    pub display_name: String,
    pub body: String,
}

/// Parser policy knobs, owned by panel settings.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Display name for lines that precede any `name:` match.
    pub fallback_name: String,
    /// When the whole completion yields nothing, emit it verbatim as a single
    /// reaction under `fallback_name` instead of returning empty.
    pub salvage_unparsed: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            fallback_name: "User".to_string(),
            salvage_unparsed: false,
        }
    }
}

// `<chatroom>` / `</chatroom>` markers echoed back by the model.
static WRAPPER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?chatroom>").expect("wrapper regex"));

// Lines that are nothing but separator punctuation: ".", "---", "___", "…".
static NOISE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[.…\-_]+$").expect("noise regex"));

// Optional leading list marker, lazy name up to the first colon, then body.
// The name is truncated afterwards rather than rejected when over-long.
static LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[\d.\-*]*\s*)?(.+?):\s*(.+)$").expect("line regex"));

/// Strip wrapper tags and surrounding whitespace from the whole completion.
pub fn clean_completion(raw: &str) -> String {
    WRAPPER_RE.replace_all(raw, "").trim().to_string()
}

fn clean_name(raw: &str) -> String {
    let stripped: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '"' | '`'))
        .collect();
    stripped.chars().take(MAX_NAME_LEN).collect()
}

fn is_pure_noise(cleaned: &str) -> bool {
    cleaned
        .lines()
        .all(|l| l.trim().is_empty() || NOISE_RE.is_match(l.trim()))
}

/// Split a completion into at most `target_count` reactions.
///
/// Total over all inputs: malformed text degrades to an empty vector, never
/// a panic. Output order is strictly the order records were encountered;
/// repeated names are kept as-is.
pub fn parse_reactions(raw: &str, target_count: usize, opts: &ParserOptions) -> Vec<ParsedReaction> {
    let cleaned = clean_completion(raw);
    let mut parsed: Vec<ParsedReaction> = Vec::new();
    let mut accumulating = false;

    for line in cleaned.split('\n') {
        let line = line.trim();

        if line.is_empty() {
            // Preserve paragraph breaks inside a message being accumulated.
            if accumulating {
                if let Some(current) = parsed.last_mut() {
                    if !current.body.ends_with("\n\n") {
                        current.body.push_str("\n\n");
                    }
                }
            }
            continue;
        }

        if NOISE_RE.is_match(line) {
            continue;
        }

        if let Some(caps) = LINE_RE.captures(line) {
            let name = clean_name(&caps[1]);
            let body = caps[2].trim().to_string();
            parsed.push(ParsedReaction {
                display_name: name,
                body,
            });
            accumulating = true;
        } else if accumulating {
            if let Some(current) = parsed.last_mut() {
                if !current.body.ends_with("\n\n") {
                    current.body.push(' ');
                }
                current.body.push_str(line);
            }
        } else {
            // Last resort: keep non-conforming leading output under a
            // generic name rather than dropping it silently.
            parsed.push(ParsedReaction {
                display_name: opts.fallback_name.clone(),
                body: line.to_string(),
            });
            accumulating = true;
        }
    }

    let mut out: Vec<ParsedReaction> = Vec::new();
    for msg in parsed {
        if out.len() >= target_count {
            break;
        }
        let body = msg.body.trim();
        if body.chars().count() < MIN_BODY_LEN {
            continue;
        }
        out.push(ParsedReaction {
            display_name: msg.display_name,
            body: body.to_string(),
        });
    }

    // Salvage plays by the same output bounds as the normal path.
    if out.is_empty()
        && opts.salvage_unparsed
        && target_count > 0
        && cleaned.chars().count() >= MIN_BODY_LEN
        && !is_pure_noise(&cleaned)
    {
        out.push(ParsedReaction {
            display_name: opts.fallback_name.clone(),
            body: cleaned,
        });
    }

    out
}
