pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod parser;
pub mod prompt;
pub mod sources;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use config::PanelSettings;
pub use dispatch::{Dispatcher, GenerationRequest};
pub use error::GenerateError;
pub use parser::{ParsedReaction, ParserOptions};
pub use prompt::ConversationMessage;
pub use sources::SourceKind;

// ---------------------------------------------------------------------------
// Panel events
// ---------------------------------------------------------------------------

/// What the panel reports back to its consumer (UI or CLI). Every event
/// carries the id of the generation it belongs to; ids are handed out by
/// `trigger` and strictly increase.
#[derive(Debug)]
pub enum PanelEvent {
    /// Debounce elapsed, the backend call is starting.
    Started { generation_id: u64 },
    /// The completion parsed into at least one reaction.
    Reactions {
        generation_id: u64,
        reactions: Vec<ParsedReaction>,
    },
    /// The backend answered but nothing usable could be parsed out.
    Empty { generation_id: u64 },
    /// Stopped by the user or by the local-server deadline.
    Cancelled { generation_id: u64 },
    /// The backend or the configuration failed.
    Failed {
        generation_id: u64,
        error: GenerateError,
    },
}

impl PanelEvent {
    pub fn generation_id(&self) -> u64 {
        match self {
            PanelEvent::Started { generation_id }
            | PanelEvent::Reactions { generation_id, .. }
            | PanelEvent::Empty { generation_id }
            | PanelEvent::Cancelled { generation_id }
            | PanelEvent::Failed { generation_id, .. } => *generation_id,
        }
    }
}

// ---------------------------------------------------------------------------
// ReactionPanel — debounced single-flight generation engine
// ---------------------------------------------------------------------------

struct PanelInner {
    next_id: u64,
    /// Generation whose outcome is still wanted. 0 means none.
    current_id: u64,
    cancel: Option<CancellationToken>,
}

/// Drives the whole pipeline: trigger debouncing, backend dispatch, parsing,
/// and event delivery. At most one generation is live at a time; a new
/// trigger supersedes the previous one and its late result is discarded.
pub struct ReactionPanel {
    dispatcher: Arc<Dispatcher>,
    events: mpsc::UnboundedSender<PanelEvent>,
    inner: Arc<Mutex<PanelInner>>,
}

impl ReactionPanel {
    pub fn new(dispatcher: Arc<Dispatcher>, events: mpsc::UnboundedSender<PanelEvent>) -> Self {
        ReactionPanel {
            dispatcher,
            events,
            inner: Arc::new(Mutex::new(PanelInner {
                next_id: 1,
                current_id: 0,
                cancel: None,
            })),
        }
    }

    /// Request a generation for the given transcript. Supersedes any pending
    /// or in-flight generation. Returns the new generation's id, or `None`
    /// when the panel is disabled (nothing is scheduled and nothing already
    /// running is disturbed).
    pub fn trigger(
        &self,
        transcript: Vec<ConversationMessage>,
        settings: PanelSettings,
    ) -> Option<u64> {
        if !settings.enabled {
            debug!("panel disabled, trigger ignored");
            return None;
        }

        let (id, cancel) = {
            let mut inner = self.inner.lock().expect("panel state poisoned");
            if let Some(prior) = inner.cancel.take() {
                prior.cancel();
            }
            let id = inner.next_id;
            inner.next_id += 1;
            inner.current_id = id;
            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());
            (id, cancel)
        };

        let dispatcher = self.dispatcher.clone();
        let events = self.events.clone();
        let shared = self.inner.clone();
        tokio::spawn(run_generation(
            dispatcher, events, shared, id, cancel, transcript, settings,
        ));
        Some(id)
    }

    /// User-initiated abort of whatever is pending or in flight.
    pub fn cancel(&self) {
        let finished = {
            let mut inner = self.inner.lock().expect("panel state poisoned");
            if let Some(token) = inner.cancel.take() {
                token.cancel();
            }
            std::mem::take(&mut inner.current_id)
        };
        if finished != 0 {
            let _ = self.events.send(PanelEvent::Cancelled {
                generation_id: finished,
            });
        }
    }

    /// Whether a generation is pending or in flight.
    pub fn is_busy(&self) -> bool {
        self.inner.lock().expect("panel state poisoned").current_id != 0
    }
}

/// True while `id` is still the generation whose outcome is wanted.
fn is_current(inner: &Mutex<PanelInner>, id: u64) -> bool {
    inner.lock().expect("panel state poisoned").current_id == id
}

/// Mark `id` finished, releasing the busy state if it is still current.
fn finish(inner: &Mutex<PanelInner>, id: u64) {
    let mut inner = inner.lock().expect("panel state poisoned");
    if inner.current_id == id {
        inner.current_id = 0;
        inner.cancel = None;
    }
}

async fn run_generation(
    dispatcher: Arc<Dispatcher>,
    events: mpsc::UnboundedSender<PanelEvent>,
    shared: Arc<Mutex<PanelInner>>,
    id: u64,
    cancel: CancellationToken,
    transcript: Vec<ConversationMessage>,
    settings: PanelSettings,
) {
    // Quiet period. Rapid re-triggers cancel this sleep and collapse into
    // the newest request without ever touching a backend.
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(id, "superseded during debounce");
            return;
        }
        _ = tokio::time::sleep(settings.debounce()) => {}
    }

    let _ = events.send(PanelEvent::Started { generation_id: id });

    let window = prompt::select_history(
        &transcript,
        settings.include_user_input,
        settings.context_depth,
    );
    let target_count = prompt::effective_count(settings.reaction_count, settings.narrator_style);
    let request = GenerationRequest {
        history_text: prompt::format_history(window),
        style_instructions: settings.style_prompt.clone(),
        target_count,
        narrator: settings.narrator_style,
        source: settings.source,
    };

    let outcome = dispatcher.generate(&request, &settings, &cancel).await;

    if !is_current(&shared, id) {
        debug!(id, "stale result discarded");
        return;
    }

    let event = match outcome {
        Ok(raw) => {
            let reactions = parser::parse_reactions(&raw, target_count, &settings.parser_options());
            if reactions.is_empty() {
                PanelEvent::Empty { generation_id: id }
            } else {
                PanelEvent::Reactions {
                    generation_id: id,
                    reactions,
                }
            }
        }
        Err(error) if error.is_cancelled() => PanelEvent::Cancelled { generation_id: id },
        Err(error) => {
            warn!(id, %error, "generation failed");
            PanelEvent::Failed {
                generation_id: id,
                error,
            }
        }
    };
    finish(&shared, id);
    let _ = events.send(event);
}
