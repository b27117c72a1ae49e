//! End-to-end tests for the panel pipeline: trigger, debounce, dispatch
//! through fake host capabilities, parse, and event delivery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use peanut_gallery::host::{
    ActiveProfileSlot, CompletionHost, ProfileHandle, ProfileRegistry, ProfileRequestService,
};
use peanut_gallery::sources::{ChatMessage, ProfileResponse};
use peanut_gallery::{
    ConversationMessage, Dispatcher, GenerateError, PanelEvent, PanelSettings, ReactionPanel,
    SourceKind,
};

// -- Fakes ------------------------------------------------------------------

struct FakeHost {
    reply: Result<String, String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeHost {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(FakeHost {
            reply: Ok(reply.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(detail: &str) -> Arc<Self> {
        Arc::new(FakeHost {
            reply: Err(detail.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(FakeHost {
            reply: Ok(reply.to_string()),
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionHost for FakeHost {
    async fn raw_completion(
        &self,
        _system: &str,
        _prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => return Err(GenerateError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(detail) => Err(GenerateError::backend(detail.clone())),
        }
    }
}

struct FakeRegistry;

#[async_trait]
impl ProfileRegistry for FakeRegistry {
    async fn resolve(&self, name: &str) -> Option<ProfileHandle> {
        (name == "writing-pal").then(|| ProfileHandle {
            id: "prof-7".to_string(),
            name: name.to_string(),
        })
    }
}

enum ServiceScript {
    Reply(String),
    Fail(String),
    HangUntilCancelled,
}

struct FakeService {
    script: ServiceScript,
    observed_active: std::sync::Mutex<Option<String>>,
    slot: ActiveProfileSlot,
}

#[async_trait]
impl ProfileRequestService for FakeService {
    async fn send_request(
        &self,
        _profile_id: &str,
        _messages: &[ChatMessage],
        _max_tokens: u32,
        cancel: &CancellationToken,
    ) -> Result<ProfileResponse, GenerateError> {
        // record what the host would see as the active profile mid-request
        *self.observed_active.lock().expect("lock") = self.slot.get();
        match &self.script {
            ServiceScript::Reply(text) => Ok(ProfileResponse::Extracted {
                content: text.clone(),
            }),
            ServiceScript::Fail(detail) => Err(GenerateError::backend(detail.clone())),
            ServiceScript::HangUntilCancelled => {
                cancel.cancelled().await;
                Err(GenerateError::Cancelled)
            }
        }
    }
}

fn transcript() -> Vec<ConversationMessage> {
    vec![
        ConversationMessage {
            speaker_name: "You".to_string(),
            body: "tell me a ghost story".to_string(),
            is_user: true,
        },
        ConversationMessage {
            speaker_name: "Storyteller".to_string(),
            body: "The lights flickered twice, then went out.".to_string(),
            is_user: false,
        },
    ]
}

fn settings() -> PanelSettings {
    PanelSettings::default()
}

fn panel_for(host: Arc<FakeHost>) -> (ReactionPanel, mpsc::UnboundedReceiver<PanelEvent>) {
    let slot = ActiveProfileSlot::default();
    let dispatcher = Arc::new(Dispatcher::new(
        host,
        Arc::new(FakeRegistry),
        Arc::new(FakeService {
            script: ServiceScript::Reply(String::new()),
            observed_active: std::sync::Mutex::new(None),
            slot: slot.clone(),
        }),
        slot,
    ));
    let (tx, rx) = mpsc::unbounded_channel();
    (ReactionPanel::new(dispatcher, tx), rx)
}

fn profile_panel(
    script: ServiceScript,
) -> (
    ReactionPanel,
    mpsc::UnboundedReceiver<PanelEvent>,
    Arc<FakeService>,
    ActiveProfileSlot,
) {
    let slot = ActiveProfileSlot::new(Some("user-picked".to_string()));
    let service = Arc::new(FakeService {
        script,
        observed_active: std::sync::Mutex::new(None),
        slot: slot.clone(),
    });
    let dispatcher = Arc::new(Dispatcher::new(
        FakeHost::replying("unused"),
        Arc::new(FakeRegistry),
        service.clone(),
        slot.clone(),
    ));
    let (tx, rx) = mpsc::unbounded_channel();
    (ReactionPanel::new(dispatcher, tx), rx, service, slot)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<PanelEvent>) -> PanelEvent {
    rx.recv().await.expect("event channel open")
}

async fn recv_terminal(rx: &mut mpsc::UnboundedReceiver<PanelEvent>) -> PanelEvent {
    loop {
        let ev = recv(rx).await;
        if !matches!(ev, PanelEvent::Started { .. }) {
            return ev;
        }
    }
}

// -- Happy path -------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_default_source_end_to_end() {
    let host = FakeHost::replying("watcher01: did you hear that\nnightowl: turn the lights on!");
    let (panel, mut rx) = panel_for(host.clone());

    panel.trigger(transcript(), settings()).expect("enabled");
    match recv_terminal(&mut rx).await {
        PanelEvent::Reactions { reactions, .. } => {
            assert_eq!(reactions.len(), 2);
            assert_eq!(reactions[0].display_name, "watcher01");
            assert_eq!(reactions[1].body, "turn the lights on!");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(host.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_reported() {
    let host = FakeHost::failing("connection refused");
    let (panel, mut rx) = panel_for(host);

    panel.trigger(transcript(), settings()).expect("enabled");
    match recv_terminal(&mut rx).await {
        PanelEvent::Failed { error, .. } => {
            assert!(error.to_string().contains("connection refused"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

// -- Debounce and supersession ----------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_burst_of_triggers_hits_backend_once() {
    let host = FakeHost::replying("lurker: nice");
    let (panel, mut rx) = panel_for(host.clone());

    let mut last = 0;
    for _ in 0..10 {
        last = panel.trigger(transcript(), settings()).expect("enabled");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let ev = recv_terminal(&mut rx).await;
    assert_eq!(ev.generation_id(), last);
    assert_eq!(host.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_generation_superseded_by_new_trigger() {
    let host = FakeHost::slow("slowpoke: finally done", Duration::from_secs(60));
    let (panel, mut rx) = panel_for(host.clone());

    let first = panel.trigger(transcript(), settings()).expect("enabled");
    // let the first one get past its debounce and into the backend
    assert!(matches!(recv(&mut rx).await, PanelEvent::Started { generation_id } if generation_id == first));

    let second = panel.trigger(transcript(), settings()).expect("enabled");
    assert!(second > first);

    // every remaining event belongs to the second generation
    loop {
        let ev = recv(&mut rx).await;
        assert_eq!(ev.generation_id(), second, "leaked event: {ev:?}");
        if !matches!(ev, PanelEvent::Started { .. }) {
            break;
        }
    }
    // both generations reached the backend; only the second's result was kept
    assert_eq!(host.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_user_cancel_mid_flight() {
    let host = FakeHost::slow("slowpoke: never seen", Duration::from_secs(60));
    let (panel, mut rx) = panel_for(host);

    let id = panel.trigger(transcript(), settings()).expect("enabled");
    assert!(matches!(recv(&mut rx).await, PanelEvent::Started { .. }));

    panel.cancel();
    match recv(&mut rx).await {
        PanelEvent::Cancelled { generation_id } => assert_eq!(generation_id, id),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(!panel.is_busy());
}

// -- Profile swap guarantees ------------------------------------------------

fn profile_settings() -> PanelSettings {
    PanelSettings {
        source: SourceKind::Profile,
        profile: "writing-pal".to_string(),
        ..PanelSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_profile_swap_visible_during_request_restored_after() {
    let (panel, mut rx, service, slot) =
        profile_panel(ServiceScript::Reply("fan_club: loved that chapter".to_string()));

    panel.trigger(transcript(), profile_settings()).expect("enabled");
    match recv_terminal(&mut rx).await {
        PanelEvent::Reactions { reactions, .. } => {
            assert_eq!(reactions[0].display_name, "fan_club");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    // mid-request the slot held the target profile, afterwards the original
    assert_eq!(
        service.observed_active.lock().expect("lock").as_deref(),
        Some("prof-7")
    );
    assert_eq!(slot.get().as_deref(), Some("user-picked"));
}

#[tokio::test(start_paused = true)]
async fn test_profile_restored_after_backend_error() {
    let (panel, mut rx, _service, slot) =
        profile_panel(ServiceScript::Fail("rate limited".to_string()));

    panel.trigger(transcript(), profile_settings()).expect("enabled");
    match recv_terminal(&mut rx).await {
        PanelEvent::Failed { error, .. } => assert!(error.to_string().contains("rate limited")),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(slot.get().as_deref(), Some("user-picked"));
}

#[tokio::test(start_paused = true)]
async fn test_profile_restored_after_user_cancel() {
    let (panel, mut rx, _service, slot) = profile_panel(ServiceScript::HangUntilCancelled);

    panel.trigger(transcript(), profile_settings()).expect("enabled");
    assert!(matches!(recv(&mut rx).await, PanelEvent::Started { .. }));

    panel.cancel();
    assert!(matches!(
        recv(&mut rx).await,
        PanelEvent::Cancelled { .. }
    ));
    // give the superseded task a moment to unwind its guard
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(slot.get().as_deref(), Some("user-picked"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_profile_is_config_failure() {
    let (panel, mut rx, _service, slot) =
        profile_panel(ServiceScript::Reply("unused".to_string()));
    let settings = PanelSettings {
        profile: "no-such-profile".to_string(),
        ..profile_settings()
    };

    panel.trigger(transcript(), settings).expect("enabled");
    match recv_terminal(&mut rx).await {
        PanelEvent::Failed { error, .. } => {
            assert!(matches!(error, GenerateError::Config(_)));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(slot.get().as_deref(), Some("user-picked"));
}
