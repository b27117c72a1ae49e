//! Generation dispatcher — one completion per request, from exactly one
//! backend, under a single cancellation token.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PanelSettings;
use crate::error::GenerateError;
use crate::host::{ActiveProfileSlot, CompletionHost, ProfileRegistry, ProfileRequestService};
use crate::parser::WRAPPER_TAG;
use crate::sources::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, OllamaGenerateRequest,
    OllamaGenerateResponse, OllamaOptions, SourceKind,
};

/// Token budget handed to the profile request service.
const PROFILE_MAX_TOKENS: u32 = 512;

/// One generation attempt. Built fresh per invocation, immutable after.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub history_text: String,
    pub style_instructions: String,
    pub target_count: usize,
    pub narrator: bool,
    pub source: SourceKind,
}

impl GenerationRequest {
    fn composed_prompt(&self) -> String {
        crate::prompt::compose_prompt(
            &self.history_text,
            &self.style_instructions,
            self.target_count,
            self.narrator,
        )
    }
}

/// Owns the HTTP client and the host collaborators; stateless across calls
/// apart from connection pooling.
pub struct Dispatcher {
    client: Client,
    host: Arc<dyn CompletionHost>,
    registry: Arc<dyn ProfileRegistry>,
    service: Arc<dyn ProfileRequestService>,
    active_profile: ActiveProfileSlot,
}

impl Dispatcher {
    pub fn new(
        host: Arc<dyn CompletionHost>,
        registry: Arc<dyn ProfileRegistry>,
        service: Arc<dyn ProfileRequestService>,
        active_profile: ActiveProfileSlot,
    ) -> Self {
        Dispatcher {
            client: Client::new(),
            host,
            registry,
            service,
            active_profile,
        }
    }

    /// Produce one raw completion, or fail with `Cancelled` / `Config` /
    /// `Backend`. Performs at most one outbound call; never retries.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        settings: &PanelSettings,
        cancel: &CancellationToken,
    ) -> Result<String, GenerateError> {
        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }
        debug!(source = %request.source, "dispatching generation");

        match request.source {
            SourceKind::Default => self.via_host(request, cancel).await,
            SourceKind::Local => self.via_local(request, settings, cancel).await,
            SourceKind::Openai => self.via_openai(request, settings, cancel).await,
            SourceKind::Profile => self.via_profile(request, settings, cancel).await,
        }
    }

    // -- Default: host raw-completion capability ----------------------------

    async fn via_host(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<String, GenerateError> {
        let prompt = request.composed_prompt();
        with_cancel(
            cancel,
            self.host
                .raw_completion(&request.style_instructions, &prompt, cancel),
        )
        .await?
    }

    // -- Local: Ollama-style /api/generate ----------------------------------

    async fn via_local(
        &self,
        request: &GenerationRequest,
        settings: &PanelSettings,
        cancel: &CancellationToken,
    ) -> Result<String, GenerateError> {
        if settings.local_model.is_empty() {
            return Err(GenerateError::Config("no local model selected".to_string()));
        }

        let url = format!("{}/api/generate", trim_base(&settings.local_url));
        let body = OllamaGenerateRequest {
            model: settings.local_model.clone(),
            system: request.style_instructions.clone(),
            prompt: request.composed_prompt(),
            stream: false,
            options: OllamaOptions {
                num_ctx: 2048,
                num_predict: 512,
                stop: vec![format!("</{WRAPPER_TAG}>")],
            },
        };

        let call = async {
            let response = self.client.post(&url).json(&body).send().await?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                warn!(%status, "local server rejected generation");
                return Err(GenerateError::http(status.as_u16(), text));
            }
            let parsed: OllamaGenerateResponse = response
                .json()
                .await
                .map_err(|e| GenerateError::backend(format!("bad local response: {e}")))?;
            Ok(parsed.response)
        };

        match settings.local_timeout() {
            Some(limit) => with_deadline(cancel, limit, call).await?,
            None => with_cancel(cancel, call).await?,
        }
    }

    // -- Openai-compatible: /chat/completions -------------------------------

    async fn via_openai(
        &self,
        request: &GenerationRequest,
        settings: &PanelSettings,
        cancel: &CancellationToken,
    ) -> Result<String, GenerateError> {
        let url = format!("{}/chat/completions", trim_base(&settings.openai_url));
        let model = if settings.openai_model.is_empty() {
            "local-model".to_string()
        } else {
            settings.openai_model.clone()
        };
        let body = ChatCompletionRequest {
            model,
            messages: vec![ChatMessage::user(request.composed_prompt())],
            temperature: 0.7,
            max_tokens: 500,
            stream: false,
        };

        let call = async {
            let response = self.client.post(&url).json(&body).send().await?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                warn!(%status, "chat endpoint rejected generation");
                return Err(GenerateError::http(status.as_u16(), text));
            }
            let parsed: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|e| GenerateError::backend(format!("bad chat response: {e}")))?;
            parsed.into_text()
        };

        with_cancel(cancel, call).await?
    }

    // -- Profile: host request service behind the registry ------------------

    async fn via_profile(
        &self,
        request: &GenerationRequest,
        settings: &PanelSettings,
        cancel: &CancellationToken,
    ) -> Result<String, GenerateError> {
        if settings.profile.is_empty() {
            return Err(GenerateError::Config("no profile selected".to_string()));
        }
        let profile = self
            .registry
            .resolve(&settings.profile)
            .await
            .ok_or_else(|| GenerateError::Config("profile not found".to_string()))?;

        let messages = vec![
            ChatMessage::system(request.style_instructions.clone()),
            ChatMessage::user(request.composed_prompt()),
        ];

        // The swap is invisible to the rest of the host: the guard restores
        // the prior selection on success, error, and cancellation alike.
        let _guard = self.active_profile.swap_scoped(&profile.id);
        let reply = with_cancel(
            cancel,
            self.service
                .send_request(&profile.id, &messages, PROFILE_MAX_TOKENS, cancel),
        )
        .await??;
        reply.into_text()
    }
}

fn trim_base(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Race a backend call against the cancellation token.
async fn with_cancel<T>(
    cancel: &CancellationToken,
    fut: impl std::future::Future<Output = T>,
) -> Result<T, GenerateError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(GenerateError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Like `with_cancel`, with a deadline. A timeout cancels the token so any
/// cooperating callee stops too, then surfaces as `Cancelled` — the panel
/// presents it the same way as a user abort.
async fn with_deadline<T>(
    cancel: &CancellationToken,
    limit: Duration,
    fut: impl std::future::Future<Output = T>,
) -> Result<T, GenerateError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(GenerateError::Cancelled),
        _ = tokio::time::sleep(limit) => {
            warn!(?limit, "local generation timed out");
            cancel.cancel();
            Err(GenerateError::Cancelled)
        }
        out = fut => Ok(out),
    }
}
