//! Trait boundaries for the embedding host's capabilities.
//!
//! The panel never talks to the host directly; it goes through these objects
//! so the standalone binary and the test suite can plug in their own.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::GenerateError;
use crate::sources::{ChatMessage, ProfileResponse};

/// The host's generic raw-completion capability (the `Default` source).
/// Implementations must honor the cancellation token.
#[async_trait]
pub trait CompletionHost: Send + Sync {
    async fn raw_completion(
        &self,
        system: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, GenerateError>;
}

/// A named bundle of model/endpoint/credential settings managed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileHandle {
    pub id: String,
    pub name: String,
}

/// Resolves a profile name to a handle, if the host knows one by that name.
#[async_trait]
pub trait ProfileRegistry: Send + Sync {
    async fn resolve(&self, name: &str) -> Option<ProfileHandle>;
}

/// Issues a request through a resolved profile. Streaming is always disabled
/// by this crate; the response shape varies by host (see `ProfileResponse`).
#[async_trait]
pub trait ProfileRequestService: Send + Sync {
    async fn send_request(
        &self,
        profile_id: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
        cancel: &CancellationToken,
    ) -> Result<ProfileResponse, GenerateError>;
}

// -- Active-profile slot ----------------------------------------------------

/// The host's shared "currently selected profile" state. Some request
/// services only work against the active profile, so the dispatcher swaps
/// this slot to the target for the duration of the call. The swap must not
/// be observable after the call returns, on any exit path.
#[derive(Debug, Clone, Default)]
pub struct ActiveProfileSlot {
    inner: Arc<Mutex<Option<String>>>,
}

impl ActiveProfileSlot {
    pub fn new(initial: Option<String>) -> Self {
        ActiveProfileSlot {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.inner.lock().expect("profile slot poisoned").clone()
    }

    pub fn set(&self, value: Option<String>) {
        *self.inner.lock().expect("profile slot poisoned") = value;
    }

    /// Swap the slot to `target` and return a guard that restores the prior
    /// value when dropped — including drops caused by cancellation or error
    /// unwinding mid-request.
    pub fn swap_scoped(&self, target: &str) -> ProfileSwapGuard {
        let prior = {
            let mut slot = self.inner.lock().expect("profile slot poisoned");
            std::mem::replace(&mut *slot, Some(target.to_string()))
        };
        ProfileSwapGuard {
            slot: self.clone(),
            prior,
        }
    }
}

/// Restores the active-profile slot on drop.
pub struct ProfileSwapGuard {
    slot: ActiveProfileSlot,
    prior: Option<String>,
}

impl Drop for ProfileSwapGuard {
    fn drop(&mut self) {
        self.slot.set(self.prior.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_starts_empty_by_default() {
        let slot = ActiveProfileSlot::default();
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn test_swap_scoped_sets_target_while_held() {
        let slot = ActiveProfileSlot::new(Some("original".to_string()));
        let guard = slot.swap_scoped("target");
        assert_eq!(slot.get().as_deref(), Some("target"));
        drop(guard);
        assert_eq!(slot.get().as_deref(), Some("original"));
    }

    #[test]
    fn test_swap_scoped_restores_none() {
        let slot = ActiveProfileSlot::new(None);
        {
            let _guard = slot.swap_scoped("target");
            assert_eq!(slot.get().as_deref(), Some("target"));
        }
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn test_swap_scoped_restores_on_early_return() {
        fn bails(slot: &ActiveProfileSlot) -> Result<(), GenerateError> {
            let _guard = slot.swap_scoped("target");
            Err(GenerateError::Cancelled)
        }
        let slot = ActiveProfileSlot::new(Some("keep".to_string()));
        let _ = bails(&slot);
        assert_eq!(slot.get().as_deref(), Some("keep"));
    }

    #[test]
    fn test_nested_swaps_unwind_in_order() {
        let slot = ActiveProfileSlot::new(Some("a".to_string()));
        let g1 = slot.swap_scoped("b");
        let g2 = slot.swap_scoped("c");
        assert_eq!(slot.get().as_deref(), Some("c"));
        drop(g2);
        assert_eq!(slot.get().as_deref(), Some("b"));
        drop(g1);
        assert_eq!(slot.get().as_deref(), Some("a"));
    }
}
