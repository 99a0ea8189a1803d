//! Leased session handle.
//!
//! A handle grants its holder the right to issue requests until
//! `release`. Every operation is guarded: a released handle, or a
//! session that has left `In Use`, rejects the call instead of
//! dispatching it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::request::HttpRequestOptions;
use crate::response::HttpResponse;
use crate::session::{RefHook, RefToken, SerializedSession, SessionShared, SessionState};

/// A leased right to use the session, bound to one ref token.
pub struct SessionHandle {
    shared: Arc<SessionShared>,
    ref_token: RefToken,
    released: AtomicBool,
    on_release: Option<RefHook>,
    release_hook_fired: AtomicBool,
}

impl SessionHandle {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        ref_token: RefToken,
        on_release: Option<RefHook>,
    ) -> Self {
        Self {
            shared,
            ref_token,
            released: AtomicBool::new(false),
            on_release,
            release_hook_fired: AtomicBool::new(false),
        }
    }

    /// The lease's opaque identity, as threaded through its hooks.
    pub fn ref_token(&self) -> RefToken {
        self.ref_token
    }

    /// Whether this handle has been released. Monotonic false→true.
    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn fire_release_hook(&self) {
        if !self.release_hook_fired.swap(true, Ordering::SeqCst) {
            if let Some(hook) = &self.on_release {
                hook(self.ref_token);
            }
        }
    }

    /// Reject the call when the handle is released or the session has
    /// left `In Use`.
    fn guard(&self, operation: &str) -> Result<()> {
        if self.released.load(Ordering::SeqCst) {
            return Err(Error::session(format!(
                "calling {} failed because session has already been released",
                operation
            )));
        }
        let state = self.shared.state();
        if state != SessionState::InUse {
            self.fire_release_hook();
            return Err(Error::session(format!(
                "calling {} failed because session is in status {}",
                operation, state
            )));
        }
        Ok(())
    }

    /// Guard for release-terminal operations: flips `was_released`
    /// before dispatching so a second call always sees it.
    fn guard_terminal(&self, operation: &str) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(Error::session(format!(
                "calling {} failed because session has already been released",
                operation
            )));
        }
        let state = self.shared.state();
        if state != SessionState::InUse {
            self.fire_release_hook();
            return Err(Error::session(format!(
                "calling {} failed because session is in status {}",
                operation, state
            )));
        }
        Ok(())
    }

    /// Current user state.
    pub fn get_state(&self) -> Result<serde_json::Value> {
        self.guard("get_state")?;
        Ok(self.shared.user_state())
    }

    /// Shallow-merge `partial` into the user state.
    pub fn set_state(&self, partial: serde_json::Value) -> Result<()> {
        self.guard("set_state")?;
        self.shared.merge_state(partial);
        Ok(())
    }

    /// Issue a request through the session.
    pub async fn request(&self, options: HttpRequestOptions) -> Result<HttpResponse> {
        self.guard("request")?;
        self.shared.session_request(options, true).await
    }

    /// Pure snapshot of state, default headers, and cookies.
    pub fn serialize(&self) -> Result<SerializedSession> {
        self.guard("serialize")?;
        Ok(self.shared.serialize())
    }

    /// End the lease and let the next queued caller proceed.
    pub async fn release(&self) -> Result<()> {
        self.guard_terminal("release")?;
        self.shared.release(self.ref_token).await
    }

    /// End the lease and invalidate the login; the next caller runs
    /// login afresh.
    pub async fn invalidate(&self, error: Option<String>) -> Result<()> {
        self.guard_terminal("invalidate")?;
        self.shared.invalidate(error, Some(self.ref_token)).await
    }

    /// End the lease and put the session into lockout; no login is
    /// attempted until the cooldown elapses.
    pub fn report_lockout(&self) -> Result<()> {
        self.guard_terminal("report_lockout")?;
        self.shared.report_lockout();
        Ok(())
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("ref_token", &self.ref_token)
            .field("was_released", &self.was_released())
            .finish()
    }
}
