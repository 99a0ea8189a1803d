//! Stateful HTTP session: credential lifecycle, cookie jar, request
//! gate, heartbeat, and lockout-aware backoff.
//!
//! A session hands out leased [`SessionHandle`]s through a FIFO queue
//! (or concurrently, with the gate off). Exactly one login is in flight
//! at any time; callers that arrive while a login runs share its
//! outcome. All session state lives behind one mutex that is never held
//! across an await, so every observable transition is atomic.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::HeaderMap;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cookie::{Cookie, CookieFilter, CookieJar};
use crate::error::{Error, Result};
use crate::executor::http_request;
use crate::request::HttpRequestOptions;
use crate::response::HttpResponse;
use crate::transport::{TcpTransport, Transport};

mod config;
mod handle;
mod status;

pub use config::{
    EnhanceHook, LoginCallback, LogoutCallback, RefHook, RequestSessionOptions, SessionConfig,
};
pub use handle::SessionHandle;
pub use status::{SessionState, SessionStatus};

/// Opaque identity of one lease, threaded through its hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefToken(u64);

/// Pure snapshot of the persistable session state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SerializedSession {
    pub state: serde_json::Value,
    pub default_headers: Vec<(String, String)>,
    pub cookies: Vec<Cookie>,
}

struct QueuedEntry {
    ref_token: RefToken,
    tx: oneshot::Sender<Result<SessionHandle>>,
    before_request: Option<RefHook>,
    on_release: Option<RefHook>,
}

type FlowResult = std::result::Result<(), String>;

struct SessionInner {
    state: SessionState,
    user_state: serde_json::Value,
    credentials: serde_json::Value,
    default_headers: HeaderMap,
    heartbeat_url: Option<String>,
    is_logged_in: bool,
    uptime_since: Option<DateTime<Utc>>,
    last_error: Option<DateTime<Utc>>,
    error: Option<String>,
    in_queue: usize,
    active_handles: usize,
    queue: VecDeque<QueuedEntry>,
    /// Present while a login is in flight; late arrivals join the list
    /// and share the outcome.
    login_waiters: Option<Vec<oneshot::Sender<FlowResult>>>,
    logout_waiters: Option<Vec<oneshot::Sender<FlowResult>>>,
    heartbeat: Option<JoinHandle<()>>,
    /// A dispatcher task is currently serving the queue head.
    serving: bool,
    last_url: Option<Url>,
}

pub(crate) struct SessionShared {
    name: String,
    login: Option<LoginCallback>,
    logout: Option<LogoutCallback>,
    always_renew: bool,
    lockout_time: Duration,
    heartbeat_interval: Duration,
    allow_multiple_requests: bool,
    enhance_login_methods: Option<EnhanceHook>,
    enhance_logout_methods: Option<EnhanceHook>,
    transport: Arc<dyn Transport>,
    jar: Arc<Mutex<CookieJar>>,
    inner: Mutex<SessionInner>,
    status_tx: watch::Sender<SessionStatus>,
    shutdown: CancellationToken,
    next_ref: AtomicU64,
}

/// A long-lived HTTP session gating requests behind a login/logout
/// protocol.
pub struct HttpSession {
    shared: Arc<SessionShared>,
}

impl HttpSession {
    pub fn new(config: SessionConfig) -> Self {
        let transport = config
            .transport
            .unwrap_or_else(|| Arc::new(TcpTransport::new(config.agent.clone())));

        let initial_state = if config.login.is_some() {
            SessionState::LoggedOut
        } else {
            SessionState::Ready
        };

        let inner = SessionInner {
            state: initial_state,
            user_state: config.state,
            credentials: config.credentials,
            default_headers: config.default_headers,
            heartbeat_url: config.heartbeat_url,
            is_logged_in: false,
            uptime_since: None,
            last_error: None,
            error: None,
            in_queue: 0,
            active_handles: 0,
            queue: VecDeque::new(),
            login_waiters: None,
            logout_waiters: None,
            heartbeat: None,
            serving: false,
            last_url: None,
        };

        let status = SessionStatus {
            name: config.name.clone(),
            state: initial_state,
            uptime_since: None,
            last_error: None,
            error: None,
            in_queue: 0,
            is_logged_in: false,
        };
        let (status_tx, _) = watch::channel(status);

        let shared = Arc::new(SessionShared {
            name: config.name,
            login: config.login,
            logout: config.logout,
            always_renew: config.always_renew,
            lockout_time: config.lockout_time,
            heartbeat_interval: config.heartbeat_interval,
            allow_multiple_requests: config.allow_multiple_requests,
            enhance_login_methods: config.enhance_login_methods,
            enhance_logout_methods: config.enhance_logout_methods,
            transport,
            jar: Arc::new(Mutex::new(CookieJar::with_cookies(config.cookies))),
            inner: Mutex::new(inner),
            status_tx,
            shutdown: CancellationToken::new(),
            next_ref: AtomicU64::new(1),
        });

        Self { shared }
    }

    /// Construct a session seeded from a [`SerializedSession`]
    /// snapshot.
    pub fn from_serialized(config: SessionConfig, snapshot: SerializedSession) -> Self {
        Self::new(config.with_snapshot(snapshot))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.shared.status_tx.borrow().clone()
    }

    /// Subscribe to status changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Shallow-merge `partial` into the session's user state.
    pub fn set_state(&self, partial: serde_json::Value) {
        self.shared.merge_state(partial);
    }

    /// Replace the headers merged into every session request.
    pub fn set_default_headers(&self, headers: HeaderMap) {
        self.shared.lock_inner().default_headers = headers;
    }

    pub fn set_credentials(&self, credentials: serde_json::Value) {
        self.shared.lock_inner().credentials = credentials;
    }

    /// Pure snapshot of state, default headers, and cookies.
    pub fn serialize(&self) -> SerializedSession {
        self.shared.serialize()
    }

    /// Request a leased session handle, queueing behind the gate and
    /// logging in first when necessary.
    pub async fn request_session(&self, options: RequestSessionOptions) -> Result<SessionHandle> {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return Err(Error::session("Session has shutdown"));
        }

        let ref_token = RefToken(shared.next_ref.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = shared.lock_inner();
            if inner.state == SessionState::Shutdown {
                return Err(Error::session("Session has shutdown"));
            }
            inner.in_queue += 1;
            inner.queue.push_back(QueuedEntry {
                ref_token,
                tx,
                before_request: options.before_request.clone(),
                on_release: options.on_release.clone(),
            });
            shared.publish(&inner);
        }

        if let Some(timeout) = options.timeout {
            let weak = Arc::downgrade(shared);
            let shutdown = shared.shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        if let Some(shared) = weak.upgrade() {
                            shared.expire_queued(ref_token);
                        }
                    }
                    _ = shutdown.cancelled() => {}
                }
            });
        }

        SessionShared::kick(shared);

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::session("Session has shutdown")),
        }
    }

    /// Log out (if logged in) and drop back to `Logged Out`, or to
    /// `Error` when a reason is given. Outstanding handles become
    /// unusable; the next `request_session` runs login afresh.
    pub async fn invalidate_session(&self, error: Option<String>) -> Result<()> {
        self.shared.invalidate(error, None).await
    }

    /// Stop timers, log out, reject queued waiters, and move to
    /// `Shutdown`. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return Ok(());
        }
        tracing::debug!(session = %shared.name, "shutting down session");
        shared.shutdown.cancel();

        let (entries, was_logged_in) = {
            let mut inner = shared.lock_inner();
            if let Some(heartbeat) = inner.heartbeat.take() {
                heartbeat.abort();
            }
            let entries: Vec<QueuedEntry> = inner.queue.drain(..).collect();
            inner.in_queue = inner
                .in_queue
                .saturating_sub(entries.len() + inner.active_handles);
            inner.active_handles = 0;
            (entries, inner.is_logged_in)
        };
        for entry in entries {
            let _ = entry.tx.send(Err(Error::timeout("Session has shutdown")));
        }

        if was_logged_in {
            let _ = shared.logout_flow(None).await;
        }

        let mut inner = shared.lock_inner();
        inner.is_logged_in = false;
        inner.state = SessionState::Shutdown;
        shared.publish(&inner);
        Ok(())
    }
}

impl SessionShared {
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("session mutex poisoned")
    }

    fn lock_jar(&self) -> std::sync::MutexGuard<'_, CookieJar> {
        self.jar.lock().expect("cookie jar mutex poisoned")
    }

    fn publish(&self, inner: &SessionInner) {
        self.status_tx.send_replace(SessionStatus {
            name: self.name.clone(),
            state: inner.state,
            uptime_since: inner.uptime_since,
            last_error: inner.last_error,
            error: inner.error.clone(),
            in_queue: inner.in_queue,
            is_logged_in: inner.is_logged_in,
        });
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lock_inner().state
    }

    pub(crate) fn user_state(&self) -> serde_json::Value {
        self.lock_inner().user_state.clone()
    }

    pub(crate) fn merge_state(&self, partial: serde_json::Value) {
        let mut inner = self.lock_inner();
        match (&mut inner.user_state, partial) {
            (serde_json::Value::Object(base), serde_json::Value::Object(add)) => {
                for (key, value) in add {
                    base.insert(key, value);
                }
            }
            (slot, value) => *slot = value,
        }
    }

    pub(crate) fn serialize(&self) -> SerializedSession {
        let inner = self.lock_inner();
        SerializedSession {
            state: inner.user_state.clone(),
            default_headers: inner
                .default_headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            cookies: self.lock_jar().to_json(),
        }
    }

    /// Spawn a dispatcher for the queue. A no-op when one is already
    /// serving.
    fn kick(self: &Arc<Self>) {
        let shared = self.clone();
        tokio::spawn(async move {
            shared.drive().await;
        });
    }

    /// Serve the queue.
    ///
    /// Single-request mode serves the head and waits for its release
    /// before touching the next entry. With the gate off, every queued
    /// caller is dispatched concurrently; the login flow's single-
    /// flight discipline still makes them share one login.
    async fn drive(self: Arc<Self>) {
        loop {
            let entry = {
                let mut inner = self.lock_inner();
                if inner.state == SessionState::Shutdown {
                    return;
                }
                if inner.queue.is_empty() {
                    if inner.is_logged_in
                        && inner.active_handles == 0
                        && inner.state == SessionState::InUse
                    {
                        inner.state = SessionState::Ready;
                        self.publish(&inner);
                    }
                    return;
                }
                if !self.allow_multiple_requests {
                    if inner.serving || inner.state == SessionState::InUse {
                        return;
                    }
                    if inner.state == SessionState::LoggingOut {
                        return;
                    }
                    inner.serving = true;
                }
                inner.queue.pop_front().expect("non-empty queue")
            };

            if self.allow_multiple_requests {
                let shared = self.clone();
                tokio::spawn(async move {
                    shared.serve_entry(entry).await;
                });
            } else {
                self.serve_entry(entry).await;
            }
        }
    }

    /// Run one queued caller's hooks and the login flow, then hand out
    /// a lease or reject.
    async fn serve_entry(self: &Arc<Self>, entry: QueuedEntry) {
        if let Some(hook) = &entry.before_request {
            hook(entry.ref_token);
        }

        let login_result = self.login_flow(Some(entry.ref_token)).await;

        let send = {
            let mut inner = self.lock_inner();
            inner.serving = false;
            match login_result {
                Ok(()) => {
                    inner.state = SessionState::InUse;
                    inner.active_handles += 1;
                    self.publish(&inner);
                    Ok(())
                }
                Err(message) => {
                    inner.in_queue = inner.in_queue.saturating_sub(1);
                    self.publish(&inner);
                    Err(message)
                }
            }
        };
        match send {
            Ok(()) => {
                let handle = SessionHandle::new(self.clone(), entry.ref_token, entry.on_release);
                let _ = entry.tx.send(Ok(handle));
            }
            Err(message) => {
                let _ = entry.tx.send(Err(Error::session(message)));
            }
        }
    }

    /// Remove a timed-out entry from the queue and reject its caller.
    fn expire_queued(self: &Arc<Self>, ref_token: RefToken) {
        let entry = {
            let mut inner = self.lock_inner();
            let Some(pos) = inner.queue.iter().position(|e| e.ref_token == ref_token) else {
                return;
            };
            inner.in_queue = inner.in_queue.saturating_sub(1);
            let entry = inner.queue.remove(pos).expect("entry at position");
            self.publish(&inner);
            entry
        };
        tracing::debug!(session = %self.name, "queued session request timed out");
        let _ = entry
            .tx
            .send(Err(Error::timeout("timed out waiting for a session")));
        Self::kick(self);
    }

    /// Ensure the session is logged in. Exactly one login is in flight
    /// at a time; concurrent callers share the same outcome.
    async fn login_flow(self: &Arc<Self>, ref_token: Option<RefToken>) -> FlowResult {
        if self.login.is_none() {
            return Ok(());
        }

        let waiter = {
            let mut inner = self.lock_inner();
            if inner.is_logged_in {
                return Ok(());
            }
            if let Some(waiters) = &mut inner.login_waiters {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Some(rx)
            } else {
                inner.login_waiters = Some(Vec::new());
                None
            }
        };

        if let Some(rx) = waiter {
            return match rx.await {
                Ok(result) => result,
                Err(_) => Err("Session has shutdown".to_string()),
            };
        }

        // Leader: sit out any lockout first; only then announce the
        // login attempt.
        let result = async {
            self.wait_for_lockout().await?;
            {
                let mut inner = self.lock_inner();
                inner.state = SessionState::LoggingIn;
                self.publish(&inner);
            }
            self.perform_login(ref_token).await
        }
        .await;

        let waiters = {
            let mut inner = self.lock_inner();
            let waiters = inner.login_waiters.take().unwrap_or_default();
            match &result {
                Ok(()) => {
                    inner.is_logged_in = true;
                    inner.uptime_since = Some(Utc::now());
                    inner.error = None;
                    if inner.state == SessionState::LoggingIn {
                        inner.state = SessionState::Ready;
                    }
                    self.publish(&inner);
                }
                Err(message) => {
                    tracing::warn!(session = %self.name, error = %message, "login failed");
                    inner.is_logged_in = false;
                    inner.state = SessionState::Error;
                    inner.error = Some(message.clone());
                    inner.last_error = Some(Utc::now());
                    if let Some(heartbeat) = inner.heartbeat.take() {
                        heartbeat.abort();
                    }
                    self.publish(&inner);
                }
            }
            waiters
        };
        if result.is_ok() {
            self.arm_heartbeat();
        }
        for tx in waiters {
            let _ = tx.send(result.clone());
        }
        result
    }

    async fn perform_login(self: &Arc<Self>, ref_token: Option<RefToken>) -> FlowResult {
        let Some(login) = self.login.clone() else {
            return Ok(());
        };
        let ext = self
            .enhance_login_methods
            .as_ref()
            .map(|enhance| enhance(ref_token))
            .unwrap_or_default();
        tracing::debug!(session = %self.name, "running login callback");
        let methods = LoginMethods {
            shared: self.clone(),
            ext,
        };
        login(methods).await.map_err(|e| e.to_string())
    }

    /// Suspend until the lockout cooldown has elapsed. Cancelled by
    /// shutdown.
    async fn wait_for_lockout(&self) -> FlowResult {
        let remaining_ms = {
            let inner = self.lock_inner();
            if inner.state != SessionState::LockedOut {
                return Ok(());
            }
            match inner.last_error {
                Some(at) => {
                    let elapsed = Utc::now().signed_duration_since(at).num_milliseconds();
                    self.lockout_time.as_millis() as i64 - elapsed
                }
                None => 0,
            }
        };
        if remaining_ms > 0 {
            tracing::debug!(session = %self.name, remaining_ms, "waiting out lockout");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(remaining_ms as u64)) => {}
                _ = self.shutdown.cancelled() => return Err("Session has shutdown".to_string()),
            }
        }
        Ok(())
    }

    /// Log out with the same single-flight discipline as login.
    async fn logout_flow(self: &Arc<Self>, ref_token: Option<RefToken>) -> FlowResult {
        let waiter = {
            let mut inner = self.lock_inner();
            if !inner.is_logged_in {
                return Ok(());
            }
            if let Some(waiters) = &mut inner.logout_waiters {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Some(rx)
            } else {
                inner.logout_waiters = Some(Vec::new());
                inner.state = SessionState::LoggingOut;
                self.publish(&inner);
                None
            }
        };

        if let Some(rx) = waiter {
            return match rx.await {
                Ok(result) => result,
                Err(_) => Err("Session has shutdown".to_string()),
            };
        }

        let result = match &self.logout {
            Some(logout) => {
                let ext = self
                    .enhance_logout_methods
                    .as_ref()
                    .map(|enhance| enhance(ref_token))
                    .unwrap_or_default();
                tracing::debug!(session = %self.name, "running logout callback");
                let methods = LogoutMethods {
                    shared: self.clone(),
                    ext,
                };
                logout(methods).await.map_err(|e| e.to_string())
            }
            None => Ok(()),
        };

        let waiters = {
            let mut inner = self.lock_inner();
            let waiters = inner.logout_waiters.take().unwrap_or_default();
            inner.is_logged_in = false;
            inner.uptime_since = None;
            if let Some(heartbeat) = inner.heartbeat.take() {
                heartbeat.abort();
            }
            match &result {
                Ok(()) => {
                    if inner.state == SessionState::LoggingOut {
                        inner.state = SessionState::LoggedOut;
                    }
                }
                Err(message) => {
                    tracing::warn!(session = %self.name, error = %message, "logout failed");
                    inner.state = SessionState::Error;
                    inner.error = Some(message.clone());
                    inner.last_error = Some(Utc::now());
                }
            }
            self.publish(&inner);
            waiters
        };
        for tx in waiters {
            let _ = tx.send(result.clone());
        }
        result
    }

    /// Release one lease; with `always_renew`, log out before serving
    /// the next caller.
    pub(crate) async fn release(self: &Arc<Self>, ref_token: RefToken) -> Result<()> {
        let renew = {
            let mut inner = self.lock_inner();
            inner.active_handles = inner.active_handles.saturating_sub(1);
            inner.in_queue = inner.in_queue.saturating_sub(1);
            let renew = self.always_renew
                && inner.is_logged_in
                && inner.active_handles == 0
                && !matches!(inner.state, SessionState::Error | SessionState::LockedOut);
            if !renew && inner.active_handles == 0 && inner.state == SessionState::InUse {
                inner.state = SessionState::Ready;
            }
            self.publish(&inner);
            renew
        };
        if renew {
            let _ = self.logout_flow(Some(ref_token)).await;
        }
        Self::kick(self);
        Ok(())
    }

    pub(crate) async fn invalidate(
        self: &Arc<Self>,
        error: Option<String>,
        ref_token: Option<RefToken>,
    ) -> Result<()> {
        let was_logged_in = self.lock_inner().is_logged_in;
        if was_logged_in {
            let _ = self.logout_flow(ref_token).await;
        }
        {
            let mut inner = self.lock_inner();
            if let Some(heartbeat) = inner.heartbeat.take() {
                heartbeat.abort();
            }
            inner.is_logged_in = false;
            // Outstanding handles are dead from here on; their guards
            // reject further use.
            inner.in_queue = inner.in_queue.saturating_sub(inner.active_handles);
            inner.active_handles = 0;
            match error {
                Some(message) => {
                    inner.state = SessionState::Error;
                    inner.error = Some(message);
                    inner.last_error = Some(Utc::now());
                }
                None => {
                    if inner.state != SessionState::Shutdown {
                        inner.state = SessionState::LoggedOut;
                    }
                }
            }
            self.publish(&inner);
        }
        Self::kick(self);
        Ok(())
    }

    pub(crate) fn report_lockout(self: &Arc<Self>) {
        {
            let mut inner = self.lock_inner();
            if let Some(heartbeat) = inner.heartbeat.take() {
                heartbeat.abort();
            }
            inner.is_logged_in = false;
            inner.uptime_since = None;
            inner.state = SessionState::LockedOut;
            inner.last_error = Some(Utc::now());
            inner.in_queue = inner.in_queue.saturating_sub(inner.active_handles);
            inner.active_handles = 0;
            self.publish(&inner);
        }
        tracing::warn!(session = %self.name, "session locked out");
        Self::kick(self);
    }

    /// Issue a request through the session, bypassing the gate. Merges
    /// the session's default headers, jar, transport, and last URL, and
    /// suspends the heartbeat for the duration.
    pub(crate) async fn session_request(
        self: &Arc<Self>,
        mut options: HttpRequestOptions,
        manage_heartbeat: bool,
    ) -> Result<HttpResponse> {
        if manage_heartbeat {
            self.stop_heartbeat();
        }
        {
            let inner = self.lock_inner();
            for (name, value) in inner.default_headers.iter() {
                if !options.headers.contains_key(name) {
                    options.headers.insert(name.clone(), value.clone());
                }
            }
            if options.previous_url.is_none() {
                options.previous_url = inner.last_url.clone();
            }
        }
        if options.cookie_jar.is_none() {
            options.cookie_jar = Some(self.jar.clone());
        }
        if options.transport.is_none() {
            options.transport = Some(self.transport.clone());
        }

        let result = http_request(options).await;

        if let Ok(response) = &result {
            if let Ok(final_url) = Url::parse(&response.url) {
                self.lock_inner().last_url = Some(final_url);
            }
        }
        if manage_heartbeat {
            self.arm_heartbeat();
        }
        result
    }

    fn stop_heartbeat(&self) {
        if let Some(heartbeat) = self.lock_inner().heartbeat.take() {
            heartbeat.abort();
        }
    }

    /// (Re)start the heartbeat timer, when configured and the session
    /// is live.
    fn arm_heartbeat(self: &Arc<Self>) {
        let mut inner = self.lock_inner();
        if let Some(heartbeat) = inner.heartbeat.take() {
            heartbeat.abort();
        }
        let Some(url) = inner.heartbeat_url.clone() else {
            return;
        };
        if !matches!(inner.state, SessionState::Ready | SessionState::InUse) {
            return;
        }
        let weak = Arc::downgrade(self);
        let interval = self.heartbeat_interval;
        let shutdown = self.shutdown.clone();
        inner.heartbeat = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.cancelled() => return,
                }
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                {
                    let inner = shared.lock_inner();
                    if !matches!(inner.state, SessionState::Ready | SessionState::InUse) {
                        return;
                    }
                }
                tracing::debug!(session = %shared.name, url = %url, "sending heartbeat");
                let options = HttpRequestOptions::new(url.clone());
                if let Err(error) = shared.session_request(options, false).await {
                    tracing::warn!(session = %shared.name, error = %error, "heartbeat failed");
                }
            }
        }));
    }

    pub(crate) fn credentials(&self) -> serde_json::Value {
        self.lock_inner().credentials.clone()
    }

    pub(crate) fn set_default_headers(&self, headers: HeaderMap) {
        self.lock_inner().default_headers = headers;
    }

    pub(crate) fn set_heartbeat_url(self: &Arc<Self>, url: Option<String>) {
        self.lock_inner().heartbeat_url = url;
    }

    pub(crate) fn add_cookies(&self, cookies: Vec<Cookie>) {
        self.lock_jar().add_cookies(cookies);
    }

    pub(crate) fn remove_cookies(&self, filter: &CookieFilter) {
        self.lock_jar().remove_cookies(filter);
    }
}

/// Method object handed to the login callback.
pub struct LoginMethods {
    shared: Arc<SessionShared>,
    /// Typed extensions produced by the `enhance_login_methods` hook.
    pub ext: http::Extensions,
}

impl LoginMethods {
    pub fn get_credentials(&self) -> serde_json::Value {
        self.shared.credentials()
    }

    /// Shallow-merge `partial` into the session's user state.
    pub fn set_state(&self, partial: serde_json::Value) {
        self.shared.merge_state(partial);
    }

    /// Set or clear the heartbeat URL. Takes effect once the session
    /// reaches a live state.
    pub fn set_heartbeat_url(&self, url: Option<String>) {
        self.shared.set_heartbeat_url(url);
    }

    /// Issue a request through the session, bypassing the gate.
    pub async fn request(&self, options: HttpRequestOptions) -> Result<HttpResponse> {
        self.shared.session_request(options, true).await
    }

    pub fn set_default_headers(&self, headers: HeaderMap) {
        self.shared.set_default_headers(headers);
    }

    pub fn add_cookies(&self, cookies: Vec<Cookie>) {
        self.shared.add_cookies(cookies);
    }

    pub fn remove_cookies(&self, filter: &CookieFilter) {
        self.shared.remove_cookies(filter);
    }
}

/// Method object handed to the logout callback.
///
/// Mirrors [`LoginMethods`] except for `set_heartbeat_url`, which is
/// deliberately absent here.
pub struct LogoutMethods {
    shared: Arc<SessionShared>,
    /// Typed extensions produced by the `enhance_logout_methods` hook.
    pub ext: http::Extensions,
}

impl LogoutMethods {
    pub fn get_credentials(&self) -> serde_json::Value {
        self.shared.credentials()
    }

    pub fn set_state(&self, partial: serde_json::Value) {
        self.shared.merge_state(partial);
    }

    pub async fn request(&self, options: HttpRequestOptions) -> Result<HttpResponse> {
        self.shared.session_request(options, true).await
    }

    pub fn set_default_headers(&self, headers: HeaderMap) {
        self.shared.set_default_headers(headers);
    }

    pub fn add_cookies(&self, cookies: Vec<Cookie>) {
        self.shared.add_cookies(cookies);
    }

    pub fn remove_cookies(&self, filter: &CookieFilter) {
        self.shared.remove_cookies(filter);
    }
}
