//! Session configuration.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;

use crate::cookie::Cookie;
use crate::error::Result;
use crate::pool::AgentOptions;
use crate::session::{LoginMethods, LogoutMethods, RefToken, SerializedSession};
use crate::transport::Transport;

/// Login callback: authenticates against the remote service using the
/// session-provided method object.
pub type LoginCallback =
    Arc<dyn Fn(LoginMethods) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Logout callback, mirroring [`LoginCallback`].
pub type LogoutCallback =
    Arc<dyn Fn(LogoutMethods) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Hook invoked with a lease's ref token.
pub type RefHook = Arc<dyn Fn(RefToken) + Send + Sync>;

/// Produces typed extensions merged onto the login/logout method
/// object. Receives the lease ref when the call is tied to one.
pub type EnhanceHook = Arc<dyn Fn(Option<RefToken>) -> http::Extensions + Send + Sync>;

/// Configuration for [`crate::session::HttpSession`].
pub struct SessionConfig {
    pub name: String,
    pub login: Option<LoginCallback>,
    pub logout: Option<LogoutCallback>,
    /// Initial user state; opaque to the session.
    pub state: serde_json::Value,
    /// Credentials handed to the login callback; opaque to the session.
    pub credentials: serde_json::Value,
    /// Headers merged into every request issued through the session.
    pub default_headers: HeaderMap,
    /// Seed cookies for the session jar.
    pub cookies: Vec<Cookie>,
    /// Log out after every release instead of keeping the login warm.
    pub always_renew: bool,
    /// Cooldown before a login is attempted again after a lockout.
    pub lockout_time: Duration,
    pub heartbeat_url: Option<String>,
    pub heartbeat_interval: Duration,
    /// Gate off: multiple handles may be leased concurrently.
    pub allow_multiple_requests: bool,
    /// Connection-pool options for the session transport.
    pub agent: AgentOptions,
    pub enhance_login_methods: Option<EnhanceHook>,
    pub enhance_logout_methods: Option<EnhanceHook>,
    /// Transport override; defaults to the TCP transport built from
    /// `agent`.
    pub transport: Option<Arc<dyn Transport>>,
}

impl SessionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            login: None,
            logout: None,
            state: serde_json::Value::Null,
            credentials: serde_json::Value::Null,
            default_headers: HeaderMap::new(),
            cookies: Vec::new(),
            always_renew: false,
            lockout_time: Duration::from_secs(24 * 60 * 60),
            heartbeat_url: None,
            heartbeat_interval: Duration::from_secs(60),
            allow_multiple_requests: false,
            agent: AgentOptions::default(),
            enhance_login_methods: None,
            enhance_logout_methods: None,
            transport: None,
        }
    }

    pub fn login<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LoginMethods) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.login = Some(Arc::new(move |methods| Box::pin(f(methods))));
        self
    }

    pub fn logout<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LogoutMethods) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.logout = Some(Arc::new(move |methods| Box::pin(f(methods))));
        self
    }

    pub fn state(mut self, state: serde_json::Value) -> Self {
        self.state = state;
        self
    }

    pub fn credentials(mut self, credentials: serde_json::Value) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    pub fn cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn always_renew(mut self, always_renew: bool) -> Self {
        self.always_renew = always_renew;
        self
    }

    pub fn lockout_time(mut self, lockout_time: Duration) -> Self {
        self.lockout_time = lockout_time;
        self
    }

    pub fn heartbeat_url(mut self, url: impl Into<String>) -> Self {
        self.heartbeat_url = Some(url.into());
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn allow_multiple_requests(mut self, allow: bool) -> Self {
        self.allow_multiple_requests = allow;
        self
    }

    pub fn agent(mut self, agent: AgentOptions) -> Self {
        self.agent = agent;
        self
    }

    pub fn enhance_login_methods(
        mut self,
        f: impl Fn(Option<RefToken>) -> http::Extensions + Send + Sync + 'static,
    ) -> Self {
        self.enhance_login_methods = Some(Arc::new(f));
        self
    }

    pub fn enhance_logout_methods(
        mut self,
        f: impl Fn(Option<RefToken>) -> http::Extensions + Send + Sync + 'static,
    ) -> Self {
        self.enhance_logout_methods = Some(Arc::new(f));
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Seed state, default headers, and cookies from a serialized
    /// session snapshot.
    pub fn with_snapshot(mut self, snapshot: SerializedSession) -> Self {
        self.state = snapshot.state;
        let mut headers = HeaderMap::new();
        for (name, value) in &snapshot.default_headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<http::HeaderName>(),
                http::HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        self.default_headers = headers;
        self.cookies = snapshot.cookies;
        self
    }
}

/// Options for one [`crate::session::HttpSession::request_session`]
/// call.
#[derive(Default, Clone)]
pub struct RequestSessionOptions {
    /// Wait budget; a queued caller is rejected when it elapses.
    pub timeout: Option<Duration>,
    /// Invoked with the lease ref just before login and hand-out.
    pub before_request: Option<RefHook>,
    /// Invoked with the lease ref, once, when a handle operation is
    /// rejected by its guard.
    pub on_release: Option<RefHook>,
}

impl RequestSessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn before_request(mut self, hook: impl Fn(RefToken) + Send + Sync + 'static) -> Self {
        self.before_request = Some(Arc::new(hook));
        self
    }

    pub fn on_release(mut self, hook: impl Fn(RefToken) + Send + Sync + 'static) -> Self {
        self.on_release = Some(Arc::new(hook));
        self
    }
}
