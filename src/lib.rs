//! # Warden
//!
//! Stateful HTTP client with a session-gated request pipeline.
//!
//! Warden couples three subsystems: an [`HttpSession`] that owns a
//! credential lifecycle, cookie jar, connection pool, and request gate;
//! an HTTP request executor ([`http_request`]) that performs one
//! logical call including redirects and decompression; and an RFC
//! 6265-style [`CookieJar`].

// Core modules
pub mod cookie;
pub mod error;
pub mod executor;
pub mod headers;
pub mod pool;
pub mod request;
pub mod response;
pub mod util;

// Transport layer
pub mod transport;

// Session state machine and request gate
pub mod session;

// Re-exports for convenient access
pub use cookie::{Cookie, CookieFilter, CookieJar, SameSite};
pub use error::{Error, ResponseSnapshot, Result};
pub use executor::http_request;
pub use request::{
    DataType, FormValue, HttpRequestOptions, RequestData, ResponseType, SanitizedRequest,
};
pub use response::{HttpResponse, ResponseData};

// Session re-exports
pub use session::{
    HttpSession, LoginMethods, LogoutMethods, RefToken, RequestSessionOptions, SerializedSession,
    SessionConfig, SessionHandle, SessionState, SessionStatus,
};

// Transport and pool re-exports
pub use pool::{AgentOptions, PoolStats};
pub use transport::{TcpTransport, Transport, TransportBody, TransportRequest, TransportResponse};
