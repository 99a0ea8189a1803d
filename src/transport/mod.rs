//! Pluggable transport layer.
//!
//! The executor talks to the network through the [`Transport`] trait:
//! send a request head and body, receive response headers and an async
//! body reader. Tests substitute scripted transports; production uses
//! [`TcpTransport`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::request::BodyStream;
use crate::response::ResponseStream;

pub mod tcp;

pub use tcp::TcpTransport;

/// Wire-level request body.
pub enum TransportBody {
    Empty,
    Bytes(Bytes),
    /// Streamed upload; consumed by the send.
    Stream(BodyStream),
}

impl TransportBody {
    pub fn is_stream(&self) -> bool {
        matches!(self, TransportBody::Stream(_))
    }
}

/// One hop's request as handed to the transport.
pub struct TransportRequest {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: TransportBody,
    pub timeout: Option<Duration>,
    pub abort: Option<CancellationToken>,
}

/// Response head plus an async body reader.
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: ResponseStream,
}

impl TransportResponse {
    /// Header value by name, case-insensitive.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A primitive capable of one HTTP exchange.
///
/// Implementations must honor the request's abort token and timeout
/// where they can; the executor enforces both around the call as well.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}
