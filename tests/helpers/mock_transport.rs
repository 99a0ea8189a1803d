//! Scripted transport for integration tests.
//!
//! Routes are matched in registration order against the recorded
//! request; an unmatched request fails with a transport error, which
//! doubles as the "unreachable host" case in tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue};
use tokio::io::AsyncReadExt;

use warden::{Error, Result, Transport, TransportBody, TransportRequest, TransportResponse};

/// A request as seen by the transport, fully drained.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Scripted response returned by a route.
pub struct MockResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn text(body: &str) -> Self {
        Self::new(200).body(body.as_bytes().to_vec())
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::new(status).header("Location", location)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

type Matcher = Box<dyn Fn(&RecordedRequest) -> bool + Send + Sync>;
type Responder = Box<dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync>;

struct Route {
    matcher: Matcher,
    responder: Responder,
}

/// Route-based [`Transport`] double.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a route matched on the full request URL.
    pub fn on_url(
        self: &Arc<Self>,
        url: &str,
        responder: impl Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    ) -> Arc<Self> {
        let url = url.to_string();
        self.on(move |req| req.url == url, responder)
    }

    /// Register a route with an arbitrary matcher.
    pub fn on(
        self: &Arc<Self>,
        matcher: impl Fn(&RecordedRequest) -> bool + Send + Sync + 'static,
        responder: impl Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    ) -> Arc<Self> {
        self.routes
            .lock()
            .expect("route mutex poisoned")
            .push(Route {
                matcher: Box::new(matcher),
                responder: Box::new(responder),
            });
        self.clone()
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().expect("log mutex poisoned").clone()
    }

    /// Requests whose URL path equals `path`.
    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| {
                url::Url::parse(&r.url)
                    .map(|u| u.path() == path)
                    .unwrap_or(false)
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let body = match request.body {
            TransportBody::Empty => Vec::new(),
            TransportBody::Bytes(bytes) => bytes.to_vec(),
            TransportBody::Stream(mut stream) => {
                let mut buf = Vec::new();
                stream
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| Error::transport(format!("mock failed to drain body: {}", e)))?;
                buf
            }
        };
        let recorded = RecordedRequest {
            method: request.method.to_string(),
            url: request.url.to_string(),
            headers: request.headers.clone(),
            body,
        };

        let response = {
            let routes = self.routes.lock().expect("route mutex poisoned");
            routes
                .iter()
                .find(|route| (route.matcher)(&recorded))
                .map(|route| (route.responder)(&recorded))
        };
        self.log
            .lock()
            .expect("log mutex poisoned")
            .push(recorded.clone());

        let Some(response) = response else {
            return Err(Error::transport(format!(
                "no route for {} {}",
                recorded.method, recorded.url
            )));
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &response.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }

        Ok(TransportResponse {
            status: response.status,
            status_text: response.status_text,
            headers,
            body: Box::new(std::io::Cursor::new(response.body)),
        })
    }
}
