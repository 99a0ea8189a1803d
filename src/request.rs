//! Request descriptor, body formatting, and the sanitized request echo.
//!
//! The request body is a tagged union: the variant both carries the
//! payload and selects the wire formatting, so a mismatched data/payload
//! combination is unrepresentable.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;
use url::Url;

use crate::cookie::{Cookie, CookieJar};
use crate::error::Result;
use crate::transport::Transport;
use crate::util::redact;

/// Default redirect budget for a single logical request.
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Request body kind, echoed in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Raw,
    Json,
    Form,
    Binary,
    Stream,
}

/// How the response body is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Text,
    Binary,
    Json,
    Stream,
}

/// A streaming request body.
pub type BodyStream = Box<dyn AsyncRead + Send + Unpin>;

/// Value of a single form field; lists produce repeated keys.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    List(Vec<String>),
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

impl From<Vec<String>> for FormValue {
    fn from(value: Vec<String>) -> Self {
        FormValue::List(value)
    }
}

/// Request payload, tagged by wire format.
#[derive(Default)]
pub enum RequestData {
    /// No body.
    #[default]
    Empty,
    /// Pass-through text body.
    Raw(String),
    /// JSON-encoded body.
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded` body.
    Form(Vec<(String, FormValue)>),
    /// Pass-through byte body.
    Binary(Bytes),
    /// Streamed body; sent once, cannot be replayed across redirects.
    Stream(BodyStream),
}

impl RequestData {
    /// The data-type tag for this payload.
    pub fn data_type(&self) -> DataType {
        match self {
            RequestData::Empty | RequestData::Raw(_) => DataType::Raw,
            RequestData::Json(_) => DataType::Json,
            RequestData::Form(_) => DataType::Form,
            RequestData::Binary(_) => DataType::Binary,
            RequestData::Stream(_) => DataType::Stream,
        }
    }

    /// Whether the request carries a body at all.
    pub fn has_body(&self) -> bool {
        !matches!(self, RequestData::Empty)
    }
}

impl std::fmt::Debug for RequestData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestData::Empty => f.write_str("Empty"),
            RequestData::Raw(s) => f.debug_tuple("Raw").field(s).finish(),
            RequestData::Json(v) => f.debug_tuple("Json").field(v).finish(),
            RequestData::Form(pairs) => f.debug_tuple("Form").field(pairs).finish(),
            RequestData::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
            RequestData::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// The formatted wire body for one request.
pub(crate) enum FormattedBody {
    None,
    Bytes(Bytes),
    /// Body will be piped from [`RequestData::Stream`] at send time.
    Stream,
}

impl FormattedBody {
    pub(crate) fn len(&self) -> usize {
        match self {
            FormattedBody::Bytes(b) => b.len(),
            _ => 0,
        }
    }

    pub(crate) fn bytes(&self) -> Option<&Bytes> {
        match self {
            FormattedBody::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// Serialize the payload into its wire form.
pub(crate) fn format_body(data: &RequestData) -> Result<FormattedBody> {
    Ok(match data {
        RequestData::Empty => FormattedBody::None,
        RequestData::Raw(text) => FormattedBody::Bytes(Bytes::from(text.clone())),
        RequestData::Json(value) => FormattedBody::Bytes(Bytes::from(serde_json::to_vec(value)?)),
        RequestData::Form(pairs) => {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in pairs {
                match value {
                    FormValue::Text(v) => {
                        serializer.append_pair(key, v);
                    }
                    FormValue::List(items) => {
                        for item in items {
                            serializer.append_pair(key, item);
                        }
                    }
                }
            }
            FormattedBody::Bytes(Bytes::from(serializer.finish()))
        }
        RequestData::Binary(bytes) => FormattedBody::Bytes(bytes.clone()),
        RequestData::Stream(_) => FormattedBody::Stream,
    })
}

/// Content-Type derived from the payload kind when the caller set none.
pub(crate) fn content_type_for(data_type: DataType) -> Option<&'static str> {
    match data_type {
        DataType::Form => Some("application/x-www-form-urlencoded"),
        DataType::Binary => Some("application/octet-stream"),
        DataType::Json => Some("application/json"),
        DataType::Raw | DataType::Stream => None,
    }
}

/// Descriptor for one logical HTTP call.
///
/// Built with the builder-style setters and consumed by
/// [`crate::executor::http_request`].
pub struct HttpRequestOptions {
    pub url: String,
    /// Source of the navigation, for the Referer policy and SameSite
    /// selection.
    pub previous_url: Option<Url>,
    pub method: Method,
    pub data: RequestData,
    pub response_type: ResponseType,
    pub headers: HeaderMap,
    /// Explicit cookies attached in addition to the jar's selection.
    pub cookies: Vec<Cookie>,
    /// Shared jar consulted for outgoing cookies and updated from
    /// responses.
    pub cookie_jar: Option<Arc<Mutex<CookieJar>>>,
    /// Per-hop transport timeout.
    pub timeout: Option<Duration>,
    pub abort: Option<CancellationToken>,
    pub max_redirects: u32,
    pub transport: Option<Arc<dyn Transport>>,
    /// Secrets scrubbed from logs and error snapshots.
    pub hide_secrets: Vec<String>,
    pub validate_status: Option<Arc<dyn Fn(u16) -> bool + Send + Sync>>,
    pub validate_json: Option<Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>>,
    pub assert_non_empty_response: bool,
}

impl HttpRequestOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            previous_url: None,
            method: Method::GET,
            data: RequestData::Empty,
            response_type: ResponseType::Text,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            cookie_jar: None,
            timeout: None,
            abort: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            transport: None,
            hide_secrets: Vec::new(),
            validate_status: None,
            validate_json: None,
            assert_non_empty_response: false,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn previous_url(mut self, url: Url) -> Self {
        self.previous_url = Some(url);
        self
    }

    /// Set a pass-through text body.
    pub fn raw(mut self, body: impl Into<String>) -> Self {
        self.data = RequestData::Raw(body.into());
        self
    }

    /// Set a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.data = RequestData::Json(body);
        self
    }

    /// Set a urlencoded form body.
    pub fn form(mut self, pairs: Vec<(String, FormValue)>) -> Self {
        self.data = RequestData::Form(pairs);
        self
    }

    /// Set a byte body.
    pub fn binary(mut self, body: impl Into<Bytes>) -> Self {
        self.data = RequestData::Binary(body.into());
        self
    }

    /// Set a streaming body.
    pub fn stream(mut self, body: BodyStream) -> Self {
        self.data = RequestData::Stream(body);
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Add a header to the request.
    pub fn header(mut self, key: http::HeaderName, value: impl Into<String>) -> Self {
        if let Ok(v) = http::HeaderValue::from_str(&value.into()) {
            self.headers.append(key, v);
        }
        self
    }

    /// Set all headers (replaces existing headers).
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn cookie_jar(mut self, jar: Arc<Mutex<CookieJar>>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn abort(mut self, token: CancellationToken) -> Self {
        self.abort = Some(token);
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn hide_secret(mut self, secret: impl Into<String>) -> Self {
        self.hide_secrets.push(secret.into());
        self
    }

    pub fn hide_secrets(mut self, secrets: Vec<String>) -> Self {
        self.hide_secrets = secrets;
        self
    }

    pub fn validate_status(mut self, f: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        self.validate_status = Some(Arc::new(f));
        self
    }

    pub fn validate_json(
        mut self,
        f: impl Fn(&serde_json::Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validate_json = Some(Arc::new(f));
        self
    }

    pub fn assert_non_empty_response(mut self, assert: bool) -> Self {
        self.assert_non_empty_response = assert;
        self
    }
}

/// Secret-redacted view of an in-flight request.
///
/// This is what reaches logs and error payloads; the live descriptor is
/// never rendered directly.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SanitizedRequest {
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub data_type: DataType,
    pub data: Option<String>,
    pub formatted_data: Option<String>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<String>,
}

/// Secrets encoded the way the given body encodes them, so redaction
/// matches what actually appears on the wire.
fn encoded_secrets(secrets: &[String], data_type: DataType) -> Vec<String> {
    match data_type {
        DataType::Form => secrets
            .iter()
            .map(|s| form_urlencoded::byte_serialize(s.as_bytes()).collect())
            .collect(),
        DataType::Json => secrets.iter().map(|s| s.replace('"', "\\\"")).collect(),
        _ => secrets.to_vec(),
    }
}

/// Build the sanitized echo of a request.
#[allow(clippy::too_many_arguments)]
pub(crate) fn sanitize_request(
    method: &Method,
    url: &str,
    timeout: Option<Duration>,
    data: &RequestData,
    formatted: &FormattedBody,
    headers: &HeaderMap,
    cookies: &[String],
    secrets: &[String],
) -> SanitizedRequest {
    let data_type = data.data_type();
    let encoded = encoded_secrets(secrets, data_type);

    let raw_view = match data {
        RequestData::Empty => None,
        RequestData::Raw(text) => Some(redact(text, secrets)),
        RequestData::Json(value) => Some(redact(&value.to_string(), &encoded)),
        RequestData::Form(pairs) => {
            let rendered = pairs
                .iter()
                .map(|(k, v)| match v {
                    FormValue::Text(t) => format!("{}={}", k, t),
                    FormValue::List(items) => format!("{}={}", k, items.join(",")),
                })
                .collect::<Vec<_>>()
                .join("&");
            Some(redact(&rendered, secrets))
        }
        RequestData::Binary(_) => Some("[BINARY]".to_string()),
        RequestData::Stream(_) => Some("[STREAM]".to_string()),
    };

    let formatted_view = match (data, formatted) {
        (RequestData::Binary(_), _) => Some("[BINARY]".to_string()),
        (RequestData::Stream(_), _) | (_, FormattedBody::Stream) => Some("[STREAM]".to_string()),
        (_, FormattedBody::None) => None,
        (_, FormattedBody::Bytes(bytes)) => {
            Some(redact(&String::from_utf8_lossy(bytes), &encoded))
        }
    };

    SanitizedRequest {
        method: method.to_string(),
        url: url.to_string(),
        timeout_ms: timeout.map(|t| t.as_millis() as u64),
        data_type,
        data: raw_view,
        formatted_data: formatted_view,
        headers: headers
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    redact(&String::from_utf8_lossy(v.as_bytes()), secrets),
                )
            })
            .collect(),
        cookies: cookies.iter().map(|c| redact(c, secrets)).collect(),
    }
}
