//! Typed HTTP responses with explicit decompression.

use std::collections::HashMap;
use std::io::Read;

use bytes::Bytes;
use http::HeaderMap;
use tokio::io::AsyncRead;

use crate::error::{Error, Result};
use crate::request::SanitizedRequest;

/// A streamed response body.
pub type ResponseStream = Box<dyn AsyncRead + Send + Unpin>;

/// Response payload, materialized per the requested response type.
pub enum ResponseData {
    Text(String),
    Binary(Bytes),
    Json(serde_json::Value),
    Stream(ResponseStream),
}

impl ResponseData {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            ResponseData::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseData::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Take the byte stream out of a streamed response.
    pub fn into_stream(self) -> Option<ResponseStream> {
        match self {
            ResponseData::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// True for an empty non-stream body.
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            ResponseData::Text(s) => s.is_empty(),
            ResponseData::Binary(b) => b.is_empty(),
            ResponseData::Json(_) | ResponseData::Stream(_) => false,
        }
    }
}

impl std::fmt::Debug for ResponseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseData::Text(s) => f.debug_tuple("Text").field(s).finish(),
            ResponseData::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
            ResponseData::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ResponseData::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A fully materialized HTTP response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    /// URL of the final hop.
    pub url: String,
    /// Every redirect target followed, in order.
    pub redirect_urls: Vec<String>,
    pub redirect_count: u32,
    /// Cookies stored from this exchange, flattened to name=value.
    pub cookies: HashMap<String, String>,
    pub headers: HeaderMap,
    pub data: ResponseData,
    /// Sanitized echo of the request that produced this response.
    pub request: SanitizedRequest,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Header value by name, case-insensitive.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Decode a drained body per its Content-Encoding.
///
/// `gzip`, `deflate`, and `br` are supported; any other non-empty
/// encoding is a protocol failure.
pub(crate) fn decode_body(content_encoding: Option<&str>, body: Bytes) -> Result<Bytes> {
    match content_encoding.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(body),
        Some("gzip") => decode_gzip(&body),
        Some("deflate") => decode_deflate(&body),
        Some("br") => decode_brotli(&body),
        Some(other) => Err(Error::protocol(format!(
            "Unknown content encoding: {}",
            other
        ))),
    }
}

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::protocol(format!("gzip decode failed: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_deflate(data: &[u8]) -> Result<Bytes> {
    // Servers disagree on whether "deflate" means zlib-wrapped or raw;
    // try zlib first and fall back to the raw stream.
    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut decoded)
        .is_ok()
    {
        return Ok(Bytes::from(decoded));
    }
    decoded.clear();
    flate2::read::DeflateDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::protocol(format!("deflate decode failed: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_brotli(data: &[u8]) -> Result<Bytes> {
    let mut decoder = brotli::Decompressor::new(data, 4096);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::protocol(format!("brotli decode failed: {}", e)))?;
    Ok(Bytes::from(decoded))
}
