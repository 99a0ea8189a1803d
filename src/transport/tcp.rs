//! Default HTTP/1.1 transport over TCP, with rustls for https.
//!
//! Request serialization and response framing are handled here: fixed
//! Content-Length bodies, chunked transfer coding (both directions),
//! and close-delimited bodies. Reusable connections are parked in the
//! session-wide pool after the response is fully drained.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use url::Url;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::pool::{AgentOptions, ConnectionPool, PoolKey};
use crate::transport::{Transport, TransportBody, TransportRequest, TransportResponse};

/// Maximum response head size (64KB).
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Maximum number of response headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// Plain or TLS-wrapped client stream.
pub(crate) enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Build (once) a rustls client config backed by the OS trust store.
fn tls_client_config() -> Result<Arc<rustls::ClientConfig>> {
    static CONFIG: OnceLock<std::result::Result<Arc<rustls::ClientConfig>, String>> =
        OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let loaded = rustls_native_certs::load_native_certs();
            for err in &loaded.errors {
                tracing::warn!(error = %err, "error loading native root certificate");
            }
            let mut roots = rustls::RootCertStore::empty();
            let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
            if added == 0 {
                return Err("no usable native root CA certificates found".to_string());
            }
            tracing::debug!(added, ignored, "loaded native root certificates");
            Ok(Arc::new(
                rustls::ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            ))
        })
        .clone()
        .map_err(Error::transport)
}

/// Default transport: HTTP/1.1 over TCP, TLS via rustls for https.
pub struct TcpTransport {
    pool: ConnectionPool<MaybeTlsStream>,
    options: AgentOptions,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(AgentOptions::default())
    }
}

impl TcpTransport {
    pub fn new(options: AgentOptions) -> Self {
        Self {
            pool: ConnectionPool::new(options.max_idle_per_host, options.idle_timeout),
            options,
        }
    }

    /// Current idle-pool statistics.
    pub fn pool_stats(&self) -> crate::pool::PoolStats {
        self.pool.stats()
    }

    fn pool_key(url: &Url) -> Result<PoolKey> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::invalid_input(format!("URL has no host: {}", url)))?;
        let is_https = match url.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(Error::invalid_input(format!(
                    "unsupported URL scheme: {}",
                    other
                )))
            }
        };
        let port = url
            .port_or_known_default()
            .unwrap_or(if is_https { 443 } else { 80 });
        Ok(PoolKey::new(host.to_string(), port, is_https))
    }

    async fn connect(&self, key: &PoolKey) -> Result<MaybeTlsStream> {
        let tcp = tokio::time::timeout(
            self.options.connect_timeout,
            TcpStream::connect((key.host.as_str(), key.port)),
        )
        .await
        .map_err(|_| Error::timeout(format!("connect to {}:{} timed out", key.host, key.port)))?
        .map_err(|e| Error::transport(format!("connect to {}:{} failed: {}", key.host, key.port, e)))?;
        let _ = tcp.set_nodelay(true);

        if !key.is_https {
            return Ok(MaybeTlsStream::Plain(tcp));
        }

        let config = tls_client_config()?;
        let server_name = rustls::pki_types::ServerName::try_from(key.host.clone())
            .map_err(|_| Error::transport(format!("invalid TLS server name: {}", key.host)))?;
        let stream = tokio_rustls::TlsConnector::from(config)
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::transport(format!("TLS handshake failed: {}", e)))?;
        Ok(MaybeTlsStream::Tls(Box::new(stream)))
    }

    async fn send_inner(
        &self,
        url: &Url,
        method: Method,
        headers: HeaderMap,
        body: TransportBody,
    ) -> Result<TransportResponse> {
        let key = Self::pool_key(url)?;

        // Streamed uploads cannot be replayed, so they never ride a
        // possibly stale pooled connection.
        let mut pooled = if body.is_stream() {
            None
        } else {
            self.pool.take(&key)
        };
        let body_bytes = match body {
            TransportBody::Empty => None,
            TransportBody::Bytes(b) => Some(b),
            TransportBody::Stream(stream) => {
                let mut conn = self.connect(&key).await?;
                return self
                    .exchange(&mut conn, url, &method, &headers, None, Some(stream))
                    .await
                    .map(|(response, reusable)| {
                        if reusable {
                            self.pool.park(key, conn);
                        }
                        response
                    });
            }
        };

        loop {
            let (mut conn, from_pool) = match pooled.take() {
                Some(conn) => (conn, true),
                None => (self.connect(&key).await?, false),
            };
            match self
                .exchange(&mut conn, url, &method, &headers, body_bytes.clone(), None)
                .await
            {
                Ok((response, reusable)) => {
                    if reusable {
                        self.pool.park(key, conn);
                    }
                    return Ok(response);
                }
                Err(e) if from_pool => {
                    tracing::debug!(error = %e, "pooled connection failed, reconnecting");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn exchange(
        &self,
        conn: &mut MaybeTlsStream,
        url: &Url,
        method: &Method,
        headers: &HeaderMap,
        body: Option<Bytes>,
        body_stream: Option<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> Result<(TransportResponse, bool)> {
        let head = build_request_head(url, method, headers, body.as_ref(), body_stream.is_some());
        conn.write_all(&head)
            .await
            .map_err(|e| Error::transport(format!("failed to write request: {}", e)))?;

        if let Some(body) = &body {
            conn.write_all(body)
                .await
                .map_err(|e| Error::transport(format!("failed to write body: {}", e)))?;
        } else if let Some(stream) = body_stream {
            write_chunked_body(conn, stream).await?;
        }
        conn.flush()
            .await
            .map_err(|e| Error::transport(format!("failed to flush request: {}", e)))?;

        read_response(conn, method).await
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let TransportRequest {
            url,
            method,
            headers,
            body,
            timeout,
            abort,
        } = request;

        let fut = self.send_inner(&url, method, headers, body);
        tokio::pin!(fut);

        tokio::select! {
            biased;
            _ = async {
                match &abort {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            } => Err(Error::transport("request aborted")),
            result = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, &mut fut)
                        .await
                        .map_err(|_| Error::timeout("request timed out"))?,
                    None => fut.await,
                }
            } => result,
        }
    }
}

/// Serialize the request line and headers.
fn build_request_head(
    url: &Url,
    method: &Method,
    headers: &HeaderMap,
    body: Option<&Bytes>,
    is_stream: bool,
) -> Vec<u8> {
    let mut head = Vec::with_capacity(1024);
    head.extend_from_slice(method.as_str().as_bytes());
    head.push(b' ');
    head.extend_from_slice(url.path().as_bytes());
    if let Some(query) = url.query() {
        head.push(b'?');
        head.extend_from_slice(query.as_bytes());
    }
    head.extend_from_slice(b" HTTP/1.1\r\n");

    for (name, value) in headers {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    // Keep-alive by default so connections can be pooled.
    if !headers.contains_key(CONNECTION) {
        head.extend_from_slice(b"Connection: keep-alive\r\n");
    }
    if let Some(body) = body {
        if !headers.contains_key(CONTENT_LENGTH) && !headers.contains_key(TRANSFER_ENCODING) {
            head.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
    } else if is_stream && !headers.contains_key(TRANSFER_ENCODING) {
        head.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
    }

    head.extend_from_slice(b"\r\n");
    head
}

/// Stream an upload body as chunked transfer coding.
async fn write_chunked_body(
    conn: &mut MaybeTlsStream,
    mut stream: Box<dyn AsyncRead + Send + Unpin>,
) -> Result<()> {
    let mut buf = vec![0u8; 8192];
    loop {
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| Error::transport(format!("failed to read upload stream: {}", e)))?;
        if n == 0 {
            break;
        }
        conn.write_all(format!("{:x}\r\n", n).as_bytes())
            .await
            .map_err(|e| Error::transport(format!("failed to write chunk: {}", e)))?;
        conn.write_all(&buf[..n])
            .await
            .map_err(|e| Error::transport(format!("failed to write chunk: {}", e)))?;
        conn.write_all(b"\r\n")
            .await
            .map_err(|e| Error::transport(format!("failed to write chunk: {}", e)))?;
    }
    conn.write_all(b"0\r\n\r\n")
        .await
        .map_err(|e| Error::transport(format!("failed to finish chunked body: {}", e)))?;
    Ok(())
}

/// Read and parse an HTTP/1.1 response, skipping 1xx interim responses.
///
/// Returns the response and whether the connection may be reused.
async fn read_response(
    conn: &mut MaybeTlsStream,
    request_method: &Method,
) -> Result<(TransportResponse, bool)> {
    let mut buffer: Vec<u8> = Vec::with_capacity(8192);

    loop {
        let head_end = loop {
            if let Some(end) = find_head_end(&buffer) {
                break end;
            }
            if buffer.len() >= MAX_HEAD_SIZE {
                return Err(Error::protocol("response headers too large"));
            }
            let mut read_buf = vec![0u8; 8192];
            let n = conn
                .read(&mut read_buf)
                .await
                .map_err(|e| Error::transport(format!("failed to read response: {}", e)))?;
            if n == 0 {
                return Err(Error::transport(
                    "connection closed before response headers",
                ));
            }
            buffer.extend_from_slice(&read_buf[..n]);
        };

        let mut parsed_headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
        let mut parsed = httparse::Response::new(&mut parsed_headers);
        let status_len = match parsed
            .parse(&buffer[..head_end])
            .map_err(|e| Error::protocol(format!("failed to parse response: {}", e)))?
        {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => {
                return Err(Error::protocol("incomplete response headers"));
            }
        };
        debug_assert_eq!(status_len, head_end);

        let status = parsed
            .code
            .ok_or_else(|| Error::protocol("missing status code"))?;
        let status_text = parsed.reason.unwrap_or_default().to_string();
        let http10 = parsed.version == Some(0);

        let mut headers = HeaderMap::new();
        for h in parsed.headers.iter().filter(|h| !h.name.is_empty()) {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(h.name.as_bytes()),
                HeaderValue::from_bytes(h.value),
            ) {
                headers.append(name, value);
            }
        }

        buffer.drain(..head_end);

        // Interim responses carry no body; keep reading for the final one.
        if (100..200).contains(&status) {
            continue;
        }

        let connection = headers
            .get(CONNECTION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut reusable = if http10 {
            connection.contains("keep-alive")
        } else {
            !connection.contains("close")
        };

        let has_body =
            !matches!(status, 204 | 304) && *request_method != Method::HEAD;

        let body = if !has_body {
            Bytes::new()
        } else {
            let chunked = headers
                .get(TRANSFER_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(|v| {
                    v.split(',')
                        .next_back()
                        .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
                        .unwrap_or(false)
                })
                .unwrap_or(false);
            let content_length = if chunked {
                None
            } else {
                match headers.get(CONTENT_LENGTH).and_then(|v| v.to_str().ok()) {
                    Some(v) => Some(v.trim().parse::<usize>().map_err(|_| {
                        Error::protocol(format!("invalid Content-Length: {}", v))
                    })?),
                    None => None,
                }
            };

            if chunked {
                read_chunked_body(conn, &mut buffer).await?
            } else if let Some(len) = content_length {
                read_fixed_body(conn, &mut buffer, len).await?
            } else {
                // Close-delimited body; the connection dies with it.
                reusable = false;
                read_until_close(conn, &mut buffer).await?
            }
        };

        let response = TransportResponse {
            status,
            status_text,
            headers,
            body: Box::new(Cursor::new(body)),
        };
        return Ok((response, reusable));
    }
}

async fn read_fixed_body(
    conn: &mut MaybeTlsStream,
    buffer: &mut Vec<u8>,
    content_length: usize,
) -> Result<Bytes> {
    let initial = buffer.len().min(content_length);
    let mut body = Vec::with_capacity(content_length);
    body.extend_from_slice(&buffer[..initial]);
    buffer.drain(..initial);

    while body.len() < content_length {
        let mut chunk = vec![0u8; (content_length - body.len()).min(8192)];
        let n = conn
            .read(&mut chunk)
            .await
            .map_err(|e| Error::transport(format!("failed to read body: {}", e)))?;
        if n == 0 {
            return Err(Error::transport(format!(
                "connection closed mid-body ({} of {} bytes)",
                body.len(),
                content_length
            )));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Ok(Bytes::from(body))
}

async fn read_until_close(conn: &mut MaybeTlsStream, buffer: &mut Vec<u8>) -> Result<Bytes> {
    let mut body = std::mem::take(buffer);
    let mut read_buf = vec![0u8; 8192];
    loop {
        let n = conn
            .read(&mut read_buf)
            .await
            .map_err(|e| Error::transport(format!("failed to read body: {}", e)))?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&read_buf[..n]);
    }
    Ok(Bytes::from(body))
}

async fn read_chunked_body(conn: &mut MaybeTlsStream, buffer: &mut Vec<u8>) -> Result<Bytes> {
    let mut body = Vec::new();
    let mut read_buf = vec![0u8; 8192];

    loop {
        let (chunk_size, line_end) = loop {
            if let Some(found) = find_chunk_size(buffer)? {
                break found;
            }
            let n = conn
                .read(&mut read_buf)
                .await
                .map_err(|e| Error::transport(format!("failed to read chunk size: {}", e)))?;
            if n == 0 {
                return Err(Error::transport("connection closed mid-chunk"));
            }
            buffer.extend_from_slice(&read_buf[..n]);
        };
        buffer.drain(..line_end);

        if chunk_size == 0 {
            consume_trailers(conn, buffer).await?;
            break;
        }

        let chunk_end = chunk_size + 2; // data + CRLF
        while buffer.len() < chunk_end {
            let n = conn
                .read(&mut read_buf)
                .await
                .map_err(|e| Error::transport(format!("failed to read chunk data: {}", e)))?;
            if n == 0 {
                return Err(Error::transport("connection closed mid-chunk"));
            }
            buffer.extend_from_slice(&read_buf[..n]);
        }
        body.extend_from_slice(&buffer[..chunk_size]);
        buffer.drain(..chunk_end);
    }

    Ok(Bytes::from(body))
}

async fn consume_trailers(conn: &mut MaybeTlsStream, buffer: &mut Vec<u8>) -> Result<()> {
    let mut read_buf = vec![0u8; 4096];
    loop {
        if let Some(pos) = find_crlf(buffer) {
            if pos == 0 {
                buffer.drain(..2);
                return Ok(());
            }
            buffer.drain(..pos + 2);
            continue;
        }
        let n = conn
            .read(&mut read_buf)
            .await
            .map_err(|e| Error::transport(format!("failed to read trailers: {}", e)))?;
        if n == 0 {
            // Connection closed; absent trailers are acceptable.
            return Ok(());
        }
        buffer.extend_from_slice(&read_buf[..n]);
    }
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}

/// Parse a chunk-size line, returning (size, end_of_line_offset).
fn find_chunk_size(buffer: &[u8]) -> Result<Option<(usize, usize)>> {
    let Some(pos) = find_crlf(buffer) else {
        return Ok(None);
    };
    let line = String::from_utf8_lossy(&buffer[..pos]);
    let size_part = line.split(';').next().unwrap_or_default().trim();
    let size = usize::from_str_radix(size_part, 16)
        .map_err(|_| Error::protocol(format!("invalid chunk size: {}", size_part)))?;
    Ok(Some((size, pos + 2)))
}
