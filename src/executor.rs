//! The HTTP request executor.
//!
//! One call performs one logical request: format the body, build
//! headers, follow redirects with correct method/body rewriting,
//! collect cookies on every hop, decode the body, and materialize a
//! typed response. Failures exit through a decorator that attaches the
//! sanitized request and any response fields accumulated so far.

use std::io::Cursor;
use std::sync::{Arc, Mutex, OnceLock};

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION, ORIGIN};
use http::{HeaderValue, Method};
use tokio::io::AsyncReadExt;
use url::Url;

use bytes::Bytes;

use crate::cookie::CookieJar;
use crate::error::{Error, ResponseSnapshot, Result};
use crate::headers::{
    apply_referer_policy, build_request_headers, host_of, origin_of, set_cookie_header,
};
use crate::request::{
    format_body, sanitize_request, FormattedBody, HttpRequestOptions, RequestData, ResponseType,
    SanitizedRequest,
};
use crate::response::{decode_body, HttpResponse, ResponseData, ResponseStream};
use crate::transport::{TcpTransport, Transport, TransportBody, TransportRequest};
use crate::util::truncate;

/// Process-wide default transport, shared by requests that do not
/// supply their own.
fn default_transport() -> Arc<dyn Transport> {
    static DEFAULT: OnceLock<Arc<TcpTransport>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| Arc::new(TcpTransport::default()))
        .clone()
}

#[derive(Default)]
struct Trace {
    status: Option<u16>,
    status_text: Option<String>,
    url: Option<String>,
    redirect_urls: Vec<String>,
    redirect_count: u32,
}

impl Trace {
    fn to_snapshot(&self) -> ResponseSnapshot {
        ResponseSnapshot {
            status: self.status,
            status_text: self.status_text.clone(),
            url: self.url.clone(),
            redirect_urls: self.redirect_urls.clone(),
            redirect_count: self.redirect_count,
        }
    }
}

/// Perform one logical HTTP request.
///
/// Never retries; the single outcome is either a fully materialized
/// [`HttpResponse`] or an error decorated with the sanitized request.
pub async fn http_request(options: HttpRequestOptions) -> Result<HttpResponse> {
    let mut options = options;
    let mut trace = Trace::default();
    let mut snapshot: Option<SanitizedRequest> = None;

    match execute(&mut options, &mut trace, &mut snapshot).await {
        Ok(response) => Ok(response),
        Err(error) => {
            let snapshot = snapshot.unwrap_or_else(|| {
                sanitize_request(
                    &options.method,
                    &options.url,
                    options.timeout,
                    &options.data,
                    &FormattedBody::None,
                    &options.headers,
                    &[],
                    &options.hide_secrets,
                )
            });
            tracing::debug!(
                method = %snapshot.method,
                url = %snapshot.url,
                error = %error,
                "request failed"
            );
            Err(error.with_request(snapshot, Some(trace.to_snapshot())))
        }
    }
}

async fn execute(
    options: &mut HttpRequestOptions,
    trace: &mut Trace,
    snapshot: &mut Option<SanitizedRequest>,
) -> Result<HttpResponse> {
    let transport = options
        .transport
        .clone()
        .unwrap_or_else(default_transport);

    let formatted = format_body(&options.data)?;

    let mut url = Url::parse(&options.url)
        .map_err(|e| Error::invalid_input(format!("invalid URL {:?}: {}", options.url, e)))?;
    trace.url = Some(url.to_string());

    // Requests without a jar still get one, scoped to this call, so
    // redirects carry cookies set by earlier hops.
    let jar = options
        .cookie_jar
        .clone()
        .unwrap_or_else(|| Arc::new(Mutex::new(CookieJar::new())));

    // SameSite selection is driven by the navigation source.
    let host_domain = options
        .previous_url
        .as_ref()
        .and_then(|u| u.host_str())
        .or_else(|| url.host_str())
        .unwrap_or_default()
        .to_string();

    let mut outgoing: Vec<String> = options.cookies.iter().map(|c| c.to_string()).collect();
    outgoing.extend(
        jar.lock()
            .expect("cookie jar mutex poisoned")
            .get_request_cookies(&url, &host_domain),
    );

    let mut headers = build_request_headers(
        &options.headers,
        &options.method,
        &url,
        options.previous_url.as_ref(),
        options.data.data_type(),
        &formatted,
        options.response_type,
        &outgoing,
    );

    *snapshot = Some(sanitize_request(
        &options.method,
        &options.url,
        options.timeout,
        &options.data,
        &formatted,
        &headers,
        &outgoing,
        &options.hide_secrets,
    ));

    let mut method = options.method.clone();
    let mut keep_method_and_data = method != Method::GET;
    let mut redirect_count = 0u32;
    let mut collected_cookies: Vec<(String, String)> = Vec::new();
    let mut stream_sent = false;

    let response = loop {
        if !keep_method_and_data {
            method = Method::GET;
            headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
            headers.remove(CONTENT_TYPE);
        }

        let body = if !keep_method_and_data {
            TransportBody::Empty
        } else if matches!(options.data, RequestData::Stream(_)) {
            if stream_sent {
                return Err(Error::protocol(
                    "cannot replay a stream body across redirects",
                ));
            }
            stream_sent = true;
            match std::mem::take(&mut options.data) {
                RequestData::Stream(stream) => TransportBody::Stream(stream),
                _ => unreachable!(),
            }
        } else {
            match formatted.bytes() {
                Some(bytes) => TransportBody::Bytes(bytes.clone()),
                None => TransportBody::Empty,
            }
        };

        tracing::debug!(method = %method, url = %url, redirects = redirect_count, "sending request");

        let hop = transport
            .send(TransportRequest {
                url: url.clone(),
                method: method.clone(),
                headers: headers.clone(),
                body,
                timeout: options.timeout,
                abort: options.abort.clone(),
            })
            .await?;

        trace.status = Some(hop.status);
        trace.status_text = Some(hop.status_text.clone());
        trace.url = Some(url.to_string());

        // Cookies are stored against the URL actually requested, before
        // the redirect is followed.
        let stored = jar
            .lock()
            .expect("cookie jar mutex poisoned")
            .collect_cookies_from_response(&url, &hop.headers);
        collected_cookies.extend(stored.into_iter().map(|c| (c.name, c.value)));

        if !(300..400).contains(&hop.status) {
            break hop;
        }

        let location = hop
            .headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::protocol("Redirected to invalid URL"))?;
        let target = resolve_redirect(&url, location)?;
        tracing::debug!(
            status = hop.status,
            location = %truncate(location, 256),
            "following redirect"
        );

        if let Ok(value) = HeaderValue::from_str(&host_of(&target)) {
            headers.insert(HOST, value);
        }
        if let Ok(value) = HeaderValue::from_str(&origin_of(&target)) {
            headers.insert(ORIGIN, value);
        }
        let previous_host = url.host_str().unwrap_or_default().to_string();
        let cookie_list = jar
            .lock()
            .expect("cookie jar mutex poisoned")
            .get_request_cookies(&target, &previous_host);
        set_cookie_header(&mut headers, &cookie_list);
        apply_referer_policy(&mut headers, &url, &target);

        keep_method_and_data = hop.status == 307 || hop.status == 308;
        trace.redirect_urls.push(target.to_string());
        redirect_count += 1;
        trace.redirect_count = redirect_count;
        url = target;

        if redirect_count >= options.max_redirects {
            return Err(Error::protocol("Max redirect count exceeded"));
        }
    };

    if let Some(s) = snapshot.as_mut() {
        s.headers = headers
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    crate::util::redact(
                        &String::from_utf8_lossy(v.as_bytes()),
                        &options.hide_secrets,
                    ),
                )
            })
            .collect();
    }

    let content_encoding = response
        .get_header("content-encoding")
        .map(|s| s.to_string());

    let data = match options.response_type {
        ResponseType::Stream => match content_encoding.as_deref() {
            None | Some("") => ResponseData::Stream(response.body),
            Some(encoding) => {
                // Encoded streams are decoded through the buffer-based
                // decoders; the caller still receives a byte stream.
                let bytes = drain(response.body).await?;
                let decoded = decode_body(Some(encoding), bytes)?;
                ResponseData::Stream(Box::new(Cursor::new(decoded)))
            }
        },
        response_type => {
            let bytes = drain(response.body).await?;
            let decoded = decode_body(content_encoding.as_deref(), bytes)?;
            match response_type {
                ResponseType::Binary => ResponseData::Binary(decoded),
                ResponseType::Text => {
                    ResponseData::Text(String::from_utf8_lossy(&decoded).into_owned())
                }
                ResponseType::Json => {
                    let value: serde_json::Value = serde_json::from_slice(&decoded)
                        .map_err(|_| Error::validation("Unable to parse response data as JSON"))?;
                    ResponseData::Json(value)
                }
                ResponseType::Stream => unreachable!(),
            }
        }
    };

    if let Some(validate) = &options.validate_status {
        if !validate(response.status) {
            return Err(Error::validation(format!(
                "Unexpected response status: {}",
                response.status
            )));
        }
    }
    if options.assert_non_empty_response && data.is_empty() {
        return Err(Error::validation("Empty response"));
    }
    if let (Some(validate), ResponseData::Json(value)) = (&options.validate_json, &data) {
        if !validate(value) {
            return Err(Error::validation("Invalid response JSON"));
        }
    }

    tracing::debug!(
        status = response.status,
        url = %url,
        redirects = redirect_count,
        "request complete"
    );

    Ok(HttpResponse {
        status: response.status,
        status_text: response.status_text,
        url: url.to_string(),
        redirect_urls: trace.redirect_urls.clone(),
        redirect_count,
        cookies: collected_cookies.into_iter().collect(),
        headers: response.headers,
        data,
        request: snapshot.clone().expect("snapshot set before first hop"),
    })
}

/// Resolve a Location header: absolute URLs parse as-is, anything else
/// resolves against the previous hop's origin.
fn resolve_redirect(current: &Url, location: &str) -> Result<Url> {
    match Url::parse(location) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let origin = Url::parse(&origin_of(current))
                .map_err(|_| Error::protocol("Redirected to invalid URL"))?;
            origin
                .join(location)
                .map_err(|_| Error::protocol("Redirected to invalid URL"))
        }
        Err(_) => Err(Error::protocol("Redirected to invalid URL")),
    }
}

async fn drain(mut stream: ResponseStream) -> Result<Bytes> {
    let mut buf = Vec::new();
    stream
        .read_to_end(&mut buf)
        .await
        .map_err(|e| Error::transport(format!("failed to read response body: {}", e)))?;
    Ok(Bytes::from(buf))
}
