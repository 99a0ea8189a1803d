//! Request header construction: browser-like defaults, body headers,
//! cookie assembly, and the Referer policy.

use http::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, ORIGIN,
    REFERER, USER_AGENT,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::request::{content_type_for, DataType, FormattedBody, ResponseType};

/// Default desktop User-Agent sent unless the caller overrides it.
pub const USER_AGENT_VALUE: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:100.0) Gecko/20100101 Firefox/100.0";

pub const ACCEPT_ENCODING_VALUE: &str = "gzip, deflate, br";

pub const ACCEPT_LANGUAGE_VALUE: &str = "en-GB,en;q=0.5";

const ACCEPT_JSON: &str = "application/json";

const ACCEPT_HTML: &str = "text/html, application/xhtml+xml, application/xml;q=0.9, */*;q=0.8";

/// `scheme://host[:port]` with default ports omitted.
pub(crate) fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Host header value: host plus explicit non-default port.
pub(crate) fn host_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn set(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.insert(name, v);
    }
}

/// Apply strict-origin-when-cross-origin to the Referer header.
///
/// Same origin keeps path and query, cross-origin sends the bare
/// origin, and a security downgrade (https source, http target) sends
/// nothing. Replaces any existing Referer.
pub(crate) fn apply_referer_policy(headers: &mut HeaderMap, previous: &Url, current: &Url) {
    if previous.scheme() == "https" && current.scheme() == "http" {
        headers.remove(REFERER);
        return;
    }
    if previous.origin() == current.origin() {
        let mut referer = format!("{}{}", origin_of(previous), previous.path());
        if let Some(query) = previous.query() {
            referer.push('?');
            referer.push_str(query);
        }
        set(headers, REFERER, &referer);
    } else {
        set(headers, REFERER, &origin_of(previous));
    }
}

/// Replace the Cookie header with the given `name=value` list.
pub(crate) fn set_cookie_header(headers: &mut HeaderMap, cookies: &[String]) {
    headers.remove(COOKIE);
    if !cookies.is_empty() {
        set(headers, COOKIE, &cookies.join("; "));
    }
}

/// Build the full outgoing header set for the first hop of a request.
///
/// Starts from a deep copy of the caller's headers; every default below
/// is applied only when the caller has not set the header already.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_request_headers(
    caller: &HeaderMap,
    method: &Method,
    url: &Url,
    previous_url: Option<&Url>,
    data_type: DataType,
    body: &FormattedBody,
    response_type: ResponseType,
    outgoing_cookies: &[String],
) -> HeaderMap {
    let mut headers = caller.clone();

    // Body headers: derived only when the caller set neither.
    let carries_body = !matches!(body, FormattedBody::None);
    if *method != Method::GET
        && carries_body
        && !headers.contains_key(CONTENT_TYPE)
        && !headers.contains_key(CONTENT_LENGTH)
    {
        if let Some(content_type) = content_type_for(data_type) {
            set(&mut headers, CONTENT_TYPE, content_type);
        }
        if let Some(bytes) = body.bytes() {
            set(&mut headers, CONTENT_LENGTH, &bytes.len().to_string());
        }
    }

    if let Some(previous) = previous_url {
        if !headers.contains_key(REFERER) {
            apply_referer_policy(&mut headers, previous, url);
        }
    }

    if !headers.contains_key(ORIGIN) {
        let origin = previous_url.map(origin_of).unwrap_or_else(|| origin_of(url));
        set(&mut headers, ORIGIN, &origin);
    }
    if !headers.contains_key(HOST) {
        let host = previous_url.map(host_of).unwrap_or_else(|| host_of(url));
        set(&mut headers, HOST, &host);
    }
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    }
    if !headers.contains_key(ACCEPT) {
        let accept = match response_type {
            ResponseType::Json => ACCEPT_JSON,
            _ => ACCEPT_HTML,
        };
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
    }
    if !headers.contains_key(ACCEPT_ENCODING) {
        headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static(ACCEPT_ENCODING_VALUE),
        );
    }
    if !headers.contains_key(ACCEPT_LANGUAGE) {
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE),
        );
    }

    // Outgoing cookies are appended to whatever Cookie values the
    // caller supplied (list concatenation).
    if !outgoing_cookies.is_empty() {
        let mut all: Vec<String> = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        all.extend(outgoing_cookies.iter().cloned());
        set_cookie_header(&mut headers, &all);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_referer_same_origin_keeps_path_and_query() {
        let mut headers = HeaderMap::new();
        apply_referer_policy(
            &mut headers,
            &url("https://example.com/a/b?x=1"),
            &url("https://example.com/c"),
        );
        assert_eq!(
            headers.get(REFERER).unwrap(),
            "https://example.com/a/b?x=1"
        );
    }

    #[test]
    fn test_referer_cross_origin_sends_bare_origin() {
        let mut headers = HeaderMap::new();
        apply_referer_policy(
            &mut headers,
            &url("https://example.com/a/b?x=1"),
            &url("https://other.com/"),
        );
        assert_eq!(headers.get(REFERER).unwrap(), "https://example.com");
    }

    #[test]
    fn test_referer_downgrade_sends_nothing() {
        let mut headers = HeaderMap::new();
        set(&mut headers, REFERER, "https://example.com/stale");
        apply_referer_policy(
            &mut headers,
            &url("https://example.com/a"),
            &url("http://example.com/b"),
        );
        assert!(headers.get(REFERER).is_none());
    }

    #[test]
    fn test_default_headers_applied() {
        let headers = build_request_headers(
            &HeaderMap::new(),
            &Method::GET,
            &url("http://example.com/"),
            None,
            DataType::Raw,
            &FormattedBody::None,
            ResponseType::Text,
            &[],
        );
        assert_eq!(headers.get(USER_AGENT).unwrap(), USER_AGENT_VALUE);
        assert_eq!(headers.get(ACCEPT).unwrap(), ACCEPT_HTML);
        assert_eq!(headers.get(ACCEPT_ENCODING).unwrap(), "gzip, deflate, br");
        assert_eq!(headers.get(ACCEPT_LANGUAGE).unwrap(), "en-GB,en;q=0.5");
        assert_eq!(headers.get(HOST).unwrap(), "example.com");
        assert_eq!(headers.get(ORIGIN).unwrap(), "http://example.com");
    }

    #[test]
    fn test_json_response_changes_accept() {
        let headers = build_request_headers(
            &HeaderMap::new(),
            &Method::GET,
            &url("http://example.com/"),
            None,
            DataType::Raw,
            &FormattedBody::None,
            ResponseType::Json,
            &[],
        );
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
    }

    #[test]
    fn test_body_headers_derived_for_post() {
        let body = FormattedBody::Bytes(bytes::Bytes::from_static(b"a=1"));
        let headers = build_request_headers(
            &HeaderMap::new(),
            &Method::POST,
            &url("http://example.com/"),
            None,
            DataType::Form,
            &body,
            ResponseType::Text,
            &[],
        );
        assert_eq!(
            headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "3");
    }

    #[test]
    fn test_body_headers_not_derived_when_caller_set_one() {
        let mut caller = HeaderMap::new();
        caller.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let body = FormattedBody::Bytes(bytes::Bytes::from_static(b"abc"));
        let headers = build_request_headers(
            &caller,
            &Method::POST,
            &url("http://example.com/"),
            None,
            DataType::Raw,
            &body,
            ResponseType::Text,
            &[],
        );
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain");
        assert!(headers.get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_cookies_appended_to_existing_header() {
        let mut caller = HeaderMap::new();
        caller.insert(COOKIE, HeaderValue::from_static("a=1"));
        let headers = build_request_headers(
            &caller,
            &Method::GET,
            &url("http://example.com/"),
            None,
            DataType::Raw,
            &FormattedBody::None,
            ResponseType::Text,
            &["b=2".to_string(), "c=3".to_string()],
        );
        assert_eq!(headers.get(COOKIE).unwrap(), "a=1; b=2; c=3");
    }

    #[test]
    fn test_host_prefers_previous_url() {
        let headers = build_request_headers(
            &HeaderMap::new(),
            &Method::GET,
            &url("http://example.com/"),
            Some(&url("http://prev.com:8080/page")),
            DataType::Raw,
            &FormattedBody::None,
            ResponseType::Text,
            &[],
        );
        assert_eq!(headers.get(HOST).unwrap(), "prev.com:8080");
        assert_eq!(headers.get(ORIGIN).unwrap(), "http://prev.com:8080");
    }
}
