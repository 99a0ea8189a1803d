//! Executor behavior: wire defaults, body formatting, decompression,
//! validators, and secret redaction.

mod helpers;

use std::io::Write;
use std::sync::{Arc, Mutex};

use http::Method;

use helpers::mock_transport::{MockResponse, MockTransport};
use warden::{
    http_request, Cookie, CookieJar, Error, FormValue, HttpRequestOptions, ResponseType,
};

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn brotli_compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
        writer.write_all(data).unwrap();
    }
    out
}

#[tokio::test]
async fn default_headers_reach_the_wire() {
    let transport = MockTransport::new().on_url("http://example.com/", |_| MockResponse::text("ok"));

    let response = http_request(
        HttpRequestOptions::new("http://example.com/").transport(transport.clone()),
    )
    .await
    .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.data.as_text(), Some("ok"));

    let seen = &transport.requests()[0];
    assert_eq!(
        seen.header("user-agent").unwrap(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:100.0) Gecko/20100101 Firefox/100.0"
    );
    assert_eq!(seen.header("accept-encoding").unwrap(), "gzip, deflate, br");
    assert_eq!(seen.header("accept-language").unwrap(), "en-GB,en;q=0.5");
    assert_eq!(
        seen.header("accept").unwrap(),
        "text/html, application/xhtml+xml, application/xml;q=0.9, */*;q=0.8"
    );
    assert_eq!(seen.header("host").unwrap(), "example.com");
    assert_eq!(seen.header("origin").unwrap(), "http://example.com");
}

#[tokio::test]
async fn json_request_and_response() {
    let transport = MockTransport::new().on_url("http://api.test/items", |req| {
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("accept"), Some("application/json"));
        MockResponse::text(r#"{"ok":true,"count":2}"#)
    });

    let response = http_request(
        HttpRequestOptions::new("http://api.test/items")
            .method(Method::POST)
            .json(serde_json::json!({"q": "x"}))
            .response_type(ResponseType::Json)
            .transport(transport.clone()),
    )
    .await
    .unwrap();

    assert_eq!(
        response.data.as_json().unwrap(),
        &serde_json::json!({"ok": true, "count": 2})
    );
    assert_eq!(transport.requests()[0].body_text(), r#"{"q":"x"}"#);
}

#[tokio::test]
async fn form_body_is_urlencoded_with_repeated_keys() {
    let transport =
        MockTransport::new().on_url("http://example.com/submit", |_| MockResponse::text(""));

    http_request(
        HttpRequestOptions::new("http://example.com/submit")
            .method(Method::POST)
            .form(vec![
                ("name".to_string(), FormValue::Text("a b".to_string())),
                (
                    "tag".to_string(),
                    FormValue::List(vec!["x".to_string(), "y".to_string()]),
                ),
            ])
            .transport(transport.clone()),
    )
    .await
    .unwrap();

    let seen = &transport.requests()[0];
    assert_eq!(seen.body_text(), "name=a+b&tag=x&tag=y");
    assert_eq!(
        seen.header("content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(seen.header("content-length"), Some("20"));
}

#[tokio::test]
async fn gzip_brotli_and_deflate_responses_are_decoded() {
    for (encoding, body) in [
        ("gzip", gzip(b"abc123456")),
        ("br", brotli_compress(b"abc123456")),
        ("deflate", deflate(b"abc123456")),
    ] {
        let transport = MockTransport::new().on_url("http://example.com/data", move |_| {
            MockResponse::new(200)
                .header("Content-Encoding", encoding)
                .body(body.clone())
        });
        let response = http_request(
            HttpRequestOptions::new("http://example.com/data").transport(transport),
        )
        .await
        .unwrap();
        assert_eq!(response.data.as_text(), Some("abc123456"), "{}", encoding);
    }
}

#[tokio::test]
async fn unknown_content_encoding_fails() {
    let transport = MockTransport::new().on_url("http://example.com/data", |_| {
        MockResponse::new(200)
            .header("Content-Encoding", "xyz")
            .body(b"???".to_vec())
    });
    let err = http_request(
        HttpRequestOptions::new("http://example.com/data").transport(transport),
    )
    .await
    .unwrap_err();
    assert!(matches!(err.root(), Error::Protocol(_)), "{err}");
}

#[tokio::test]
async fn stream_response_exposes_decoded_bytes() {
    use tokio::io::AsyncReadExt;

    let transport = MockTransport::new().on_url("http://example.com/stream", |_| {
        MockResponse::new(200)
            .header("Content-Encoding", "gzip")
            .body(gzip(b"streamed payload"))
    });
    let response = http_request(
        HttpRequestOptions::new("http://example.com/stream")
            .response_type(ResponseType::Stream)
            .transport(transport),
    )
    .await
    .unwrap();

    let mut stream = response.data.into_stream().unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, b"streamed payload");
}

#[tokio::test]
async fn validate_status_rejects_unexpected_codes() {
    let transport =
        MockTransport::new().on_url("http://example.com/", |_| MockResponse::new(503));
    let err = http_request(
        HttpRequestOptions::new("http://example.com/")
            .validate_status(|status| status == 200)
            .transport(transport),
    )
    .await
    .unwrap_err();
    assert!(matches!(err.root(), Error::Validation(_)));
    assert_eq!(err.response().unwrap().status, Some(503));
}

#[tokio::test]
async fn empty_response_assertion() {
    let transport = MockTransport::new().on_url("http://example.com/", |_| MockResponse::text(""));
    let err = http_request(
        HttpRequestOptions::new("http://example.com/")
            .assert_non_empty_response(true)
            .transport(transport),
    )
    .await
    .unwrap_err();
    assert_eq!(err.root().to_string(), "response validation failed: Empty response");
}

#[tokio::test]
async fn invalid_json_body_fails_with_parse_error() {
    let transport =
        MockTransport::new().on_url("http://example.com/", |_| MockResponse::text("not json"));
    let err = http_request(
        HttpRequestOptions::new("http://example.com/")
            .response_type(ResponseType::Json)
            .transport(transport),
    )
    .await
    .unwrap_err();
    assert_eq!(
        err.root().to_string(),
        "response validation failed: Unable to parse response data as JSON"
    );
}

#[tokio::test]
async fn validate_json_rejection() {
    let transport =
        MockTransport::new().on_url("http://example.com/", |_| MockResponse::text(r#"{"ok":false}"#));
    let err = http_request(
        HttpRequestOptions::new("http://example.com/")
            .response_type(ResponseType::Json)
            .validate_json(|value| value["ok"].as_bool() == Some(true))
            .transport(transport),
    )
    .await
    .unwrap_err();
    assert_eq!(
        err.root().to_string(),
        "response validation failed: Invalid response JSON"
    );
}

#[tokio::test]
async fn explicit_and_jar_cookies_are_sent() {
    let transport =
        MockTransport::new().on_url("http://example.com/page", |_| MockResponse::text("ok"));

    let jar = Arc::new(Mutex::new(CookieJar::with_cookies(vec![Cookie::new(
        "fromjar",
        "1",
        "example.com",
    )])));

    http_request(
        HttpRequestOptions::new("http://example.com/page")
            .cookie(Cookie::new("explicit", "2", "example.com"))
            .cookie_jar(jar)
            .transport(transport.clone()),
    )
    .await
    .unwrap();

    assert_eq!(
        transport.requests()[0].header("cookie"),
        Some("explicit=2; fromjar=1")
    );
}

#[tokio::test]
async fn response_cookie_map_is_flat() {
    let transport = MockTransport::new().on_url("http://example.com/", |_| {
        MockResponse::text("ok")
            .header("Set-Cookie", "a=1")
            .header("Set-Cookie", "b=2; Path=/")
    });
    let response =
        http_request(HttpRequestOptions::new("http://example.com/").transport(transport))
            .await
            .unwrap();
    assert_eq!(response.cookies.get("a").map(String::as_str), Some("1"));
    assert_eq!(response.cookies.get("b").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn secrets_never_appear_in_error_snapshots() {
    let password = "hunter2$%\"£".to_string();
    let api_key = "abc-xyz".to_string();

    // No routes: every request fails as if the host were unreachable.
    let transport = MockTransport::new();

    let err = http_request(
        HttpRequestOptions::new("http://invalid.host.test/login")
            .method(Method::POST)
            .form(vec![
                (
                    "secretPassword".to_string(),
                    FormValue::Text(password.clone()),
                ),
                ("secretApiKey".to_string(), FormValue::Text(api_key.clone())),
            ])
            .hide_secrets(vec![password.clone(), api_key.clone()])
            .transport(transport),
    )
    .await
    .unwrap_err();

    let request = err.request().expect("error carries the request echo");
    let data = request.data.as_deref().unwrap();
    let formatted = request.formatted_data.as_deref().unwrap();

    assert!(!data.contains(&password) && !data.contains(&api_key), "{data}");
    assert!(
        !formatted.contains(&api_key),
        "raw secret in formatted data: {formatted}"
    );
    let encoded_password: String =
        url::form_urlencoded::byte_serialize(password.as_bytes()).collect();
    assert!(
        !formatted.contains(&encoded_password),
        "encoded secret in formatted data: {formatted}"
    );
    assert!(formatted.contains("[SECRET]"));
}

#[tokio::test]
async fn invalid_url_is_an_input_error() {
    let err = http_request(HttpRequestOptions::new("not a url"))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), Error::InvalidInput(_)));
}

#[tokio::test]
async fn get_requests_carry_zeroed_content_length() {
    let transport = MockTransport::new().on_url("http://example.com/", |_| MockResponse::text("ok"));
    http_request(HttpRequestOptions::new("http://example.com/").transport(transport.clone()))
        .await
        .unwrap();
    assert_eq!(transport.requests()[0].header("content-length"), Some("0"));
}
