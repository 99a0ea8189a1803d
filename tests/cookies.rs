//! Cookie jar behavior: storage identity, precedence, expiry, and
//! scope rules.

use http::HeaderMap;
use url::Url;

use warden::cookie::{parse_cookie, validate_cookie};
use warden::{Cookie, CookieFilter, CookieJar, SameSite};

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn set_cookie_headers(values: &[&str]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for value in values {
        headers.append(http::header::SET_COOKIE, value.parse().unwrap());
    }
    headers
}

#[test]
fn identity_upsert_keeps_last_value() {
    let mut jar = CookieJar::new();
    jar.add_cookie(Cookie::new("session", "first", "example.com"));
    jar.add_cookie(Cookie::new("session", "second", "example.com"));

    assert_eq!(jar.len(), 1);
    assert_eq!(
        jar.get_cookie("session", None, None).unwrap().value,
        "second"
    );

    // A different scheme flag is a different identity.
    let mut https_variant = Cookie::new("session", "third", "example.com");
    https_variant.is_https = true;
    jar.add_cookie(https_variant);
    assert_eq!(jar.len(), 2);
}

#[test]
fn max_age_beats_expires_in_either_order() {
    let host = url("https://example.com/");
    let far_future = "Expires=Fri, 01 Jan 2100 00:00:00 GMT";

    let a = parse_cookie(&host, &format!("a=b; {}; Max-Age=10", far_future));
    let b = parse_cookie(&host, &format!("a=b; Max-Age=10; {}", far_future));

    // Both must expire ~10s out, not in 2100.
    let cutoff = chrono::Utc::now().timestamp_millis() + 60_000;
    assert!(a.expires.unwrap() < cutoff);
    assert!(b.expires.unwrap() < cutoff);
}

#[test]
fn domain_attribute_strips_leading_dot_and_allows_subdomains() {
    let host = url("https://app.example.com/");
    let cookie = parse_cookie(&host, "a=b; Domain=.example.com");
    assert_eq!(cookie.domain, "example.com");
    assert!(cookie.allow_sub_domains);
    assert!(validate_cookie(&host, &cookie));
}

#[test]
fn domain_match_is_asymmetric() {
    let mut jar = CookieJar::new();
    let mut parent = Cookie::new("a", "1", "example.com");
    parent.allow_sub_domains = true;
    jar.add_cookie(parent);
    jar.add_cookie(Cookie::new("b", "2", "app.example.com"));

    // Subdomain request sees the parent-scoped cookie.
    let got = jar.get_request_cookies(&url("http://app.example.com/"), "app.example.com");
    assert!(got.contains(&"a=1".to_string()));
    assert!(got.contains(&"b=2".to_string()));

    // Parent request must not see the subdomain cookie.
    let got = jar.get_request_cookies(&url("http://example.com/"), "example.com");
    assert_eq!(got, vec!["a=1"]);
}

#[test]
fn expired_cookies_are_purged_lazily() {
    let now = chrono::Utc::now().timestamp_millis();
    let mut jar = CookieJar::new();
    jar.add_cookie(Cookie::new("stale", "x", "example.com").with_expires(now - 1000));
    jar.add_cookie(Cookie::new("fresh", "y", "example.com").with_expires(now + 60_000));

    assert_eq!(jar.len(), 2, "purge happens on read, not on write");
    let got = jar.get_request_cookies(&url("http://example.com/"), "example.com");
    assert_eq!(got, vec!["fresh=y"]);
    assert_eq!(jar.to_json().len(), 1);
    assert!(jar.get_cookie("stale", None, None).is_none());
}

#[test]
fn collect_from_response_validates_each_cookie() {
    let mut jar = CookieJar::new();
    let headers = set_cookie_headers(&[
        "good=1",
        "bad name=2",
        "secure-elsewhere=3; secure",
        "__Host-ok=4; Secure; Path=/",
    ]);
    jar.collect_cookies_from_response(&url("https://example.com/"), &headers);

    assert!(jar.get_cookie("good", None, None).is_some());
    assert!(jar.get_cookie("bad name", None, None).is_none());
    assert!(jar.get_cookie("secure-elsewhere", None, None).is_some());
    assert!(jar.get_cookie("__Host-ok", None, None).is_some());

    // Over plain http the secure cookie is rejected instead.
    let mut http_jar = CookieJar::new();
    http_jar.collect_cookies_from_response(
        &url("http://example.com/"),
        &set_cookie_headers(&["s=1; secure"]),
    );
    assert!(http_jar.is_empty());
}

#[test]
fn request_cookies_serialize_as_name_value_pairs() {
    let mut jar = CookieJar::new();
    jar.collect_cookies_from_response(
        &url("http://localhost/set"),
        &set_cookie_headers(&["foo=bar", "boo=baz"]),
    );
    let got = jar.get_request_cookies(&url("http://localhost/get"), "localhost");
    assert_eq!(got, vec!["foo=bar", "boo=baz"]);
}

#[test]
fn samesite_strict_requires_matching_source() {
    let mut jar = CookieJar::new();
    jar.collect_cookies_from_response(
        &url("https://example.com/"),
        &set_cookie_headers(&["strict=1; SameSite=Strict"]),
    );

    let attached = jar.get_request_cookies(&url("https://example.com/"), "example.com");
    assert_eq!(attached, vec!["strict=1"]);

    let cross_site = jar.get_request_cookies(&url("https://example.com/"), "evil.com");
    assert!(cross_site.is_empty());
}

#[test]
fn samesite_none_follows_source_domain() {
    let mut jar = CookieJar::new();
    jar.collect_cookies_from_response(
        &url("https://example.com/"),
        &set_cookie_headers(&["embed=1; SameSite=None; Secure"]),
    );

    // Attached to a cross-site target when the source matches.
    let got = jar.get_request_cookies(&url("https://other.com/"), "example.com");
    assert_eq!(got, vec!["embed=1"]);
}

#[test]
fn unknown_attributes_reject_the_cookie() {
    let mut jar = CookieJar::new();
    jar.collect_cookies_from_response(
        &url("https://example.com/"),
        &set_cookie_headers(&["a=1; Priority=High"]),
    );
    assert!(jar.is_empty());
}

#[test]
fn remove_cookies_wildcards() {
    let mut jar = CookieJar::new();
    jar.add_cookie(Cookie::new("a", "1", "one.com"));
    jar.add_cookie(Cookie::new("b", "2", "one.com").with_path("/x"));
    jar.add_cookie(Cookie::new("a", "3", "two.com"));

    jar.remove_cookies(&CookieFilter {
        domain: Some("one.com".to_string()),
        ..Default::default()
    });
    assert_eq!(jar.len(), 1);
    assert_eq!(jar.get_cookie("a", Some("two.com"), None).unwrap().value, "3");
}

#[test]
fn path_prefix_matching() {
    let mut jar = CookieJar::new();
    jar.add_cookie(Cookie::new("scoped", "1", "example.com").with_path("/foo"));

    assert_eq!(
        jar.get_request_cookies(&url("http://example.com/foo"), "example.com"),
        vec!["scoped=1"]
    );
    assert_eq!(
        jar.get_request_cookies(&url("http://example.com/foo/bar"), "example.com"),
        vec!["scoped=1"]
    );
    assert!(jar
        .get_request_cookies(&url("http://example.com/"), "example.com")
        .is_empty());
}

#[test]
fn samesite_parsing_is_case_exact() {
    let host = url("https://example.com/");
    assert_eq!(
        parse_cookie(&host, "a=b; SameSite=Lax").same_site,
        SameSite::Lax
    );
    assert!(parse_cookie(&host, "a=b; SameSite=LAX").has_invalid_attributes);
}

#[test]
fn jar_snapshot_round_trips_through_serde() {
    let mut jar = CookieJar::new();
    jar.collect_cookies_from_response(
        &url("https://example.com/"),
        &set_cookie_headers(&["a=1; Path=/x; SameSite=Strict", "b=2; Max-Age=60"]),
    );

    let json = serde_json::to_string(&jar.to_json()).unwrap();
    let cookies: Vec<Cookie> = serde_json::from_str(&json).unwrap();
    let restored = CookieJar::with_cookies(cookies);
    assert_eq!(restored.to_json(), jar.to_json());
}
