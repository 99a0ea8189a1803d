//! RFC 6265-style cookie parsing, validation, and storage.
//!
//! Parsing is total: any `Set-Cookie` string produces a [`Cookie`], with
//! malformed attributes recorded on the cookie itself. Validation is a
//! separate pure predicate, applied before a cookie enters the jar.

use chrono::{DateTime, TimeZone, Utc};
use http::HeaderMap;
use url::Url;

use crate::util::now_ms;

/// SameSite attribute (RFC 6265bis).
///
/// Controls whether a cookie is attached to cross-site requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SameSite {
    /// Sent only when the navigation source matches the cookie domain.
    Strict,
    /// Sent when the target host matches the cookie domain (default).
    Lax,
    /// Sent for all requests; requires the Secure attribute.
    None,
}

/// A single stored cookie.
///
/// Identity for jar replacement is the tuple (name, domain, path,
/// is_https); storing a cookie with the same identity replaces the old
/// value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Scheme of the site that set the cookie.
    #[serde(default)]
    pub is_https: bool,
    /// True iff the Set-Cookie string carried a Domain attribute.
    #[serde(default)]
    pub allow_sub_domains: bool,
    #[serde(default = "SameSite::lax")]
    pub same_site: SameSite,
    #[serde(default)]
    pub secure: bool,
    /// Absolute expiry as milliseconds since the unix epoch.
    #[serde(default)]
    pub expires: Option<i64>,
    /// Set by the parser when an attribute could not be understood;
    /// consumed (and rejected) by validation.
    #[serde(default)]
    pub has_invalid_attributes: bool,
}

impl SameSite {
    fn lax() -> Self {
        SameSite::Lax
    }
}

impl Cookie {
    /// Create a plain session cookie scoped to `domain`.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_string(),
            is_https: false,
            allow_sub_domains: false,
            same_site: SameSite::Lax,
            secure: false,
            expires: None,
            has_invalid_attributes: false,
        }
    }

    /// Builder-style method to set the path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Builder-style method to set the secure flag.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Builder-style method to set the same_site attribute.
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Builder-style method to set the expiry (epoch milliseconds).
    pub fn with_expires(mut self, expires_ms: i64) -> Self {
        self.expires = Some(expires_ms);
        self
    }

    /// Whether the cookie is expired at `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires, Some(at) if at < now_ms)
    }

    fn identity_matches(&self, other: &Cookie) -> bool {
        self.name == other.name
            && self.domain == other.domain
            && self.path == other.path
            && self.is_https == other.is_https
    }
}

impl std::fmt::Display for Cookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Parse a single `Set-Cookie` string against the URL that sent it.
///
/// Parsing never fails. Attributes that cannot be understood (a bare
/// token that is not `Secure`/`HttpOnly`, an unparsable date, an unknown
/// attribute name) flag the cookie invalid instead; [`validate_cookie`]
/// rejects flagged cookies.
pub fn parse_cookie(host_url: &Url, raw: &str) -> Cookie {
    let mut cookie = Cookie::new("", "", host_url.host_str().unwrap_or_default());
    cookie.is_https = host_url.scheme() == "https";

    let mut named = false;
    for part in raw.split("; ") {
        if part.is_empty() {
            continue;
        }
        let Some((key, value)) = part.split_once('=') else {
            if part.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if part.eq_ignore_ascii_case("httponly") {
                // Script-visibility scoping is not modeled in the jar.
            } else {
                cookie.has_invalid_attributes = true;
            }
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "expires" => {
                // Max-Age wins when seen first; a second Expires is ignored.
                if cookie.expires.is_none() {
                    match parse_cookie_date(value) {
                        Some(at) => cookie.expires = Some(at.timestamp_millis()),
                        None => cookie.has_invalid_attributes = true,
                    }
                }
            }
            "max-age" => match value.parse::<i64>() {
                // Overwrites any Expires regardless of attribute order.
                Ok(seconds) => cookie.expires = Some(now_ms() + seconds * 1000),
                Err(_) => cookie.has_invalid_attributes = true,
            },
            "domain" => {
                let stripped = value.strip_prefix('.').unwrap_or(value);
                cookie.domain = stripped.to_ascii_lowercase();
                cookie.allow_sub_domains = true;
            }
            "path" => cookie.path = value.to_string(),
            "samesite" => match value {
                "Strict" => cookie.same_site = SameSite::Strict,
                "Lax" => cookie.same_site = SameSite::Lax,
                "None" => cookie.same_site = SameSite::None,
                _ => cookie.has_invalid_attributes = true,
            },
            _ => {
                if named {
                    cookie.has_invalid_attributes = true;
                } else {
                    cookie.name = strip_quotes(key).to_string();
                    cookie.value = strip_quotes(value).to_string();
                    named = true;
                }
            }
        }
    }

    cookie
}

/// Validate a parsed cookie against the URL that set it.
///
/// Pure predicate; a `false` result means the cookie must not enter the
/// jar.
pub fn validate_cookie(host_url: &Url, cookie: &Cookie) -> bool {
    if cookie.has_invalid_attributes {
        return false;
    }
    if !valid_cookie_name(&cookie.name) || !valid_cookie_value(&cookie.value) {
        return false;
    }

    if cookie.name.starts_with("__Secure-") && (!cookie.is_https || !cookie.secure) {
        return false;
    }
    if cookie.name.starts_with("__Host-")
        && !(cookie.is_https && cookie.secure && !cookie.allow_sub_domains && cookie.path == "/")
    {
        return false;
    }

    let host = host_url.host_str().unwrap_or_default();
    if cookie.domain != host && !(cookie.allow_sub_domains && match_domain(host, &cookie.domain)) {
        return false;
    }
    if cookie.secure && host_url.scheme() != "https" && host != "localhost" {
        return false;
    }
    if cookie.same_site == SameSite::None && !cookie.secure {
        return false;
    }

    true
}

/// Domain match: `candidate` equals `reference`, or is a subdomain of
/// it. Asymmetric — a parent domain never matches a subdomain reference.
pub fn match_domain(candidate: &str, reference: &str) -> bool {
    candidate == reference || candidate.ends_with(&format!(".{}", reference))
}

/// Whether a stored cookie applies to an outgoing request.
///
/// `host_domain` is the domain of the navigation source (for redirects,
/// the host before the hop), which drives the SameSite decision; the
/// target `url` drives path, scheme, and Lax domain matching.
pub(crate) fn cookie_applies(cookie: &Cookie, url: &Url, host_domain: &str) -> bool {
    let is_secure = url.scheme() == "https";
    if !url.path().starts_with(cookie.path.as_str()) {
        return false;
    }
    if cookie.secure && !is_secure {
        return false;
    }
    let url_host = url.host_str().unwrap_or_default();
    match cookie.same_site {
        SameSite::None => cookie_domain_matches(cookie, host_domain),
        SameSite::Strict => {
            cookie_domain_matches(cookie, host_domain) && cookie_domain_matches(cookie, url_host)
        }
        SameSite::Lax => cookie_domain_matches(cookie, url_host),
    }
}

fn cookie_domain_matches(cookie: &Cookie, domain: &str) -> bool {
    domain == cookie.domain
        || (cookie.allow_sub_domains && match_domain(domain, &cookie.domain))
}

const NAME_FORBIDDEN: &[char] = &[
    '(', ')', '<', '>', '@', ',', ';', ':', '\\', '"', '/', '[', ']', '?', '=', '{', '}',
];

fn valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| {
            let cp = c as u32;
            (33..=126).contains(&cp) && !NAME_FORBIDDEN.contains(&c)
        })
}

fn valid_cookie_value(value: &str) -> bool {
    value.chars().all(|c| {
        let cp = c as u32;
        (33..=126).contains(&cp) && !matches!(c, '"' | ',' | ';' | '\\')
    })
}

fn strip_quotes(input: &str) -> &str {
    if input.len() >= 2 && input.starts_with('"') && input.ends_with('"') {
        &input[1..input.len() - 1]
    } else {
        input
    }
}

/// Filter for [`CookieJar::remove_cookies`]. Omitted fields match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct CookieFilter {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub path: Option<String>,
}

impl CookieFilter {
    fn matches(&self, cookie: &Cookie) -> bool {
        self.name.as_deref().map_or(true, |n| n == cookie.name)
            && self.domain.as_deref().map_or(true, |d| d == cookie.domain)
            && self.path.as_deref().map_or(true, |p| p == cookie.path)
    }
}

/// Ordered cookie store with identity-keyed upsert.
///
/// Expired cookies are purged lazily, the next time the jar is consulted
/// for outgoing cookies.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a jar seeded with `cookies` (upsert semantics apply).
    pub fn with_cookies(cookies: Vec<Cookie>) -> Self {
        let mut jar = Self::new();
        jar.add_cookies(cookies);
        jar
    }

    /// Insert a cookie, replacing any stored cookie with the same
    /// (name, domain, path, is_https) identity.
    pub fn add_cookie(&mut self, cookie: Cookie) {
        if let Some(pos) = self.cookies.iter().position(|c| c.identity_matches(&cookie)) {
            self.cookies[pos] = cookie;
        } else {
            self.cookies.push(cookie);
        }
    }

    /// Bulk [`CookieJar::add_cookie`].
    pub fn add_cookies(&mut self, cookies: Vec<Cookie>) {
        for cookie in cookies {
            self.add_cookie(cookie);
        }
    }

    /// Remove all cookies matched by `filter`; an empty filter clears
    /// the jar.
    pub fn remove_cookies(&mut self, filter: &CookieFilter) {
        self.cookies.retain(|c| !filter.matches(c));
    }

    /// First cookie with the given name (and domain/path when supplied).
    pub fn get_cookie(
        &self,
        name: &str,
        domain: Option<&str>,
        path: Option<&str>,
    ) -> Option<&Cookie> {
        self.cookies.iter().find(|c| {
            c.name == name
                && domain.map_or(true, |d| d == c.domain)
                && path.map_or(true, |p| p == c.path)
        })
    }

    /// Parse, validate, and store every `Set-Cookie` header in
    /// `headers` against `url`. Cookies that fail validation are
    /// dropped.
    pub fn collect_cookies_from_response(&mut self, url: &Url, headers: &HeaderMap) -> Vec<Cookie> {
        let mut stored = Vec::new();
        for value in headers.get_all(http::header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            let cookie = parse_cookie(url, raw);
            if validate_cookie(url, &cookie) {
                self.add_cookie(cookie.clone());
                stored.push(cookie);
            } else {
                tracing::debug!(cookie = %cookie.name, "dropping invalid response cookie");
            }
        }
        stored
    }

    /// Cookies applicable to an outgoing request, serialized as
    /// `name=value`. Purges expired cookies first.
    pub fn get_request_cookies(&mut self, url: &Url, host_domain: &str) -> Vec<String> {
        let now = now_ms();
        self.cookies.retain(|c| !c.is_expired(now));
        self.cookies
            .iter()
            .filter(|c| cookie_applies(c, url, host_domain))
            .map(|c| c.to_string())
            .collect()
    }

    /// Snapshot of the stored cookies, safe to persist.
    pub fn to_json(&self) -> Vec<Cookie> {
        self.cookies.clone()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }
}

fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    // RFC 6265 Section 5.1.1 formats plus common variations.
    const FORMATS: &[&str] = &[
        "%a, %d %b %Y %H:%M:%S GMT", // RFC 1123
        "%A, %d-%b-%y %H:%M:%S GMT", // RFC 850
        "%a %b %e %H:%M:%S %Y",      // ANSI C asctime()
        "%a, %d-%b-%Y %H:%M:%S GMT", // RFC 1036 variation
        "%d %b %Y %H:%M:%S GMT",     // No weekday prefix
        "%a, %d %b %Y %H:%M:%S %z",  // With timezone offset
        "%Y-%m-%dT%H:%M:%SZ",        // ISO 8601 UTC
        "%Y-%m-%dT%H:%M:%S%.fZ",     // ISO 8601 with fractional seconds
    ];

    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(date_str, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    // Fallback: unix timestamp in seconds.
    date_str
        .parse::<i64>()
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}
