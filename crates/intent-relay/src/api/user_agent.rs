//! Signal extraction from a browser request
//!
//! Parses the `User-Agent` header into platform, browser and device fields
//! and pulls the client address from proxy headers or the socket.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::signals::SignalTuple;

lazy_static! {
    static ref IOS: Regex =
        Regex::new(r"(?:iPhone|iPad|iPod).*?OS (\d+(?:_\d+)*)").unwrap();
    static ref IOS_DEVICE: Regex = Regex::new(r"(iPhone|iPad|iPod)").unwrap();
    static ref ANDROID: Regex = Regex::new(r"Android[ /]?(\d+(?:\.\d+)*)?").unwrap();
    static ref ANDROID_MODEL: Regex =
        Regex::new(r"Android[^;)]*;\s*(?:[a-zA-Z]{2}[-_][a-zA-Z]{2};\s*)?([^;)]+?)(?:\s+Build/[^;)]*)?\)").unwrap();
    static ref WINDOWS: Regex = Regex::new(r"Windows NT (\d+(?:\.\d+)*)").unwrap();
    static ref MAC: Regex = Regex::new(r"Mac OS X (\d+(?:[_.]\d+)*)").unwrap();

    // Order matters: embedded webviews and Chromium forks before the generic engines.
    static ref BROWSERS: Vec<(&'static str, Regex)> = vec![
        ("Line", Regex::new(r"Line/(\d+(?:\.\d+)*)").unwrap()),
        ("Instagram", Regex::new(r"Instagram (\d+(?:\.\d+)*)").unwrap()),
        ("Facebook", Regex::new(r"FBAV/(\d+(?:\.\d+)*)").unwrap()),
        ("Edge", Regex::new(r"Edg(?:e|A|iOS)?/(\d+(?:\.\d+)*)").unwrap()),
        ("Samsung Browser", Regex::new(r"SamsungBrowser/(\d+(?:\.\d+)*)").unwrap()),
        ("Firefox", Regex::new(r"(?:Firefox|FxiOS)/(\d+(?:\.\d+)*)").unwrap()),
        ("Chrome", Regex::new(r"(?:CriOS|Chrome)/(\d+(?:\.\d+)*)").unwrap()),
        ("Mobile Safari", Regex::new(r"Version/(\d+(?:\.\d+)*).*Mobile.*Safari/").unwrap()),
        ("Safari", Regex::new(r"Version/(\d+(?:\.\d+)*).*Safari/").unwrap()),
    ];
}

/// Platform and client fields read from a user agent string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUserAgent {
    pub platform_name: Option<String>,
    pub platform_version: Option<String>,
    pub client_name: Option<String>,
    pub client_version: Option<String>,
    pub device_model: Option<String>,
}

pub fn parse_user_agent(ua: &str) -> ParsedUserAgent {
    let mut parsed = ParsedUserAgent::default();

    if let Some(caps) = IOS.captures(ua) {
        parsed.platform_name = Some("iOS".to_string());
        parsed.platform_version = caps.get(1).map(|m| m.as_str().replace('_', "."));
        parsed.device_model = IOS_DEVICE.captures(ua).map(|c| c[1].to_string());
    } else if let Some(caps) = ANDROID.captures(ua) {
        parsed.platform_name = Some("Android".to_string());
        parsed.platform_version = caps.get(1).map(|m| m.as_str().to_string());
        parsed.device_model = ANDROID_MODEL
            .captures(ua)
            .map(|c| c[1].trim().to_string())
            .filter(|m| !m.is_empty() && m != "K");
    } else if let Some(caps) = WINDOWS.captures(ua) {
        parsed.platform_name = Some("Windows".to_string());
        parsed.platform_version = caps.get(1).map(|m| m.as_str().to_string());
    } else if let Some(caps) = MAC.captures(ua) {
        parsed.platform_name = Some("Mac OS".to_string());
        parsed.platform_version = caps.get(1).map(|m| m.as_str().replace('_', "."));
    } else if ua.contains("Linux") {
        parsed.platform_name = Some("Linux".to_string());
    }

    for (name, regex) in BROWSERS.iter() {
        if let Some(caps) = regex.captures(ua) {
            parsed.client_name = Some(name.to_string());
            parsed.client_version = caps.get(1).map(|m| m.as_str().to_string());
            break;
        }
    }

    parsed
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address: first `x-forwarded-for` hop, `x-real-ip`, then the socket peer.
pub fn client_address(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> Option<String> {
    if trust_proxy_headers {
        if let Some(forwarded) = header(headers, "x-forwarded-for") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return Some(first.to_string());
            }
        }
        if let Some(real_ip) = header(headers, "x-real-ip") {
            return Some(real_ip.to_string());
        }
    }
    peer.map(|addr| addr.ip().to_string())
}

/// Full click-side signal tuple for a browser request.
pub fn signals_from_request(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> SignalTuple {
    let ua = parse_user_agent(header(headers, "user-agent").unwrap_or(""));
    SignalTuple {
        network_address: client_address(headers, peer, trust_proxy_headers),
        client_name: ua.client_name,
        client_version: ua.client_version,
        platform_name: ua.platform_name,
        platform_version: ua.platform_version,
        device_model: ua.device_model,
        locale: header(headers, "accept-language").map(str::to_string),
        encoding: header(headers, "accept-encoding").map(str::to_string),
    }
}
