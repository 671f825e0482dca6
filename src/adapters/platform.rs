//! Platform abstraction for OS identification and URI encoding.
//!
//! iOS receives the bearer token unencoded in the query string; every other
//! target percent-encodes both the base URI and the token.

/// OS identifier that selects raw token embedding
pub const IOS: &str = "ios";

pub trait PlatformAdapter: Send + Sync {
    /// OS identifier, e.g. `ios`, `android`, `linux`
    fn os(&self) -> &str;

    /// Encode a full URI, leaving its structural characters intact
    fn encode_uri(&self, uri: &str) -> String;

    /// Encode a single URI component (query value)
    fn encode_uri_component(&self, component: &str) -> String;
}

/// Default adapter backed by the `urlencoding` crate
#[derive(Debug, Clone)]
pub struct NativePlatform {
    os: String,
}

impl NativePlatform {
    pub fn new(os: impl Into<String>) -> Self {
        Self { os: os.into() }
    }

    /// Adapter for the OS this binary was compiled for
    pub fn current() -> Self {
        Self::new(std::env::consts::OS)
    }
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::current()
    }
}

impl PlatformAdapter for NativePlatform {
    fn os(&self) -> &str {
        &self.os
    }

    fn encode_uri(&self, uri: &str) -> String {
        let mut encoded = String::with_capacity(uri.len());
        let mut buf = [0u8; 4];
        for c in uri.chars() {
            if keeps_in_uri(c) {
                encoded.push(c);
            } else {
                encoded.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
            }
        }
        encoded
    }

    fn encode_uri_component(&self, component: &str) -> String {
        urlencoding::encode(component).into_owned()
    }
}

/// Unreserved and reserved URI characters plus `#`; everything else is escaped.
/// The input is never parsed or normalized.
fn keeps_in_uri(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'();/?:@&=+$,#".contains(c)
}

/// Build the connection URI carrying the bearer token as a `token` query parameter
pub fn build_connection_url(platform: &dyn PlatformAdapter, base: &str, token: &str) -> String {
    if platform.os() == IOS {
        format!("{}?token={}", base, token)
    } else {
        format!(
            "{}?token={}",
            platform.encode_uri(base),
            platform.encode_uri_component(token)
        )
    }
}
