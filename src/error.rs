//! Failure taxonomy for the acquisition engine.
//!
//! Every strategy reports failures through [`FetchError`]; the chain
//! controller never propagates them to the caller — they end up as
//! [`ErrorKind`]-tagged entries in the diagnostic trail of an
//! `AcquisitionResult`.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// All errors a fetch strategy can report.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network timeout after {elapsed_ms}ms")]
    NetworkTimeout { elapsed_ms: u64 },

    #[error("TLS failure: {0}")]
    Tls(String),

    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("browser crashed: {0}")]
    BrowserCrash(String),

    #[error("browser pool exhausted")]
    PoolExhausted,

    #[error("blocked by site defenses: {0}")]
    BlockedByDefense(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("unclassified failure: {0}")]
    Unknown(String),
}

/// Serializable tag for a [`FetchError`], used in diagnostic trails and
/// error-distribution stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkTimeout,
    Tls,
    HttpStatus,
    BrowserCrash,
    PoolExhausted,
    BlockedByDefense,
    MalformedRequest,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NetworkTimeout => "network_timeout",
            ErrorKind::Tls => "tls",
            ErrorKind::HttpStatus => "http_status",
            ErrorKind::BrowserCrash => "browser_crash",
            ErrorKind::PoolExhausted => "pool_exhausted",
            ErrorKind::BlockedByDefense => "blocked_by_defense",
            ErrorKind::MalformedRequest => "malformed_request",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::NetworkTimeout { .. } => ErrorKind::NetworkTimeout,
            FetchError::Tls(_) => ErrorKind::Tls,
            FetchError::HttpStatus { .. } => ErrorKind::HttpStatus,
            FetchError::BrowserCrash(_) => ErrorKind::BrowserCrash,
            FetchError::PoolExhausted => ErrorKind::PoolExhausted,
            FetchError::BlockedByDefense(_) => ErrorKind::BlockedByDefense,
            FetchError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            FetchError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// A fatal error aborts the remaining chain instead of advancing to the
    /// next layer.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::MalformedRequest(_))
    }

    /// Classify a browser-layer failure from its message shape.
    ///
    /// Chromium errors reach us as opaque strings through the CDP layer;
    /// connection/websocket death means the browser process is gone.
    pub fn classify_browser(err: &anyhow::Error, elapsed: Duration) -> FetchError {
        let msg = format!("{err:#}");
        let lower = msg.to_lowercase();

        if lower.contains("timed out") || lower.contains("timeout") {
            return FetchError::NetworkTimeout {
                elapsed_ms: elapsed.as_millis() as u64,
            };
        }
        if lower.contains("connection closed")
            || lower.contains("connection reset")
            || lower.contains("websocket")
            || lower.contains("browser closed")
            || lower.contains("target crashed")
            || lower.contains("session not found")
        {
            return FetchError::BrowserCrash(msg);
        }
        if lower.contains("certificate") || lower.contains("ssl") || lower.contains("tls") {
            return FetchError::Tls(msg);
        }
        FetchError::Unknown(msg)
    }
}

/// Challenge-page signatures of common WAF/anti-bot products.
///
/// Matching any of these in a response body means the target served a
/// defense interstitial rather than real content.
const CHALLENGE_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)checking your browser before accessing", "cloudflare browser check"),
    (r"(?i)cf-browser-verification|cf_chl_", "cloudflare challenge"),
    (r"(?i)attention required!\s*\|\s*cloudflare", "cloudflare block page"),
    (r"(?i)ddos protection by", "ddos-guard interstitial"),
    (r"(?i)請求您完成驗證|perimeterx|_px_", "perimeterx challenge"),
    (r"(?i)incapsula incident", "imperva incapsula block"),
    (r"(?i)akamai.{0,40}reference #", "akamai block page"),
    (r"(?i)access denied.{0,80}permission to access", "generic access-denied page"),
    (r"(?i)enable javascript and cookies to continue", "javascript challenge"),
    (r"(?i)<title>\s*just a moment", "cloudflare managed challenge"),
];

fn challenge_set() -> &'static (regex::RegexSet, Vec<&'static str>) {
    static SET: OnceLock<(regex::RegexSet, Vec<&'static str>)> = OnceLock::new();
    SET.get_or_init(|| {
        let patterns: Vec<&str> = CHALLENGE_PATTERNS.iter().map(|(p, _)| *p).collect();
        let labels: Vec<&'static str> = CHALLENGE_PATTERNS.iter().map(|(_, l)| *l).collect();
        // Patterns are static and known-valid; a bad one is a programmer error.
        let set = regex::RegexSet::new(&patterns).expect("invalid challenge pattern");
        (set, labels)
    })
}

/// Return the label of the first matching defense signature, if any.
pub fn detect_challenge(body: &str) -> Option<&'static str> {
    let (set, labels) = challenge_set();
    set.matches(body).iter().next().map(|i| labels[i])
}
