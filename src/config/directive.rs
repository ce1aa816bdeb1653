//! Parsing of the compact textual directives found in the proxy block.
//!
//! `health_check <path>:<port> [<interval>]` is kept in its one-line form
//! so that existing proxy configurations translate one-to-one.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

/// Interval used when a `health_check` directive omits one.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(4);

/// Port assumed for upstreams configured without one.
pub const DEFAULT_DNS_PORT: u16 = 53;

/// A parsed `health_check` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckDirective {
    pub path: String,
    pub port: u16,
    pub interval: Duration,
}

/// Why a directive could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("health_check directive is empty")]
    Empty,
    #[error("health_check `{0}` must have the form <path>:<port> [<interval>]")]
    MissingPort(String),
    #[error("health_check path `{0}` must start with '/'")]
    InvalidPath(String),
    #[error("health_check port `{0}` is not a valid non-zero port")]
    InvalidPort(String),
    #[error("invalid duration `{0}` (expected e.g. 500ms, 1s, 2m)")]
    InvalidDuration(String),
    #[error("health_check directive has unexpected trailing `{0}`")]
    Trailing(String),
    #[error("`{0}` is not an IP address with optional port")]
    InvalidAddress(String),
}

impl HealthCheckDirective {
    /// Parse `"/health:8080 1s"`. The interval is optional.
    pub fn parse(input: &str) -> Result<Self, DirectiveError> {
        let mut parts = input.split_whitespace();
        let target = parts.next().ok_or(DirectiveError::Empty)?;

        let (path, port) = target
            .rsplit_once(':')
            .ok_or_else(|| DirectiveError::MissingPort(target.to_string()))?;
        if !path.starts_with('/') {
            return Err(DirectiveError::InvalidPath(path.to_string()));
        }
        let port = match port.parse::<u16>() {
            Ok(p) if p != 0 => p,
            _ => return Err(DirectiveError::InvalidPort(port.to_string())),
        };

        let interval = match parts.next() {
            Some(raw) => parse_duration(raw)?,
            None => DEFAULT_HEALTH_CHECK_INTERVAL,
        };

        if let Some(extra) = parts.next() {
            return Err(DirectiveError::Trailing(extra.to_string()));
        }

        Ok(Self {
            path: path.to_string(),
            port,
            interval,
        })
    }
}

/// Parse a non-zero duration such as `250ms`, `1s`, `2m` or `1h`.
pub fn parse_duration(input: &str) -> Result<Duration, DirectiveError> {
    let invalid = || DirectiveError::InvalidDuration(input.to_string());

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (digits, unit) = input.split_at(split);
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        "h" => Duration::from_secs(value.saturating_mul(3600)),
        _ => return Err(invalid()),
    };

    if duration.is_zero() {
        return Err(invalid());
    }
    Ok(duration)
}

/// Parse an upstream address, defaulting the port to 53.
pub fn parse_upstream_address(input: &str) -> Result<SocketAddr, DirectiveError> {
    let input = input.trim();
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }
    // Bare IPv6 may be written with brackets but no port.
    let bare = input
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(input);
    bare.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DEFAULT_DNS_PORT))
        .map_err(|_| DirectiveError::InvalidAddress(input.to_string()))
}
