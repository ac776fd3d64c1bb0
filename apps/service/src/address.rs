//! Address validation and the http → https upgrade heuristic.

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::monitoring::probe::Probe;

/// Scheme assumed when the user typed a bare host
pub const DEFAULT_SCHEME: &str = "http";

fn has_explicit_scheme(input: &str) -> bool {
    let lower = input.get(..8).unwrap_or(input).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Host must be a dotted name with no empty labels (`example.com`,
/// `203.0.113.7`, or fully qualified `example.com.`); bare names like
/// `localhost` and URLs carrying credentials are rejected.
fn is_acceptable(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    if !url.username().is_empty() || url.password().is_some() {
        return false;
    }

    match url.host_str() {
        Some(host) => {
            let host = host.strip_suffix('.').unwrap_or(host);
            host.contains('.') && host.split('.').all(|label| !label.is_empty())
        }
        None => false,
    }
}

/// Validate and normalize a user-supplied address.
///
/// Input without an explicit `http://`/`https://` prefix gets `http://`
/// prepended before parsing.
pub fn parse_address(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    let invalid = || Error::InvalidAddress(input.to_owned());

    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let candidate = if has_explicit_scheme(trimmed) {
        trimmed.to_owned()
    } else {
        format!("{DEFAULT_SCHEME}://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|_| invalid())?;
    if !is_acceptable(&url) {
        return Err(invalid());
    }

    Ok(url)
}

/// Turn a stored URL back into a [`Url`]. Canonical values take the fast
/// path; anything else goes through full [`parse_address`] validation.
pub fn resolve_stored(raw: &str) -> Result<Url> {
    match Url::parse(raw) {
        Ok(url) if is_acceptable(&url) => Ok(url),
        _ => parse_address(raw),
    }
}

/// Prefer the https counterpart of a plain http URL when it answers.
///
/// Best effort only: whatever goes wrong, the original URL comes back.
pub async fn upgrade_to_secure(url: Url, probe: &dyn Probe, deadline: Duration) -> Url {
    if url.scheme() == "https" {
        return url;
    }

    let mut candidate = url.clone();
    // Default port follows the scheme; an explicit non-default port is kept.
    if candidate.set_scheme("https").is_err() {
        return url;
    }

    if probe.probe(&candidate, deadline).await {
        debug!(from = %url, to = %candidate, "Upgraded address to https");
        candidate
    } else {
        debug!(%url, "https counterpart did not answer, keeping original");
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProbe;

    #[test]
    fn test_explicit_schemes_are_kept() {
        let url = parse_address("https://google.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("google.com"));

        let url = parse_address("http://google.com/status?x=1").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_str(), Some("google.com"));
        assert_eq!(url.path(), "/status");

        let url = parse_address("http://example.com.").unwrap();
        assert_eq!(url.host_str(), Some("example.com."));
    }

    #[test]
    fn test_credentials_are_rejected() {
        for input in ["http://user:pw@example.com", "https://user@example.com/", "admin:secret@example.com"] {
            assert!(
                matches!(parse_address(input), Err(Error::InvalidAddress(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_default_scheme_is_prepended() {
        let url = parse_address("google.com").unwrap();
        assert_eq!(url.as_str(), "http://google.com/");

        let url = parse_address("  sub.example.org:8080/health  ").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.port(), Some(8080));
    }

    #[test]
    fn test_scheme_token_is_case_insensitive() {
        let url = parse_address("HTTPS://Example.COM").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_undotted_hosts_are_rejected() {
        for input in ["notasite", "localhost", "http://localhost:3000", "https://intranet/", "http://[::1]/"] {
            assert!(
                matches!(parse_address(input), Err(Error::InvalidAddress(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_malformed_inputs_are_rejected() {
        for input in ["", "   ", "exa mple.com", "http://", "http://.com", "http://example..com", "ftp://example.com"] {
            assert!(parse_address(input).is_err(), "{input:?} should be rejected");
        }
    }

    #[test]
    fn test_resolve_stored_fast_path_and_fallback() {
        let canonical = resolve_stored("https://example.com/").unwrap();
        assert_eq!(canonical.as_str(), "https://example.com/");

        // Legacy rows may hold bare hosts; they go through full validation.
        let legacy = resolve_stored("example.com").unwrap();
        assert_eq!(legacy.as_str(), "http://example.com/");

        assert!(resolve_stored("garbage").is_err());
    }

    #[tokio::test]
    async fn test_upgrade_keeps_plaintext_when_secure_fails() {
        let probe = ScriptedProbe::down();
        let url = parse_address("http://example.com").unwrap();

        let upgraded = upgrade_to_secure(url.clone(), &probe, Duration::from_millis(50)).await;

        assert_eq!(upgraded, url);
        assert_eq!(probe.calls(), vec![Url::parse("https://example.com/").unwrap()]);
    }

    #[tokio::test]
    async fn test_upgrade_switches_when_secure_answers() {
        let probe = ScriptedProbe::up();
        let url = parse_address("example.com/login").unwrap();

        let upgraded = upgrade_to_secure(url, &probe, Duration::from_millis(50)).await;

        assert_eq!(upgraded.as_str(), "https://example.com/login");
        assert_eq!(upgraded.port_or_known_default(), Some(443));
    }

    #[tokio::test]
    async fn test_upgrade_preserves_explicit_port() {
        let probe = ScriptedProbe::up();
        let url = parse_address("http://example.com:8080/").unwrap();

        let upgraded = upgrade_to_secure(url, &probe, Duration::from_millis(50)).await;

        assert_eq!(upgraded.as_str(), "https://example.com:8080/");
    }

    #[tokio::test]
    async fn test_upgrade_skips_secure_urls() {
        let probe = ScriptedProbe::down();
        let url = parse_address("https://example.com").unwrap();

        let upgraded = upgrade_to_secure(url.clone(), &probe, Duration::from_millis(50)).await;

        assert_eq!(upgraded, url);
        assert!(probe.calls().is_empty(), "no probe for an already secure URL");
    }
}
