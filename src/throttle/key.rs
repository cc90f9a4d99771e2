//! Key normalization and domain extraction.

use url::Url;

use super::error::{ThrottleError, ThrottleResult};

/// Longest hostname DNS allows.
const MAX_KEY_LEN: usize = 253;

/// Normalize a raw key (typically a hostname) for registry lookups.
///
/// Keys are trimmed, lower-cased and stripped of a single trailing dot, so
/// `Example.COM.` and `example.com` share one throttle.
pub fn normalize_key(raw: &str) -> ThrottleResult<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);

    let invalid = |reason| ThrottleError::InvalidKey {
        key: raw.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("key is empty"));
    }
    if trimmed.len() > MAX_KEY_LEN {
        return Err(invalid("key is longer than 253 bytes"));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("key contains whitespace or control characters"));
    }
    if trimmed.contains(['/', '?', '#', '@']) {
        return Err(invalid("key looks like a URL, not a host"));
    }

    Ok(trimmed.to_lowercase())
}

/// Extract the host from a URL.
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_trims() {
        assert_eq!(normalize_key("  Example.COM ").unwrap(), "example.com");
        assert_eq!(normalize_key("example.com.").unwrap(), "example.com");
        assert_eq!(normalize_key("127.0.0.1:8080").unwrap(), "127.0.0.1:8080");
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        for bad in ["", "   ", ".", "exa mple.com", "a.com/path", "user@a.com", "a\tb"] {
            let err = normalize_key(bad).unwrap_err();
            assert!(
                matches!(err, ThrottleError::InvalidKey { .. }),
                "{bad:?} should be rejected"
            );
        }
        assert!(normalize_key(&"a".repeat(254)).is_err());
        assert!(normalize_key(&"a".repeat(253)).is_ok());
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://example.com/path"),
            Some("example.com".to_string())
        );
        assert_eq!(
            extract_domain("http://bit.ly/1cX5Rh4"),
            Some("bit.ly".to_string())
        );
        assert_eq!(extract_domain("not a url"), None);
    }
}
