//! Hostname grammar for scan targets.
//!
//! A target is one or more dot-separated labels. Each label is 1-63
//! alphanumeric or hyphen characters and neither starts nor ends with a hyphen.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("hostname pattern is valid")
});

/// Longest hostname accepted, in characters.
const MAX_HOSTNAME_LEN: usize = 253;

/// Whether `candidate` matches the hostname grammar.
pub fn is_valid_hostname(candidate: &str) -> bool {
    candidate.len() <= MAX_HOSTNAME_LEN && HOSTNAME.is_match(candidate)
}

/// Validate a scan target, returning it unchanged on success.
pub fn validate_hostname(candidate: &str) -> Result<&str, CoreError> {
    if is_valid_hostname(candidate) {
        Ok(candidate)
    } else {
        Err(CoreError::InvalidTarget(candidate.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_hostnames() {
        for host in [
            "example.com",
            "api.example.com",
            "a.b.c.d.example.co.uk",
            "xn--bcher-kva.example",
            "localhost",
            "1.2.3.4",
        ] {
            assert!(is_valid_hostname(host), "{host} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_hostnames() {
        for host in [
            "",
            "not a host!",
            "-leading.example.com",
            "trailing-.example.com",
            "double..dot.com",
            ".example.com",
            "example.com.",
            "under_score.example.com",
        ] {
            assert!(!is_valid_hostname(host), "{host:?} should be invalid");
        }
    }

    #[test]
    fn label_length_limit() {
        let ok = format!("{}.com", "a".repeat(63));
        let too_long = format!("{}.com", "a".repeat(64));
        assert!(is_valid_hostname(&ok));
        assert!(!is_valid_hostname(&too_long));
    }

    #[test]
    fn validate_returns_invalid_target_error() {
        let err = validate_hostname("not a host!").unwrap_err();
        assert!(matches!(err, CoreError::InvalidTarget(t) if t == "not a host!"));
    }
}
