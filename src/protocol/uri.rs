//! URI grammar checks for realms, topics, procedures and error URIs.
//!
//! Loose URI rules: dot separated components, no empty component, no
//! whitespace and no `#` anywhere.

use crate::{Result, WampError};

/// Validate a URI, returning it unchanged on success.
///
/// # Errors
///
/// Returns [`WampError::InvalidUri`] for an empty URI, an empty component
/// (leading, trailing or doubled dot) or a component containing whitespace
/// or `#`.
pub fn validate_uri(uri: &str) -> Result<&str> {
    // ---
    if is_valid_uri(uri) {
        Ok(uri)
    } else {
        Err(WampError::InvalidUri(uri.to_owned()))
    }
}

/// Non-failing form of [`validate_uri`].
pub fn is_valid_uri(uri: &str) -> bool {
    // ---
    !uri.is_empty()
        && uri
            .split('.')
            .all(|component| !component.is_empty() && is_valid_component(component))
}

/// Wildcard subscription pattern: empty components match any single
/// component, so only whitespace and `#` are rejected.
pub fn is_valid_wildcard_uri(uri: &str) -> bool {
    // ---
    uri.contains('.') && uri.split('.').all(is_valid_component)
}

fn is_valid_component(component: &str) -> bool {
    !component.chars().any(|c| c.is_whitespace() || c == '#')
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_accepts_dotted_uris() {
        // ---
        assert!(is_valid_uri("com.example.topic"));
        assert!(is_valid_uri("myrealm"));
        assert!(is_valid_uri("wamp.error.no_such_procedure"));
        assert!(is_valid_uri("com.example.v2-beta"));
    }

    #[test]
    fn test_rejects_empty_components() {
        // ---
        for uri in ["", ".", "com..example", ".com.example", "com.example."] {
            assert!(!is_valid_uri(uri), "{uri:?} should be rejected");
        }
    }

    #[test]
    fn test_rejects_whitespace_and_hash() {
        // ---
        assert!(!is_valid_uri("com.exa mple"));
        assert!(!is_valid_uri("com.example#1"));
        assert!(!is_valid_uri("com.\texample"));
    }

    #[test]
    fn test_wildcard_patterns() {
        // ---
        assert!(is_valid_wildcard_uri("com..topic"));
        assert!(is_valid_wildcard_uri("com.example.topic"));
        assert!(!is_valid_wildcard_uri("topic"));
        assert!(!is_valid_wildcard_uri("com. .topic"));
    }

    #[test]
    fn test_validate_uri_error_names_uri() {
        // ---
        match validate_uri("a..b") {
            Err(WampError::InvalidUri(uri)) => assert_eq!(uri, "a..b"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
