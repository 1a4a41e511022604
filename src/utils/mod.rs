//! Small shared helpers that don't belong to a single module.

use regex::Regex;

/// Valid Envoy resource name: starts with a letter or underscore, followed by
/// letters, numbers, underscores, or hyphens.
pub static VALID_NAME_REGEX: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_-]*$").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_name_regex_accepts_identifiers() {
        assert!(VALID_NAME_REGEX.is_match("orders-api"));
        assert!(VALID_NAME_REGEX.is_match("orders_api"));
        assert!(!VALID_NAME_REGEX.is_match("9orders"));
    }
}
