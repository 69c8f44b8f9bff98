//! Display name and login identifier resolution.

use crate::claims::{ClaimSet, NAME_CLAIM};

/// Resolve the display name for an account.
///
/// Returns the first `name` claim verbatim when it has non-whitespace
/// content, otherwise `fallback` exactly as given.
pub fn resolve_display_name(claims: &ClaimSet, fallback: &str) -> String {
    match claims.find_first(NAME_CLAIM) {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => fallback.to_string(),
    }
}

/// Resolve the login identifier: the provider's identity name, verbatim.
///
/// `None` means identity assignment is skipped for this login; no login
/// identifier is ever invented.
pub fn resolve_login_identifier(claims: &ClaimSet) -> Option<String> {
    claims.identity_name().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claim;

    fn claims(pairs: &[(&str, &str)]) -> ClaimSet {
        ClaimSet::new(
            pairs.iter().map(|(t, v)| Claim::new(*t, *v)).collect(),
            "preferred_username",
        )
    }

    #[test]
    fn test_name_claim_wins() {
        let c = claims(&[("preferred_username", "jane@example.com"), ("name", " Jane Doe ")]);
        assert_eq!(resolve_display_name(&c, "jane@example.com"), " Jane Doe ");
    }

    #[test]
    fn test_missing_name_falls_back() {
        let c = claims(&[("preferred_username", "jane@example.com")]);
        assert_eq!(resolve_display_name(&c, "jane@example.com"), "jane@example.com");
    }

    #[test]
    fn test_blank_name_falls_back() {
        let c = claims(&[("name", "   \t")]);
        assert_eq!(resolve_display_name(&c, "fallback"), "fallback");
    }

    #[test]
    fn test_login_identifier() {
        let c = claims(&[("preferred_username", "Jane@Example.com")]);
        assert_eq!(resolve_login_identifier(&c).as_deref(), Some("Jane@Example.com"));
        assert_eq!(resolve_login_identifier(&claims(&[("name", "Jane")])), None);
    }
}
