//! Verified claim sets handed over by the authentication pipeline.
//!
//! A [`ClaimSet`] is an ordered list of `(type, value)` pairs. Claim types
//! may repeat (a user has one `groups` claim per membership), so lookups
//! come in two flavours: [`ClaimSet::find_first`] and [`ClaimSet::values`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ClaimsError;

/// Claim type carrying the user's human-readable name.
pub const NAME_CLAIM: &str = "name";

/// Name of the authentication token holding the bearer access token.
pub const ACCESS_TOKEN_NAME: &str = "access_token";

/// A single name/value assertion about the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// Ordered, immutable set of verified claims for one login attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSet {
    claims: Vec<Claim>,
    identity_name_claim: String,
}

/// JSON shapes accepted for a claims document.
#[derive(Deserialize)]
#[serde(untagged)]
enum ClaimsDocument {
    List(Vec<Claim>),
    Map(serde_json::Map<String, serde_json::Value>),
}

impl ClaimSet {
    /// Build a claim set. `identity_name_claim` is the claim type the provider
    /// uses for the user's identity name.
    pub fn new(claims: Vec<Claim>, identity_name_claim: impl Into<String>) -> Self {
        Self {
            claims,
            identity_name_claim: identity_name_claim.into(),
        }
    }

    /// Parse a JSON claims document.
    ///
    /// Accepts either `[{"type": "...", "value": "..."}, ...]` or an object
    /// whose values are strings or arrays of strings (one claim per element;
    /// object keys are visited in sorted order). Numbers and booleans are
    /// kept as their JSON text, nulls are dropped.
    pub fn from_json(json: &str, identity_name_claim: &str) -> Result<Self, ClaimsError> {
        let doc: ClaimsDocument =
            serde_json::from_str(json).map_err(|e| ClaimsError::ParseError(e.to_string()))?;

        let claims = match doc {
            ClaimsDocument::List(claims) => claims,
            ClaimsDocument::Map(map) => {
                let mut claims = Vec::with_capacity(map.len());
                for (claim_type, value) in map {
                    push_json_value(&mut claims, &claim_type, value)?;
                }
                claims
            }
        };

        debug!(count = claims.len(), "parsed claims document");
        Ok(Self::new(claims, identity_name_claim))
    }

    /// Read and parse a JSON claims file.
    pub fn load<P: AsRef<Path>>(path: P, identity_name_claim: &str) -> Result<Self, ClaimsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents, identity_name_claim)
    }

    /// Value of the first claim of the given type.
    pub fn find_first(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// Values of every claim of the given type, in order.
    pub fn values<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// The provider's identity name, if the assertion carries one.
    pub fn identity_name(&self) -> Option<&str> {
        self.find_first(&self.identity_name_claim)
    }

    pub fn identity_name_claim(&self) -> &str {
        &self.identity_name_claim
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Claim> {
        self.claims.iter()
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

impl<'a> IntoIterator for &'a ClaimSet {
    type Item = &'a Claim;
    type IntoIter = std::slice::Iter<'a, Claim>;

    fn into_iter(self) -> Self::IntoIter {
        self.claims.iter()
    }
}

fn push_json_value(
    claims: &mut Vec<Claim>,
    claim_type: &str,
    value: serde_json::Value,
) -> Result<(), ClaimsError> {
    use serde_json::Value;

    match value {
        Value::String(s) => claims.push(Claim::new(claim_type, s)),
        Value::Number(n) => claims.push(Claim::new(claim_type, n.to_string())),
        Value::Bool(b) => claims.push(Claim::new(claim_type, b.to_string())),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Array(_) | Value::Object(_) => {
                        return Err(ClaimsError::ParseError(format!(
                            "claim '{}' contains a nested value",
                            claim_type
                        )))
                    }
                    other => push_json_value(claims, claim_type, other)?,
                }
            }
        }
        Value::Null => {}
        Value::Object(_) => {
            return Err(ClaimsError::ParseError(format!(
                "claim '{}' must be a string or an array of strings",
                claim_type
            )))
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Login context
// ---------------------------------------------------------------------------

/// A named token issued during authentication (access token, id token...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthToken {
    pub name: String,
    pub value: String,
}

/// Everything the authentication pipeline knows about one external login.
#[derive(Debug, Clone, Default)]
pub struct ExternalLoginInfo {
    pub claims: ClaimSet,
    pub tokens: Vec<AuthToken>,
}

impl ExternalLoginInfo {
    pub fn new(claims: ClaimSet) -> Self {
        Self {
            claims,
            tokens: Vec::new(),
        }
    }

    /// Attach a bearer access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(AuthToken {
            name: ACCESS_TOKEN_NAME.into(),
            value: token.into(),
        });
        self
    }

    /// The bearer access token, if the login produced one.
    pub fn access_token(&self) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| t.name == ACCESS_TOKEN_NAME)
            .map(|t| t.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_claim_types() {
        let claims = ClaimSet::new(
            vec![
                Claim::new("groups", "a"),
                Claim::new("name", "Jane"),
                Claim::new("groups", "b"),
            ],
            "preferred_username",
        );
        assert_eq!(claims.values("groups").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(claims.find_first("groups"), Some("a"));
        assert_eq!(claims.find_first("missing"), None);
        assert_eq!(claims.identity_name(), None);
    }

    #[test]
    fn test_from_json_list() {
        let json = r#"[
            {"type": "preferred_username", "value": "jane@example.com"},
            {"type": "groups", "value": "g1"}
        ]"#;
        let claims = ClaimSet::from_json(json, "preferred_username").unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims.identity_name(), Some("jane@example.com"));
    }

    #[test]
    fn test_from_json_map_with_arrays() {
        let json = r#"{
            "preferred_username": "jane@example.com",
            "groups": ["g1", "g2"],
            "email_verified": true,
            "middle_name": null
        }"#;
        let claims = ClaimSet::from_json(json, "preferred_username").unwrap();
        assert_eq!(claims.values("groups").count(), 2);
        assert_eq!(claims.find_first("email_verified"), Some("true"));
        assert_eq!(claims.find_first("middle_name"), None);
    }

    #[test]
    fn test_from_json_rejects_nested_objects() {
        let json = r#"{"address": {"street": "x"}}"#;
        let result = ClaimSet::from_json(json, "preferred_username");
        assert!(matches!(result, Err(ClaimsError::ParseError(_))));
    }

    #[test]
    fn test_access_token_lookup() {
        let login = ExternalLoginInfo::new(ClaimSet::default());
        assert_eq!(login.access_token(), None);

        let login = login.with_access_token("eyJ0eXAi");
        assert_eq!(login.access_token(), Some("eyJ0eXAi"));
    }
}
