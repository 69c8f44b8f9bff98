//! Group resolution from provider claims.
//!
//! [`GroupResolver`] turns a claim set into the set of local group aliases
//! the user should hold. [`RoleMergePolicy`] decides how that set is combined
//! with the roles the account already has.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::claims::ClaimSet;

/// Maps claim values to local group aliases.
///
/// Any claim whose value is a key of the lookup table contributes the
/// aliases of the mapped string, regardless of the claim type. Keys are
/// matched case-sensitively.
#[derive(Debug, Clone, Default)]
pub struct GroupResolver {
    lookup: HashMap<String, String>,
    default_groups: Vec<String>,
}

impl GroupResolver {
    pub fn new(lookup: HashMap<String, String>, default_groups: Vec<String>) -> Self {
        Self {
            lookup,
            default_groups,
        }
    }

    /// Resolve the groups implied by `claims`, defaults included.
    ///
    /// Mapped strings are split on `,`. Unlike a plain split, each alias is
    /// trimmed and empty aliases are dropped, so `"admin, editor,"` yields
    /// `admin` and `editor`. Unmapped claim values contribute nothing.
    /// Default groups are added exactly as configured.
    pub fn resolve(&self, claims: &ClaimSet) -> BTreeSet<String> {
        let mut groups = BTreeSet::new();

        for claim in claims {
            if let Some(mapped) = self.lookup.get(&claim.value) {
                debug!(claim_type = %claim.claim_type, value = %claim.value, mapped = %mapped, "claim maps to groups");
                groups.extend(split_aliases(mapped));
            }
        }

        groups.extend(self.default_groups.iter().cloned());

        groups
    }
}

fn split_aliases(mapped: &str) -> impl Iterator<Item = String> + '_ {
    mapped
        .split(',')
        .map(str::trim)
        .filter(|alias| !alias.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Merge policy
// ---------------------------------------------------------------------------

/// How resolved groups are combined with the roles an account already holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RoleMergePolicy {
    /// Role set becomes exactly the resolved groups.
    #[default]
    Replace,
    /// Resolved groups are added; nothing is removed.
    Merge,
    /// Resolved groups are authoritative except for the listed aliases,
    /// which are kept when the account already holds them.
    MergePreserving {
        #[serde(default)]
        local_only: Vec<String>,
    },
}

impl RoleMergePolicy {
    /// Compute the new role set from the current one and the resolved groups.
    pub fn apply(&self, current: &BTreeSet<String>, resolved: BTreeSet<String>) -> BTreeSet<String> {
        match self {
            Self::Replace => resolved,
            Self::Merge => {
                let mut roles = resolved;
                roles.extend(current.iter().cloned());
                roles
            }
            Self::MergePreserving { local_only } => {
                let mut roles = resolved;
                roles.extend(
                    current
                        .iter()
                        .filter(|role| local_only.iter().any(|l| l == *role))
                        .cloned(),
                );
                roles
            }
        }
    }
}

impl std::fmt::Display for RoleMergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replace => write!(f, "replace"),
            Self::Merge => write!(f, "merge"),
            Self::MergePreserving { .. } => write!(f, "merge_preserving"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claim;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn resolver() -> GroupResolver {
        let mut lookup = HashMap::new();
        lookup.insert("eng".to_string(), "Editors,Translators".to_string());
        lookup.insert("ops".to_string(), "Admins, Editors ,".to_string());
        GroupResolver::new(lookup, vec!["AllStaff".to_string()])
    }

    fn claims(pairs: &[(&str, &str)]) -> ClaimSet {
        ClaimSet::new(
            pairs.iter().map(|(t, v)| Claim::new(*t, *v)).collect(),
            "preferred_username",
        )
    }

    #[test]
    fn test_department_claim_scenario() {
        let groups = resolver().resolve(&claims(&[("department", "eng")]));
        assert_eq!(groups, set(&["Editors", "Translators", "AllStaff"]));
    }

    #[test]
    fn test_defaults_always_present() {
        let groups = resolver().resolve(&ClaimSet::default());
        assert_eq!(groups, set(&["AllStaff"]));
    }

    #[test]
    fn test_defaults_added_verbatim() {
        let defaults = vec![" AllStaff".to_string(), "".to_string(), "Writers".to_string()];
        let r = GroupResolver::new(HashMap::new(), defaults.clone());
        let groups = r.resolve(&claims(&[("groups", "eng")]));
        for default in &defaults {
            assert!(groups.contains(default), "default {:?} missing from {:?}", default, groups);
        }
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_unmapped_values_contribute_nothing() {
        let groups = resolver().resolve(&claims(&[("groups", "marketing"), ("name", "eng ")]));
        assert_eq!(groups, set(&["AllStaff"]));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let groups = resolver().resolve(&claims(&[("groups", "ENG")]));
        assert_eq!(groups, set(&["AllStaff"]));
    }

    #[test]
    fn test_aliases_are_trimmed_and_deduplicated() {
        let groups = resolver().resolve(&claims(&[("groups", "eng"), ("groups", "ops")]));
        assert_eq!(groups, set(&["Admins", "AllStaff", "Editors", "Translators"]));
    }

    #[test]
    fn test_order_independent() {
        let forward = claims(&[("groups", "ops"), ("department", "eng"), ("x", "y")]);
        let backward = claims(&[("x", "y"), ("department", "eng"), ("groups", "ops")]);
        let r = resolver();
        assert_eq!(r.resolve(&forward), r.resolve(&backward));
    }

    #[test]
    fn test_replace_policy() {
        let current = set(&["Admins", "Legacy"]);
        let roles = RoleMergePolicy::Replace.apply(&current, set(&["Editors"]));
        assert_eq!(roles, set(&["Editors"]));
    }

    #[test]
    fn test_merge_policy_keeps_everything() {
        let current = set(&["Admins", "Legacy"]);
        let roles = RoleMergePolicy::Merge.apply(&current, set(&["Editors"]));
        assert_eq!(roles, set(&["Admins", "Editors", "Legacy"]));
    }

    #[test]
    fn test_merge_preserving_keeps_only_local_aliases() {
        let policy = RoleMergePolicy::MergePreserving {
            local_only: vec!["Translators".into(), "Reviewers".into()],
        };
        let current = set(&["Admins", "Translators"]);
        let roles = policy.apply(&current, set(&["Editors"]));
        assert_eq!(roles, set(&["Editors", "Translators"]));
    }

    #[test]
    fn test_policy_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            role_merge: RoleMergePolicy,
        }
        let w: Wrapper = toml::from_str(r#"role_merge = { mode = "merge" }"#).unwrap();
        assert_eq!(w.role_merge, RoleMergePolicy::Merge);
        assert_eq!(w.role_merge.to_string(), "merge");
    }
}
