//! Domain model types used throughout claimsync.
//!
//! These types bridge the reconciliation engine, the account store and the
//! CLI.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Local user
// ---------------------------------------------------------------------------

/// A local account as seen by the engine.
///
/// The account store owns creation, deletion and dirty tracking; the engine
/// only mutates fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalUser {
    pub id: String,
    /// Login identifier (user name).
    pub login: String,
    /// Display name.
    pub name: String,
    pub email: Option<String>,
    pub is_approved: bool,
    /// Group aliases.
    pub roles: BTreeSet<String>,
    /// Relative path of the profile picture in the content store.
    pub avatar: Option<String>,
}

impl LocalUser {
    /// A fresh, unapproved account with a new id.
    pub fn new(login: impl Into<String>) -> Self {
        let login = login.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: login.clone(),
            login,
            email: None,
            is_approved: false,
            roles: BTreeSet::new(),
            avatar: None,
        }
    }

    pub fn add_role(&mut self, alias: impl Into<String>) {
        self.roles.insert(alias.into());
    }
}

// ---------------------------------------------------------------------------
// Step outcomes
// ---------------------------------------------------------------------------

/// Which login event triggered a reconciliation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// First-time automatic link of a new account.
    Provisioning,
    /// Any later successful external login.
    Login,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provisioning => write!(f, "provisioning"),
            Self::Login => write!(f, "login"),
        }
    }
}

/// One of the optional reconciliation steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Groups,
    Identity,
    Avatar,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Groups => write!(f, "groups"),
            Self::Identity => write!(f, "identity"),
            Self::Avatar => write!(f, "avatar"),
        }
    }
}

/// Why a step did nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum SkipReason {
    /// Turned off in configuration.
    Disabled,
    /// The login produced no bearer access token.
    NoAccessToken,
    /// The photo endpoint answered with this non-success status.
    NoPhoto(u16),
    /// The photo response carried no `ETag`.
    NoVersionTag,
    /// The computed avatar path equals the persisted one.
    Unchanged,
    /// The assertion carries no identity-name claim.
    NoIdentityName,
    /// The account store has no record for the login identifier.
    UserNotPersisted,
    /// The login request was cancelled.
    Cancelled,
    /// Provisioning already ran for this account.
    AlreadyProvisioned,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::NoAccessToken => write!(f, "no access token"),
            Self::NoPhoto(status) => write!(f, "no photo (HTTP {})", status),
            Self::NoVersionTag => write!(f, "no version tag"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::NoIdentityName => write!(f, "no identity name claim"),
            Self::UserNotPersisted => write!(f, "user not persisted"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::AlreadyProvisioned => write!(f, "already provisioned"),
        }
    }
}

/// Result of one optional step. `Failed` never denies a login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum StepOutcome {
    Applied,
    Skipped(SkipReason),
    Failed(String),
}

impl StepOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
            Self::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Summary of one reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileReport {
    pub trigger: Trigger,
    pub groups: StepOutcome,
    pub identity: StepOutcome,
    pub avatar: StepOutcome,
    /// Whether sign-in should continue. Enrichment never denies a login.
    pub proceed: bool,
}

impl ReconcileReport {
    pub(crate) fn skipped(trigger: Trigger, reason: SkipReason) -> Self {
        Self {
            trigger,
            groups: StepOutcome::Skipped(reason.clone()),
            identity: StepOutcome::Skipped(reason.clone()),
            avatar: StepOutcome::Skipped(reason),
            proceed: true,
        }
    }

    pub fn outcome(&self, step: Step) -> &StepOutcome {
        match step {
            Step::Groups => &self.groups,
            Step::Identity => &self.identity,
            Step::Avatar => &self.avatar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_is_unapproved() {
        let user = LocalUser::new("jane@example.com");
        assert!(!user.is_approved);
        assert_eq!(user.name, "jane@example.com");
        assert!(user.roles.is_empty());
        assert!(user.avatar.is_none());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(StepOutcome::Applied.to_string(), "applied");
        assert_eq!(
            StepOutcome::Skipped(SkipReason::NoPhoto(404)).to_string(),
            "skipped: no photo (HTTP 404)"
        );
        assert_eq!(
            StepOutcome::Failed("timeout".into()).to_string(),
            "failed: timeout"
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&StepOutcome::Skipped(SkipReason::NoVersionTag)).unwrap();
        assert_eq!(
            json,
            r#"{"status":"skipped","detail":{"reason":"no_version_tag"}}"#
        );
    }
}
