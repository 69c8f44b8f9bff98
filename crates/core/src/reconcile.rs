//! Reconciliation of an external login with the local account.
//!
//! The [`ExternalLoginProvider`] is invoked by the host on two triggers:
//!
//! 1. **Provisioning** ([`on_auto_linking`](ExternalLoginProvider::on_auto_linking)):
//!    a newly auto-linked, not yet approved account. Groups are assigned,
//!    name and login identifier are set, the avatar is synced and the
//!    account is approved. Never runs twice for the same account.
//! 2. **Login** ([`on_external_login`](ExternalLoginProvider::on_external_login)):
//!    every later successful login. Groups are rebuilt only when
//!    `set_groups_on_login` is on; name and avatar always sync.
//!
//! Sign-in always proceeds. Only account-store persistence failures are
//! returned as errors, and they are operational errors, not authentication
//! failures.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::avatar::AvatarSynchronizer;
use crate::claims::{ClaimSet, ExternalLoginInfo};
use crate::config::{AppConfig, ProviderConfig};
use crate::errors::{CoreError, ReconcileError, StoreError};
use crate::identity::groups::{GroupResolver, RoleMergePolicy};
use crate::identity::names::{resolve_display_name, resolve_login_identifier};
use crate::models::{LocalUser, ReconcileReport, SkipReason, StepOutcome, Trigger};
use crate::notify::{OutcomeSink, TracingOutcomeSink};
use crate::store::{AccountStore, ContentStore};

// ---------------------------------------------------------------------------
// Provider options
// ---------------------------------------------------------------------------

/// Auto-link behaviour handed to the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoLinkOptions {
    /// Must be true for auto-linking to happen at all.
    pub auto_link_external_account: bool,
    /// Groups the host assigns itself; empty because provisioning assigns
    /// them from claims.
    pub default_user_groups: Vec<String>,
    /// Culture for new accounts; `None` uses the host default.
    pub default_culture: Option<String>,
    /// Whether users may link/unlink this provider manually.
    pub allow_manual_linking: bool,
}

impl Default for AutoLinkOptions {
    fn default() -> Self {
        Self {
            auto_link_external_account: true,
            default_user_groups: Vec::new(),
            default_culture: None,
            allow_manual_linking: false,
        }
    }
}

/// Login-screen options for this provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginProviderOptions {
    pub button_style: String,
    pub icon: String,
    pub deny_local_login: bool,
    pub auto_redirect_login_to_external_provider: bool,
    pub auto_link: AutoLinkOptions,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// The reconciliation engine for one external login provider.
///
/// `Send + Sync`; share it behind an `Arc` across concurrent logins. There
/// is no per-user state: concurrent logins of different users reconcile
/// independently.
pub struct ExternalLoginProvider {
    settings: ProviderConfig,
    groups: GroupResolver,
    avatar: AvatarSynchronizer,
    accounts: Arc<dyn AccountStore>,
    content: Arc<dyn ContentStore>,
    sink: Arc<dyn OutcomeSink>,
}

impl ExternalLoginProvider {
    /// Create a provider with all required collaborators. Outcomes are
    /// logged via [`TracingOutcomeSink`] until [`with_sink`](Self::with_sink)
    /// replaces it.
    pub fn new(
        settings: ProviderConfig,
        avatar: AvatarSynchronizer,
        accounts: Arc<dyn AccountStore>,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        info!(scheme = %settings.authentication_type(), "initializing external login provider");
        let groups = GroupResolver::new(
            settings.group_lookup.clone(),
            settings.default_groups.clone(),
        );
        Self {
            settings,
            groups,
            avatar,
            accounts,
            content,
            sink: Arc::new(TracingOutcomeSink),
        }
    }

    /// Build the provider and its HTTP client from the application config.
    pub fn from_config(
        config: &AppConfig,
        accounts: Arc<dyn AccountStore>,
        content: Arc<dyn ContentStore>,
    ) -> Result<Self, CoreError> {
        let avatar = AvatarSynchronizer::new(
            config.provider.graph_endpoint.clone(),
            Duration::from_secs(config.avatar.fetch_timeout_secs),
        )?;
        Ok(Self::new(config.provider.clone(), avatar, accounts, content))
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn settings(&self) -> &ProviderConfig {
        &self.settings
    }

    /// Login-screen options, but only when `name` is this provider's
    /// authentication scheme. Any other name is a pass-through (`None`):
    /// several providers share the same configuration surface.
    pub fn configure(&self, name: Option<&str>) -> Option<LoginProviderOptions> {
        let scheme = self.settings.authentication_type();
        if name != Some(scheme.as_str()) {
            debug!(requested = ?name, scheme = %scheme, "scheme mismatch, not configuring");
            return None;
        }

        Some(LoginProviderOptions {
            button_style: self.settings.button_style.clone(),
            icon: self.settings.icon.clone(),
            deny_local_login: self.settings.deny_local_login,
            auto_redirect_login_to_external_provider: self
                .settings
                .auto_redirect_login_to_external_provider,
            auto_link: AutoLinkOptions::default(),
        })
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// First-link provisioning of a newly auto-linked account.
    ///
    /// Does nothing for an account that is already approved.
    #[instrument(skip_all, fields(login = %user.login))]
    pub async fn on_auto_linking(
        &self,
        user: &mut LocalUser,
        login: &ExternalLoginInfo,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ReconcileError> {
        if user.is_approved {
            debug!("account already approved, provisioning skipped");
            let report = ReconcileReport::skipped(Trigger::Provisioning, SkipReason::AlreadyProvisioned);
            self.sink.record(&user.login, &report);
            return Ok(report);
        }

        info!("provisioning auto-linked account");
        let groups = self.apply_groups(user, &login.claims, &RoleMergePolicy::Replace);
        let identity = self.apply_identity(user, &login.claims);
        user.is_approved = true;

        self.finish(user, login, cancel, Trigger::Provisioning, groups, identity)
            .await
    }

    /// Per-login synchronization. The returned report always has
    /// `proceed = true`.
    ///
    /// Approval is left alone here; only provisioning sets `is_approved`.
    #[instrument(skip_all, fields(login = %user.login))]
    pub async fn on_external_login(
        &self,
        user: &mut LocalUser,
        login: &ExternalLoginInfo,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ReconcileError> {
        let groups = if self.settings.set_groups_on_login {
            self.apply_groups(user, &login.claims, &self.settings.role_merge)
        } else {
            StepOutcome::Skipped(SkipReason::Disabled)
        };
        let identity = self.apply_identity(user, &login.claims);

        self.finish(user, login, cancel, Trigger::Login, groups, identity)
            .await
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    fn apply_groups(
        &self,
        user: &mut LocalUser,
        claims: &ClaimSet,
        policy: &RoleMergePolicy,
    ) -> StepOutcome {
        let resolved = self.groups.resolve(claims);
        let roles = policy.apply(&user.roles, resolved);
        debug!(policy = %policy, roles = ?roles, "assigning groups");
        user.roles = roles;
        StepOutcome::Applied
    }

    fn apply_identity(&self, user: &mut LocalUser, claims: &ClaimSet) -> StepOutcome {
        let Some(login_id) = resolve_login_identifier(claims) else {
            debug!(claim = %claims.identity_name_claim(), "no identity name claim, identity unchanged");
            return StepOutcome::Skipped(SkipReason::NoIdentityName);
        };
        user.name = resolve_display_name(claims, &login_id);
        user.login = login_id;
        StepOutcome::Applied
    }

    /// Persist the claim-derived changes, sync the avatar, and report.
    ///
    /// The account is saved before the avatar step so that the photo is
    /// looked up under the login identifier just assigned.
    async fn finish(
        &self,
        user: &mut LocalUser,
        login: &ExternalLoginInfo,
        cancel: &CancellationToken,
        trigger: Trigger,
        groups: StepOutcome,
        identity: StepOutcome,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.persist(user)?;

        let avatar = if self.settings.sync_user_avatar {
            self.avatar
                .sync(
                    login.access_token(),
                    user,
                    self.accounts.as_ref(),
                    self.content.as_ref(),
                    cancel,
                )
                .await
                .map_err(|e| self.persistence_failed(user, e))?
        } else {
            StepOutcome::Skipped(SkipReason::Disabled)
        };

        self.persist(user)?;

        let report = ReconcileReport {
            trigger,
            groups,
            identity,
            avatar,
            proceed: true,
        };
        self.sink.record(&user.login, &report);
        Ok(report)
    }

    fn persist(&self, user: &LocalUser) -> Result<(), ReconcileError> {
        let dirty = self
            .accounts
            .is_dirty(user)
            .map_err(|e| self.persistence_failed(user, e))?;
        if dirty {
            self.accounts
                .save(user)
                .map_err(|e| self.persistence_failed(user, e))?;
            debug!("account saved");
        }
        Ok(())
    }

    fn persistence_failed(&self, user: &LocalUser, err: StoreError) -> ReconcileError {
        error!(login = %user.login, error = %err, "account persistence failed during reconciliation");
        ReconcileError::Persistence(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claim;
    use crate::db::Database;
    use crate::media::FileSystemContentStore;

    fn provider(settings: ProviderConfig) -> ExternalLoginProvider {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        let avatar = AvatarSynchronizer::with_client(reqwest::Client::new(), "http://127.0.0.1:9");
        ExternalLoginProvider::new(
            settings,
            avatar,
            Arc::new(db),
            Arc::new(FileSystemContentStore::new(std::env::temp_dir())),
        )
    }

    #[test]
    fn test_configure_matches_scheme_only() {
        let p = provider(ProviderConfig {
            deny_local_login: true,
            ..Default::default()
        });
        let options = p.configure(Some("Umbraco.MicrosoftAccount")).unwrap();
        assert!(options.deny_local_login);
        assert!(!options.auto_redirect_login_to_external_provider);
        assert!(options.auto_link.auto_link_external_account);
        assert!(!options.auto_link.allow_manual_linking);
        assert!(options.auto_link.default_user_groups.is_empty());

        assert!(p.configure(Some("Umbraco.Google")).is_none());
        assert!(p.configure(Some("MicrosoftAccount")).is_none());
        assert!(p.configure(Some("umbraco.microsoftaccount")).is_none());
        assert!(p.configure(None).is_none());
    }

    #[test]
    fn test_apply_identity_without_identity_name() {
        let p = provider(ProviderConfig::default());
        let mut user = LocalUser::new("old");
        let claims = ClaimSet::new(vec![Claim::new("name", "Jane")], "preferred_username");
        let outcome = p.apply_identity(&mut user, &claims);
        assert_eq!(outcome, StepOutcome::Skipped(SkipReason::NoIdentityName));
        assert_eq!(user.login, "old");
        assert_eq!(user.name, "old");
    }
}
