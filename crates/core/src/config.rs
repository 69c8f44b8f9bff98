//! TOML-based configuration system for claimsync.
//!
//! The provider section mirrors the settings an administrator configures for
//! the external login provider. Secrets are stored as `_env` fields that
//! reference environment variable names and are resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::identity::groups::RoleMergePolicy;
use crate::identity::mapping_file::MappingFile;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// External login provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Profile picture synchronization settings.
    #[serde(default)]
    pub avatar: AvatarConfig,

    /// Local account store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// External login provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Prefix the host prepends to every external authentication scheme.
    #[serde(default = "default_scheme_prefix")]
    pub scheme_prefix: String,

    /// Scheme identifier of this provider.
    #[serde(default = "default_scheme_name")]
    pub scheme_name: String,

    /// Directory (tenant) the application is registered in.
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Application (client) ID.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Environment variable holding the client secret.
    #[serde(default)]
    pub client_secret_env: Option<String>,

    /// Claim type carrying the provider's identity name.
    #[serde(default = "default_identity_name_claim")]
    pub identity_name_claim: String,

    /// CSS class of the login button.
    #[serde(default = "default_button_style")]
    pub button_style: String,

    /// Icon of the login button.
    #[serde(default = "default_icon")]
    pub icon: String,

    /// Disable username/password login for the whole back office.
    #[serde(default)]
    pub deny_local_login: bool,

    /// Skip the login screen and go straight to this provider.
    #[serde(default)]
    pub auto_redirect_login_to_external_provider: bool,

    /// Fetch the user's profile picture on every login.
    #[serde(default = "default_true")]
    pub sync_user_avatar: bool,

    /// Rebuild group membership from claims on every login, not only when
    /// the account is first linked.
    #[serde(default)]
    pub set_groups_on_login: bool,

    /// How resolved groups are combined with roles already held on login.
    #[serde(default)]
    pub role_merge: RoleMergePolicy,

    /// Base URL of the graph API serving profile pictures.
    #[serde(default = "default_graph_endpoint")]
    pub graph_endpoint: String,

    /// Group aliases every user receives.
    #[serde(default)]
    pub default_groups: Vec<String>,

    /// External claim value -> comma-separated local group aliases.
    #[serde(default)]
    pub group_lookup: HashMap<String, String>,

    /// Optional TOML file with additional `[groups]` mappings.
    #[serde(default)]
    pub group_lookup_file: Option<PathBuf>,

    /// Resolved client secret (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub client_secret: Option<String>,
}

fn default_scheme_prefix() -> String {
    "Umbraco.".into()
}
fn default_scheme_name() -> String {
    "MicrosoftAccount".into()
}
fn default_identity_name_claim() -> String {
    "preferred_username".into()
}
fn default_button_style() -> String {
    "btn-microsoft".into()
}
fn default_icon() -> String {
    "fa fa-lock".into()
}
fn default_graph_endpoint() -> String {
    "https://graph.microsoft.com".into()
}
fn default_true() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            scheme_prefix: default_scheme_prefix(),
            scheme_name: default_scheme_name(),
            tenant_id: None,
            client_id: None,
            client_secret_env: None,
            identity_name_claim: default_identity_name_claim(),
            button_style: default_button_style(),
            icon: default_icon(),
            deny_local_login: false,
            auto_redirect_login_to_external_provider: false,
            sync_user_avatar: true,
            set_groups_on_login: false,
            role_merge: RoleMergePolicy::default(),
            graph_endpoint: default_graph_endpoint(),
            default_groups: Vec::new(),
            group_lookup: HashMap::new(),
            group_lookup_file: None,
            client_secret: None,
        }
    }
}

impl ProviderConfig {
    /// Full authentication scheme name as requested by the host.
    pub fn authentication_type(&self) -> String {
        format!("{}{}", self.scheme_prefix, self.scheme_name)
    }
}

// ---------------------------------------------------------------------------
// Avatar
// ---------------------------------------------------------------------------

/// Profile picture synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarConfig {
    /// Upper bound for the whole photo request, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Root directory of the media file store.
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
}

fn default_fetch_timeout() -> u64 {
    10
}
fn default_media_root() -> PathBuf {
    PathBuf::from("/var/lib/claimsync/media")
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout(),
            media_root: default_media_root(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Local account store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the SQLite database holding user accounts.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("/var/lib/claimsync/claimsync.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables or the group mapping
    /// file -- call [`resolve_env_vars`](Self::resolve_env_vars) and
    /// [`resolve_group_lookup_file`](Self::resolve_group_lookup_file)
    /// afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables.
    ///
    /// Missing variables log a warning but do not fail; the client secret is
    /// only needed by the host's token exchange, not by reconciliation.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if let Some(ref env_name) = self.provider.client_secret_env {
            self.provider.client_secret =
                resolve_optional_env(env_name, "provider.client_secret_env");
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Merge mappings from `provider.group_lookup_file` into
    /// `provider.group_lookup`. Inline entries win over file entries.
    pub fn resolve_group_lookup_file(&mut self) -> Result<(), ConfigError> {
        let Some(ref path) = self.provider.group_lookup_file else {
            return Ok(());
        };

        let mut merged = MappingFile::load(path)?;
        let from_file = merged.len();
        merged.extend(self.provider.group_lookup.drain());
        debug!(
            from_file,
            total = merged.len(),
            "merged group mapping file into lookup"
        );
        self.provider.group_lookup = merged;
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.scheme_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "provider.scheme_name".into(),
                detail: "scheme name must not be empty".into(),
            });
        }
        let endpoint = self.provider.graph_endpoint.as_str();
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(ConfigError::InvalidValue {
                field: "provider.graph_endpoint".into(),
                detail: "must be an absolute http(s) URL".into(),
            });
        }
        if self.provider.group_lookup.keys().any(|k| k.is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "provider.group_lookup".into(),
                detail: "mapping keys must not be empty".into(),
            });
        }
        if let Some(bad) = self
            .provider
            .default_groups
            .iter()
            .find(|g| g.is_empty() || g.trim() != g.as_str())
        {
            return Err(ConfigError::InvalidValue {
                field: "provider.default_groups".into(),
                detail: format!("group alias {:?} is empty or has surrounding whitespace", bad),
            });
        }
        if self.avatar.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "avatar.fetch_timeout_secs".into(),
                detail: "fetch timeout must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.resolve_group_lookup_file()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
