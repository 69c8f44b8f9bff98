//! Error types for the claimsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! Only [`StoreError`] is allowed to escape a reconciliation (see
//! [`ReconcileError`]); every other failure is folded into a step outcome.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Claims(#[from] ClaimsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Avatar(#[from] AvatarError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// The group mapping file could not be loaded.
    #[error("group mapping file error at '{path}': {detail}")]
    MappingFileError {
        path: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Claim errors
// ---------------------------------------------------------------------------

/// Errors from reading a claim set supplied by the authentication pipeline.
#[derive(Debug, Error)]
pub enum ClaimsError {
    /// The claims document is not valid JSON or has an unsupported shape.
    #[error("claims parse error: {0}")]
    ParseError(String),

    /// Generic I/O error reading a claims file.
    #[error("claims I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Account store errors
// ---------------------------------------------------------------------------

/// Errors from the local account store.
///
/// These indicate account-store unavailability and are the only failures a
/// reconciliation surfaces to its caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying rusqlite error.
    #[error("account store database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("account store migration failed (version {version}): {detail}")]
    MigrationFailed {
        version: u32,
        detail: String,
    },

    /// A user record was not found.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// A user with the same login identifier already exists.
    #[error("user already exists: {0}")]
    DuplicateLogin(String),

    /// A stored column could not be decoded.
    #[error("corrupt user record '{login}': {detail}")]
    CorruptRecord {
        login: String,
        detail: String,
    },

    /// Store-specific failure from a non-SQLite implementation.
    #[error("account store unavailable: {0}")]
    Unavailable(String),

    /// Generic I/O error (e.g. file permissions).
    #[error("account store I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Content store errors
// ---------------------------------------------------------------------------

/// Errors from the content (media file) store.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The relative path escapes the store root or is otherwise unusable.
    #[error("invalid content path '{0}'")]
    InvalidPath(String),

    /// The file exists and overwrite was not requested.
    #[error("content file already exists: {0}")]
    AlreadyExists(String),

    /// Reading the source stream failed part-way.
    #[error("content stream error: {0}")]
    StreamError(String),

    /// Generic I/O error.
    #[error("content I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Avatar errors
// ---------------------------------------------------------------------------

/// Errors from the profile picture fetch.
///
/// These never fail a login; the synchronizer turns them into a failed step
/// outcome.
#[derive(Debug, Error)]
pub enum AvatarError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("photo endpoint HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Writing the picture to the content store failed.
    #[error("avatar write failed: {0}")]
    Content(#[from] ContentError),
}

// ---------------------------------------------------------------------------
// Reconciliation errors
// ---------------------------------------------------------------------------

/// The only failure a reconciliation may surface.
///
/// The identity provider has already authenticated the user, so this is an
/// operational error and must not be reported to the end user as an
/// authentication failure.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Persisting the user failed.
    #[error("account persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ConfigError::InvalidValue {
            field: "provider.graph_endpoint".into(),
            detail: "must be an absolute http(s) URL".into(),
        };
        assert!(err.to_string().contains("provider.graph_endpoint"));

        let err = StoreError::UserNotFound("jane@example.com".into());
        assert_eq!(err.to_string(), "user not found: jane@example.com");

        let err = ContentError::InvalidPath("../etc/passwd".into());
        assert_eq!(err.to_string(), "invalid content path '../etc/passwd'");
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let store_err = StoreError::UserNotFound("x".into());
        let core_err: CoreError = store_err.into();
        assert!(matches!(core_err, CoreError::Store(_)));

        let reconcile_err: ReconcileError = StoreError::Unavailable("down".into()).into();
        assert!(reconcile_err.to_string().contains("persistence"));
        let core_err: CoreError = reconcile_err.into();
        assert!(matches!(core_err, CoreError::Reconcile(_)));
    }
}
