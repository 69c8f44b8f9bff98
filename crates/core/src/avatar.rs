//! Profile picture synchronization.
//!
//! The picture is fetched from the graph endpoint with the login's bearer
//! token and stored under a path derived from the response's version tag:
//!
//! ```text
//! UserAvatars/<hex sha256(ETag)>.jpg
//! ```
//!
//! The same tag always yields the same path, so the account store's dirty
//! check alone decides whether the body needs downloading. Repeated logins
//! with an unchanged picture read no body and write nothing. Old pictures
//! are never deleted.
//!
//! Nothing here may deny a login: every remote or content-store problem
//! becomes a [`StepOutcome`]. Only account-store errors propagate.

use std::time::Duration;

use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ETAG, USER_AGENT};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::{AvatarError, StoreError};
use crate::models::{LocalUser, SkipReason, StepOutcome};
use crate::store::{AccountStore, ByteStream, ContentStore};

/// Directory (relative to the content store root) holding profile pictures.
pub const AVATAR_DIR: &str = "UserAvatars";

/// Content store path for a picture with the given version tag.
///
/// The tag is hashed verbatim, quotes and weak-validator prefix included.
pub fn avatar_path(version_tag: &str) -> String {
    let digest = Sha256::digest(version_tag.as_bytes());
    format!("{}/{}.jpg", AVATAR_DIR, hex::encode(digest))
}

/// Fetches profile pictures and stores them content-addressed.
///
/// Holds one pooled HTTP client for its whole lifetime; share the
/// synchronizer (or the client) instead of building one per login.
#[derive(Clone)]
pub struct AvatarSynchronizer {
    http: reqwest::Client,
    graph_endpoint: String,
}

impl AvatarSynchronizer {
    /// Build a synchronizer with its own client. `timeout` bounds each whole
    /// request, body included.
    pub fn new(graph_endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AvatarError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("claimsync/", env!("CARGO_PKG_VERSION"))),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(http, graph_endpoint))
    }

    /// Build a synchronizer around an existing client.
    pub fn with_client(http: reqwest::Client, graph_endpoint: impl Into<String>) -> Self {
        let graph_endpoint = graph_endpoint.into().trim_end_matches('/').to_string();
        info!(graph_endpoint = %graph_endpoint, "created AvatarSynchronizer");
        Self {
            http,
            graph_endpoint,
        }
    }

    /// URL of the signed-in user's photo.
    pub fn photo_url(&self) -> String {
        format!("{}/v1.0/me/photo/$value", self.graph_endpoint)
    }

    /// Synchronize the profile picture of `user`.
    ///
    /// On success the persisted record is saved with the new path and
    /// `user.avatar` is updated to match. A content-store failure leaves the
    /// record unsaved so the next login retries.
    #[instrument(skip_all, fields(login = %user.login))]
    pub async fn sync(
        &self,
        access_token: Option<&str>,
        user: &mut LocalUser,
        accounts: &dyn AccountStore,
        content: &dyn ContentStore,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, StoreError> {
        let Some(token) = access_token else {
            debug!("no access token, skipping avatar sync");
            return Ok(StepOutcome::Skipped(SkipReason::NoAccessToken));
        };

        let request = self.http.get(self.photo_url()).bearer_auth(token).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("login cancelled before photo response");
                return Ok(StepOutcome::Skipped(SkipReason::Cancelled));
            }
            result = request => match result {
                Ok(response) => response,
                Err(e) => {
                    let err = AvatarError::from(e);
                    warn!(error = %err, "photo request failed");
                    return Ok(StepOutcome::Failed(err.to_string()));
                }
            },
        };

        let status = response.status();
        if !status.is_success() {
            debug!(status = %status, "no photo available");
            return Ok(StepOutcome::Skipped(SkipReason::NoPhoto(status.as_u16())));
        }

        let Some(version_tag) = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
        else {
            debug!("photo response has no ETag");
            return Ok(StepOutcome::Skipped(SkipReason::NoVersionTag));
        };

        let Some(mut stored) = accounts.find_by_login_identifier(&user.login)? else {
            debug!("user not in account store, skipping avatar");
            return Ok(StepOutcome::Skipped(SkipReason::UserNotPersisted));
        };

        let path = avatar_path(&version_tag);
        stored.avatar = Some(path.clone());

        if !accounts.is_dirty(&stored)? {
            debug!(path = %path, "avatar unchanged");
            user.avatar = stored.avatar;
            return Ok(StepOutcome::Skipped(SkipReason::Unchanged));
        }

        let body: ByteStream = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("login cancelled while storing photo");
                return Ok(StepOutcome::Skipped(SkipReason::Cancelled));
            }
            result = content.write_file(&path, body, true) => match result {
                Ok(n) => n,
                Err(e) => {
                    let err = AvatarError::from(e);
                    warn!(path = %path, error = %err, "storing photo failed");
                    return Ok(StepOutcome::Failed(err.to_string()));
                }
            },
        };

        accounts.save(&stored)?;
        user.avatar = stored.avatar;
        info!(path = %path, bytes = written, "avatar updated");
        Ok(StepOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avatar_path_is_deterministic() {
        let a = avatar_path("\"abc123\"");
        let b = avatar_path("\"abc123\"");
        assert_eq!(a, b);
        assert!(a.starts_with("UserAvatars/"));
        assert!(a.ends_with(".jpg"));
        // 64 hex chars between the prefix and the extension.
        assert_eq!(a.len(), "UserAvatars/".len() + 64 + ".jpg".len());
    }

    #[test]
    fn test_avatar_path_known_digest() {
        assert_eq!(
            avatar_path("abc"),
            "UserAvatars/ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad.jpg"
        );
    }

    #[test]
    fn test_distinct_tags_distinct_paths() {
        assert_ne!(avatar_path("\"v1\""), avatar_path("\"v2\""));
        assert_ne!(avatar_path("\"v1\""), avatar_path("W/\"v1\""));
    }

    #[test]
    fn test_photo_url_trims_trailing_slash() {
        let sync = AvatarSynchronizer::new("https://graph.example.com/", Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            sync.photo_url(),
            "https://graph.example.com/v1.0/me/photo/$value"
        );
    }
}
