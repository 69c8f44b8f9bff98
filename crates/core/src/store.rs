//! Collaborator interfaces the engine consumes.
//!
//! The engine never creates or deletes accounts and never decides on its own
//! whether an account has unsaved changes: both are the account store's job.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::errors::{ContentError, StoreError};
use crate::models::LocalUser;

/// Local account store.
pub trait AccountStore: Send + Sync {
    /// Look up the persisted account for a login identifier.
    fn find_by_login_identifier(&self, login: &str) -> Result<Option<LocalUser>, StoreError>;

    /// Persist every engine-visible attribute of `user`.
    fn save(&self, user: &LocalUser) -> Result<(), StoreError>;

    /// Whether `user` differs from its persisted state. An account that has
    /// never been saved is dirty.
    fn is_dirty(&self, user: &LocalUser) -> Result<bool, StoreError>;
}

/// A stream of body chunks, as produced by an HTTP response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Media file store addressed by relative paths.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Write `body` to `path`, returning the number of bytes written.
    ///
    /// With `overwrite = false` an existing file is an error.
    async fn write_file(
        &self,
        path: &str,
        body: ByteStream,
        overwrite: bool,
    ) -> Result<u64, ContentError>;
}
