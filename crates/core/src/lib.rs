//! claimsync core library.
//!
//! Reconciles an external identity provider's verified claims with a local
//! user account on first-time linking and on every later login: group
//! membership from claims, display name and login identifier, and a
//! content-addressed copy of the user's profile picture.

pub mod avatar;
pub mod claims;
pub mod config;
pub mod db;
pub mod errors;
pub mod identity;
pub mod media;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod store;

// Re-exports for convenience.
pub use avatar::{avatar_path, AvatarSynchronizer};
pub use claims::{Claim, ClaimSet, ExternalLoginInfo};
pub use config::AppConfig;
pub use db::Database;
pub use identity::{GroupResolver, RoleMergePolicy};
pub use media::FileSystemContentStore;
pub use models::{LocalUser, ReconcileReport, SkipReason, StepOutcome};
pub use reconcile::ExternalLoginProvider;
pub use store::{AccountStore, ContentStore};
pub use tokio_util::sync::CancellationToken;
