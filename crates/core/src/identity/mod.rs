//! Identity reconciliation: which local groups a user holds and what the
//! account is called.
//!
//! - [`groups`]: claim values -> local group aliases, plus merge policies
//! - [`names`]: display name and login identifier with fallback
//! - [`mapping_file`]: optional TOML file extending the group lookup table

pub mod groups;
pub mod mapping_file;
pub mod names;

pub use groups::{GroupResolver, RoleMergePolicy};
pub use names::{resolve_display_name, resolve_login_identifier};
