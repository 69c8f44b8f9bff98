//! Typed query helpers for the account database.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::Database;
use crate::errors::StoreError;
use crate::models::{LocalUser, ReconcileReport};
use crate::store::AccountStore;

// ---------------------------------------------------------------------------
// Domain structs returned by queries
// ---------------------------------------------------------------------------

/// A row from the `reconcile_log` table.
#[derive(Debug, Clone)]
pub struct ReconcileLogEntry {
    pub id: i64,
    pub login: String,
    pub trigger: String,
    pub groups: String,
    pub identity: String,
    pub avatar: String,
    pub success: bool,
    pub created_at: String,
}

/// Raw `users` row before the role list is decoded.
struct UserRow {
    id: String,
    login: String,
    name: String,
    email: Option<String>,
    is_approved: bool,
    roles: String,
    avatar: Option<String>,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            login: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            is_approved: row.get(4)?,
            roles: row.get(5)?,
            avatar: row.get(6)?,
        })
    }

    fn into_user(self) -> Result<LocalUser, StoreError> {
        let roles: BTreeSet<String> =
            serde_json::from_str(&self.roles).map_err(|e| StoreError::CorruptRecord {
                login: self.login.clone(),
                detail: format!("roles column: {}", e),
            })?;
        Ok(LocalUser {
            id: self.id,
            login: self.login,
            name: self.name,
            email: self.email,
            is_approved: self.is_approved,
            roles,
            avatar: self.avatar,
        })
    }
}

const USER_COLUMNS: &str = "id, login, name, email, is_approved, roles, avatar";

fn encode_roles(roles: &BTreeSet<String>) -> String {
    // A set of strings always serializes.
    serde_json::to_string(roles).unwrap_or_else(|_| "[]".into())
}

fn map_unique_violation(err: rusqlite::Error, login: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::DuplicateLogin(login.to_string())
        }
        other => other.into(),
    }
}

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- users --------------------------------------------------------------

    /// Insert a new account. Fails with [`StoreError::DuplicateLogin`] if the
    /// login identifier is taken.
    pub fn insert_user(&self, user: &LocalUser) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (id, login, name, email, is_approved, roles, avatar, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                user.id,
                user.login,
                user.name,
                user.email,
                user.is_approved,
                encode_roles(&user.roles),
                user.avatar,
                now
            ],
        )
        .map_err(|e| map_unique_violation(e, &user.login))?;
        debug!(id = %user.id, login = %user.login, "inserted user");
        Ok(())
    }

    /// Look up an account by login identifier.
    pub fn get_user_by_login(&self, login: &str) -> Result<Option<LocalUser>, StoreError> {
        let row = {
            let conn = self.conn();
            conn.query_row(
                &format!("SELECT {} FROM users WHERE login = ?1", USER_COLUMNS),
                params![login],
                UserRow::from_row,
            )
            .optional()?
        };
        row.map(UserRow::into_user).transpose()
    }

    /// Look up an account by id.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<LocalUser>, StoreError> {
        let row = {
            let conn = self.conn();
            conn.query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                UserRow::from_row,
            )
            .optional()?
        };
        row.map(UserRow::into_user).transpose()
    }

    /// List all accounts ordered by login identifier.
    pub fn list_users(&self) -> Result<Vec<LocalUser>, StoreError> {
        let rows: Vec<UserRow> = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users ORDER BY login",
                USER_COLUMNS
            ))?;
            let rows = stmt.query_map([], UserRow::from_row)?;
            rows.collect::<Result<_, _>>()?
        };
        rows.into_iter().map(UserRow::into_user).collect()
    }

    /// Overwrite the stored attributes of an existing account.
    pub fn update_user(&self, user: &LocalUser) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE users
                 SET login = ?2, name = ?3, email = ?4, is_approved = ?5, roles = ?6,
                     avatar = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    user.id,
                    user.login,
                    user.name,
                    user.email,
                    user.is_approved,
                    encode_roles(&user.roles),
                    user.avatar,
                    now
                ],
            )
            .map_err(|e| map_unique_violation(e, &user.login))?;
        if changed == 0 {
            return Err(StoreError::UserNotFound(user.login.clone()));
        }
        debug!(id = %user.id, login = %user.login, "updated user");
        Ok(())
    }

    /// Count stored accounts.
    pub fn count_users(&self) -> Result<i64, StoreError> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- reconcile_log ------------------------------------------------------

    /// Record the outcome of one reconciliation.
    pub fn insert_reconcile_log(
        &self,
        login: &str,
        report: &ReconcileReport,
    ) -> Result<i64, StoreError> {
        let now = Utc::now().to_rfc3339();
        let success = !(report.groups.is_failed()
            || report.identity.is_failed()
            || report.avatar.is_failed());
        let conn = self.conn();
        conn.execute(
            "INSERT INTO reconcile_log
                (login, trigger_kind, groups_outcome, identity_outcome, avatar_outcome, success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                login,
                report.trigger.to_string(),
                report.groups.to_string(),
                report.identity.to_string(),
                report.avatar.to_string(),
                success,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, login, success, "inserted reconcile_log entry");
        Ok(id)
    }

    /// Most recent reconciliations for a login identifier, newest first.
    pub fn list_reconcile_log(
        &self,
        login: &str,
        limit: u32,
    ) -> Result<Vec<ReconcileLogEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, login, trigger_kind, groups_outcome, identity_outcome, avatar_outcome,
                    success, created_at
             FROM reconcile_log WHERE login = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![login, limit], |row| {
            Ok(ReconcileLogEntry {
                id: row.get(0)?,
                login: row.get(1)?,
                trigger: row.get(2)?,
                groups: row.get(3)?,
                identity: row.get(4)?,
                avatar: row.get(5)?,
                success: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Count recorded reconciliations with at least one failed step.
    pub fn count_failed_reconciliations(&self) -> Result<i64, StoreError> {
        let conn = self.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM reconcile_log WHERE success = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// AccountStore
// ---------------------------------------------------------------------------

impl AccountStore for Database {
    fn find_by_login_identifier(&self, login: &str) -> Result<Option<LocalUser>, StoreError> {
        self.get_user_by_login(login)
    }

    fn save(&self, user: &LocalUser) -> Result<(), StoreError> {
        self.update_user(user)
    }

    fn is_dirty(&self, user: &LocalUser) -> Result<bool, StoreError> {
        Ok(match self.get_user_by_id(&user.id)? {
            Some(stored) => stored != *user,
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SkipReason, StepOutcome, Trigger};

    fn db() -> Database {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_insert_and_find_user() {
        let db = db();
        let mut user = LocalUser::new("jane@example.com");
        user.add_role("editor");
        user.add_role("writer");
        db.insert_user(&user).unwrap();

        let found = db.find_by_login_identifier("jane@example.com").unwrap().unwrap();
        assert_eq!(found, user);
        assert!(db.find_by_login_identifier("nobody").unwrap().is_none());
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_login_rejected() {
        let db = db();
        db.insert_user(&LocalUser::new("jane")).unwrap();
        let result = db.insert_user(&LocalUser::new("jane"));
        assert!(matches!(result, Err(StoreError::DuplicateLogin(ref l)) if l == "jane"));
    }

    #[test]
    fn test_dirty_tracking() {
        let db = db();
        let mut user = LocalUser::new("jane");
        assert!(db.is_dirty(&user).unwrap(), "unsaved user is dirty");

        db.insert_user(&user).unwrap();
        assert!(!db.is_dirty(&user).unwrap());

        user.avatar = Some("UserAvatars/abc.jpg".into());
        assert!(db.is_dirty(&user).unwrap());

        db.save(&user).unwrap();
        assert!(!db.is_dirty(&user).unwrap());

        user.avatar = Some("UserAvatars/abc.jpg".into());
        assert!(!db.is_dirty(&user).unwrap(), "same value is not a change");
    }

    #[test]
    fn test_save_unknown_user_fails() {
        let db = db();
        let result = db.save(&LocalUser::new("ghost"));
        assert!(matches!(result, Err(StoreError::UserNotFound(_))));
    }

    #[test]
    fn test_corrupt_roles_reported() {
        let db = db();
        db.insert_user(&LocalUser::new("jane")).unwrap();
        db.conn()
            .execute("UPDATE users SET roles = 'not json' WHERE login = 'jane'", [])
            .unwrap();
        let result = db.get_user_by_login("jane");
        assert!(matches!(result, Err(StoreError::CorruptRecord { .. })));
    }

    #[test]
    fn test_list_users_sorted() {
        let db = db();
        db.insert_user(&LocalUser::new("zed")).unwrap();
        db.insert_user(&LocalUser::new("amy")).unwrap();
        let logins: Vec<String> = db.list_users().unwrap().into_iter().map(|u| u.login).collect();
        assert_eq!(logins, vec!["amy", "zed"]);
    }

    #[test]
    fn test_reconcile_log() {
        let db = db();
        let report = ReconcileReport {
            trigger: Trigger::Login,
            groups: StepOutcome::Skipped(SkipReason::Disabled),
            identity: StepOutcome::Applied,
            avatar: StepOutcome::Failed("timeout".into()),
            proceed: true,
        };
        db.insert_reconcile_log("jane", &report).unwrap();

        let entries = db.list_reconcile_log("jane", 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].trigger, "login");
        assert_eq!(entries[0].avatar, "failed: timeout");
        assert!(!entries[0].success);
        assert_eq!(db.count_failed_reconciliations().unwrap(), 1);
    }
}
