use std::sync::Arc;

use rusqlite::OptionalExtension;

use crate::Database;
use crate::records::{PostRecord, UserRecord};
use crate::store::{Record, Store, StoreError};

const USER_SELECT: &str =
    "SELECT id, username, email, password_hash, display_name, profile_image, created_at
     FROM users";

/// Account repository: the generic CRUD path via `store`, plus the lookups
/// the auth flow needs.
#[derive(Clone)]
pub struct Users {
    pub store: Store<UserRecord>,
    db: Arc<Database>,
}

impl Users {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            store: Store::new(db.clone()),
            db,
        }
    }

    pub fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("{USER_SELECT} WHERE username = ?1");
            let row = conn
                .query_row(&sql, [username], |row| UserRecord::from_row(row))
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("{USER_SELECT} WHERE email = ?1");
            let row = conn
                .query_row(&sql, [email], |row| UserRecord::from_row(row))
                .optional()?;
            Ok(row)
        })
    }

    pub fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let found: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                [username],
                |row| row.get(0),
            )?;
            Ok(found != 0)
        })
    }

    pub fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let found: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                [email],
                |row| row.get(0),
            )?;
            Ok(found != 0)
        })
    }

    /// An account together with its posts, newest first.
    pub fn get_with_posts(
        &self,
        user_id: i64,
    ) -> Result<Option<(UserRecord, Vec<PostRecord>)>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("{USER_SELECT} WHERE id = ?1");
            let user = conn
                .query_row(&sql, [user_id], |row| UserRecord::from_row(row))
                .optional()?;
            let Some(user) = user else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT id, title, content, image_path, user_id, created_at, updated_at
                 FROM posts
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let posts = stmt
                .query_map([user_id], |row| PostRecord::from_row(row))?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Some((user, posts)))
        })
    }
}
