//! Entity-agnostic CRUD over the SQLite store.
//!
//! A [`Record`] describes how one entity binds to its table; [`Store`]
//! implements the common read/write path once over any `Record`. Per-entity
//! repositories compose a `Store` and add their specialized queries on top.

use std::marker::PhantomData;
use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params_from_iter};
use thiserror::Error;

use crate::Database;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
    #[error("operation violates a foreign key or uniqueness constraint")]
    Constraint,
    #[error("database connection lock poisoned")]
    LockPoisoned,
    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(cause, _)
                if cause.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

/// Binding between a record type and its table: name, columns, row decoding,
/// and parameter encoding. The integer primary key column is always `id`.
pub trait Record: Sized + Send + 'static {
    /// Resource kind used in not-found errors, e.g. "post".
    const KIND: &'static str;
    const TABLE: &'static str;
    /// Columns other than `id`, in the order `data_values` produces them.
    const DATA_COLUMNS: &'static [&'static str];

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    /// Decode a row selected as `id, DATA_COLUMNS...`.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
    fn data_values(&self) -> Vec<Value>;
}

/// One tested implementation of the generic CRUD path, shared by every
/// entity. All reads return detached owned records: mutating a returned
/// value has no effect on the store unless it is passed back to [`update`].
///
/// [`update`]: Store::update
pub struct Store<T: Record> {
    db: Arc<Database>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Store<T> {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            _record: PhantomData,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn select_list() -> String {
        format!("id, {}", T::DATA_COLUMNS.join(", "))
    }

    pub fn get_all(&self) -> Result<Vec<T>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM {} ORDER BY id",
                Self::select_list(),
                T::TABLE
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| T::from_row(row))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<T>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM {} WHERE id = ?1",
                Self::select_list(),
                T::TABLE
            );
            let row = conn
                .query_row(&sql, [id], |row| T::from_row(row))
                .optional()?;
            Ok(row)
        })
    }

    /// Filter the table with an in-memory predicate.
    pub fn find<F>(&self, predicate: F) -> Result<Vec<T>, StoreError>
    where
        F: Fn(&T) -> bool,
    {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|record| predicate(record))
            .collect())
    }

    /// Insert a record and return it with its assigned id.
    pub fn add(&self, mut record: T) -> Result<T, StoreError> {
        self.db.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=T::DATA_COLUMNS.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                T::TABLE,
                T::DATA_COLUMNS.join(", "),
                placeholders.join(", ")
            );
            conn.execute(&sql, params_from_iter(record.data_values()))?;
            record.set_id(conn.last_insert_rowid());
            Ok(record)
        })
    }

    /// Full-record replace keyed on the record's id. Fails with
    /// [`StoreError::NotFound`] when no row has that id.
    pub fn update(&self, record: T) -> Result<T, StoreError> {
        self.db.with_conn(|conn| {
            let assignments: Vec<String> = T::DATA_COLUMNS
                .iter()
                .enumerate()
                .map(|(i, col)| format!("{col} = ?{}", i + 1))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?{}",
                T::TABLE,
                assignments.join(", "),
                T::DATA_COLUMNS.len() + 1
            );

            let mut values = record.data_values();
            values.push(Value::Integer(record.id()));

            let changed = conn.execute(&sql, params_from_iter(values))?;
            if changed == 0 {
                return Err(StoreError::NotFound {
                    kind: T::KIND,
                    id: record.id(),
                });
            }
            Ok(record)
        })
    }

    /// No-op when the id is absent.
    pub fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("DELETE FROM {} WHERE id = ?1", T::TABLE);
            conn.execute(&sql, [id])?;
            Ok(())
        })
    }

    pub fn delete(&self, record: &T) -> Result<(), StoreError> {
        self.delete_by_id(record.id())
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM {}", T::TABLE);
            let count = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count)
        })
    }

    pub fn exists(&self, id: i64) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", T::TABLE);
            let found: i64 = conn.query_row(&sql, [id], |row| row.get(0))?;
            Ok(found != 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::UserRecord;
    use chrono::Utc;

    fn store() -> Store<UserRecord> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Store::new(db)
    }

    fn user(name: &str) -> UserRecord {
        UserRecord {
            id: 0,
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "$argon2id$stub".to_string(),
            display_name: name.to_string(),
            profile_image: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn add_assigns_ids_in_order() {
        let store = store();
        let a = store.add(user("alice")).unwrap();
        let b = store.add(user("bob")).unwrap();
        assert!(a.id > 0);
        assert!(b.id > a.id);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn get_by_id_roundtrips_fields() {
        let store = store();
        let added = store.add(user("alice")).unwrap();
        let fetched = store.get_by_id(added.id).unwrap().unwrap();
        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched.email, "alice@example.com");
        assert_eq!(
            fetched.created_at.timestamp(),
            added.created_at.timestamp()
        );
        assert!(store.get_by_id(9999).unwrap().is_none());
    }

    #[test]
    fn reads_are_detached() {
        let store = store();
        let added = store.add(user("alice")).unwrap();

        let mut copy = store.get_by_id(added.id).unwrap().unwrap();
        copy.display_name = "Changed".to_string();

        // The store is untouched until the copy goes back through update.
        let fresh = store.get_by_id(added.id).unwrap().unwrap();
        assert_eq!(fresh.display_name, "alice");

        store.update(copy).unwrap();
        let fresh = store.get_by_id(added.id).unwrap().unwrap();
        assert_eq!(fresh.display_name, "Changed");
    }

    #[test]
    fn update_missing_id_is_not_found() {
        let store = store();
        let mut ghost = user("ghost");
        ghost.id = 424242;
        match store.update(ghost) {
            Err(StoreError::NotFound { kind, id }) => {
                assert_eq!(kind, "account");
                assert_eq!(id, 424242);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn delete_by_id_is_a_noop_when_absent() {
        let store = store();
        store.delete_by_id(9999).unwrap();

        let added = store.add(user("alice")).unwrap();
        store.delete_by_id(added.id).unwrap();
        assert!(!store.exists(added.id).unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn delete_record_removes_it() {
        let store = store();
        let added = store.add(user("alice")).unwrap();
        store.delete(&added).unwrap();
        assert!(store.get_by_id(added.id).unwrap().is_none());
    }

    #[test]
    fn find_filters_in_memory() {
        let store = store();
        store.add(user("alice")).unwrap();
        store.add(user("bob")).unwrap();
        store.add(user("carol")).unwrap();

        let matched = store.find(|u| u.username.starts_with('c')).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].username, "carol");
    }

    #[test]
    fn exists_reflects_membership() {
        let store = store();
        assert!(!store.exists(1).unwrap());
        let added = store.add(user("alice")).unwrap();
        assert!(store.exists(added.id).unwrap());
    }
}
