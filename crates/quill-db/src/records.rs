//! Database row types. These map directly to SQLite rows and stay distinct
//! from the API DTOs in quill-types so the DB layer is independent of the
//! HTTP surface.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::{Type, Value};

use crate::store::Record;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PostRecord {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub image_path: Option<String>,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CommentRecord {
    pub id: i64,
    pub content: String,
    pub user_id: i64,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}

// -- Joined shapes for eager fetches --

/// Public author columns pulled alongside a post or comment.
#[derive(Debug, Clone)]
pub struct AuthorRow {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PostWithAuthor {
    pub post: PostRecord,
    pub author: AuthorRow,
    pub comment_count: i64,
}

#[derive(Debug, Clone)]
pub struct CommentWithAuthor {
    pub comment: CommentRecord,
    pub author: AuthorRow,
}

/// A post together with its author and all comments, each comment carrying
/// its own author. One logical fetch for the presentation layer.
#[derive(Debug, Clone)]
pub struct PostDetails {
    pub post: PostRecord,
    pub author: AuthorRow,
    pub comments: Vec<CommentWithAuthor>,
}

#[derive(Debug, Clone)]
pub struct CommentDetails {
    pub comment: CommentRecord,
    pub author: AuthorRow,
    pub post: PostRecord,
}

// -- Timestamp mapping --

/// Timestamps are written as RFC 3339, but rows created by the schema
/// default arrive as SQLite's "YYYY-MM-DD HH:MM:SS" without timezone, so
/// parse that as naive UTC and convert.
pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|naive| naive.and_utc())
        })
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn opt_text(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

fn timestamp(value: &DateTime<Utc>) -> Value {
    Value::Text(value.to_rfc3339())
}

fn opt_timestamp(value: &Option<DateTime<Utc>>) -> Value {
    match value {
        Some(dt) => Value::Text(dt.to_rfc3339()),
        None => Value::Null,
    }
}

// -- Record bindings --

impl Record for UserRecord {
    const KIND: &'static str = "account";
    const TABLE: &'static str = "users";
    const DATA_COLUMNS: &'static [&'static str] = &[
        "username",
        "email",
        "password_hash",
        "display_name",
        "profile_image",
        "created_at",
    ];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            display_name: row.get(4)?,
            profile_image: row.get(5)?,
            created_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
        })
    }

    fn data_values(&self) -> Vec<Value> {
        vec![
            text(&self.username),
            text(&self.email),
            text(&self.password_hash),
            text(&self.display_name),
            opt_text(&self.profile_image),
            timestamp(&self.created_at),
        ]
    }
}

impl Record for PostRecord {
    const KIND: &'static str = "post";
    const TABLE: &'static str = "posts";
    const DATA_COLUMNS: &'static [&'static str] = &[
        "title",
        "content",
        "image_path",
        "user_id",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let updated_at = match row.get::<_, Option<String>>(6)? {
            Some(raw) => Some(parse_timestamp(6, &raw)?),
            None => None,
        };
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            image_path: row.get(3)?,
            user_id: row.get(4)?,
            created_at: parse_timestamp(5, &row.get::<_, String>(5)?)?,
            updated_at,
        })
    }

    fn data_values(&self) -> Vec<Value> {
        vec![
            text(&self.title),
            text(&self.content),
            opt_text(&self.image_path),
            Value::Integer(self.user_id),
            timestamp(&self.created_at),
            opt_timestamp(&self.updated_at),
        ]
    }
}

impl Record for CommentRecord {
    const KIND: &'static str = "comment";
    const TABLE: &'static str = "comments";
    const DATA_COLUMNS: &'static [&'static str] = &["content", "user_id", "post_id", "created_at"];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content: row.get(1)?,
            user_id: row.get(2)?,
            post_id: row.get(3)?,
            created_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
        })
    }

    fn data_values(&self) -> Vec<Value> {
        vec![
            text(&self.content),
            Value::Integer(self.user_id),
            Value::Integer(self.post_id),
            timestamp(&self.created_at),
        ]
    }
}
