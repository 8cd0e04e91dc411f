use std::sync::Arc;

use rusqlite::{OptionalExtension, Row};

use crate::Database;
use crate::comments::comment_with_author_row;
use crate::records::{AuthorRow, PostDetails, PostRecord, PostWithAuthor};
use crate::store::{Record, Store, StoreError};

// JOIN users so every listing carries its author in a single query.
const POST_AUTHOR_SELECT: &str =
    "SELECT p.id, p.title, p.content, p.image_path, p.user_id, p.created_at, p.updated_at,
            u.id, u.username, u.display_name, u.profile_image,
            (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id)
     FROM posts p
     JOIN users u ON p.user_id = u.id";

// Stable newest-first order: created_at has second resolution, so ties fall
// back to the monotonic id.
const NEWEST_FIRST: &str = "ORDER BY p.created_at DESC, p.id DESC";

fn post_with_author_row(row: &Row<'_>) -> rusqlite::Result<PostWithAuthor> {
    Ok(PostWithAuthor {
        post: PostRecord::from_row(row)?,
        author: AuthorRow {
            id: row.get(7)?,
            username: row.get(8)?,
            display_name: row.get(9)?,
            profile_image: row.get(10)?,
        },
        comment_count: row.get(11)?,
    })
}

/// Post repository: generic CRUD via `store`, plus listing, search, and the
/// eager detail fetch.
#[derive(Clone)]
pub struct Posts {
    pub store: Store<PostRecord>,
    db: Arc<Database>,
}

impl Posts {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            store: Store::new(db.clone()),
            db,
        }
    }

    /// Newest-first page. Callers clamp `page_number >= 1` and
    /// `page_size` into [1, 100] before invoking.
    pub fn get_paged(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> Result<Vec<PostWithAuthor>, StoreError> {
        let offset = (page_number - 1) * page_size;
        self.db.with_conn(|conn| {
            let sql = format!("{POST_AUTHOR_SELECT} {NEWEST_FIRST} LIMIT ?1 OFFSET ?2");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([page_size as i64, offset as i64], post_with_author_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Case-insensitive substring match on the title, newest first.
    pub fn search_by_title(&self, term: &str) -> Result<Vec<PostWithAuthor>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "{POST_AUTHOR_SELECT} WHERE LOWER(p.title) LIKE '%' || LOWER(?1) || '%' {NEWEST_FIRST}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([term], post_with_author_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_recent(&self, count: u32) -> Result<Vec<PostWithAuthor>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("{POST_AUTHOR_SELECT} {NEWEST_FIRST} LIMIT ?1");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([count as i64], post_with_author_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_by_user_id(&self, user_id: i64) -> Result<Vec<PostWithAuthor>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("{POST_AUTHOR_SELECT} WHERE p.user_id = ?1 {NEWEST_FIRST}");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], post_with_author_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The post with its author and all comments (each with its own author)
    /// in one logical fetch.
    pub fn get_with_details(&self, post_id: i64) -> Result<Option<PostDetails>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("{POST_AUTHOR_SELECT} WHERE p.id = ?1");
            let head = conn
                .query_row(&sql, [post_id], post_with_author_row)
                .optional()?;
            let Some(head) = head else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT c.id, c.content, c.user_id, c.post_id, c.created_at,
                        u.id, u.username, u.display_name, u.profile_image
                 FROM comments c
                 JOIN users u ON c.user_id = u.id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at ASC, c.id ASC",
            )?;
            let comments = stmt
                .query_map([post_id], comment_with_author_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Some(PostDetails {
                post: head.post,
                author: head.author,
                comments,
            }))
        })
    }
}
