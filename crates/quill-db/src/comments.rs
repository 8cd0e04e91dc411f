use std::sync::Arc;

use rusqlite::{OptionalExtension, Row};

use crate::Database;
use crate::records::{AuthorRow, CommentDetails, CommentRecord, CommentWithAuthor, PostRecord};
use crate::store::{Record, Store, StoreError};

const COMMENT_AUTHOR_SELECT: &str =
    "SELECT c.id, c.content, c.user_id, c.post_id, c.created_at,
            u.id, u.username, u.display_name, u.profile_image
     FROM comments c
     JOIN users u ON c.user_id = u.id";

pub(crate) fn comment_with_author_row(row: &Row<'_>) -> rusqlite::Result<CommentWithAuthor> {
    Ok(CommentWithAuthor {
        comment: CommentRecord::from_row(row)?,
        author: AuthorRow {
            id: row.get(5)?,
            username: row.get(6)?,
            display_name: row.get(7)?,
            profile_image: row.get(8)?,
        },
    })
}

/// Comment repository: generic CRUD via `store`, plus the per-post and
/// per-account listings.
#[derive(Clone)]
pub struct Comments {
    pub store: Store<CommentRecord>,
    db: Arc<Database>,
}

impl Comments {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            store: Store::new(db.clone()),
            db,
        }
    }

    /// Comments on a post in chronological order, each with its author.
    pub fn get_by_post_id(&self, post_id: i64) -> Result<Vec<CommentWithAuthor>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "{COMMENT_AUTHOR_SELECT} WHERE c.post_id = ?1 ORDER BY c.created_at ASC, c.id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([post_id], comment_with_author_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// An account's comments, newest first.
    pub fn get_by_user_id(&self, user_id: i64) -> Result<Vec<CommentRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, user_id, post_id, created_at
                 FROM comments
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| CommentRecord::from_row(row))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// A comment with its author and its parent post.
    pub fn get_with_details(&self, comment_id: i64) -> Result<Option<CommentDetails>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("{COMMENT_AUTHOR_SELECT} WHERE c.id = ?1");
            let head = conn
                .query_row(&sql, [comment_id], comment_with_author_row)
                .optional()?;
            let Some(head) = head else {
                return Ok(None);
            };

            let post = conn.query_row(
                "SELECT id, title, content, image_path, user_id, created_at, updated_at
                 FROM posts WHERE id = ?1",
                [head.comment.post_id],
                |row| PostRecord::from_row(row),
            )?;

            Ok(Some(CommentDetails {
                comment: head.comment,
                author: head.author,
                post,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posts::Posts;
    use crate::records::{PostRecord, UserRecord};
    use crate::users::Users;
    use chrono::Utc;

    struct Fx {
        users: Users,
        posts: Posts,
        comments: Comments,
    }

    fn fixtures() -> Fx {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Fx {
            users: Users::new(db.clone()),
            posts: Posts::new(db.clone()),
            comments: Comments::new(db),
        }
    }

    fn user(name: &str) -> UserRecord {
        UserRecord {
            id: 0,
            username: name.to_string(),
            email: format!("{name}@x.com"),
            password_hash: "$argon2id$stub".to_string(),
            display_name: name.to_string(),
            profile_image: None,
            created_at: Utc::now(),
        }
    }

    fn post(user_id: i64, title: &str) -> PostRecord {
        PostRecord {
            id: 0,
            title: title.to_string(),
            content: "a body with at least ten characters".to_string(),
            image_path: None,
            user_id,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn comment(user_id: i64, post_id: i64, content: &str) -> CommentRecord {
        CommentRecord {
            id: 0,
            content: content.to_string(),
            user_id,
            post_id,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn per_post_listing_is_chronological() {
        let fx = fixtures();
        let alice = fx.users.store.add(user("alice")).unwrap();
        let p = fx.posts.store.add(post(alice.id, "a post")).unwrap();

        for i in 1..=3 {
            fx.comments
                .store
                .add(comment(alice.id, p.id, &format!("comment {i}")))
                .unwrap();
        }

        let listed = fx.comments.get_by_post_id(p.id).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].comment.content, "comment 1");
        assert_eq!(listed[2].comment.content, "comment 3");
        assert_eq!(listed[0].author.username, "alice");

        let newest_first = fx.comments.get_by_user_id(alice.id).unwrap();
        assert_eq!(newest_first[0].content, "comment 3");
    }

    #[test]
    fn details_carry_author_and_post() {
        let fx = fixtures();
        let alice = fx.users.store.add(user("alice")).unwrap();
        let bob = fx.users.store.add(user("bob")).unwrap();
        let p = fx.posts.store.add(post(alice.id, "a post")).unwrap();
        let c = fx
            .comments
            .store
            .add(comment(bob.id, p.id, "nice post"))
            .unwrap();

        let details = fx.comments.get_with_details(c.id).unwrap().unwrap();
        assert_eq!(details.comment.content, "nice post");
        assert_eq!(details.author.username, "bob");
        assert_eq!(details.post.id, p.id);

        assert!(fx.comments.get_with_details(9999).unwrap().is_none());
    }

    #[test]
    fn deleting_a_post_cascades_its_comments() {
        let fx = fixtures();
        let alice = fx.users.store.add(user("alice")).unwrap();
        let bob = fx.users.store.add(user("bob")).unwrap();
        let p = fx.posts.store.add(post(alice.id, "a post")).unwrap();
        fx.comments
            .store
            .add(comment(bob.id, p.id, "gone soon"))
            .unwrap();

        fx.posts.store.delete_by_id(p.id).unwrap();
        assert_eq!(fx.comments.store.count().unwrap(), 0);
    }

    #[test]
    fn deleting_an_account_cascades_posts_and_their_comments() {
        let fx = fixtures();
        let alice = fx.users.store.add(user("alice")).unwrap();
        let bob = fx.users.store.add(user("bob")).unwrap();

        let p1 = fx.posts.store.add(post(alice.id, "first")).unwrap();
        let p2 = fx.posts.store.add(post(alice.id, "second")).unwrap();
        // Bob's comments live on Alice's posts, so they go with the posts.
        fx.comments
            .store
            .add(comment(bob.id, p1.id, "on first"))
            .unwrap();
        fx.comments
            .store
            .add(comment(bob.id, p2.id, "on second"))
            .unwrap();

        fx.users.store.delete_by_id(alice.id).unwrap();

        assert_eq!(fx.posts.store.count().unwrap(), 0);
        assert_eq!(fx.comments.store.count().unwrap(), 0);
        assert!(fx.users.store.exists(bob.id).unwrap());
    }

    #[test]
    fn deleting_a_commenter_is_restricted() {
        let fx = fixtures();
        let alice = fx.users.store.add(user("alice")).unwrap();
        let bob = fx.users.store.add(user("bob")).unwrap();
        let p = fx.posts.store.add(post(alice.id, "a post")).unwrap();
        fx.comments
            .store
            .add(comment(bob.id, p.id, "sticky comment"))
            .unwrap();

        let result = fx.users.store.delete_by_id(bob.id);
        assert!(matches!(result, Err(StoreError::Constraint)));
        assert!(fx.users.store.exists(bob.id).unwrap());
    }
}
