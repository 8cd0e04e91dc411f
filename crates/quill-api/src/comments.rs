use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;

use quill_auth::token::Claims;
use quill_db::records::{CommentRecord, CommentWithAuthor};
use quill_types::api::{CommentResponse, CreateCommentRequest, UpdateCommentRequest};

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiError;
use crate::ownership::require_owner;
use crate::posts::author_view;

pub(crate) fn comment_response(row: &CommentWithAuthor) -> CommentResponse {
    CommentResponse {
        id: row.comment.id,
        content: row.comment.content.clone(),
        post_id: row.comment.post_id,
        created_at: row.comment.created_at,
        author: author_view(&row.author),
    }
}

fn validate_comment(content: &str) -> Result<(), ApiError> {
    if content.is_empty() || content.len() > 1000 {
        return Err(ApiError::BadRequest(
            "comment must be 1-1000 characters".into(),
        ));
    }
    Ok(())
}

/// A comment addressed under the wrong post is a caller mistake, not a 404.
fn require_same_post(comment: &CommentRecord, post_id: i64) -> Result<(), ApiError> {
    if comment.post_id != post_id {
        return Err(ApiError::BadRequest(
            "comment does not belong to the specified post".into(),
        ));
    }
    Ok(())
}

// -- Handlers --

pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let body = tokio::task::spawn_blocking(move || list_comments_sync(&state, post_id))
        .await
        .map_err(ApiError::from_join)??;
    Ok(Json(body))
}

pub async fn get_comment(
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let body = tokio::task::spawn_blocking(move || get_comment_sync(&state, post_id, comment_id))
        .await
        .map_err(ApiError::from_join)??;
    Ok(Json(body))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let body =
        tokio::task::spawn_blocking(move || create_comment_sync(&state, claims.sub, post_id, req))
            .await
            .map_err(ApiError::from_join)??;
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn update_comment(
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let body = tokio::task::spawn_blocking(move || {
        update_comment_sync(&state, claims.sub, post_id, comment_id, req)
    })
    .await
    .map_err(ApiError::from_join)??;
    Ok(Json(body))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    tokio::task::spawn_blocking(move || {
        delete_comment_sync(&state, claims.sub, post_id, comment_id)
    })
    .await
    .map_err(ApiError::from_join)??;
    Ok(StatusCode::NO_CONTENT)
}

// -- Blocking bodies --

pub(crate) fn list_comments_sync(
    state: &AppStateInner,
    post_id: i64,
) -> Result<Vec<CommentResponse>, ApiError> {
    if !state.posts.store.exists(post_id)? {
        return Err(ApiError::NotFound {
            kind: "post",
            id: post_id,
        });
    }
    let rows = state.comments.get_by_post_id(post_id)?;
    Ok(rows.iter().map(comment_response).collect())
}

pub(crate) fn get_comment_sync(
    state: &AppStateInner,
    post_id: i64,
    comment_id: i64,
) -> Result<CommentResponse, ApiError> {
    let details = state
        .comments
        .get_with_details(comment_id)?
        .ok_or(ApiError::NotFound {
            kind: "comment",
            id: comment_id,
        })?;
    require_same_post(&details.comment, post_id)?;

    Ok(CommentResponse {
        id: details.comment.id,
        content: details.comment.content,
        post_id: details.comment.post_id,
        created_at: details.comment.created_at,
        author: author_view(&details.author),
    })
}

pub(crate) fn create_comment_sync(
    state: &AppStateInner,
    actor: i64,
    post_id: i64,
    req: CreateCommentRequest,
) -> Result<CommentResponse, ApiError> {
    validate_comment(&req.content)?;

    if !state.posts.store.exists(post_id)? {
        return Err(ApiError::NotFound {
            kind: "post",
            id: post_id,
        });
    }

    let user = state
        .users
        .store
        .get_by_id(actor)?
        .ok_or(ApiError::Unauthenticated)?;

    let comment = state.comments.store.add(CommentRecord {
        id: 0,
        content: req.content,
        user_id: user.id,
        post_id,
        created_at: Utc::now(),
    })?;

    info!("comment {} created on post {post_id} by account {actor}", comment.id);

    Ok(CommentResponse {
        id: comment.id,
        content: comment.content,
        post_id: comment.post_id,
        created_at: comment.created_at,
        author: author_view(&quill_db::records::AuthorRow {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            profile_image: user.profile_image,
        }),
    })
}

pub(crate) fn update_comment_sync(
    state: &AppStateInner,
    actor: i64,
    post_id: i64,
    comment_id: i64,
    req: UpdateCommentRequest,
) -> Result<CommentResponse, ApiError> {
    validate_comment(&req.content)?;

    let mut comment = state
        .comments
        .store
        .get_by_id(comment_id)?
        .ok_or(ApiError::NotFound {
            kind: "comment",
            id: comment_id,
        })?;
    require_same_post(&comment, post_id)?;
    require_owner(actor, comment.user_id)?;

    comment.content = req.content;
    state.comments.store.update(comment)?;
    info!("comment {comment_id} updated by account {actor}");

    get_comment_sync(state, post_id, comment_id)
}

pub(crate) fn delete_comment_sync(
    state: &AppStateInner,
    actor: i64,
    post_id: i64,
    comment_id: i64,
) -> Result<(), ApiError> {
    let comment = state
        .comments
        .store
        .get_by_id(comment_id)?
        .ok_or(ApiError::NotFound {
            kind: "comment",
            id: comment_id,
        })?;
    require_same_post(&comment, post_id)?;
    require_owner(actor, comment.user_id)?;

    state.comments.store.delete(&comment)?;
    info!("comment {comment_id} deleted by account {actor}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::register_account;
    use crate::posts::create_post_sync;
    use quill_auth::token::TokenIssuer;
    use quill_db::Database;
    use quill_types::api::{CreatePostRequest, RegisterRequest};
    use std::sync::Arc;

    fn test_state() -> AppStateInner {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let tokens = TokenIssuer::new(
            "test-secret".into(),
            "quill".into(),
            "quill-clients".into(),
            60,
        );
        AppStateInner::new(db, tokens)
    }

    fn register(state: &AppStateInner, name: &str) -> i64 {
        register_account(
            state,
            RegisterRequest {
                username: name.to_string(),
                email: format!("{name}@x.com"),
                password: "a decent password".to_string(),
                display_name: name.to_string(),
            },
        )
        .unwrap()
        .user
        .id
    }

    fn make_post(state: &AppStateInner, owner: i64) -> i64 {
        create_post_sync(
            state,
            owner,
            CreatePostRequest {
                title: "a post title".into(),
                content: "a body with at least ten characters".into(),
                image_path: None,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn comment_lifecycle_with_ownership() {
        let state = test_state();
        let alice = register(&state, "alice");
        let bob = register(&state, "bob");
        let post = make_post(&state, alice);

        let comment = create_comment_sync(
            &state,
            bob,
            post,
            CreateCommentRequest {
                content: "bob's take".into(),
            },
        )
        .unwrap();
        assert_eq!(comment.author.username, "bob");

        // Alice owns the post but not the comment.
        assert!(matches!(
            update_comment_sync(
                &state,
                alice,
                post,
                comment.id,
                UpdateCommentRequest {
                    content: "edited by alice".into()
                }
            ),
            Err(ApiError::Forbidden)
        ));
        assert!(matches!(
            delete_comment_sync(&state, alice, post, comment.id),
            Err(ApiError::Forbidden)
        ));

        let updated = update_comment_sync(
            &state,
            bob,
            post,
            comment.id,
            UpdateCommentRequest {
                content: "bob's edited take".into(),
            },
        )
        .unwrap();
        assert_eq!(updated.content, "bob's edited take");

        delete_comment_sync(&state, bob, post, comment.id).unwrap();
        assert!(matches!(
            get_comment_sync(&state, post, comment.id),
            Err(ApiError::NotFound { kind: "comment", .. })
        ));
    }

    #[test]
    fn listing_requires_the_post_to_exist() {
        let state = test_state();
        let alice = register(&state, "alice");
        let post = make_post(&state, alice);

        assert!(list_comments_sync(&state, post).unwrap().is_empty());
        assert!(matches!(
            list_comments_sync(&state, 999),
            Err(ApiError::NotFound { kind: "post", .. })
        ));

        create_comment_sync(
            &state,
            alice,
            post,
            CreateCommentRequest {
                content: "first".into(),
            },
        )
        .unwrap();
        let listed = list_comments_sync(&state, post).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "first");
    }

    #[test]
    fn wrong_post_id_is_a_bad_request() {
        let state = test_state();
        let alice = register(&state, "alice");
        let post_a = make_post(&state, alice);
        let post_b = make_post(&state, alice);

        let comment = create_comment_sync(
            &state,
            alice,
            post_a,
            CreateCommentRequest {
                content: "on post a".into(),
            },
        )
        .unwrap();

        assert!(matches!(
            get_comment_sync(&state, post_b, comment.id),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            delete_comment_sync(&state, alice, post_b, comment.id),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn commenting_on_a_missing_post_is_not_found() {
        let state = test_state();
        let alice = register(&state, "alice");
        assert!(matches!(
            create_comment_sync(
                &state,
                alice,
                999,
                CreateCommentRequest {
                    content: "into the void".into()
                }
            ),
            Err(ApiError::NotFound { kind: "post", .. })
        ));
    }

    #[test]
    fn empty_and_oversized_comments_are_rejected() {
        let state = test_state();
        let alice = register(&state, "alice");
        let post = make_post(&state, alice);

        assert!(matches!(
            create_comment_sync(
                &state,
                alice,
                post,
                CreateCommentRequest { content: "".into() }
            ),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            create_comment_sync(
                &state,
                alice,
                post,
                CreateCommentRequest {
                    content: "x".repeat(1001)
                }
            ),
            Err(ApiError::BadRequest(_))
        ));
    }
}
