use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use quill_auth::token::Claims;
use quill_db::records::{AuthorRow, PostDetails, PostRecord, PostWithAuthor, UserRecord};
use quill_types::api::{
    AuthorView, CreatePostRequest, Paginated, PostDetailResponse, PostResponse, UpdatePostRequest,
};

use crate::auth::{AppState, AppStateInner};
use crate::comments::comment_response;
use crate::error::ApiError;
use crate::ownership::require_owner;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

pub(crate) fn author_view(author: &AuthorRow) -> AuthorView {
    AuthorView {
        id: author.id,
        username: author.username.clone(),
        display_name: author.display_name.clone(),
        profile_image: author.profile_image.clone(),
    }
}

fn post_response(row: &PostWithAuthor) -> PostResponse {
    PostResponse {
        id: row.post.id,
        title: row.post.title.clone(),
        content: row.post.content.clone(),
        image_path: row.post.image_path.clone(),
        created_at: row.post.created_at,
        updated_at: row.post.updated_at,
        author: author_view(&row.author),
        comment_count: row.comment_count,
    }
}

fn post_detail_response(details: PostDetails) -> PostDetailResponse {
    PostDetailResponse {
        id: details.post.id,
        title: details.post.title,
        content: details.post.content,
        image_path: details.post.image_path,
        created_at: details.post.created_at,
        updated_at: details.post.updated_at,
        author: author_view(&details.author),
        comments: details.comments.iter().map(comment_response).collect(),
    }
}

fn validate_title(title: &str) -> Result<(), ApiError> {
    if title.len() < 3 || title.len() > 200 {
        return Err(ApiError::BadRequest("title must be 3-200 characters".into()));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), ApiError> {
    if content.len() < 10 || content.len() > 10000 {
        return Err(ApiError::BadRequest(
            "content must be 10-10000 characters".into(),
        ));
    }
    Ok(())
}

// -- Handlers --

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let body = tokio::task::spawn_blocking(move || list_posts_sync(&state, query))
        .await
        .map_err(ApiError::from_join)??;
    Ok(Json(body))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let body = tokio::task::spawn_blocking(move || get_post_sync(&state, id))
        .await
        .map_err(ApiError::from_join)??;
    Ok(Json(body))
}

pub async fn search_posts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let body = tokio::task::spawn_blocking(move || search_posts_sync(&state, &query.query))
        .await
        .map_err(ApiError::from_join)??;
    Ok(Json(body))
}

pub async fn my_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let body = tokio::task::spawn_blocking(move || my_posts_sync(&state, claims.sub))
        .await
        .map_err(ApiError::from_join)??;
    Ok(Json(body))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let body = tokio::task::spawn_blocking(move || create_post_sync(&state, claims.sub, req))
        .await
        .map_err(ApiError::from_join)??;
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let body = tokio::task::spawn_blocking(move || update_post_sync(&state, claims.sub, id, req))
        .await
        .map_err(ApiError::from_join)??;
    Ok(Json(body))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    tokio::task::spawn_blocking(move || delete_post_sync(&state, claims.sub, id))
        .await
        .map_err(ApiError::from_join)??;
    Ok(StatusCode::NO_CONTENT)
}

// -- Blocking bodies, testable without the HTTP layer --

pub(crate) fn list_posts_sync(
    state: &AppStateInner,
    query: ListQuery,
) -> Result<Paginated<PostResponse>, ApiError> {
    let page = query.page.max(1);
    let page_size = if query.page_size < 1 || query.page_size > 100 {
        10
    } else {
        query.page_size
    };

    let rows = state.posts.get_paged(page, page_size)?;
    let total_count = state.posts.store.count()?;
    let total_pages = (total_count + page_size as i64 - 1) / page_size as i64;

    Ok(Paginated {
        data: rows.iter().map(post_response).collect(),
        page,
        page_size,
        total_count,
        total_pages,
    })
}

pub(crate) fn get_post_sync(
    state: &AppStateInner,
    id: i64,
) -> Result<PostDetailResponse, ApiError> {
    let details = state
        .posts
        .get_with_details(id)?
        .ok_or(ApiError::NotFound { kind: "post", id })?;
    Ok(post_detail_response(details))
}

pub(crate) fn search_posts_sync(
    state: &AppStateInner,
    term: &str,
) -> Result<Vec<PostResponse>, ApiError> {
    if term.trim().is_empty() {
        return Err(ApiError::BadRequest("query parameter is required".into()));
    }
    let rows = state.posts.search_by_title(term)?;
    Ok(rows.iter().map(post_response).collect())
}

pub(crate) fn my_posts_sync(
    state: &AppStateInner,
    actor: i64,
) -> Result<Vec<PostResponse>, ApiError> {
    let rows = state.posts.get_by_user_id(actor)?;
    Ok(rows.iter().map(post_response).collect())
}

pub(crate) fn create_post_sync(
    state: &AppStateInner,
    actor: i64,
    req: CreatePostRequest,
) -> Result<PostResponse, ApiError> {
    validate_title(&req.title)?;
    validate_content(&req.content)?;

    // The token may outlive its account.
    let user: UserRecord = state
        .users
        .store
        .get_by_id(actor)?
        .ok_or(ApiError::Unauthenticated)?;

    let post = state.posts.store.add(PostRecord {
        id: 0,
        title: req.title,
        content: req.content,
        image_path: req.image_path,
        user_id: user.id,
        created_at: Utc::now(),
        updated_at: None,
    })?;

    info!("post {} created by account {}", post.id, user.id);

    Ok(PostResponse {
        id: post.id,
        title: post.title,
        content: post.content,
        image_path: post.image_path,
        created_at: post.created_at,
        updated_at: post.updated_at,
        author: AuthorView {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            profile_image: user.profile_image,
        },
        comment_count: 0,
    })
}

/// Partial merge: only provided fields change, then the whole record is
/// written back through the store.
pub(crate) fn update_post_sync(
    state: &AppStateInner,
    actor: i64,
    id: i64,
    req: UpdatePostRequest,
) -> Result<PostDetailResponse, ApiError> {
    let mut post = state
        .posts
        .store
        .get_by_id(id)?
        .ok_or(ApiError::NotFound { kind: "post", id })?;

    require_owner(actor, post.user_id)?;

    if let Some(title) = req.title {
        validate_title(&title)?;
        post.title = title;
    }
    if let Some(content) = req.content {
        validate_content(&content)?;
        post.content = content;
    }
    if let Some(image_path) = req.image_path {
        post.image_path = Some(image_path);
    }
    post.updated_at = Some(Utc::now());

    let post = state.posts.store.update(post)?;
    info!("post {} updated by account {}", post.id, actor);

    get_post_sync(state, post.id)
}

pub(crate) fn delete_post_sync(state: &AppStateInner, actor: i64, id: i64) -> Result<(), ApiError> {
    let post = state
        .posts
        .store
        .get_by_id(id)?
        .ok_or(ApiError::NotFound { kind: "post", id })?;

    require_owner(actor, post.user_id)?;

    state.posts.store.delete(&post)?;
    info!("post {} deleted by account {}", post.id, actor);
    Ok(())
}
