use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
};

use crate::{
    dto::uploads::{UploadedImage, UploadedImageList},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::upload_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(upload_image))
        .route("/multiple", post(upload_images))
        // Storage keys contain slashes, so the id is a wildcard segment.
        .route("/{*public_id}", delete(delete_image))
}

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Uploaded file metadata", body = ApiResponse<UploadedImage>),
        (status = 400, description = "Unsupported type or oversized file"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Upload"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let resp = upload_service::upload_image(&state, &user, multipart).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/upload/multiple",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Uploaded files, first marked primary", body = ApiResponse<UploadedImageList>),
        (status = 400, description = "Unsupported type or oversized file"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Upload"
)]
pub async fn upload_images(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let resp = upload_service::upload_images(&state, &user, multipart).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    delete,
    path = "/api/upload/{public_id}",
    params(
        ("public_id" = String, Path, description = "Storage key of the remote asset")
    ),
    responses(
        (status = 200, description = "Asset deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Remote asset absent"),
    ),
    security(("bearer_auth" = [])),
    tag = "Upload"
)]
pub async fn delete_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(public_id): Path<String>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = upload_service::delete_image(&state, &user, &public_id).await?;
    Ok(Json(resp))
}
