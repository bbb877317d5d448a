use axum::extract::Multipart;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::uploads::{UploadedImage, UploadedImageList},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    state::AppState,
};

const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];
const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const MAX_FILES: usize = 6;

struct PendingFile {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

pub async fn upload_image(
    state: &AppState,
    user: &AuthUser,
    multipart: Multipart,
) -> AppResult<ApiResponse<UploadedImage>> {
    ensure_admin(user)?;
    let mut files = read_files(multipart, 1).await?;
    let file = files.pop().ok_or_else(|| {
        AppError::BadRequest("expected one image file".into())
    })?;

    let uploaded = store(state, user, file, true).await?;
    Ok(ApiResponse::success(
        "Image uploaded",
        uploaded,
        Some(Meta::empty()),
    ))
}

pub async fn upload_images(
    state: &AppState,
    user: &AuthUser,
    multipart: Multipart,
) -> AppResult<ApiResponse<UploadedImageList>> {
    ensure_admin(user)?;
    let files = read_files(multipart, MAX_FILES).await?;
    if files.is_empty() {
        return Err(AppError::BadRequest("expected at least one image file".into()));
    }

    let mut items = Vec::with_capacity(files.len());
    for (index, file) in files.into_iter().enumerate() {
        // First file is primary by convention.
        let uploaded = store(state, user, file, index == 0).await?;
        items.push(uploaded);
    }

    Ok(ApiResponse::success(
        "Images uploaded",
        UploadedImageList { items },
        Some(Meta::empty()),
    ))
}

pub async fn delete_image(
    state: &AppState,
    user: &AuthUser,
    public_id: &str,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    state.images.delete(public_id).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "image_delete",
        Some("images"),
        Some(serde_json::json!({ "public_id": public_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Image deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn read_files(mut multipart: Multipart, max_files: usize) -> AppResult<Vec<PendingFile>> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Invalid multipart payload".into()))?
    {
        if field.file_name().is_none() {
            continue;
        }
        if files.len() == max_files {
            return Err(AppError::BadRequest(format!(
                "at most {max_files} files per upload"
            )));
        }

        let filename = field
            .file_name()
            .unwrap_or("upload")
            .to_string();
        let content_type = field
            .content_type()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("missing content type".into()))?;
        if !is_allowed_mime(&content_type) {
            return Err(AppError::BadRequest(format!(
                "unsupported image type: {content_type}"
            )));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|_| AppError::BadRequest("Invalid multipart payload".into()))?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AppError::BadRequest("image exceeds 5 MiB".into()));
        }

        files.push(PendingFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Ok(files)
}

async fn store(
    state: &AppState,
    user: &AuthUser,
    file: PendingFile,
    is_primary: bool,
) -> AppResult<UploadedImage> {
    let key = format!("products/{}", Uuid::new_v4());
    let asset = state
        .images
        .upload(&key, &file.filename, &file.content_type, file.bytes)
        .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "image_upload",
        Some("images"),
        Some(serde_json::json!({ "public_id": asset.public_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(UploadedImage {
        url: asset.url,
        public_id: asset.public_id,
        is_primary,
    })
}

fn is_allowed_mime(content_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&content_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_image_mime_types_are_accepted() {
        assert!(is_allowed_mime("image/jpeg"));
        assert!(is_allowed_mime("image/png"));
        assert!(is_allowed_mime("image/webp"));
        assert!(!is_allowed_mime("application/pdf"));
        assert!(!is_allowed_mime("image/svg+xml"));
        assert!(!is_allowed_mime("text/html"));
    }
}
