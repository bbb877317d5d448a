use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadedImage {
    pub url: String,
    pub public_id: String,
    pub is_primary: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadedImageList {
    pub items: Vec<UploadedImage>,
}
