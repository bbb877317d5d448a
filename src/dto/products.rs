use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Product, SizeStock};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ImageInput {
    pub url: String,
    pub public_id: String,
    pub alt: Option<String>,
    pub is_primary: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub brand: String,
    pub category: String,
    pub description: String,
    pub price: i64,
    pub original_price: Option<i64>,
    pub stock: i32,
    #[serde(default)]
    pub images: Vec<ImageInput>,
    #[serde(default)]
    pub sizes: Vec<SizeStock>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub is_featured: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub original_price: Option<i64>,
    pub stock: Option<i32>,
    /// When present, replaces the whole image set.
    pub images: Option<Vec<ImageInput>>,
    pub sizes: Option<Vec<SizeStock>>,
    pub colors: Option<Vec<String>>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct CategoryList {
    #[schema(value_type = Vec<String>)]
    pub items: Vec<String>,
}
