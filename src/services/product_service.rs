use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::products::{CategoryList, CreateProductRequest, ImageInput, ProductList, UpdateProductRequest},
    entity::{
        product_images::{
            ActiveModel as ImageActive, Column as ImageCol, Entity as ProductImages,
            Model as ImageModel,
        },
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{self, Product, ProductImage},
    response::{ApiResponse, Meta},
    routes::params::{CatalogSort, PAGE_SIZE, PriceRange, ProductQuery},
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let page = query.page();
    let offset = query.offset();
    let mut condition = Condition::all();

    if let Some(keyword) = query.keyword.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", keyword);
        condition = condition.add(Expr::col(Column::Name).ilike(pattern));
    }

    if let Some(category) = query.category.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(Column::Category.eq(category.clone()));
    }

    if let Some(brand) = query.brand.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(Column::Brand.eq(brand.clone()));
    }

    if let Some(raw) = query.price.as_ref().filter(|s| !s.is_empty()) {
        let range = PriceRange::parse(raw)
            .ok_or_else(|| AppError::BadRequest("Invalid price range".into()))?;
        condition = condition
            .add(Column::Price.gte(range.min))
            .add(Column::Price.lte(range.max));
    }

    let mut finder = Products::find().filter(condition);
    finder = match query.sort {
        Some(CatalogSort::PriceLow) => finder.order_by_asc(Column::Price),
        Some(CatalogSort::PriceHigh) => finder.order_by_desc(Column::Price),
        Some(CatalogSort::Newest) => finder.order_by_desc(Column::CreatedAt),
        None => finder.order_by_desc(Column::Rating),
    };

    // Count covers the full filtered set, not the returned page.
    let total = finder.clone().count(&state.orm).await? as i64;

    let models = finder
        .limit(PAGE_SIZE as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = with_images(state, models).await?;

    let meta = Meta::new(page, PAGE_SIZE, total);
    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(meta),
    ))
}

pub async fn featured_products(state: &AppState) -> AppResult<ApiResponse<ProductList>> {
    let featured = Products::find()
        .filter(Column::IsFeatured.eq(true))
        .order_by_desc(Column::Rating)
        .limit(8)
        .all(&state.orm)
        .await?;

    // Fall back to a small arbitrary selection when nothing is flagged.
    let models = if featured.is_empty() {
        Products::find()
            .order_by_desc(Column::CreatedAt)
            .limit(4)
            .all(&state.orm)
            .await?
    } else {
        featured
    };

    let items = with_images(state, models).await?;
    Ok(ApiResponse::success(
        "Featured products",
        ProductList { items },
        Some(Meta::empty()),
    ))
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT category FROM products ORDER BY category")
            .fetch_all(&state.pool)
            .await?;

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::empty()),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let model = Products::find_by_id(id).one(&state.orm).await?;
    let model = match model {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let images = ProductImages::find()
        .filter(ImageCol::ProductId.eq(id))
        .order_by_asc(ImageCol::Position)
        .all(&state.orm)
        .await?;

    Ok(ApiResponse::success(
        "Product",
        product_from_entity(model, images),
        None,
    ))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_name(&payload.name)?;
    validate_category(&payload.category)?;
    validate_price(payload.price)?;
    if let Some(original) = payload.original_price {
        validate_price(original)?;
    }
    if payload.stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }

    let id = Uuid::new_v4();
    let txn = state.orm.begin().await?;

    let active = ActiveModel {
        id: Set(id),
        name: Set(payload.name),
        brand: Set(payload.brand),
        category: Set(payload.category),
        description: Set(payload.description),
        price: Set(payload.price),
        original_price: Set(payload.original_price),
        stock: Set(payload.stock),
        sizes: Set(to_json(&payload.sizes)?),
        colors: Set(to_json(&payload.colors)?),
        rating: Set(0.0),
        num_reviews: Set(0),
        is_featured: Set(payload.is_featured),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = active.insert(&txn).await?;

    let images = insert_images(&txn, id, payload.images).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product created",
        product_from_entity(product, images),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    if let Some(category) = payload.category.as_ref() {
        validate_category(category)?;
    }
    if let Some(price) = payload.price {
        validate_price(price)?;
    }
    if let Some(original) = payload.original_price {
        validate_price(original)?;
    }
    if let Some(stock) = payload.stock {
        if stock < 0 {
            return Err(AppError::BadRequest("stock cannot be negative".into()));
        }
    }

    let txn = state.orm.begin().await?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        validate_name(&name)?;
        active.name = Set(name);
    }
    if let Some(brand) = payload.brand {
        active.brand = Set(brand);
    }
    if let Some(category) = payload.category {
        active.category = Set(category);
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if payload.original_price.is_some() {
        active.original_price = Set(payload.original_price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(sizes) = payload.sizes.as_ref() {
        active.sizes = Set(to_json(sizes)?);
    }
    if let Some(colors) = payload.colors.as_ref() {
        active.colors = Set(to_json(colors)?);
    }
    if let Some(is_featured) = payload.is_featured {
        active.is_featured = Set(is_featured);
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&txn).await?;

    let images = match payload.images {
        Some(inputs) => {
            ProductImages::delete_many()
                .filter(ImageCol::ProductId.eq(id))
                .exec(&txn)
                .await?;
            insert_images(&txn, id, inputs).await?
        }
        None => {
            ProductImages::find()
                .filter(ImageCol::ProductId.eq(id))
                .order_by_asc(ImageCol::Position)
                .all(&txn)
                .await?
        }
    };

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_update",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        product_from_entity(product, images),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id).one(&state.orm).await?;
    if existing.is_none() {
        return Err(AppError::NotFound);
    }

    let images = ProductImages::find()
        .filter(ImageCol::ProductId.eq(id))
        .all(&state.orm)
        .await?;

    // Best-effort remote cleanup: a failed asset delete is logged and never
    // blocks removal of the product record.
    for image in &images {
        if let Err(err) = state.images.delete(&image.public_id).await {
            tracing::warn!(
                public_id = %image.public_id,
                error = %err,
                "remote image delete failed"
            );
        }
    }

    // Image rows go with the product via FK cascade.
    Products::delete_by_id(id).exec(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "product_delete",
        Some("products"),
        Some(serde_json::json!({ "product_id": id, "images": images.len() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn insert_images<C: sea_orm::ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    inputs: Vec<ImageInput>,
) -> AppResult<Vec<ImageModel>> {
    let any_primary = inputs.iter().any(|i| i.is_primary.unwrap_or(false));
    let mut models = Vec::with_capacity(inputs.len());
    for (position, input) in inputs.into_iter().enumerate() {
        // First image is primary unless the caller flagged one explicitly.
        let is_primary = input.is_primary.unwrap_or(!any_primary && position == 0);
        let model = ImageActive {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            url: Set(input.url),
            public_id: Set(input.public_id),
            alt: Set(input.alt),
            is_primary: Set(is_primary),
            position: Set(position as i32),
        }
        .insert(conn)
        .await?;
        models.push(model);
    }
    Ok(models)
}

async fn with_images(
    state: &AppState,
    models: Vec<ProductModel>,
) -> AppResult<Vec<Product>> {
    let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
    let mut by_product: HashMap<Uuid, Vec<ImageModel>> = HashMap::new();
    if !ids.is_empty() {
        let images = ProductImages::find()
            .filter(ImageCol::ProductId.is_in(ids))
            .order_by_asc(ImageCol::Position)
            .all(&state.orm)
            .await?;
        for image in images {
            by_product.entry(image.product_id).or_default().push(image);
        }
    }

    Ok(models
        .into_iter()
        .map(|m| {
            let images = by_product.remove(&m.id).unwrap_or_default();
            product_from_entity(m, images)
        })
        .collect())
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }
    Ok(())
}

fn validate_category(category: &str) -> Result<(), AppError> {
    if !models::is_valid_category(category) {
        return Err(AppError::BadRequest(format!(
            "unknown category: {category}"
        )));
    }
    Ok(())
}

fn validate_price(price: i64) -> Result<(), AppError> {
    if price < 0 {
        return Err(AppError::BadRequest("price cannot be negative".into()));
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
}

fn product_from_entity(model: ProductModel, images: Vec<ImageModel>) -> Product {
    Product {
        id: model.id,
        name: model.name,
        brand: model.brand,
        category: model.category,
        description: model.description,
        price: model.price,
        original_price: model.original_price,
        stock: model.stock,
        images: images.into_iter().map(image_from_entity).collect(),
        sizes: serde_json::from_value(model.sizes).unwrap_or_default(),
        colors: serde_json::from_value(model.colors).unwrap_or_default(),
        rating: model.rating,
        num_reviews: model.num_reviews,
        is_featured: model.is_featured,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn image_from_entity(model: ImageModel) -> ProductImage {
    ProductImage {
        id: model.id,
        url: model.url,
        public_id: model.public_id,
        alt: model.alt,
        is_primary: model.is_primary,
        position: model.position,
    }
}
