use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest},
        orders::{
            CreateOrderRequest, OrderCustomer, OrderDetail, OrderItemInput, OrderList,
            OrderWithItems, UpdateOrderStatusRequest,
        },
        products::{CategoryList, CreateProductRequest, ImageInput, ProductList, UpdateProductRequest},
        uploads::{UploadedImage, UploadedImageList},
        users::{AdminUser, AdminUserList, DashboardStats, NewUserStats, OrderStatusCounts, UpdateUserRequest},
    },
    models::{Order, OrderItem, OrderStatus, Product, ProductImage, ShippingAddress, SizeStock, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, health, orders, params, products, upload},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::diagnostic,
        auth::register,
        auth::login,
        auth::get_profile,
        auth::update_profile,
        products::list_products,
        products::featured_products,
        products::list_categories,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        orders::create_order,
        orders::my_orders,
        orders::get_order,
        admin::list_all_orders,
        admin::update_order_status,
        admin::delete_order,
        admin::dashboard_stats,
        admin::list_users,
        admin::update_user,
        admin::delete_user,
        upload::upload_image,
        upload::upload_images,
        upload::delete_image
    ),
    components(
        schemas(
            User,
            Product,
            ProductImage,
            SizeStock,
            Order,
            OrderItem,
            OrderStatus,
            ShippingAddress,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateProfileRequest,
            CreateProductRequest,
            UpdateProductRequest,
            ImageInput,
            ProductList,
            CategoryList,
            CreateOrderRequest,
            OrderItemInput,
            OrderList,
            OrderWithItems,
            OrderDetail,
            OrderCustomer,
            UpdateOrderStatusRequest,
            AdminUser,
            AdminUserList,
            UpdateUserRequest,
            DashboardStats,
            NewUserStats,
            OrderStatusCounts,
            UploadedImage,
            UploadedImageList,
            params::ProductQuery,
            params::CatalogSort,
            health::HealthData,
            health::DiagnosticData,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderDetail>,
            ApiResponse<DashboardStats>,
            ApiResponse<AdminUserList>,
            ApiResponse<UploadedImageList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and diagnostics"),
        (name = "Auth", description = "Authentication and profile"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Admin", description = "Admin endpoints"),
        (name = "Upload", description = "Image upload endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
