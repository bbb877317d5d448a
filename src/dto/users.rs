use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Administrative user listing row, enriched with order aggregates in a
/// single grouped query.
#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct AdminUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub order_count: i64,
    /// Sum of `total_price` over this user's Delivered orders.
    pub total_spent: i64,
    pub last_order_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminUserList {
    pub items: Vec<AdminUser>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NewUserStats {
    pub today: i64,
    pub this_week: i64,
    pub this_month: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderStatusCounts {
    pub processing: i64,
    pub shipped: i64,
    pub delivered: i64,
    pub cancelled: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub products: i64,
    pub users: i64,
    pub orders: i64,
    /// Revenue in minor units over Delivered orders.
    pub revenue: i64,
    pub new_users: NewUserStats,
    pub order_status_counts: OrderStatusCounts,
}
