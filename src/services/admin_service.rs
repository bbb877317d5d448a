use chrono::{DateTime, Duration, Local, Months, NaiveTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::{
        orders::{OrderList, UpdateOrderStatusRequest},
        users::{AdminUser, AdminUserList, DashboardStats, NewUserStats, OrderStatusCounts, UpdateUserRequest},
    },
    entity::{
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderStatus, User},
    response::{ApiResponse, Meta},
    services::order_service::order_from_entity,
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let orders = Orders::find()
        .order_by_desc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(Meta::empty()),
    ))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let status = OrderStatus::parse(&payload.status)
        .ok_or_else(|| AppError::BadRequest("Invalid order status".into()))?;

    let existing = Orders::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    // Any of the four statuses may be set regardless of the current one; the
    // transition is an overwrite, not a guarded state machine.
    let mut active: OrderActive = existing.into();
    apply_status(&mut active, status, Utc::now());
    let order = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "status": order.status })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

pub async fn delete_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    // Unconditional: no state guard, a Shipped or Delivered order goes too.
    let result = Orders::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_delete",
        Some("orders"),
        Some(serde_json::json!({ "order_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn dashboard_stats(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<DashboardStats>> {
    ensure_admin(user)?;

    let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(&state.pool)
        .await?;
    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.pool)
        .await?;
    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&state.pool)
        .await?;

    let revenue: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total_price), 0)::BIGINT FROM orders WHERE status = 'Delivered'",
    )
    .fetch_one(&state.pool)
    .await?;

    let now = Utc::now();
    let new_users = NewUserStats {
        today: count_users_since(state, local_midnight()).await?,
        this_week: count_users_since(state, now - Duration::days(7)).await?,
        this_month: count_users_since(
            state,
            now.checked_sub_months(Months::new(1)).unwrap_or(now),
        )
        .await?,
    };

    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM orders GROUP BY status")
            .fetch_all(&state.pool)
            .await?;
    let mut counts = OrderStatusCounts {
        processing: 0,
        shipped: 0,
        delivered: 0,
        cancelled: 0,
    };
    for (status, count) in rows {
        match OrderStatus::parse(&status) {
            Some(OrderStatus::Processing) => counts.processing = count,
            Some(OrderStatus::Shipped) => counts.shipped = count,
            Some(OrderStatus::Delivered) => counts.delivered = count,
            Some(OrderStatus::Cancelled) => counts.cancelled = count,
            None => tracing::warn!(status, "order row with unknown status"),
        }
    }

    Ok(ApiResponse::success(
        "Dashboard stats",
        DashboardStats {
            products,
            users,
            orders,
            revenue,
            new_users,
            order_status_counts: counts,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AdminUserList>> {
    ensure_admin(user)?;

    // One grouped scan instead of a per-user order loop.
    let items: Vec<AdminUser> = sqlx::query_as(
        r#"
        SELECT u.id, u.name, u.email, u.is_admin, u.created_at,
               COUNT(o.id) AS order_count,
               COALESCE(SUM(o.total_price) FILTER (WHERE o.status = 'Delivered'), 0)::BIGINT
                   AS total_spent,
               MAX(o.created_at) AS last_order_at
        FROM users u
        LEFT JOIN orders o ON o.user_id = u.id
        GROUP BY u.id, u.name, u.email, u.is_admin, u.created_at
        ORDER BY u.created_at DESC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Users",
        AdminUserList { items },
        Some(Meta::empty()),
    ))
}

pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;

    if id == user.user_id && payload.is_admin == Some(false) {
        return Err(AppError::BadRequest(
            "cannot remove your own admin flag".into(),
        ));
    }

    let existing = Users::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    if let Some(email) = payload.email.as_ref().filter(|e| **e != existing.email) {
        let taken = Users::find()
            .filter(UserCol::Email.eq(email.clone()))
            .one(&state.orm)
            .await?;
        if taken.is_some() {
            return Err(AppError::BadRequest("Email is already taken".into()));
        }
    }

    let mut active: UserActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(email) = payload.email {
        active.email = Set(email);
    }
    if let Some(is_admin) = payload.is_admin {
        active.is_admin = Set(is_admin);
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_update",
        Some("users"),
        Some(serde_json::json!({ "target_user_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User updated",
        User {
            id: updated.id,
            name: updated.name,
            email: updated.email,
            is_admin: updated.is_admin,
            created_at: updated.created_at.with_timezone(&Utc),
        },
        Some(Meta::empty()),
    ))
}

pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    if id == user.user_id {
        return Err(AppError::BadRequest(
            "cannot delete your own account".into(),
        ));
    }

    let result = Users::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_delete",
        Some("users"),
        Some(serde_json::json!({ "target_user_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Overwrite the status and derive the delivery flags. Delivered stamps the
/// delivery time, Cancelled clears it, other statuses leave the flags alone.
fn apply_status(active: &mut OrderActive, status: OrderStatus, now: DateTime<Utc>) {
    active.status = Set(status.as_str().to_string());
    match status {
        OrderStatus::Delivered => {
            active.is_delivered = Set(true);
            active.delivered_at = Set(Some(now.into()));
        }
        OrderStatus::Cancelled => {
            active.is_delivered = Set(false);
            active.delivered_at = Set(None);
        }
        OrderStatus::Processing | OrderStatus::Shipped => {}
    }
    active.updated_at = Set(now.into());
}

async fn count_users_since(state: &AppState, cutoff: DateTime<Utc>) -> AppResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE created_at >= $1")
        .bind(cutoff)
        .fetch_one(&state.pool)
        .await?;
    Ok(count)
}

/// Start of "today" at the local midnight cutoff, in UTC for querying.
fn local_midnight() -> DateTime<Utc> {
    let now = Local::now();
    now.with_time(NaiveTime::MIN)
        .single()
        .unwrap_or(now)
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ActiveValue;

    #[test]
    fn delivered_sets_delivery_flags() {
        let mut active = <OrderActive as ActiveModelTrait>::default();
        let now = Utc::now();
        apply_status(&mut active, OrderStatus::Delivered, now);

        assert_eq!(active.status.clone().unwrap(), "Delivered");
        assert!(active.is_delivered.clone().unwrap());
        assert_eq!(active.delivered_at.clone().unwrap(), Some(now.into()));
    }

    #[test]
    fn cancelled_clears_delivery_flags() {
        let mut active = <OrderActive as ActiveModelTrait>::default();
        apply_status(&mut active, OrderStatus::Cancelled, Utc::now());

        assert_eq!(active.status.clone().unwrap(), "Cancelled");
        assert!(!active.is_delivered.clone().unwrap());
        assert_eq!(active.delivered_at.clone().unwrap(), None);
    }

    #[test]
    fn shipped_touches_only_status() {
        let mut active = <OrderActive as ActiveModelTrait>::default();
        apply_status(&mut active, OrderStatus::Shipped, Utc::now());

        assert_eq!(active.status.clone().unwrap(), "Shipped");
        assert!(matches!(active.is_delivered, ActiveValue::NotSet));
        assert!(matches!(active.delivered_at, ActiveValue::NotSet));
    }
}
