use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{CreateOrderRequest, OrderCustomer, OrderDetail, OrderItemInput, OrderList, OrderWithItems},
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, ShippingAddress},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub const DEFAULT_PAYMENT_METHOD: &str = "Cash on Delivery";

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.order_items.is_empty() {
        return Err(AppError::BadRequest("No order items".into()));
    }
    for item in &payload.order_items {
        if item.quantity < 1 {
            return Err(AppError::BadRequest("quantity must be at least 1".into()));
        }
    }
    validate_shipping(&payload.shipping_address)?;
    check_totals(
        &payload.order_items,
        payload.items_price,
        payload.tax_price,
        payload.shipping_price,
        payload.total_price,
    )
    .map_err(AppError::BadRequest)?;

    // Line prices must match the catalog at order time; the stored line is a
    // snapshot from then on.
    let ids: Vec<Uuid> = payload.order_items.iter().map(|i| i.product_id).collect();
    let products = Products::find()
        .filter(ProdCol::Id.is_in(ids))
        .all(&state.orm)
        .await?;
    for item in &payload.order_items {
        let product = products
            .iter()
            .find(|p| p.id == item.product_id)
            .ok_or_else(|| {
                AppError::BadRequest(format!("unknown product {}", item.product_id))
            })?;
        if product.price != item.price {
            return Err(AppError::BadRequest(format!(
                "price mismatch for product {}",
                item.product_id
            )));
        }
    }

    let order_id = Uuid::new_v4();
    let shipping = payload.shipping_address;
    let txn = state.orm.begin().await?;

    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        shipping_name: Set(shipping.full_name),
        shipping_address: Set(shipping.address),
        shipping_city: Set(shipping.city),
        shipping_postal_code: Set(shipping.postal_code),
        shipping_country: Set(shipping.country),
        shipping_phone: Set(shipping.phone),
        payment_method: Set(payload
            .payment_method
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string())),
        items_price: Set(payload.items_price),
        tax_price: Set(payload.tax_price),
        shipping_price: Set(payload.shipping_price),
        total_price: Set(payload.total_price),
        is_paid: Set(false),
        paid_at: Set(None),
        is_delivered: Set(false),
        delivered_at: Set(None),
        status: Set(OrderStatus::Processing.as_str().to_string()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(payload.order_items.len());
    for input in payload.order_items {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(Some(input.product_id)),
            name: Set(input.name),
            image: Set(input.image),
            price: Set(input.price),
            quantity: Set(input.quantity),
            size: Set(input.size),
            color: Set(input.color),
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn my_orders(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<OrderList>> {
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
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

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    // Owner or admin only.
    if order.user_id != user.user_id && !user.is_admin {
        return Err(AppError::Forbidden);
    }

    let customer = Users::find_by_id(order.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Order",
        OrderDetail {
            order: order_from_entity(order),
            items,
            customer: OrderCustomer {
                name: customer.name,
                email: customer.email,
            },
        },
        Some(Meta::empty()),
    ))
}

fn validate_shipping(shipping: &ShippingAddress) -> Result<(), AppError> {
    let required = [
        ("full_name", &shipping.full_name),
        ("address", &shipping.address),
        ("city", &shipping.city),
        ("postal_code", &shipping.postal_code),
        ("country", &shipping.country),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!(
                "shipping_address.{field} is required"
            )));
        }
    }
    Ok(())
}

/// Client-supplied totals are verified, never trusted: the items total must
/// equal the line sum and the grand total must add up.
fn check_totals(
    items: &[OrderItemInput],
    items_price: i64,
    tax_price: i64,
    shipping_price: i64,
    total_price: i64,
) -> Result<(), String> {
    if items_price < 0 || tax_price < 0 || shipping_price < 0 || total_price < 0 {
        return Err("price fields cannot be negative".into());
    }
    let line_sum: i64 = items
        .iter()
        .map(|i| i.price * i64::from(i.quantity))
        .sum();
    if line_sum != items_price {
        return Err(format!(
            "items_price {items_price} does not match line total {line_sum}"
        ));
    }
    let expected_total = items_price + tax_price + shipping_price;
    if expected_total != total_price {
        return Err(format!(
            "total_price {total_price} does not match {expected_total}"
        ));
    }
    Ok(())
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        shipping_address: ShippingAddress {
            full_name: model.shipping_name,
            address: model.shipping_address,
            city: model.shipping_city,
            postal_code: model.shipping_postal_code,
            country: model.shipping_country,
            phone: model.shipping_phone,
        },
        payment_method: model.payment_method,
        items_price: model.items_price,
        tax_price: model.tax_price,
        shipping_price: model.shipping_price,
        total_price: model.total_price,
        is_paid: model.is_paid,
        paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        is_delivered: model.is_delivered,
        delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
        status: OrderStatus::parse(&model.status).unwrap_or(OrderStatus::Processing),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        name: model.name,
        image: model.image,
        price: model.price,
        quantity: model.quantity,
        size: model.size,
        color: model.color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: i64, quantity: i32) -> OrderItemInput {
        OrderItemInput {
            product_id: Uuid::new_v4(),
            name: "Court Classic".into(),
            image: "https://cdn.example.com/court-classic.jpg".into(),
            price,
            quantity,
            size: None,
            color: None,
        }
    }

    #[test]
    fn totals_must_add_up() {
        let items = vec![line(5000, 2), line(12000, 1)];
        assert!(check_totals(&items, 22000, 2200, 500, 24700).is_ok());
        assert!(check_totals(&items, 22000, 2200, 500, 25000).is_err());
        assert!(check_totals(&items, 21000, 2200, 500, 23700).is_err());
    }

    #[test]
    fn negative_price_fields_are_rejected() {
        let items = vec![line(5000, 1)];
        assert!(check_totals(&items, 5000, -1, 0, 4999).is_err());
    }
}
