use axum_storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        orders::{CreateOrderRequest, OrderItemInput, UpdateOrderStatusRequest},
        products::{CreateProductRequest, UpdateProductRequest},
        users::UpdateUserRequest,
    },
    entity::users::ActiveModel as UserActive,
    error::AppError,
    imagehost::ImageHostClient,
    middleware::auth::AuthUser,
    models::{OrderStatus, Product, ShippingAddress},
    routes::params::{CatalogSort, ProductQuery},
    services::{admin_service, order_service, product_service},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

// Integration flow: admin seeds a catalog, a customer filters it and places an
// order, the admin walks the order through its statuses and reads the
// dashboard. Covers the spec-level invariants end to end.
#[tokio::test]
async fn catalog_order_and_admin_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let admin_id = create_user(&state, "Admin", "admin@example.com", true).await?;
    let user_id = create_user(&state, "Customer", "user@example.com", false).await?;
    let other_id = create_user(&state, "Other", "other@example.com", false).await?;

    let auth_admin = AuthUser {
        user_id: admin_id,
        is_admin: true,
    };
    let auth_user = AuthUser {
        user_id,
        is_admin: false,
    };
    let auth_other = AuthUser {
        user_id: other_id,
        is_admin: false,
    };

    // Seed 15 sneakers priced 3000..=17000 plus noise in another category.
    let mut sneakers: Vec<Product> = Vec::new();
    for i in 0..15 {
        let created = product_service::create_product(
            &state,
            &auth_admin,
            product_payload(
                &format!("Sneaker {i:02}"),
                "Sneakers",
                3000 + i * 1000,
            ),
        )
        .await?;
        sneakers.push(created.data.expect("created product"));
    }
    for i in 0..3 {
        product_service::create_product(
            &state,
            &auth_admin,
            product_payload(&format!("Boot {i:02}"), "Boots", 9000 + i * 1000),
        )
        .await?;
    }

    // Filter + sort + paginate: inclusive price bounds, ascending order,
    // total reflecting the full filtered set.
    let page = product_service::list_products(
        &state,
        ProductQuery {
            category: Some("Sneakers".into()),
            price: Some("5000-15000".into()),
            sort: Some(CatalogSort::PriceLow),
            ..Default::default()
        },
    )
    .await?;
    let meta = page.meta.expect("meta");
    let items = page.data.expect("products").items;

    let expected: Vec<&Product> = sneakers
        .iter()
        .filter(|p| p.price >= 5000 && p.price <= 15000)
        .collect();
    assert_eq!(meta.total, Some(expected.len() as i64));
    assert_eq!(meta.pages, Some(1));
    assert!(items.len() <= 12);
    assert!(items.iter().all(|p| p.price >= 5000 && p.price <= 15000));
    assert!(items.windows(2).all(|w| w[0].price <= w[1].price));
    assert!(items.iter().all(|p| p.category == "Sneakers"));

    // Nothing is flagged featured yet: fall back to at most 4 arbitrary
    // products.
    let fallback = product_service::featured_products(&state).await?;
    assert_eq!(fallback.data.expect("products").items.len(), 4);

    // Flag one via partial update; the featured list then carries only it.
    product_service::update_product(
        &state,
        &auth_admin,
        sneakers[3].id,
        UpdateProductRequest {
            is_featured: Some(true),
            ..Default::default()
        },
    )
    .await?;
    let featured = product_service::featured_products(&state).await?;
    let featured_items = featured.data.expect("products").items;
    assert_eq!(featured_items.len(), 1);
    assert_eq!(featured_items[0].id, sneakers[3].id);

    // Malformed price range is rejected, not silently matched against nothing.
    let err = product_service::list_products(
        &state,
        ProductQuery {
            price: Some("cheap-150".into()),
            ..Default::default()
        },
    )
    .await
    .expect_err("malformed range must fail");
    assert!(matches!(err, AppError::BadRequest(_)));

    // Create an order from a catalog line.
    let product = &sneakers[5];
    let order_resp = order_service::create_order(
        &state,
        &auth_user,
        CreateOrderRequest {
            order_items: vec![line_item(product, 2)],
            shipping_address: shipping(),
            payment_method: None,
            items_price: product.price * 2,
            tax_price: 800,
            shipping_price: 500,
            total_price: product.price * 2 + 1300,
        },
    )
    .await?;
    let order = order_resp.data.expect("order").order;
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.payment_method, "Cash on Delivery");

    // Empty item list is rejected before anything is written.
    let err = order_service::create_order(
        &state,
        &auth_user,
        CreateOrderRequest {
            order_items: vec![],
            shipping_address: shipping(),
            payment_method: None,
            items_price: 0,
            tax_price: 0,
            shipping_price: 0,
            total_price: 0,
        },
    )
    .await
    .expect_err("empty order must fail");
    assert!(matches!(err, AppError::BadRequest(_)));

    // Tampered totals are rejected.
    let err = order_service::create_order(
        &state,
        &auth_user,
        CreateOrderRequest {
            order_items: vec![line_item(product, 1)],
            shipping_address: shipping(),
            payment_method: None,
            items_price: 1,
            tax_price: 0,
            shipping_price: 0,
            total_price: 1,
        },
    )
    .await
    .expect_err("wrong totals must fail");
    assert!(matches!(err, AppError::BadRequest(_)));

    let my_orders = order_service::my_orders(&state, &auth_user).await?;
    assert_eq!(my_orders.data.expect("orders").items.len(), 1);

    // A stranger cannot read the order; the owner and the admin can.
    let err = order_service::get_order(&state, &auth_other, order.id)
        .await
        .expect_err("stranger must be rejected");
    assert!(matches!(err, AppError::Forbidden));
    let detail = order_service::get_order(&state, &auth_user, order.id).await?;
    assert_eq!(detail.data.expect("detail").customer.email, "user@example.com");

    // Processing -> Shipped -> Delivered stamps the delivery flags.
    let updated = admin_service::update_order_status(
        &state,
        &auth_admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "Shipped".into(),
        },
    )
    .await?;
    let updated = updated.data.expect("order");
    assert_eq!(updated.status, OrderStatus::Shipped);
    assert!(!updated.is_delivered);

    let updated = admin_service::update_order_status(
        &state,
        &auth_admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "Delivered".into(),
        },
    )
    .await?;
    let updated = updated.data.expect("order");
    assert_eq!(updated.status, OrderStatus::Delivered);
    assert!(updated.is_delivered);
    assert!(updated.delivered_at.is_some());

    // Revenue and per-user aggregates count Delivered orders.
    let stats = admin_service::dashboard_stats(&state, &auth_admin).await?;
    let stats = stats.data.expect("stats");
    assert_eq!(stats.products, 18);
    assert_eq!(stats.users, 3);
    assert_eq!(stats.orders, 1);
    assert_eq!(stats.revenue, order.total_price);
    assert_eq!(stats.order_status_counts.delivered, 1);

    let users = admin_service::list_users(&state, &auth_admin).await?;
    let users = users.data.expect("users").items;
    let customer = users
        .iter()
        .find(|u| u.id == user_id)
        .expect("customer listed");
    assert_eq!(customer.order_count, 1);
    assert_eq!(customer.total_spent, order.total_price);
    assert!(customer.last_order_at.is_some());

    // The overwrite model permits regressing a terminal state; Cancelled
    // clears the delivery flags. Whether that regression should stay legal is
    // an open design question; this asserts the current behavior.
    let updated = admin_service::update_order_status(
        &state,
        &auth_admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "Cancelled".into(),
        },
    )
    .await?;
    let updated = updated.data.expect("order");
    assert_eq!(updated.status, OrderStatus::Cancelled);
    assert!(!updated.is_delivered);
    assert!(updated.delivered_at.is_none());

    // Unknown statuses are rejected.
    let err = admin_service::update_order_status(
        &state,
        &auth_admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "Refunded".into(),
        },
    )
    .await
    .expect_err("unknown status must fail");
    assert!(matches!(err, AppError::BadRequest(_)));

    // Admin self-protection.
    let err = admin_service::update_user(
        &state,
        &auth_admin,
        admin_id,
        UpdateUserRequest {
            name: None,
            email: None,
            is_admin: Some(false),
        },
    )
    .await
    .expect_err("self-demotion must fail");
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = admin_service::delete_user(&state, &auth_admin, admin_id)
        .await
        .expect_err("self-deletion must fail");
    assert!(matches!(err, AppError::BadRequest(_)));

    // Deleting another user is allowed.
    admin_service::delete_user(&state, &auth_admin, other_id).await?;

    // Unconditional order deletion, even after Shipped/Delivered history.
    admin_service::delete_order(&state, &auth_admin, order.id).await?;
    let err = order_service::get_order(&state, &auth_user, order.id)
        .await
        .expect_err("deleted order is gone");
    assert!(matches!(err, AppError::NotFound));

    // Product deletion proceeds without remote images to clean up.
    product_service::delete_product(&state, &auth_admin, sneakers[0].id).await?;
    let err = product_service::get_product(&state, sneakers[0].id)
        .await
        .expect_err("deleted product is gone");
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs.
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, product_images, audit_logs, products, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    // Points at nothing; the flow never touches the remote image host.
    let images = ImageHostClient::new("http://127.0.0.1:9", "test-key");

    Ok(AppState { pool, orm, images })
}

async fn create_user(
    state: &AppState,
    name: &str,
    email: &str,
    is_admin: bool,
) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        is_admin: Set(is_admin),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

fn product_payload(name: &str, category: &str, price: i64) -> CreateProductRequest {
    CreateProductRequest {
        name: name.to_string(),
        brand: "Northwind".to_string(),
        category: category.to_string(),
        description: format!("{name} test product"),
        price,
        original_price: None,
        stock: 10,
        images: vec![],
        sizes: vec![],
        colors: vec![],
        is_featured: false,
    }
}

fn line_item(product: &Product, quantity: i32) -> OrderItemInput {
    OrderItemInput {
        product_id: product.id,
        name: product.name.clone(),
        image: String::new(),
        price: product.price,
        quantity,
        size: None,
        color: None,
    }
}

fn shipping() -> ShippingAddress {
    ShippingAddress {
        full_name: "Test Customer".into(),
        address: "1 Main St".into(),
        city: "Springfield".into(),
        postal_code: "12345".into(),
        country: "US".into(),
        phone: None,
    }
}
