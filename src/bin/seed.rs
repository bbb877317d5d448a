use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_storefront_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "Admin", "admin@example.com", "admin123", true).await?;
    let user_id = ensure_user(&pool, "Customer", "user@example.com", "user123", false).await?;
    seed_products(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    is_admin: bool,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, is_admin)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET is_admin = EXCLUDED.is_admin
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(is_admin)
    .fetch_optional(pool)
    .await?;

    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (admin={is_admin})");
    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = [
        ("Court Classic", "Northwind", "Sneakers", 8900, 40, 4.5, true),
        ("Street Low", "Northwind", "Sneakers", 6500, 55, 4.1, false),
        ("Trail Runner 2", "Pacer", "Running", 12900, 30, 4.7, true),
        ("Road Glide", "Pacer", "Running", 11000, 25, 4.2, false),
        ("Post Up Mid", "Rimline", "Basketball", 14500, 18, 4.4, false),
        ("Loafer Drift", "Harbor", "Casual", 7800, 60, 3.9, false),
        ("Chelsea Stout", "Harbor", "Boots", 15900, 12, 4.6, true),
        ("Strand Slide", "Tidewater", "Sandals", 3900, 80, 3.7, false),
        ("Derby Prime", "Atelier", "Formal", 18900, 10, 4.8, false),
    ];

    for (name, brand, category, price, stock, rating, featured) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, brand, category, description, price, stock, rating, is_featured)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(brand)
        .bind(category)
        .bind(format!("{name} by {brand}"))
        .bind(price as i64)
        .bind(stock as i32)
        .bind(rating as f64)
        .bind(featured)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
