use argon2::{
    Argon2, PasswordHasher,
    password_hash::{rand_core::OsRng, SaltString},
};
use axum_marketplace_api::{
    config::AppConfig,
    db::create_pool,
};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin123", "admin").await?;
    let buyer_id = ensure_user(&pool, "user@example.com", "user123", "user").await?;
    let seller_id = ensure_user(&pool, "vendor@example.com", "vendor123", "vendor").await?;

    let vendor_id = ensure_vendor(&pool, seller_id, "Ferris Goods").await?;
    let address_id = ensure_address(&pool, buyer_id).await?;
    seed_catalog(&pool, vendor_id).await?;

    println!(
        "Seed completed. Admin ID: {admin_id}, User ID: {buyer_id}, Vendor ID: {vendor_id}, Address ID: {address_id}"
    );
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_vendor(pool: &sqlx::PgPool, user_id: Uuid, name: &str) -> anyhow::Result<Uuid> {
    let (vendor_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO vendors (id, user_id, business_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id) DO UPDATE SET business_name = EXCLUDED.business_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(vendor_id)
}

async fn ensure_address(pool: &sqlx::PgPool, user_id: Uuid) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM addresses WHERE user_id = $1 LIMIT 1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO addresses (id, user_id, line1, city, country)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind("1 Crab Lane")
    .bind("Lagos")
    .bind("NG")
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// One product sold by variant combination and a few with flat inventory.
async fn seed_catalog(pool: &sqlx::PgPool, vendor_id: Uuid) -> anyhow::Result<()> {
    let hoodie_id = ensure_product(pool, vendor_id, "Axum Hoodie", 7500, None).await?;
    let combinations = [
        ("Black-M", json!({ "color": "Black", "size": "M" }), 0, 5),
        ("Black-L", json!({ "color": "Black", "size": "L" }), 500, 3),
        ("White-M", json!({ "color": "White", "size": "M" }), 0, 8),
    ];
    for (name, attributes, modifier, stock) in combinations {
        sqlx::query(
            r#"
            INSERT INTO variant_combinations
                (id, product_id, combination_name, attributes, price_modifier, stock)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE NOT EXISTS (
                SELECT 1 FROM variant_combinations WHERE product_id = $2 AND combination_name = $3
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(hoodie_id)
        .bind(name)
        .bind(attributes)
        .bind(modifier)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    let flat = [
        ("Ferris Mug", 1200, Some(1000), 100),
        ("Rust Sticker Pack", 500, None, 200),
        ("E-book: Async Rust", 2500, None, 75),
    ];
    for (name, price, discounted, stock) in flat {
        let product_id = ensure_product(pool, vendor_id, name, price, discounted).await?;
        sqlx::query(
            r#"
            INSERT INTO inventory (id, product_id, stock)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded catalog");
    Ok(())
}

async fn ensure_product(
    pool: &sqlx::PgPool,
    vendor_id: Uuid,
    name: &str,
    price: i64,
    discounted_price: Option<i64>,
) -> anyhow::Result<Uuid> {
    // Whole currency units; NUMERIC columns take them as text.
    let price = Decimal::from(price).to_string();
    let discounted_price = discounted_price.map(|p| Decimal::from(p).to_string());

    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO products (id, vendor_id, name, price, discounted_price)
        VALUES ($1, $2, $3, $4::numeric, $5::numeric)
        ON CONFLICT (name) DO UPDATE SET vendor_id = EXCLUDED.vendor_id
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(vendor_id)
    .bind(name)
    .bind(price)
    .bind(discounted_price)
    .fetch_one(pool)
    .await?;
    Ok(id)
}
