// =============================================================================
// DATABASE MODULE
// =============================================================================
// PostgreSQL implementation of the order store, the coupon ledger and the
// gateway credential source.
//
// LEARNING NOTES:
// - Uniqueness of order identifiers is enforced by a UNIQUE constraint, not
//   by the generator; callers retry on `AppError::Conflict`
// - Payment settlement and coupon redemption share one transaction
// - Addresses and cart items are JSONB; money is NUMERIC (rust_decimal)
// =============================================================================

use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    PgExecutor, PgPool, Row,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{
    Address, CartItem, NewOrder, Order, OrderStatus, PaymentMode, PaymentStatus, UnknownVariant,
};
use crate::payment::{CredentialSource, GatewayCredentials};
use crate::store::{normalize_coupon_code, ListScope, OrderStore, Page};

/// Column list shared by every query returning a full order.
const ORDER_COLUMNS: &str = r#"
    id, order_id, user_id, shipping_address, billing_address, cart_items,
    payment_mode, payment_status, delivery_date, delivery_slot,
    shipping_charges, coupan_applied, coupan_discount,
    total_shipment_price, total_product_price, total_price,
    order_note, order_status, razorpay_order_id, razorpay_payment_id,
    created_at, updated_at
"#;

const ORDER_ID_UNIQUE: &str = "orders_order_id_key";

const KEY_ID: &str = "RAZORPAY_KEY_ID";
const KEY_SECRET: &str = "RAZORPAY_KEY_SECRET";

// -----------------------------------------------------------------------------
// DATABASE WRAPPER
// -----------------------------------------------------------------------------
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    // -------------------------------------------------------------------------
    // CONNECTION
    // -------------------------------------------------------------------------
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .idle_timeout(std::time::Duration::from_secs(300))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    // -------------------------------------------------------------------------
    // MIGRATIONS
    // -------------------------------------------------------------------------
    /// Create the orders, coupon and credential tables if they don't exist.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                -- Database record identifier
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),

                -- Public order identifier, generated server side
                order_id VARCHAR(64) UNIQUE NOT NULL,

                user_id VARCHAR(128) NOT NULL,
                shipping_address JSONB NOT NULL,
                billing_address JSONB,
                cart_items JSONB NOT NULL,

                payment_mode VARCHAR(16) NOT NULL
                    CHECK (payment_mode IN ('COD', 'PREPAID')),
                payment_status VARCHAR(16) NOT NULL
                    CHECK (payment_status IN ('PENDING', 'PAID', 'COD')),

                delivery_date DATE NOT NULL,
                delivery_slot VARCHAR(64),

                shipping_charges NUMERIC(12, 2) NOT NULL DEFAULT 0,
                coupan_applied VARCHAR(64),
                coupan_discount NUMERIC(12, 2) NOT NULL DEFAULT 0,
                total_shipment_price NUMERIC(12, 2) NOT NULL DEFAULT 0,
                total_product_price NUMERIC(12, 2) NOT NULL DEFAULT 0,
                total_price NUMERIC(12, 2) NOT NULL,

                order_note TEXT NOT NULL DEFAULT '',
                order_status VARCHAR(16) NOT NULL DEFAULT 'Pending'
                    CHECK (order_status IN ('Pending', 'Processing', 'Shipped', 'Delivered', 'Cancelled')),

                -- Gateway identifiers, set once a prepaid flow starts
                razorpay_order_id VARCHAR(64) UNIQUE,
                razorpay_payment_id VARCHAR(64),

                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                -- COD orders never enter the PENDING/PAID flow
                CONSTRAINT cod_payment_status CHECK (
                    (payment_mode = 'COD') = (payment_status = 'COD')
                )
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create orders table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders(user_id)")
            .execute(&self.pool)
            .await
            .context("Failed to create user_id index")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at DESC)")
            .execute(&self.pool)
            .await
            .context("Failed to create created_at index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_coupons (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id VARCHAR(128) NOT NULL,

                -- Stored uppercase; matching uppercases the input
                code VARCHAR(64) NOT NULL CHECK (code = UPPER(code)),

                discount_type VARCHAR(16) NOT NULL
                    CHECK (discount_type IN ('percentage', 'flat')),
                discount_value NUMERIC(12, 2) NOT NULL,
                min_order_value NUMERIC(12, 2) NOT NULL DEFAULT 0,
                is_used BOOLEAN NOT NULL DEFAULT FALSE,

                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT user_coupon_code_unique UNIQUE (user_id, code)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create user_coupons table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS confidential_keys (
                key VARCHAR(64) PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create confidential_keys table")?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // HEALTH CHECK
    // -------------------------------------------------------------------------

    /// Check if database connection is healthy
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> AppResult<Option<Order>> {
        let start = Instant::now();
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = $1");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        metrics::record_db_query("select", start.elapsed().as_secs_f64());

        row.as_ref().map(order_from_row).transpose().map_err(Into::into)
    }
}

// =============================================================================
// ORDER STORE
// =============================================================================
#[async_trait]
impl OrderStore for Database {
    async fn insert_order(&self, order: &NewOrder, redeem: bool) -> AppResult<Order> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            INSERT INTO orders (
                order_id, user_id, shipping_address, billing_address, cart_items,
                payment_mode, payment_status, delivery_date, delivery_slot,
                shipping_charges, coupan_applied, coupan_discount,
                total_shipment_price, total_product_price, total_price,
                order_note, razorpay_order_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let result = sqlx::query(&sql)
            .bind(&order.order_id)
            .bind(&order.user_id)
            .bind(Json(&order.shipping_address))
            .bind(order.billing_address.as_ref().map(Json))
            .bind(Json(&order.cart_items))
            .bind(order.payment_mode.as_str())
            .bind(order.payment_status.as_str())
            .bind(order.delivery_date)
            .bind(order.delivery_slot.as_deref())
            .bind(order.shipping_charges)
            .bind(order.coupan_applied.as_deref())
            .bind(order.coupan_discount)
            .bind(order.total_shipment_price)
            .bind(order.total_product_price)
            .bind(order.total_price)
            .bind(&order.order_note)
            .bind(order.razorpay_order_id.as_deref())
            .fetch_one(&mut *tx)
            .await;

        // Dropping `tx` on any early return rolls the insert back
        let row = match result {
            Ok(row) => row,
            Err(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation() && db_err.constraint() == Some(ORDER_ID_UNIQUE) =>
            {
                return Err(AppError::Conflict(format!(
                    "Order id already exists: {}",
                    order.order_id
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let stored = order_from_row(&row)?;

        if redeem {
            if let Some(code) = stored.coupan_applied.as_deref() {
                redeem_coupon(&mut *tx, &stored.user_id, code).await?;
            }
        }

        tx.commit().await?;
        metrics::record_db_query("insert", start.elapsed().as_secs_f64());

        Ok(stored)
    }

    async fn find_by_order_id(&self, order_id: &str) -> AppResult<Option<Order>> {
        self.fetch_one_by("order_id", order_id).await
    }

    async fn find_by_razorpay_order_id(&self, razorpay_order_id: &str) -> AppResult<Option<Order>> {
        self.fetch_one_by("razorpay_order_id", razorpay_order_id).await
    }

    async fn list_settled(&self, scope: ListScope<'_>, page: Page) -> AppResult<(Vec<Order>, i64)> {
        let start = Instant::now();
        let user_filter = match scope {
            ListScope::All => None,
            ListScope::User(user_id) => Some(user_id),
        };

        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE payment_status IN ('COD', 'PAID')
              AND ($1::VARCHAR IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(user_filter)
            .bind(i64::from(page.per_page))
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM orders
            WHERE payment_status IN ('COD', 'PAID')
              AND ($1::VARCHAR IS NULL OR user_id = $1)
            "#,
        )
        .bind(user_filter)
        .fetch_one(&self.pool)
        .await?;
        metrics::record_db_query("select", start.elapsed().as_secs_f64());

        let orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((orders, total.0))
    }

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> AppResult<Option<Order>> {
        let start = Instant::now();
        let sql = format!(
            r#"
            UPDATE orders
            SET order_status = $1, updated_at = NOW()
            WHERE order_id = $2
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        metrics::record_db_query("update", start.elapsed().as_secs_f64());

        row.as_ref().map(order_from_row).transpose().map_err(Into::into)
    }

    async fn settle_payment(
        &self,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
    ) -> AppResult<Option<Order>> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        // The PENDING guard makes concurrent verifications race safely:
        // exactly one of them gets the row back
        let sql = format!(
            r#"
            UPDATE orders
            SET payment_status = 'PAID',
                razorpay_payment_id = $2,
                order_status = 'Processing',
                updated_at = NOW()
            WHERE razorpay_order_id = $1 AND payment_status = 'PENDING'
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let Some(row) = sqlx::query(&sql)
            .bind(razorpay_order_id)
            .bind(razorpay_payment_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };
        let order = order_from_row(&row)?;

        if let Some(code) = order.coupan_applied.as_deref() {
            redeem_coupon(&mut *tx, &order.user_id, code).await?;
        }

        tx.commit().await?;
        metrics::record_db_query("update", start.elapsed().as_secs_f64());

        Ok(Some(order))
    }
}

// =============================================================================
// COUPON LEDGER
// =============================================================================

/// Mark the user's unused coupon matching `code` (case-insensitive) as used.
///
/// Single place where a coupon gets marked used; both the COD insert and
/// payment settlement call it inside their transaction. A code with no
/// unused match is a no-op, not an error.
async fn redeem_coupon<'e, E>(executor: E, user_id: &str, code: &str) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let code = normalize_coupon_code(code);
    if code.is_empty() {
        return Ok(false);
    }

    let result = sqlx::query(
        r#"
        UPDATE user_coupons
        SET is_used = TRUE, updated_at = NOW()
        WHERE user_id = $1 AND code = $2 AND is_used = FALSE
        "#,
    )
    .bind(user_id)
    .bind(&code)
    .execute(executor)
    .await?;

    let redeemed = result.rows_affected() > 0;
    metrics::record_coupon_redemption(redeemed);
    if redeemed {
        tracing::info!(user_id = %user_id, code = %code, "Coupon redeemed");
    } else {
        tracing::debug!(user_id = %user_id, code = %code, "No unused coupon matched; skipping");
    }

    Ok(redeemed)
}

// =============================================================================
// GATEWAY CREDENTIALS
// =============================================================================
#[async_trait]
impl CredentialSource for Database {
    async fn load_credentials(&self) -> AppResult<Option<GatewayCredentials>> {
        let rows = sqlx::query("SELECT key, value FROM confidential_keys WHERE key = ANY($1)")
            .bind(vec![KEY_ID, KEY_SECRET])
            .fetch_all(&self.pool)
            .await?;

        let mut key_id = None;
        let mut key_secret = None;
        for row in &rows {
            let key: String = row.try_get("key")?;
            let value: String = row.try_get("value")?;
            match key.as_str() {
                KEY_ID => key_id = Some(value),
                KEY_SECRET => key_secret = Some(value),
                _ => {}
            }
        }

        Ok(match (key_id, key_secret) {
            (Some(key_id), Some(key_secret)) => Some(GatewayCredentials { key_id, key_secret }),
            _ => None,
        })
    }
}

// =============================================================================
// ROW MAPPING
// =============================================================================

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    let payment_mode: String = row.try_get("payment_mode")?;
    let payment_status: String = row.try_get("payment_status")?;
    let order_status: String = row.try_get("order_status")?;

    Ok(Order {
        id: row.try_get::<Uuid, _>("id")?,
        order_id: row.try_get("order_id")?,
        user_id: row.try_get("user_id")?,
        shipping_address: row.try_get::<Json<Address>, _>("shipping_address")?.0,
        billing_address: row
            .try_get::<Option<Json<Address>>, _>("billing_address")?
            .map(|json| json.0),
        cart_items: row.try_get::<Json<Vec<CartItem>>, _>("cart_items")?.0,
        payment_mode: payment_mode
            .parse::<PaymentMode>()
            .map_err(decode_error)?,
        payment_status: payment_status
            .parse::<PaymentStatus>()
            .map_err(decode_error)?,
        delivery_date: row.try_get::<NaiveDate, _>("delivery_date")?,
        delivery_slot: row.try_get("delivery_slot")?,
        shipping_charges: row.try_get::<Decimal, _>("shipping_charges")?,
        coupan_applied: row.try_get("coupan_applied")?,
        coupan_discount: row.try_get("coupan_discount")?,
        total_shipment_price: row.try_get("total_shipment_price")?,
        total_product_price: row.try_get("total_product_price")?,
        total_price: row.try_get("total_price")?,
        order_note: row.try_get("order_note")?,
        order_status: order_status
            .parse::<OrderStatus>()
            .map_err(decode_error)?,
        razorpay_order_id: row.try_get("razorpay_order_id")?,
        razorpay_payment_id: row.try_get("razorpay_payment_id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn decode_error(err: UnknownVariant) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}
