//! SQLite order store.
//!
//! The reservation protocol is expressed as parameterized single-statement
//! conditional updates; the WHERE clause encodes the precondition and the
//! database's row-level atomicity serializes racing callers. Affected-row
//! counts are the only signal - there is no read-then-write anywhere.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::OnceCell;

use crate::application::ports::{OrderStorePort, StoreError, SubmissionConfirmation};
use crate::domain::{OrderRecord, OrderStatus, OrderType};

/// Embedded schema migrations.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Cached status-reference ids. The status table never changes at runtime,
/// so the ids are resolved once and reused for every statement.
#[derive(Debug, Clone, Copy)]
struct StatusIds {
    new_id: i64,
    sent_id: i64,
}

/// SQLite implementation of `OrderStorePort` backed by a shared `sqlx` pool.
#[derive(Debug)]
pub struct SqliteOrderStore {
    pool: SqlitePool,
    status_ids: OnceCell<StatusIds>,
}

impl SqliteOrderStore {
    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            status_ids: OnceCell::new(),
        }
    }

    /// Connect and build a bounded pool.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StoreError::Connection {
                message: e.to_string(),
            })?;
        Ok(Self::new(pool))
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await.map_err(|e| StoreError::Query {
            message: format!("migration failed: {e}"),
        })
    }

    /// Insert an order row (test setup and the CRUD collaborator's create
    /// path both land here).
    pub async fn insert_order(&self, order: &OrderRecord) -> Result<(), StoreError> {
        let ids = self.status_ids().await?;
        let status_id = match order.status {
            OrderStatus::New => ids.new_id,
            OrderStatus::Sent => ids.sent_id,
        };

        sqlx::query(
            r"
            INSERT INTO orders (
                id, status_id, trade_reference_id, portfolio_id, security_id,
                order_type, quantity, limit_price, order_timestamp, blotter_id, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
        )
        .bind(order.id)
        .bind(status_id)
        .bind(order.trade_reference_id)
        .bind(&order.portfolio_id)
        .bind(&order.security_id)
        .bind(order.order_type.as_str())
        .bind(order.quantity.to_string())
        .bind(order.limit_price.map(|p| p.to_string()))
        .bind(order.order_timestamp)
        .bind(order.blotter_id)
        .bind(order.version)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    /// Insert a blotter reference row (test setup).
    pub async fn insert_blotter(&self, blotter_id: i64, name: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO blotters (id, name) VALUES (?1, ?2)")
            .bind(blotter_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    /// Resolve and cache the NEW/SENT status ids.
    async fn status_ids(&self) -> Result<StatusIds, StoreError> {
        self.status_ids
            .get_or_try_init(|| async {
                let new_id = self.status_id("NEW").await?;
                let sent_id = self.status_id("SENT").await?;
                Ok(StatusIds { new_id, sent_id })
            })
            .await
            .copied()
    }

    async fn status_id(&self, name: &str) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT id FROM order_status WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        let row = row.ok_or_else(|| StoreError::MissingReferenceData {
            message: format!("order status '{name}' not found"),
        })?;

        row.try_get("id").map_err(query_error)
    }
}

fn query_error(e: sqlx::Error) -> StoreError {
    StoreError::Query {
        message: e.to_string(),
    }
}

fn map_order_row(row: &SqliteRow) -> Result<OrderRecord, StoreError> {
    let id: i64 = row.try_get("id").map_err(query_error)?;

    let corrupt = |message: String| StoreError::CorruptRow {
        order_id: id,
        message,
    };

    let status_name: String = row.try_get("status").map_err(query_error)?;
    let status = match status_name.as_str() {
        "NEW" => OrderStatus::New,
        "SENT" => OrderStatus::Sent,
        other => return Err(corrupt(format!("unknown status '{other}'"))),
    };

    let order_type_name: String = row.try_get("order_type").map_err(query_error)?;
    let order_type = match order_type_name.as_str() {
        "MARKET" => OrderType::Market,
        "LIMIT" => OrderType::Limit,
        other => return Err(corrupt(format!("unknown order type '{other}'"))),
    };

    let quantity_text: String = row.try_get("quantity").map_err(query_error)?;
    let quantity = Decimal::from_str(&quantity_text)
        .map_err(|e| corrupt(format!("quantity '{quantity_text}': {e}")))?;

    let limit_price_text: Option<String> = row.try_get("limit_price").map_err(query_error)?;
    let limit_price = limit_price_text
        .map(|text| {
            Decimal::from_str(&text).map_err(|e| corrupt(format!("limit price '{text}': {e}")))
        })
        .transpose()?;

    let order_timestamp: Option<DateTime<Utc>> =
        row.try_get("order_timestamp").map_err(query_error)?;

    Ok(OrderRecord {
        id,
        status,
        trade_reference_id: row.try_get("trade_reference_id").map_err(query_error)?,
        portfolio_id: row.try_get("portfolio_id").map_err(query_error)?,
        security_id: row.try_get("security_id").map_err(query_error)?,
        order_type,
        quantity,
        limit_price,
        order_timestamp,
        blotter_id: row.try_get("blotter_id").map_err(query_error)?,
        version: row.try_get("version").map_err(query_error)?,
    })
}

#[async_trait]
impl OrderStorePort for SqliteOrderStore {
    async fn find_all_by_ids(&self, ids: &[i64]) -> Result<Vec<OrderRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            r"
            SELECT o.id, s.name AS status, o.trade_reference_id, o.portfolio_id,
                   o.security_id, o.order_type, o.quantity, o.limit_price,
                   o.order_timestamp, o.blotter_id, o.version
            FROM orders o
            JOIN order_status s ON s.id = o.status_id
            WHERE o.id IN (
            ",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        builder.push(")");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(map_order_row).collect()
    }

    async fn reserve(&self, order_id: i64) -> Result<bool, StoreError> {
        let ids = self.status_ids().await?;

        let result = sqlx::query(
            r"
            UPDATE orders
            SET trade_reference_id = -id, version = version + 1
            WHERE id = ?1 AND status_id = ?2 AND trade_reference_id IS NULL
            ",
        )
        .bind(order_id)
        .bind(ids.new_id)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit(&self, order_id: i64, trade_reference_id: i64) -> Result<bool, StoreError> {
        let ids = self.status_ids().await?;

        let result = sqlx::query(
            r"
            UPDATE orders
            SET trade_reference_id = ?2, status_id = ?3, version = version + 1
            WHERE id = ?1 AND status_id = ?4 AND trade_reference_id = -id
            ",
        )
        .bind(order_id)
        .bind(trade_reference_id)
        .bind(ids.sent_id)
        .bind(ids.new_id)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, order_id: i64) -> Result<bool, StoreError> {
        let ids = self.status_ids().await?;

        let result = sqlx::query(
            r"
            UPDATE orders
            SET trade_reference_id = NULL, version = version + 1
            WHERE id = ?1 AND status_id = ?2 AND trade_reference_id = -id
            ",
        )
        .bind(order_id)
        .bind(ids.new_id)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_submissions(
        &self,
        confirmations: &[SubmissionConfirmation],
    ) -> Result<u64, StoreError> {
        if confirmations.is_empty() {
            return Ok(0);
        }

        let ids = self.status_ids().await?;

        // One batched statement; each row is still guarded by the claim
        // sentinel and NEW-status condition.
        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new("UPDATE orders SET status_id = ");
        builder.push_bind(ids.sent_id);
        builder.push(", version = version + 1, trade_reference_id = CASE id");
        for confirmation in confirmations {
            builder.push(" WHEN ");
            builder.push_bind(confirmation.order_id);
            builder.push(" THEN ");
            builder.push_bind(confirmation.trade_reference_id);
        }
        builder.push(" END WHERE status_id = ");
        builder.push_bind(ids.new_id);
        builder.push(" AND trade_reference_id = -id AND id IN (");
        let mut separated = builder.separated(", ");
        for confirmation in confirmations {
            separated.push_bind(confirmation.order_id);
        }
        builder.push(")");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected())
    }

    async fn resolve_blotters(&self, blotter_ids: &[i64]) -> Result<HashSet<i64>, StoreError> {
        if blotter_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT id FROM blotters WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in blotter_ids {
            separated.push_bind(*id);
        }
        builder.push(")");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("id").map_err(query_error))
            .collect()
    }
}
