use super::{
    EarmarkFilter, EarmarkScope, EarmarkStore, NewEarmark, NewRebalanceOperation, OperationFilter,
    RebalanceOperationStore, RebalanceOperationUpdate, StoreError,
};
use crate::{
    config::DatabaseConfig,
    types::{Earmark, EarmarkStatus, RebalanceOperation, RebalanceStatus, TransactionEntry},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgPool, PgPoolOptions, PgRow},
    QueryBuilder, Row,
};
use std::collections::HashMap;
use uuid::Uuid;

const SCHEMA: &str = include_str!("schema.sql");

const UNIQUE_ACTIVE_EARMARK_INDEX: &str = "unique_active_earmark_per_invoice";

/// Postgres-backed implementation of both stores. The partial unique index on
/// active earmarks is the only cross-process coordination primitive.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Idempotent.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn corrupt<E: std::fmt::Display>(err: E) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn earmark_from_row(row: &PgRow) -> Result<Earmark, StoreError> {
    Ok(Earmark {
        id: row.try_get("id")?,
        invoice_id: row.try_get("invoice_id")?,
        designated_purchase_chain: row.try_get::<i64, _>("designated_purchase_chain")? as u64,
        ticker_hash: row.try_get::<String, _>("ticker_hash")?.parse().map_err(corrupt)?,
        min_amount: row.try_get::<String, _>("min_amount")?.parse().map_err(corrupt)?,
        status: row.try_get::<String, _>("status")?.parse().map_err(corrupt)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn operation_from_row(row: &PgRow) -> Result<RebalanceOperation, StoreError> {
    let transactions: serde_json::Value = row.try_get("transactions")?;
    let transactions: HashMap<u64, TransactionEntry> =
        serde_json::from_value(transactions).map_err(corrupt)?;
    Ok(RebalanceOperation {
        id: row.try_get("id")?,
        earmark_id: row.try_get("earmark_id")?,
        origin_chain_id: row.try_get::<i64, _>("origin_chain_id")? as u64,
        destination_chain_id: row.try_get::<i64, _>("destination_chain_id")? as u64,
        ticker_hash: row.try_get::<String, _>("ticker_hash")?.parse().map_err(corrupt)?,
        amount_native: row.try_get::<String, _>("amount")?.parse().map_err(corrupt)?,
        slippage_dbps: row.try_get::<i32, _>("slippage_dbps")? as u32,
        bridge: row.try_get::<String, _>("bridge")?.parse().map_err(corrupt)?,
        status: row.try_get::<String, _>("status")?.parse().map_err(corrupt)?,
        is_orphaned: row.try_get("is_orphaned")?,
        recipient: row.try_get::<String, _>("recipient")?.parse().map_err(corrupt)?,
        transactions,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn status_names<S: ToString>(statuses: &[S]) -> Vec<String> {
    statuses.iter().map(|status| status.to_string()).collect()
}

fn is_unique_earmark_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.constraint() == Some(UNIQUE_ACTIVE_EARMARK_INDEX),
        _ => false,
    }
}

#[async_trait]
impl EarmarkStore for PgStore {
    async fn create_earmark(&self, new: NewEarmark) -> Result<Earmark, StoreError> {
        let result = sqlx::query(
            "INSERT INTO earmarks \
             (id, invoice_id, designated_purchase_chain, ticker_hash, min_amount, status) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&new.invoice_id)
        .bind(new.designated_purchase_chain as i64)
        .bind(new.ticker_hash.to_string())
        .bind(new.min_amount.to_string())
        .bind(new.status.as_str())
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok(row) => earmark_from_row(&row),
            Err(err) if is_unique_earmark_violation(&err) => {
                Err(StoreError::UniqueEarmarkConflict { invoice_id: new.invoice_id })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn active_earmark_for_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<Option<Earmark>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM earmarks WHERE invoice_id = $1 AND status = ANY($2) \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(invoice_id)
        .bind(status_names(&EarmarkStatus::ACTIVE))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(earmark_from_row).transpose()
    }

    async fn get_earmark(&self, id: Uuid) -> Result<Option<Earmark>, StoreError> {
        let row = sqlx::query("SELECT * FROM earmarks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(earmark_from_row).transpose()
    }

    async fn get_earmarks(&self, filter: &EarmarkFilter) -> Result<Vec<Earmark>, StoreError> {
        let mut query: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT * FROM earmarks WHERE TRUE");
        if let Some(statuses) = &filter.statuses {
            query.push(" AND status = ANY(").push_bind(status_names(statuses)).push(")");
        }
        if let Some(chain) = filter.designated_purchase_chain {
            query.push(" AND designated_purchase_chain = ").push_bind(chain as i64);
        }
        if let Some(ticker) = filter.ticker_hash {
            query.push(" AND ticker_hash = ").push_bind(ticker.to_string());
        }
        if let Some(invoice_id) = &filter.invoice_id {
            query.push(" AND invoice_id = ").push_bind(invoice_id.clone());
        }
        if let Some(after) = filter.created_after {
            query.push(" AND created_at >= ").push_bind(after);
        }
        if let Some(before) = filter.created_before {
            query.push(" AND created_at < ").push_bind(before);
        }
        query.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = filter.offset {
            query.push(" OFFSET ").push_bind(offset as i64);
        }
        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(earmark_from_row).collect()
    }

    async fn update_earmark_status(
        &self,
        id: Uuid,
        status: EarmarkStatus,
    ) -> Result<Earmark, StoreError> {
        let row = sqlx::query(
            "UPDATE earmarks SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => earmark_from_row(&row),
            None => Err(StoreError::NotFound { entity: "earmark", id }),
        }
    }

    async fn cancel_earmark_and_orphan(&self, id: Uuid) -> Result<Earmark, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM earmarks WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let earmark = match row {
            Some(row) => earmark_from_row(&row)?,
            None => return Err(StoreError::NotFound { entity: "earmark", id }),
        };
        if earmark.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                entity: "earmark",
                id,
                from: earmark.status.to_string(),
                to: EarmarkStatus::Cancelled.to_string(),
            });
        }
        sqlx::query(
            "UPDATE rebalance_operations SET is_orphaned = TRUE, updated_at = now() \
             WHERE earmark_id = $1 AND status = ANY($2)",
        )
        .bind(id)
        .bind(status_names(&RebalanceStatus::IN_FLIGHT))
        .execute(&mut *tx)
        .await?;
        let row = sqlx::query(
            "UPDATE earmarks SET status = 'CANCELLED', updated_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let earmark = earmark_from_row(&row)?;
        tx.commit().await?;
        Ok(earmark)
    }
}

#[async_trait]
impl RebalanceOperationStore for PgStore {
    async fn create_rebalance_operation(
        &self,
        new: NewRebalanceOperation,
    ) -> Result<RebalanceOperation, StoreError> {
        new.validate()?;
        let transactions = serde_json::to_value(&new.transactions).map_err(corrupt)?;
        let row = sqlx::query(
            "INSERT INTO rebalance_operations \
             (id, earmark_id, origin_chain_id, destination_chain_id, ticker_hash, amount, \
              slippage_dbps, bridge, status, is_orphaned, recipient, transactions) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.earmark_id)
        .bind(new.origin_chain_id as i64)
        .bind(new.destination_chain_id as i64)
        .bind(new.ticker_hash.to_string())
        .bind(new.amount_native.to_string())
        .bind(new.slippage_dbps as i32)
        .bind(new.bridge.as_str())
        .bind(RebalanceStatus::Pending.as_str())
        .bind(new.is_orphaned)
        .bind(new.recipient.to_string())
        .bind(transactions)
        .fetch_one(&self.pool)
        .await?;
        operation_from_row(&row)
    }

    async fn get_rebalance_operation(
        &self,
        id: Uuid,
    ) -> Result<Option<RebalanceOperation>, StoreError> {
        let row = sqlx::query("SELECT * FROM rebalance_operations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(operation_from_row).transpose()
    }

    async fn get_rebalance_operations(
        &self,
        filter: &OperationFilter,
    ) -> Result<Vec<RebalanceOperation>, StoreError> {
        let mut query: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            "SELECT o.* FROM rebalance_operations o \
             LEFT JOIN earmarks e ON o.earmark_id = e.id WHERE TRUE",
        );
        if let Some(statuses) = &filter.statuses {
            query.push(" AND o.status = ANY(").push_bind(status_names(statuses)).push(")");
        }
        if let Some(chain) = filter.chain_id {
            query
                .push(" AND (o.origin_chain_id = ")
                .push_bind(chain as i64)
                .push(" OR o.destination_chain_id = ")
                .push_bind(chain as i64)
                .push(")");
        }
        match filter.earmark {
            EarmarkScope::Any => {}
            EarmarkScope::Standalone => {
                query.push(" AND o.earmark_id IS NULL");
            }
            EarmarkScope::Owned => {
                query.push(" AND o.earmark_id IS NOT NULL");
            }
        }
        if let Some(invoice_id) = &filter.invoice_id {
            query.push(" AND e.invoice_id = ").push_bind(invoice_id.clone());
        }
        query.push(" ORDER BY o.created_at DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = filter.offset {
            query.push(" OFFSET ").push_bind(offset as i64);
        }
        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(operation_from_row).collect()
    }

    async fn operations_for_earmark(
        &self,
        earmark_id: Uuid,
    ) -> Result<Vec<RebalanceOperation>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM rebalance_operations WHERE earmark_id = $1 \
             ORDER BY created_at DESC",
        )
        .bind(earmark_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(operation_from_row).collect()
    }

    async fn update_rebalance_operation(
        &self,
        id: Uuid,
        update: RebalanceOperationUpdate,
    ) -> Result<RebalanceOperation, StoreError> {
        let merge = match &update.transactions {
            Some(transactions) => serde_json::to_value(transactions).map_err(corrupt)?,
            None => serde_json::json!({}),
        };
        let row = sqlx::query(
            "UPDATE rebalance_operations \
             SET status = COALESCE($2, status), \
                 transactions = transactions || $3::jsonb, \
                 updated_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(update.status.map(|status| status.to_string()))
        .bind(merge)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => operation_from_row(&row),
            None => Err(StoreError::NotFound { entity: "rebalance operation", id }),
        }
    }

    async fn cancel_rebalance_operation(
        &self,
        id: Uuid,
        orphan: bool,
    ) -> Result<RebalanceOperation, StoreError> {
        let row = sqlx::query(
            "UPDATE rebalance_operations \
             SET status = 'CANCELLED', is_orphaned = is_orphaned OR $2, updated_at = now() \
             WHERE id = $1 AND status = ANY($3) RETURNING *",
        )
        .bind(id)
        .bind(orphan)
        .bind(status_names(&RebalanceStatus::IN_FLIGHT))
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            return operation_from_row(&row);
        }
        // distinguish a missing row from an invalid transition
        match self.get_rebalance_operation(id).await? {
            Some(operation) => Err(StoreError::InvalidTransition {
                entity: "rebalance operation",
                id,
                from: operation.status.to_string(),
                to: RebalanceStatus::Cancelled.to_string(),
            }),
            None => Err(StoreError::NotFound { entity: "rebalance operation", id }),
        }
    }

    async fn expire_operations_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE rebalance_operations \
             SET status = 'EXPIRED', updated_at = now() \
             WHERE created_at < $1 AND status = ANY($2)",
        )
        .bind(cutoff)
        .bind(status_names(&RebalanceStatus::IN_FLIGHT))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
