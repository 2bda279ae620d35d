//! Postgres-backed [`SnapshotStore`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, Row};

use crate::graph::Pool as PoolState;
use crate::persistence::{ChainCheckpoint, EdgeRecord, SnapshotStore, TickRecord};
use crate::tick_provider::Tick;
use crate::types::{ChainId, PoolId};

/// PostgreSQL connection pool type alias.
pub type DbPool = Pool<Postgres>;

/// Database schema name
pub const SCHEMA: &str = "mig_routing";

const MAX_CONNECT_ATTEMPTS: u32 = 10;

/// Row of `pool_states`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRecord {
    pub pair: String,
    pub token0: String,
    pub token1: String,
    pub factory: String,
    pub chain_id: String,
    pub status: String,
}

impl PoolRecord {
    pub fn from_pool(pool: &PoolState) -> Self {
        Self {
            pair: pool.pair.to_string(),
            token0: pool.token0.to_string(),
            token1: pool.token1.to_string(),
            factory: pool.factory.clone(),
            chain_id: pool.chain.to_string(),
            status: "active".to_string(),
        }
    }

    pub fn into_pool(self) -> PoolState {
        PoolState {
            token0: self.token0.into(),
            token1: self.token1.into(),
            pair: self.pair.into(),
            factory: self.factory,
            chain: self.chain_id.into(),
        }
    }
}

/// Connects with retries and creates the schema when missing.
pub async fn connect(database_url: &str) -> Result<DbPool> {
    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                log::info!(
                    "[Database] Connected (attempt {}/{})",
                    attempt,
                    MAX_CONNECT_ATTEMPTS
                );
                match initialize_database(&pool).await {
                    Ok(()) => return Ok(pool),
                    Err(e) => last_err = Some(e),
                }
            }
            Err(e) => last_err = Some(e.into()),
        }
        // 200ms, 400ms, 800ms, ... capped at ~12.8s
        let delay_ms = (1u64 << attempt.min(6)) * 200;
        log::warn!(
            "[Database] Connect/init attempt {}/{} failed. Retrying in {} ms...",
            attempt,
            MAX_CONNECT_ATTEMPTS,
            delay_ms
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Unknown DB connection error")))
}

pub async fn initialize_database(pool: &DbPool) -> Result<()> {
    const MIGRATION_LOCK_ID: i64 = 0x524F555445524442; // "ROUTERDB"

    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(tx.as_mut())
        .await?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(tx.as_mut())
        .await?;

    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS {}.pool_states (
                pair VARCHAR(66) PRIMARY KEY,
                token0 VARCHAR(66) NOT NULL,
                token1 VARCHAR(66) NOT NULL,
                factory VARCHAR(66) NOT NULL,
                chain_id VARCHAR(32) NOT NULL,
                status VARCHAR(16) NOT NULL DEFAULT 'active',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.edge_states (
                chain_id VARCHAR(32) NOT NULL,
                from_token VARCHAR(66) NOT NULL,
                to_token VARCHAR(66) NOT NULL,
                pool_id VARCHAR(66) NOT NULL,
                edge_data TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (chain_id, from_token, to_token, pool_id)
            )",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.ticks (
                pool_address VARCHAR(66) NOT NULL,
                tick_index INTEGER NOT NULL,
                liquidity_gross TEXT NOT NULL,
                liquidity_net TEXT NOT NULL,
                PRIMARY KEY (pool_address, tick_index)
            )",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.chain_states (
                chain_id VARCHAR(32) PRIMARY KEY,
                last_block BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.price_ticks (
                id UUID PRIMARY KEY,
                price DOUBLE PRECISION NOT NULL,
                token_in VARCHAR(66) NOT NULL,
                amount_in DOUBLE PRECISION NOT NULL,
                token_out VARCHAR(66) NOT NULL,
                amount_out DOUBLE PRECISION NOT NULL,
                chain VARCHAR(32) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )",
            SCHEMA
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_price_ticks_pair_time ON {}.price_ticks (token_in, token_out, created_at)",
            SCHEMA
        ),
    ];
    for statement in &statements {
        sqlx::query(statement).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;
    log::info!("[Database] Schema {} ready", SCHEMA);
    Ok(())
}

/// [`SnapshotStore`] over the `mig_routing` schema.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        Ok(Self::new(connect(database_url).await?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn save_pool(&self, pool: &PoolState) -> Result<()> {
        let record = PoolRecord::from_pool(pool);
        sqlx::query(&format!(
            "INSERT INTO {}.pool_states (pair, token0, token1, factory, chain_id, status)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (pair) DO NOTHING",
            SCHEMA
        ))
        .bind(&record.pair)
        .bind(&record.token0)
        .bind(&record.token1)
        .bind(&record.factory)
        .bind(&record.chain_id)
        .bind(&record.status)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save pool {}", record.pair))?;
        Ok(())
    }

    async fn load_pools(&self, chain: &ChainId) -> Result<Vec<PoolState>> {
        let rows = sqlx::query(&format!(
            "SELECT pair, token0, token1, factory, chain_id, status
             FROM {}.pool_states WHERE chain_id = $1 AND status = 'active'",
            SCHEMA
        ))
        .bind(chain.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<PoolState> {
                Ok(PoolRecord {
                    pair: row.try_get("pair")?,
                    token0: row.try_get("token0")?,
                    token1: row.try_get("token1")?,
                    factory: row.try_get("factory")?,
                    chain_id: row.try_get("chain_id")?,
                    status: row.try_get("status")?,
                }
                .into_pool())
            })
            .collect()
    }

    async fn save_edges(&self, records: &[EdgeRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(&format!(
                "INSERT INTO {}.edge_states (chain_id, from_token, to_token, pool_id, edge_data)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (chain_id, from_token, to_token, pool_id)
                 DO UPDATE SET edge_data = excluded.edge_data, updated_at = NOW()",
                SCHEMA
            ))
            .bind(record.chain_id.as_str())
            .bind(record.from_token.as_str())
            .bind(record.to_token.as_str())
            .bind(record.pool_id.as_str())
            .bind(&record.edge_data)
            .execute(tx.as_mut())
            .await?;
        }
        tx.commit().await?;
        log::debug!("[Database] Saved {} edge snapshots", records.len());
        Ok(())
    }

    async fn save_ticks(&self, pool: &PoolId, ticks: &[Tick]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {}.ticks WHERE pool_address = $1", SCHEMA))
            .bind(pool.as_str())
            .execute(tx.as_mut())
            .await?;
        for tick in ticks {
            let record = TickRecord::new(pool, tick);
            sqlx::query(&format!(
                "INSERT INTO {}.ticks (pool_address, tick_index, liquidity_gross, liquidity_net)
                 VALUES ($1, $2, $3, $4)",
                SCHEMA
            ))
            .bind(record.pool_address.as_str())
            .bind(record.tick_index)
            .bind(&record.liquidity_gross)
            .bind(&record.liquidity_net)
            .execute(tx.as_mut())
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_ticks(&self, pool: &PoolId) -> Result<Option<Vec<Tick>>> {
        let rows = sqlx::query(&format!(
            "SELECT tick_index, liquidity_gross, liquidity_net
             FROM {}.ticks WHERE pool_address = $1 ORDER BY tick_index",
            SCHEMA
        ))
        .bind(pool.as_str())
        .fetch_all(&self.pool)
        .await?;

        // a pool without stored rows is rescanned
        if rows.is_empty() {
            return Ok(None);
        }
        let ticks = rows
            .into_iter()
            .map(|row| -> Result<Tick> {
                TickRecord {
                    pool_address: pool.clone(),
                    tick_index: row.try_get("tick_index")?,
                    liquidity_gross: row.try_get("liquidity_gross")?,
                    liquidity_net: row.try_get("liquidity_net")?,
                }
                .to_tick()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(ticks))
    }

    async fn checkpoint(&self, chain: &ChainId) -> Result<Option<ChainCheckpoint>> {
        let row = sqlx::query(&format!(
            "SELECT last_block, updated_at FROM {}.chain_states WHERE chain_id = $1",
            SCHEMA
        ))
        .bind(chain.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let last_block: i64 = row.try_get("last_block")?;
                let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
                Ok(Some(ChainCheckpoint {
                    chain_id: chain.clone(),
                    last_block: u64::try_from(last_block)
                        .with_context(|| format!("negative last_block {} for {}", last_block, chain))?,
                    updated_at,
                }))
            }
            None => Ok(None),
        }
    }

    async fn set_checkpoint(&self, chain: &ChainId, last_block: u64) -> Result<()> {
        let last_block = i64::try_from(last_block).context("block number out of range")?;
        sqlx::query(&format!(
            "INSERT INTO {}.chain_states (chain_id, last_block, updated_at) VALUES ($1, $2, NOW())
             ON CONFLICT (chain_id) DO UPDATE SET last_block = $2, updated_at = NOW()",
            SCHEMA
        ))
        .bind(chain.as_str())
        .bind(last_block)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
