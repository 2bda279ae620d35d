// Async PostgreSQL writer keeping price-tick inserts off the ingestion path
use anyhow::Result;
use async_trait::async_trait;
use log::{error, info};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::database::SCHEMA;
use crate::edges::PriceObservation;
use crate::persistence::{PriceTickRecord, PriceTickSink};

pub struct PriceTickWriter {
    tick_tx: mpsc::UnboundedSender<PriceTickRecord>,
    handle: JoinHandle<()>,
}

impl PriceTickWriter {
    pub fn new(db_pool: PgPool, batch_size: usize, flush_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        // Spawn background writer task
        let handle = tokio::spawn(Self::writer_task(db_pool, rx, batch_size.max(1), flush_interval));

        Self { tick_tx: tx, handle }
    }

    /// Queue a record for the background writer (non-blocking)
    pub fn send(&self, record: PriceTickRecord) -> Result<()> {
        self.tick_tx
            .send(record)
            .map_err(|_| anyhow::anyhow!("Failed to queue price tick - writer task may have died"))
    }

    /// Closes the channel and waits until every queued record is flushed.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.tick_tx);
        self.handle.await?;
        Ok(())
    }

    async fn writer_task(
        db_pool: PgPool,
        mut rx: mpsc::UnboundedReceiver<PriceTickRecord>,
        batch_size: usize,
        flush_interval: Duration,
    ) {
        let mut batch = Vec::with_capacity(batch_size);
        let mut flush_timer = interval(flush_interval);

        info!(
            "[PriceTickWriter] started (batch_size: {}, flush_interval: {:?})",
            batch_size, flush_interval
        );

        loop {
            tokio::select! {
                record = rx.recv() => {
                    match record {
                        Some(record) => {
                            batch.push(record);
                            if batch.len() >= batch_size {
                                Self::flush_batch(&db_pool, &mut batch).await;
                            }
                        }
                        None => {
                            // Channel closed, flush remaining and exit
                            Self::flush_batch(&db_pool, &mut batch).await;
                            info!("[PriceTickWriter] shutting down");
                            break;
                        }
                    }
                }

                _ = flush_timer.tick() => {
                    Self::flush_batch(&db_pool, &mut batch).await;
                }
            }
        }
    }

    async fn flush_batch(db_pool: &PgPool, batch: &mut Vec<PriceTickRecord>) {
        if batch.is_empty() {
            return;
        }
        let start = std::time::Instant::now();
        let count = batch.len();
        match Self::insert_batch(db_pool, batch).await {
            Ok(()) => log::debug!(
                "[PriceTickWriter] flushed {} price ticks in {:?}",
                count,
                start.elapsed()
            ),
            Err(e) => error!("[PriceTickWriter] failed to flush {} price ticks: {}", count, e),
        }
        batch.clear();
    }

    async fn insert_batch(db_pool: &PgPool, batch: &[PriceTickRecord]) -> Result<()> {
        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(format!(
            "INSERT INTO {}.price_ticks (id, price, token_in, amount_in, token_out, amount_out, chain, created_at) ",
            SCHEMA
        ));
        builder.push_values(batch, |mut row, record| {
            row.push_bind(record.id)
                .push_bind(record.price)
                .push_bind(record.token_in.to_string())
                .push_bind(record.amount_in)
                .push_bind(record.token_out.to_string())
                .push_bind(record.amount_out)
                .push_bind(record.chain.to_string())
                .push_bind(record.created_at);
        });
        builder.push(" ON CONFLICT (id) DO NOTHING");
        builder.build().execute(db_pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PriceTickSink for PriceTickWriter {
    async fn record(&self, observation: &PriceObservation) -> Result<()> {
        self.send(PriceTickRecord::from(observation))
    }
}
