use anyhow::Result;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

use crate::models::*;
use crate::schema::*;

type DbPool = Pool<AsyncPgConnection>;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const BATCH_SIZE: i64 = 100;

/// Drains inventory-change events recorded by the reservation transactions
/// and publishes them to Kafka, where open storefront sessions pick them up
/// as real-time counter updates.
pub struct OutboxProcessor {
    pool: DbPool,
    producer: FutureProducer,
    inventory_topic: String,
}

impl OutboxProcessor {
    pub fn new(pool: DbPool, producer: FutureProducer, inventory_topic: String) -> Self {
        Self { pool, producer, inventory_topic }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(POLL_INTERVAL);

        loop {
            interval.tick().await;

            if let Err(e) = self.drain().await {
                error!("error draining outbox: {}", e);
            }
        }
    }

    async fn drain(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let pending_events = outbox_events::table
            .filter(outbox_events::processed.eq(false))
            .order(outbox_events::created_at.asc())
            .limit(BATCH_SIZE)
            .load::<DbOutboxEvent>(&mut conn)
            .await?;

        for event in pending_events {
            if let Err(e) = self.publish(&event).await {
                error!("failed to publish outbox event {}: {}", event.id, e);
                continue;
            }

            diesel::update(outbox_events::table.filter(outbox_events::id.eq(event.id)))
                .set(outbox_events::processed.eq(true))
                .execute(&mut conn)
                .await?;

            info!(
                event_id = %event.id,
                sacrifice_id = %event.aggregate_id,
                "published {} event",
                event.event_type
            );
        }

        Ok(())
    }

    async fn publish(&self, event: &DbOutboxEvent) -> Result<()> {
        let json = serde_json::to_string(&event.event_data)?;
        let key = event.aggregate_id.to_string();
        let record = FutureRecord::to(&self.inventory_topic)
            .payload(&json)
            .key(&key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("failed to publish event: {}", e))?;

        Ok(())
    }
}
