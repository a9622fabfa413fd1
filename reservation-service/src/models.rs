use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::sacrifice_animals, primary_key(sacrifice_id))]
pub struct SacrificeAnimal {
    pub sacrifice_id: Uuid,
    pub sacrifice_no: i32,
    pub sacrifice_time: DateTime<Utc>,
    pub share_price: bigdecimal::BigDecimal,
    pub empty_share: i32,
    pub total_share: i32,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::reservations)]
pub struct Reservation {
    pub transaction_id: String,
    pub sacrifice_id: Uuid,
    pub share_count: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct NewReservation {
    pub transaction_id: String,
    pub sacrifice_id: Uuid,
    pub share_count: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::shareholders)]
pub struct NewShareholderRow {
    pub shareholder_id: Uuid,
    pub shareholder_name: String,
    pub phone_number: String,
    pub sacrifice_id: Uuid,
    pub transaction_id: String,
    pub total_amount: bigdecimal::BigDecimal,
    pub paid_amount: bigdecimal::BigDecimal,
    pub remaining_payment: bigdecimal::BigDecimal,
    pub delivery_location: String,
    pub sacrifice_consent: bool,
    pub security_code: String,
    pub purchase_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct DbOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct NewOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}
