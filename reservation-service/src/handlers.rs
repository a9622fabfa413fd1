use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::*;
use crate::schema::*;
use shared::{
    ledger, CancelReservationResponse, CompleteReservationRequest, CompleteReservationResponse,
    CreateReservationRequest, CreateReservationResponse, InventoryChangedEvent, ReservationError,
    ReservationStatus, ReservationStatusResponse, ReservationView, ShareOperation, TransactionId,
    UpdateShareCountRequest, UpdateShareCountResponse, HOLD_DURATION_SECS,
};

pub type DbPool = Pool<AsyncPgConnection>;

const INVENTORY_CHANGED: &str = "InventoryChanged";

/// One handler instance per request. Counter math never goes through a
/// read-then-write cycle: every mutation is a single relative UPDATE whose
/// WHERE clause carries the precondition, so two racing requests cannot
/// both apply a change the other invalidated. A guard that matches zero
/// rows is classified afterwards from a fresh read.
pub struct ReservationHandler {
    pool: DbPool,
}

impl ReservationHandler {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_reservation(
        &self,
        req: CreateReservationRequest,
    ) -> Result<CreateReservationResponse, ReservationError> {
        let txid = TransactionId::parse(&req.transaction_id)?;
        if req.share_count < 1 {
            return Err(ReservationError::InvalidShareCount { requested: req.share_count });
        }

        let mut conn = self.pool.get().await.map_err(ReservationError::storage)?;
        let conn = &mut *conn;
        let now = Utc::now();

        let response = conn
            .transaction::<_, ReservationError, _>(|conn| {
                Box::pin(async move {
                    // There is no background sweep; holds that lapsed while
                    // their tab was abandoned are reclaimed here, on the next
                    // buyer's attempt, before the capacity check.
                    let reclaimed: Vec<i32> = diesel::update(
                        reservations::table
                            .filter(reservations::sacrifice_id.eq(req.sacrifice_id))
                            .filter(reservations::status.eq(ReservationStatus::Pending.as_str()))
                            .filter(reservations::expires_at.lt(now)),
                    )
                    .set((
                        reservations::status.eq(ReservationStatus::Expired.as_str()),
                        reservations::updated_at.eq(now),
                    ))
                    .returning(reservations::share_count)
                    .get_results(conn)
                    .await?;

                    let restored: i32 = reclaimed.iter().sum();
                    if restored > 0 {
                        diesel::update(
                            sacrifice_animals::table
                                .filter(sacrifice_animals::sacrifice_id.eq(req.sacrifice_id)),
                        )
                        .set((
                            sacrifice_animals::empty_share
                                .eq(sacrifice_animals::empty_share + restored),
                            sacrifice_animals::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;
                        warn!(
                            sacrifice_id = %req.sacrifice_id,
                            restored,
                            "expired {} lapsed holds before capacity check",
                            reclaimed.len()
                        );
                    }

                    // The capacity check and the decrement are one statement;
                    // the WHERE clause is re-evaluated against the committed
                    // row, so the last share goes to exactly one buyer.
                    let new_empty: Option<i32> = diesel::update(
                        sacrifice_animals::table
                            .filter(sacrifice_animals::sacrifice_id.eq(req.sacrifice_id))
                            .filter(sacrifice_animals::empty_share.ge(req.share_count)),
                    )
                    .set((
                        sacrifice_animals::empty_share
                            .eq(sacrifice_animals::empty_share - req.share_count),
                        sacrifice_animals::updated_at.eq(now),
                    ))
                    .returning(sacrifice_animals::empty_share)
                    .get_result(conn)
                    .await
                    .optional()?;

                    let new_empty = match new_empty {
                        Some(value) => value,
                        None => {
                            let animal: Option<SacrificeAnimal> = sacrifice_animals::table
                                .find(req.sacrifice_id)
                                .first(conn)
                                .await
                                .optional()?;
                            return Err(hold_conflict(
                                animal.map(|a| a.empty_share),
                                req.share_count,
                            ));
                        }
                    };

                    let expires_at = now + Duration::seconds(HOLD_DURATION_SECS);
                    let row = NewReservation {
                        transaction_id: txid.to_string(),
                        sacrifice_id: req.sacrifice_id,
                        share_count: req.share_count,
                        status: ReservationStatus::Pending.as_str().to_string(),
                        created_at: now,
                        expires_at,
                    };
                    diesel::insert_into(reservations::table)
                        .values(&row)
                        .execute(conn)
                        .await?;

                    record_inventory_event(conn, req.sacrifice_id, new_empty, now).await?;

                    Ok(CreateReservationResponse {
                        reservation: ReservationView {
                            transaction_id: row.transaction_id,
                            sacrifice_id: req.sacrifice_id,
                            share_count: req.share_count,
                            status: ReservationStatus::Pending,
                            created_at: now,
                            expires_at,
                        },
                        empty_share: new_empty,
                    })
                })
            })
            .await?;

        info!(
            transaction_id = %response.reservation.transaction_id,
            sacrifice_id = %response.reservation.sacrifice_id,
            share_count = response.reservation.share_count,
            empty_share = response.empty_share,
            "reservation created"
        );
        Ok(response)
    }

    pub async fn update_share_count(
        &self,
        req: UpdateShareCountRequest,
    ) -> Result<UpdateShareCountResponse, ReservationError> {
        let txid = TransactionId::parse(&req.transaction_id)?;

        let mut conn = self.pool.get().await.map_err(ReservationError::storage)?;
        let conn = &mut *conn;
        let now = Utc::now();

        let response = conn
            .transaction::<_, ReservationError, _>(|conn| {
                Box::pin(async move {
                    let reservation = load_reservation(conn, txid.as_str()).await?;
                    let status = parse_status(&reservation)?;
                    if status != ReservationStatus::Pending {
                        return Err(ReservationError::NotPending { status });
                    }

                    let delta = ledger::change_delta(
                        reservation.share_count,
                        req.share_count,
                        req.operation,
                    )?;

                    // The reservation row is claimed first, keyed on the count
                    // the delta was derived from. Zero rows means another
                    // request moved the count since we read it.
                    let claimed = diesel::update(
                        reservations::table
                            .filter(
                                reservations::transaction_id
                                    .eq(reservation.transaction_id.clone()),
                            )
                            .filter(reservations::status.eq(ReservationStatus::Pending.as_str()))
                            .filter(reservations::share_count.eq(reservation.share_count)),
                    )
                    .set((
                        reservations::share_count.eq(req.share_count),
                        reservations::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;
                    if claimed == 0 {
                        let current = load_reservation(conn, txid.as_str()).await?;
                        return Err(pending_guard_conflict(&current));
                    }

                    // Negative deltas always pass the guard; positive ones
                    // consume capacity and may lose the last-share race.
                    let new_empty: Option<i32> = diesel::update(
                        sacrifice_animals::table
                            .filter(
                                sacrifice_animals::sacrifice_id.eq(reservation.sacrifice_id),
                            )
                            .filter(sacrifice_animals::empty_share.ge(delta)),
                    )
                    .set((
                        sacrifice_animals::empty_share
                            .eq(sacrifice_animals::empty_share - delta),
                        sacrifice_animals::updated_at.eq(now),
                    ))
                    .returning(sacrifice_animals::empty_share)
                    .get_result(conn)
                    .await
                    .optional()?;

                    let new_empty = match new_empty {
                        Some(value) => value,
                        None => {
                            let animal: Option<SacrificeAnimal> = sacrifice_animals::table
                                .find(reservation.sacrifice_id)
                                .first(conn)
                                .await
                                .optional()?;
                            return Err(change_conflict(
                                animal.map(|a| a.empty_share),
                                reservation.share_count,
                                req.share_count,
                                req.operation,
                            ));
                        }
                    };

                    record_inventory_event(conn, reservation.sacrifice_id, new_empty, now)
                        .await?;

                    info!(
                        transaction_id = %reservation.transaction_id,
                        delta,
                        share_count = req.share_count,
                        "share count updated"
                    );
                    Ok(UpdateShareCountResponse {
                        transaction_id: reservation.transaction_id,
                        share_count: req.share_count,
                        empty_share: new_empty,
                    })
                })
            })
            .await?;

        Ok(response)
    }

    /// Shared release path for cancel, timeout, and countdown-driven expiry.
    /// The terminal transition and the restore are guarded by the pending
    /// status, so a double cancel flips the row once and restores once;
    /// every later call reports `restored: false`.
    pub async fn release_reservation(
        &self,
        transaction_id: Option<String>,
        terminal: ReservationStatus,
    ) -> Result<CancelReservationResponse, ReservationError> {
        let raw = transaction_id.ok_or(ReservationError::MissingTransactionId)?;
        let txid = TransactionId::parse(&raw)?;

        let mut conn = self.pool.get().await.map_err(ReservationError::storage)?;
        let conn = &mut *conn;
        let now = Utc::now();

        let response = conn
            .transaction::<_, ReservationError, _>(|conn| {
                Box::pin(async move {
                    let released: Option<(Uuid, i32)> = diesel::update(
                        reservations::table
                            .filter(reservations::transaction_id.eq(txid.to_string()))
                            .filter(reservations::status.eq(ReservationStatus::Pending.as_str())),
                    )
                    .set((
                        reservations::status.eq(terminal.as_str()),
                        reservations::updated_at.eq(now),
                    ))
                    .returning((reservations::sacrifice_id, reservations::share_count))
                    .get_result(conn)
                    .await
                    .optional()?;

                    let (sacrifice_id, share_count) = match released {
                        Some(row) => row,
                        None => {
                            let current = load_reservation(conn, txid.as_str()).await?;
                            return release_outcome(&current);
                        }
                    };

                    let new_empty: i32 = diesel::update(
                        sacrifice_animals::table
                            .filter(sacrifice_animals::sacrifice_id.eq(sacrifice_id)),
                    )
                    .set((
                        sacrifice_animals::empty_share
                            .eq(sacrifice_animals::empty_share + share_count),
                        sacrifice_animals::updated_at.eq(now),
                    ))
                    .returning(sacrifice_animals::empty_share)
                    .get_result(conn)
                    .await?;

                    record_inventory_event(conn, sacrifice_id, new_empty, now).await?;

                    info!(
                        transaction_id = %txid,
                        restored = share_count,
                        %terminal,
                        "reservation released"
                    );
                    Ok(CancelReservationResponse {
                        transaction_id: txid.to_string(),
                        status: terminal,
                        restored: true,
                    })
                })
            })
            .await?;

        Ok(response)
    }

    pub async fn complete_reservation(
        &self,
        req: CompleteReservationRequest,
    ) -> Result<CompleteReservationResponse, ReservationError> {
        let txid = TransactionId::parse(&req.transaction_id)?;
        if req.shareholders.is_empty() {
            return Err(ReservationError::InvalidShareholder {
                reason: "at least one shareholder is required".to_string(),
            });
        }
        for shareholder in &req.shareholders {
            shareholder.validate()?;
        }

        let mut conn = self.pool.get().await.map_err(ReservationError::storage)?;
        let conn = &mut *conn;
        let now = Utc::now();

        let response = conn
            .transaction::<_, ReservationError, _>(|conn| {
                Box::pin(async move {
                    let completed: Option<(Uuid, i32)> = diesel::update(
                        reservations::table
                            .filter(reservations::transaction_id.eq(txid.to_string()))
                            .filter(reservations::status.eq(ReservationStatus::Pending.as_str())),
                    )
                    .set((
                        reservations::status.eq(ReservationStatus::Completed.as_str()),
                        reservations::updated_at.eq(now),
                    ))
                    .returning((reservations::sacrifice_id, reservations::share_count))
                    .get_result(conn)
                    .await
                    .optional()?;

                    let (sacrifice_id, share_count) = match completed {
                        Some(row) => row,
                        None => {
                            let current = load_reservation(conn, txid.as_str()).await?;
                            return Err(pending_guard_conflict(&current));
                        }
                    };

                    // The form may have diverged from the server-held count
                    // after concurrent updates; the count on record wins. An
                    // error here rolls the status flip back with it.
                    ledger::validate_shareholder_count(req.shareholders.len(), share_count)?;

                    let rows: Vec<NewShareholderRow> = req
                        .shareholders
                        .iter()
                        .map(|s| NewShareholderRow {
                            shareholder_id: Uuid::new_v4(),
                            shareholder_name: s.shareholder_name.clone(),
                            phone_number: s.phone_number.clone(),
                            sacrifice_id,
                            transaction_id: txid.to_string(),
                            total_amount: s.total_amount.clone(),
                            paid_amount: s.paid_amount.clone(),
                            remaining_payment: s.remaining_payment.clone(),
                            delivery_location: s.delivery_location.clone(),
                            sacrifice_consent: s.sacrifice_consent,
                            security_code: s.security_code.clone(),
                            purchase_time: now,
                        })
                        .collect();
                    let shareholder_ids: Vec<Uuid> =
                        rows.iter().map(|r| r.shareholder_id).collect();

                    diesel::insert_into(shareholders::table)
                        .values(&rows)
                        .execute(conn)
                        .await?;

                    // Shares are consumed for good; the counter stays down.
                    info!(
                        transaction_id = %txid,
                        shareholders = shareholder_ids.len(),
                        "reservation completed"
                    );
                    Ok(CompleteReservationResponse {
                        transaction_id: txid.to_string(),
                        status: ReservationStatus::Completed,
                        shareholder_ids,
                    })
                })
            })
            .await?;

        Ok(response)
    }

    pub async fn check_status(
        &self,
        transaction_id: Option<String>,
    ) -> Result<ReservationStatusResponse, ReservationError> {
        let raw = transaction_id.ok_or(ReservationError::MissingTransactionId)?;
        let txid = TransactionId::parse(&raw)?;

        let mut conn = self.pool.get().await.map_err(ReservationError::storage)?;
        let conn = &mut *conn;
        let reservation = load_reservation(conn, txid.as_str()).await?;
        let status = parse_status(&reservation)?;

        let now = Utc::now();
        let time_remaining = (reservation.expires_at - now).num_seconds().max(0);

        Ok(ReservationStatusResponse {
            transaction_id: reservation.transaction_id,
            status,
            time_remaining,
            expires_at: reservation.expires_at,
        })
    }
}

async fn load_reservation(
    conn: &mut AsyncPgConnection,
    transaction_id: &str,
) -> Result<Reservation, ReservationError> {
    reservations::table
        .find(transaction_id.to_string())
        .first(conn)
        .await
        .optional()?
        .ok_or(ReservationError::NotFound)
}

fn parse_status(reservation: &Reservation) -> Result<ReservationStatus, ReservationError> {
    ReservationStatus::parse(&reservation.status).ok_or_else(|| {
        ReservationError::Storage(format!(
            "reservation {} has unknown status '{}'",
            reservation.transaction_id, reservation.status
        ))
    })
}

/// Classify a new hold whose capacity guard matched no rows, from a fresh
/// read of the counter. A counter that would now cover the request means
/// the guard lost a race rather than capacity, so the client may retry.
fn hold_conflict(empty_share: Option<i32>, requested: i32) -> ReservationError {
    match empty_share {
        None => ReservationError::AnimalNotFound,
        Some(empty) => match ledger::reserve(empty, requested) {
            Ok(_) => ReservationError::ConcurrentUpdate,
            Err(err) => err,
        },
    }
}

/// Same classification for a failed count change on an existing hold.
fn change_conflict(
    empty_share: Option<i32>,
    current_count: i32,
    new_count: i32,
    operation: ShareOperation,
) -> ReservationError {
    match empty_share {
        None => ReservationError::AnimalNotFound,
        Some(empty) => match ledger::adjust(empty, current_count, new_count, operation) {
            Ok(_) => ReservationError::ConcurrentUpdate,
            Err(err) => err,
        },
    }
}

/// Classify a pending-status guard that matched no rows.
fn pending_guard_conflict(reservation: &Reservation) -> ReservationError {
    match parse_status(reservation) {
        Ok(ReservationStatus::Pending) => ReservationError::ConcurrentUpdate,
        Ok(status) => ReservationError::NotPending { status },
        Err(err) => err,
    }
}

/// A release whose pending guard matched no rows is a repeat call when the
/// reservation already sits in a terminal state, and a lost race otherwise.
fn release_outcome(
    reservation: &Reservation,
) -> Result<CancelReservationResponse, ReservationError> {
    let status = parse_status(reservation)?;
    if status.is_terminal() {
        return Ok(CancelReservationResponse {
            transaction_id: reservation.transaction_id.clone(),
            status,
            restored: false,
        });
    }
    Err(ReservationError::ConcurrentUpdate)
}

async fn record_inventory_event(
    conn: &mut AsyncPgConnection,
    sacrifice_id: Uuid,
    empty_share: i32,
    now: DateTime<Utc>,
) -> Result<(), ReservationError> {
    let event = InventoryChangedEvent { sacrifice_id, empty_share, occurred_at: now };
    let row = NewOutboxEvent {
        id: Uuid::new_v4(),
        aggregate_id: sacrifice_id,
        event_type: INVENTORY_CHANGED.to_string(),
        event_data: serde_json::to_value(&event).map_err(ReservationError::storage)?,
        processed: false,
        created_at: now,
    };
    diesel::insert_into(outbox_events::table)
        .values(&row)
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(status: &str) -> Reservation {
        Reservation {
            transaction_id: "a1b2c3d4e5f60718".to_string(),
            sacrifice_id: Uuid::new_v4(),
            share_count: 2,
            status: status.to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::seconds(HOLD_DURATION_SECS),
            updated_at: None,
        }
    }

    #[test]
    fn failed_hold_on_a_missing_animal_is_not_found() {
        assert!(matches!(hold_conflict(None, 2), ReservationError::AnimalNotFound));
    }

    #[test]
    fn failed_hold_with_too_few_shares_reports_the_live_count() {
        // two buyers race for the last share; the loser's re-read sees zero
        let err = hold_conflict(Some(0), 1);
        assert!(matches!(
            err,
            ReservationError::InsufficientShares { available: 0, requested: 1 }
        ));
    }

    #[test]
    fn failed_hold_with_capacity_back_is_a_retryable_conflict() {
        assert!(matches!(hold_conflict(Some(3), 2), ReservationError::ConcurrentUpdate));
    }

    #[test]
    fn failed_count_change_classifies_like_a_hold() {
        let err = change_conflict(Some(0), 2, 4, ShareOperation::Add);
        assert!(matches!(
            err,
            ReservationError::InsufficientShares { available: 0, requested: 2 }
        ));
        assert!(matches!(
            change_conflict(Some(5), 2, 4, ShareOperation::Add),
            ReservationError::ConcurrentUpdate
        ));
        assert!(matches!(
            change_conflict(None, 2, 4, ShareOperation::Add),
            ReservationError::AnimalNotFound
        ));
    }

    #[test]
    fn failed_pending_guard_reports_the_actual_status() {
        let r = reservation("completed");
        assert!(matches!(
            pending_guard_conflict(&r),
            ReservationError::NotPending { status: ReservationStatus::Completed }
        ));
        let r = reservation("pending");
        assert!(matches!(pending_guard_conflict(&r), ReservationError::ConcurrentUpdate));
    }

    #[test]
    fn repeated_release_reports_without_restoring() {
        let r = reservation("cancelled");
        let response = release_outcome(&r).unwrap();
        assert_eq!(response.status, ReservationStatus::Cancelled);
        assert!(!response.restored);

        let r = reservation("expired");
        assert!(!release_outcome(&r).unwrap().restored);
    }
}
