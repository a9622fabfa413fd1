use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::{ClientError, ReservationClient};
use crate::countdown::{Countdown, CountdownEvent};
use shared::{
    CompleteReservationRequest, CompleteReservationResponse, CreateReservationRequest,
    CreateReservationResponse, NewShareholder, ReservationStatus, ShareOperation, TransactionId,
    UpdateShareCountRequest, UpdateShareCountResponse,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    WarningThreeMinutes,
    WarningOneMinute,
    /// The hold ran out locally. The expire endpoint has already been called
    /// best-effort and the session has reset to the selection step; the UI
    /// must redirect regardless of whether that call got through.
    Expired,
    /// A status poll reported a terminal state decided elsewhere (another
    /// tab, or a stale hold reclaimed server-side); the session has reset.
    StatusConverged(ReservationStatus),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("another request is still in flight")]
    Busy,

    #[error("no active reservation")]
    NoActiveReservation,

    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug)]
struct ActiveHold {
    sacrifice_id: Uuid,
    share_count: i32,
}

/// Client-side state for one purchase attempt: the generated transaction
/// id, the countdown on the current hold, and an in-flight flag so a
/// double-clicked button can never issue two overlapping mutations.
pub struct ReservationSession {
    client: ReservationClient,
    transaction_id: TransactionId,
    hold: Option<ActiveHold>,
    countdown: Option<Countdown>,
    in_flight: bool,
}

impl ReservationSession {
    pub fn new(client: ReservationClient) -> Self {
        ReservationSession {
            client,
            transaction_id: TransactionId::generate(),
            hold: None,
            countdown: None,
            in_flight: false,
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// How often `poll_status` should be driven while the buyer is in the
    /// details and confirmation steps.
    pub fn poll_interval() -> std::time::Duration {
        std::time::Duration::from_secs(shared::STATUS_POLL_INTERVAL_SECS)
    }

    pub fn has_active_hold(&self) -> bool {
        self.hold.is_some()
    }

    /// Step one: the buyer picked a share count. Places the hold and starts
    /// the countdown from the server-reported window.
    pub async fn select_shares(
        &mut self,
        sacrifice_id: Uuid,
        share_count: i32,
    ) -> Result<CreateReservationResponse, SessionError> {
        let request = CreateReservationRequest {
            transaction_id: self.transaction_id.to_string(),
            sacrifice_id,
            share_count,
        };
        let client = self.client.clone();
        let response = self
            .guarded(async move { client.create_reservation(&request).await })
            .await?;

        let window = (response.reservation.expires_at - response.reservation.created_at)
            .num_seconds();
        self.countdown = Some(Countdown::new(window));
        self.hold = Some(ActiveHold { sacrifice_id, share_count });
        info!(
            transaction_id = %self.transaction_id,
            share_count,
            "hold placed, countdown started"
        );
        Ok(response)
    }

    /// Add or drop a share while the buyer is on the details step.
    pub async fn change_share_count(
        &mut self,
        new_count: i32,
        operation: ShareOperation,
    ) -> Result<UpdateShareCountResponse, SessionError> {
        if self.hold.is_none() {
            return Err(SessionError::NoActiveReservation);
        }
        let request = UpdateShareCountRequest {
            transaction_id: self.transaction_id.to_string(),
            share_count: new_count,
            operation,
        };
        let client = self.client.clone();
        let response = self
            .guarded(async move { client.update_share_count(&request).await })
            .await?;
        if let Some(hold) = self.hold.as_mut() {
            hold.share_count = response.share_count;
        }
        Ok(response)
    }

    /// Explicit in-app back navigation: awaited cancel, then a clean slate
    /// (fresh transaction id) for the next attempt.
    pub async fn go_back(&mut self) -> Result<(), SessionError> {
        if self.hold.is_none() {
            return Err(SessionError::NoActiveReservation);
        }
        let transaction_id = self.transaction_id.to_string();
        let client = self.client.clone();
        let result = self
            .guarded(async move { client.cancel_reservation(&transaction_id).await })
            .await;
        self.reset_to_selection();
        result.map(|_| ())
    }

    /// Best-effort release on page unload or refresh. Never awaited.
    pub fn unload(&self) {
        if self.hold.is_some() {
            self.client.send_cancel_beacon(self.transaction_id.to_string());
        }
    }

    /// Final step: persist the shareholder rows. The server re-checks that
    /// the list length matches the share count it holds.
    pub async fn submit_shareholders(
        &mut self,
        shareholders: Vec<NewShareholder>,
    ) -> Result<CompleteReservationResponse, SessionError> {
        if self.hold.is_none() {
            return Err(SessionError::NoActiveReservation);
        }
        let request = CompleteReservationRequest {
            transaction_id: self.transaction_id.to_string(),
            shareholders,
        };
        let client = self.client.clone();
        let response = self
            .guarded(async move { client.complete_reservation(&request).await })
            .await?;
        self.hold = None;
        self.countdown = None;
        Ok(response)
    }

    /// Drive the countdown once per timer interval. On expiry the expire
    /// endpoint is called best-effort and the session resets either way.
    pub async fn tick(&mut self, now: Instant) -> Option<SessionEvent> {
        let event = self.countdown.as_mut()?.tick(now)?;
        match event {
            CountdownEvent::WarningThreeMinutes => Some(SessionEvent::WarningThreeMinutes),
            CountdownEvent::WarningOneMinute => Some(SessionEvent::WarningOneMinute),
            CountdownEvent::Expired => {
                let transaction_id = self.transaction_id.to_string();
                if let Err(e) = self.client.expire_reservation(&transaction_id).await {
                    warn!("expire call for {} failed: {}", transaction_id, e);
                }
                self.reset_to_selection();
                Some(SessionEvent::Expired)
            }
        }
    }

    /// Poll check-reservation-status (every 30 seconds while the buyer fills
    /// the form). A pending report re-anchors the countdown; a terminal one
    /// means some other actor decided the outcome and this tab converges.
    pub async fn poll_status(&mut self, now: Instant) -> Result<Option<SessionEvent>, SessionError> {
        if self.hold.is_none() {
            return Err(SessionError::NoActiveReservation);
        }
        let response = self
            .client
            .check_status(self.transaction_id.to_string().as_str())
            .await?;

        if response.status == ReservationStatus::Pending {
            if let Some(countdown) = self.countdown.as_mut() {
                countdown.resync(response.time_remaining, now);
            }
            return Ok(None);
        }

        self.reset_to_selection();
        Ok(Some(SessionEvent::StatusConverged(response.status)))
    }

    fn reset_to_selection(&mut self) {
        self.hold = None;
        self.countdown = None;
        self.transaction_id = TransactionId::generate();
    }

    async fn guarded<T>(
        &mut self,
        call: impl std::future::Future<Output = Result<T, ClientError>>,
    ) -> Result<T, SessionError> {
        if self.in_flight {
            return Err(SessionError::Busy);
        }
        self.in_flight = true;
        let result = call.await;
        self.in_flight = false;
        result.map_err(SessionError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ReservationSession {
        ReservationSession::new(ReservationClient::new("http://localhost:0"))
    }

    #[test]
    fn fresh_session_has_a_sixteen_char_id_and_no_hold() {
        let session = session();
        assert_eq!(session.transaction_id().as_str().len(), 16);
        assert!(!session.has_active_hold());
    }

    #[tokio::test]
    async fn tick_without_a_hold_is_silent() {
        let mut session = session();
        assert_eq!(session.tick(Instant::now()).await, None);
    }

    #[tokio::test]
    async fn mutations_without_a_hold_are_rejected_locally() {
        let mut session = session();
        assert!(matches!(
            session.change_share_count(2, ShareOperation::Add).await,
            Err(SessionError::NoActiveReservation)
        ));
        assert!(matches!(
            session.go_back().await,
            Err(SessionError::NoActiveReservation)
        ));
        assert!(matches!(
            session.submit_shareholders(Vec::new()).await,
            Err(SessionError::NoActiveReservation)
        ));
        assert!(matches!(
            session.poll_status(Instant::now()).await,
            Err(SessionError::NoActiveReservation)
        ));
    }
}
