use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReservationError;
use crate::ledger::ShareOperation;
use crate::SECURITY_CODE_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReservationStatus::Pending),
            "approved" => Some(ReservationStatus::Approved),
            "rejected" => Some(ReservationStatus::Rejected),
            "cancelled" => Some(ReservationStatus::Cancelled),
            "completed" => Some(ReservationStatus::Completed),
            "expired" => Some(ReservationStatus::Expired),
            _ => None,
        }
    }

    /// Pending and approved reservations still hold shares against the
    /// animal's counter; every other status has released or consumed them.
    pub fn holds_shares(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Pending)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReservationRequest {
    pub transaction_id: String,
    pub sacrifice_id: Uuid,
    pub share_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateShareCountRequest {
    pub transaction_id: String,
    pub share_count: i32,
    pub operation: ShareOperation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelReservationRequest {
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteReservationRequest {
    pub transaction_id: String,
    pub shareholders: Vec<NewShareholder>,
}

/// One buyer's row in a finalized purchase. Amounts are computed by the
/// client form and re-validated here before anything is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShareholder {
    pub shareholder_name: String,
    pub phone_number: String,
    pub delivery_location: String,
    pub sacrifice_consent: bool,
    pub security_code: String,
    pub total_amount: BigDecimal,
    pub paid_amount: BigDecimal,
    pub remaining_payment: BigDecimal,
}

impl NewShareholder {
    pub fn validate(&self) -> Result<(), ReservationError> {
        if self.shareholder_name.trim().is_empty() {
            return Err(invalid("shareholder_name is required"));
        }
        if self.phone_number.trim().is_empty() {
            return Err(invalid("phone_number is required"));
        }
        if self.delivery_location.trim().is_empty() {
            return Err(invalid("delivery_location is required"));
        }
        if self.security_code.len() != SECURITY_CODE_LEN
            || !self.security_code.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid("security_code must be exactly 6 digits"));
        }
        if self.paid_amount < BigDecimal::from(0) || self.total_amount < BigDecimal::from(0) {
            return Err(invalid("amounts must not be negative"));
        }
        if self.paid_amount > self.total_amount {
            return Err(invalid("paid_amount exceeds total_amount"));
        }
        if self.remaining_payment != &self.total_amount - &self.paid_amount {
            return Err(invalid("remaining_payment must equal total_amount - paid_amount"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ReservationError {
    ReservationError::InvalidShareholder { reason: reason.to_string() }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationView {
    pub transaction_id: String,
    pub sacrifice_id: Uuid,
    pub share_count: i32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReservationResponse {
    pub reservation: ReservationView,
    pub empty_share: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateShareCountResponse {
    pub transaction_id: String,
    pub share_count: i32,
    pub empty_share: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelReservationResponse {
    pub transaction_id: String,
    pub status: ReservationStatus,
    /// Whether this call actually put shares back. False on the idempotent
    /// no-op path.
    pub restored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteReservationResponse {
    pub transaction_id: String,
    pub status: ReservationStatus,
    pub shareholder_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationStatusResponse {
    pub transaction_id: String,
    pub status: ReservationStatus,
    /// Server-computed seconds until expiry, clamped at zero.
    pub time_remaining: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Published to the inventory-events topic whenever an operation changes an
/// animal's empty-share counter, so open storefront sessions converge
/// without polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryChangedEvent {
    pub sacrifice_id: Uuid,
    pub empty_share: i32,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shareholder() -> NewShareholder {
        NewShareholder {
            shareholder_name: "Ahmet Yilmaz".to_string(),
            phone_number: "+905551234567".to_string(),
            delivery_location: "kesimhane".to_string(),
            sacrifice_consent: true,
            security_code: "123456".to_string(),
            total_amount: BigDecimal::from(40000),
            paid_amount: BigDecimal::from(10000),
            remaining_payment: BigDecimal::from(30000),
        }
    }

    #[test]
    fn valid_shareholder_passes() {
        shareholder().validate().unwrap();
    }

    #[test]
    fn security_code_must_be_six_digits() {
        let mut s = shareholder();
        s.security_code = "12345".to_string();
        assert!(s.validate().is_err());
        s.security_code = "12345a".to_string();
        assert!(s.validate().is_err());
        s.security_code = "1234567".to_string();
        assert!(s.validate().is_err());
    }

    #[test]
    fn remaining_must_match_total_minus_paid() {
        let mut s = shareholder();
        s.remaining_payment = BigDecimal::from(25000);
        assert!(s.validate().is_err());
    }

    #[test]
    fn paid_cannot_exceed_total() {
        let mut s = shareholder();
        s.paid_amount = BigDecimal::from(50000);
        s.remaining_payment = BigDecimal::from(-10000);
        assert!(s.validate().is_err());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Approved,
            ReservationStatus::Rejected,
            ReservationStatus::Cancelled,
            ReservationStatus::Completed,
            ReservationStatus::Expired,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::parse("held"), None);
    }

    #[test]
    fn only_pending_and_approved_hold_shares() {
        assert!(ReservationStatus::Pending.holds_shares());
        assert!(ReservationStatus::Approved.holds_shares());
        assert!(!ReservationStatus::Cancelled.holds_shares());
        assert!(!ReservationStatus::Completed.holds_shares());
        assert!(!ReservationStatus::Expired.holds_shares());
    }

    #[test]
    fn only_pending_can_still_transition() {
        assert!(!ReservationStatus::Pending.is_terminal());
        for status in [
            ReservationStatus::Approved,
            ReservationStatus::Rejected,
            ReservationStatus::Cancelled,
            ReservationStatus::Completed,
            ReservationStatus::Expired,
        ] {
            assert!(status.is_terminal());
        }
    }
}
