pub mod error;
pub mod ledger;
pub mod txid;
pub mod types;

pub use error::ReservationError;
pub use ledger::ShareOperation;
pub use txid::TransactionId;
pub use types::*;

/// How long a hold lasts from creation before it may be expired.
pub const HOLD_DURATION_SECS: i64 = 15 * 60;

/// Countdown warning thresholds, in seconds remaining. Each fires once.
pub const WARNING_FIRST_SECS: i64 = 3 * 60;
pub const WARNING_SECOND_SECS: i64 = 60;

/// Interval at which the storefront polls check-reservation-status.
pub const STATUS_POLL_INTERVAL_SECS: u64 = 30;

/// Required length of a shareholder's chosen security code.
pub const SECURITY_CODE_LEN: usize = 6;
