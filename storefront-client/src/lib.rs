//! Buyer-side building blocks for the share purchase flow: an HTTP client
//! for the reservation endpoints, the hold countdown with its one-shot
//! warnings, and a session that ties them together for one transaction.

pub mod client;
pub mod countdown;
pub mod session;

pub use client::{ClientError, ReservationClient};
pub use countdown::{Countdown, CountdownEvent};
pub use session::{ReservationSession, SessionError, SessionEvent};
