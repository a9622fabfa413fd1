use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReservationError;

/// Every reservation operation is keyed by a client-generated 16-character
/// identifier. Length is checked before any storage access.
pub const TRANSACTION_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Generate a fresh id from the hex form of a v4 uuid.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        TransactionId(simple[..TRANSACTION_ID_LEN].to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, ReservationError> {
        if raw.len() != TRANSACTION_ID_LEN {
            return Err(ReservationError::InvalidTransactionId {
                expected: TRANSACTION_ID_LEN,
                actual: raw.len(),
            });
        }
        Ok(TransactionId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> String {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_expected_length() {
        let id = TransactionId::generate();
        assert_eq!(id.as_str().len(), TRANSACTION_ID_LEN);
    }

    #[test]
    fn short_id_is_rejected() {
        let err = TransactionId::parse("abc123def1").unwrap_err();
        assert!(matches!(
            err,
            ReservationError::InvalidTransactionId { expected: 16, actual: 10 }
        ));
    }

    #[test]
    fn sixteen_char_id_parses() {
        let id = TransactionId::parse("0123456789abcdef").unwrap();
        assert_eq!(id.as_str(), "0123456789abcdef");
    }
}
