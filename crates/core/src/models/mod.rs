//! Domain models representing retained ledger history.
//!
//! These models are storage-agnostic and represent the canonical
//! form of history records within the domain layer. Records are written by
//! ingestion and never modified by this service.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::toid::Toid;

// =============================================================================
// 32-byte Hash Types
// =============================================================================

/// Macro to generate 32-byte hash newtypes with common functionality.
///
/// Generates:
/// - `from_hex()` - Parse from a 64 character hex string
/// - `to_hex()` - Lowercase hex, no prefix
/// - `Display` trait implementation
/// - `From<[u8; 32]>` implementation
macro_rules! hash32_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Parse from hex string (with or without 0x prefix).
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// Convert to lowercase hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Get the inner bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

hash32_newtype!(
    /// 32-byte ledger header hash.
    LedgerHash
);

hash32_newtype!(
    /// 32-byte transaction envelope hash.
    TransactionHash
);

// =============================================================================
// Accounts
// =============================================================================

/// Account known to the history tables.
///
/// The surrogate `id` only exists to keep participant rows narrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub address: String,
}

// =============================================================================
// Ledgers
// =============================================================================

/// A closed ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    /// Ledger id, `encode(sequence, 0, 0)`.
    pub id: Toid,
    pub sequence: u32,
    pub hash: LedgerHash,
    /// `None` only for the first ledger of the network.
    pub previous_hash: Option<LedgerHash>,
    pub transaction_count: u32,
    pub operation_count: u32,
    pub closed_at: DateTime<Utc>,
}

// =============================================================================
// Transactions
// =============================================================================

/// Result of applying a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionResult {
    Success,
    Failed,
    TooEarly,
    TooLate,
    MissingOperation,
    BadSeq,
    BadAuth,
    InsufficientBalance,
    NoAccount,
    InsufficientFee,
    BadAuthExtra,
    InternalError,
}

impl TransactionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionResult::Success => "success",
            TransactionResult::Failed => "failed",
            TransactionResult::TooEarly => "too_early",
            TransactionResult::TooLate => "too_late",
            TransactionResult::MissingOperation => "missing_operation",
            TransactionResult::BadSeq => "bad_seq",
            TransactionResult::BadAuth => "bad_auth",
            TransactionResult::InsufficientBalance => "insufficient_balance",
            TransactionResult::NoAccount => "no_account",
            TransactionResult::InsufficientFee => "insufficient_fee",
            TransactionResult::BadAuthExtra => "bad_auth_extra",
            TransactionResult::InternalError => "internal_error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransactionResult::Success)
    }
}

impl fmt::Display for TransactionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionResult {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "success" => TransactionResult::Success,
            "failed" => TransactionResult::Failed,
            "too_early" => TransactionResult::TooEarly,
            "too_late" => TransactionResult::TooLate,
            "missing_operation" => TransactionResult::MissingOperation,
            "bad_seq" => TransactionResult::BadSeq,
            "bad_auth" => TransactionResult::BadAuth,
            "insufficient_balance" => TransactionResult::InsufficientBalance,
            "no_account" => TransactionResult::NoAccount,
            "insufficient_fee" => TransactionResult::InsufficientFee,
            "bad_auth_extra" => TransactionResult::BadAuthExtra,
            "internal_error" => TransactionResult::InternalError,
            other => return Err(UnknownTag(other.to_string())),
        })
    }
}

/// A transaction applied in a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction id, `encode(ledger, application_order, 0)`.
    pub id: Toid,
    pub hash: TransactionHash,
    pub ledger_sequence: u32,
    /// 1-based position inside the ledger.
    pub application_order: u32,
    pub source_account: String,
    pub source_account_sequence: i64,
    /// Maximum fee the submitter offered.
    pub fee_bid: i64,
    pub fee_charged: i64,
    pub operation_count: u32,
    pub result: TransactionResult,
}

// =============================================================================
// Operations
// =============================================================================

/// Operation kinds. The set is closed; storage rejects unknown tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    CreateAccount,
    Payment,
    PathPayment,
    ManageOffer,
    CreatePassiveOffer,
    SetOptions,
    ChangeTrust,
    AllowTrust,
    AccountMerge,
    Inflation,
    ManageData,
}

impl OperationType {
    /// Storage tag, matching the numeric codes ingestion writes.
    pub fn code(&self) -> i16 {
        match self {
            OperationType::CreateAccount => 0,
            OperationType::Payment => 1,
            OperationType::PathPayment => 2,
            OperationType::ManageOffer => 3,
            OperationType::CreatePassiveOffer => 4,
            OperationType::SetOptions => 5,
            OperationType::ChangeTrust => 6,
            OperationType::AllowTrust => 7,
            OperationType::AccountMerge => 8,
            OperationType::Inflation => 9,
            OperationType::ManageData => 10,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        Some(match code {
            0 => OperationType::CreateAccount,
            1 => OperationType::Payment,
            2 => OperationType::PathPayment,
            3 => OperationType::ManageOffer,
            4 => OperationType::CreatePassiveOffer,
            5 => OperationType::SetOptions,
            6 => OperationType::ChangeTrust,
            7 => OperationType::AllowTrust,
            8 => OperationType::AccountMerge,
            9 => OperationType::Inflation,
            10 => OperationType::ManageData,
            _ => return None,
        })
    }
}

/// An operation inside a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Derived from `(ledger, transaction order, operation order)`.
    pub id: Toid,
    pub transaction_id: Toid,
    /// 1-based position inside the transaction.
    pub application_order: u32,
    pub source_account: String,
    #[serde(rename = "type")]
    pub kind: OperationType,
    /// Type-specific attributes.
    pub details: BTreeMap<String, String>,
}

impl Operation {
    pub fn ledger_sequence(&self) -> u32 {
        self.id.ledger_sequence()
    }
}

// =============================================================================
// Participants
// =============================================================================

/// Fan-out row linking an account to an operation it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationParticipant {
    pub account_id: i64,
    pub operation_id: Toid,
}

/// Fan-out row linking an account to a transaction it touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionParticipant {
    pub account_id: i64,
    pub transaction_id: Toid,
    pub transaction_hash: TransactionHash,
}

/// Tag read from storage that is outside a closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tag: {0}")]
pub struct UnknownTag(pub String);

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_hash_hex_roundtrip() {
        let hex = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let hash = LedgerHash::from_hex(hex).unwrap();
        assert_eq!(hash.to_hex(), hex);
        assert_eq!(LedgerHash::from_hex(&format!("0x{hex}")).unwrap(), hash);
    }

    #[test]
    fn hash32_invalid_length() {
        assert!(TransactionHash::from_hex("1234").is_err());
    }

    #[test]
    fn transaction_result_tags_roundtrip() {
        for result in [
            TransactionResult::Success,
            TransactionResult::BadSeq,
            TransactionResult::InsufficientFee,
            TransactionResult::InternalError,
        ] {
            assert_eq!(result.as_str().parse::<TransactionResult>().unwrap(), result);
        }
        assert!("exploded".parse::<TransactionResult>().is_err());
    }

    #[test]
    fn operation_type_codes_are_dense() {
        for code in 0..=10 {
            let kind = OperationType::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert!(OperationType::from_code(11).is_none());
    }

    #[test]
    fn operation_serializes_kind_as_type() {
        let op = Operation {
            id: Toid::encode(3, 1, 1).unwrap(),
            transaction_id: Toid::encode(3, 1, 0).unwrap(),
            application_order: 1,
            source_account: "GABC".into(),
            kind: OperationType::Payment,
            details: BTreeMap::from([("amount".to_string(), "10.0".to_string())]),
        };

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "payment");
        assert_eq!(json["id"], op.id.as_i64());
        assert_eq!(op.ledger_sequence(), 3);
    }
}
