//! Total Order Identifier (TOID) codec.
//!
//! A TOID packs a `(ledger sequence, transaction order, operation order)`
//! triple into a single non-negative 63-bit integer:
//!
//! ```text
//!  63      32 31                12 11         0
//! ┌──────────┬────────────────────┬────────────┐
//! │  ledger  │ transaction order  │ op order   │
//! │ (32 bit) │     (20 bit)       │  (12 bit)  │
//! └──────────┴────────────────────┴────────────┘
//! ```
//!
//! Because the fields are laid out most- to least-significant, numeric
//! comparison of two ids is the same as lexicographic comparison of their
//! triples. A single integer is therefore enough to order ledgers, the
//! transactions inside them and the operations inside those.
//!
//! A ledger id has transaction and operation order `0`; a transaction id has
//! operation order `0`. Ledger `0` is never assigned to a record and encodes
//! the position before the first ledger.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ToidError;

/// Largest ledger sequence representable (`i32::MAX`).
pub const LEDGER_MASK: u32 = (1 << 31) - 1;
/// Largest transaction order representable (`M_t`).
pub const TRANSACTION_MASK: u32 = (1 << 20) - 1;
/// Largest operation order representable (`M_o`).
pub const OPERATION_MASK: u32 = (1 << 12) - 1;

const LEDGER_SHIFT: u32 = 32;
const TRANSACTION_SHIFT: u32 = 12;

/// A decoded-or-encoded total order identifier.
///
/// The inner value is always the encoded integer; constructors validate the
/// components so every `Toid` in circulation decodes back to what built it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Toid(i64);

impl Toid {
    /// The smallest id, preceding every ledger.
    pub const ZERO: Toid = Toid(0);
    /// The largest id; a descending walk with no cursor starts here.
    pub const MAX: Toid = Toid(i64::MAX);

    /// Encode a triple, failing if any component exceeds its field.
    pub fn encode(
        ledger_sequence: u32,
        transaction_order: u32,
        operation_order: u32,
    ) -> Result<Self, ToidError> {
        check_field("ledger_sequence", ledger_sequence, LEDGER_MASK)?;
        check_field("transaction_order", transaction_order, TRANSACTION_MASK)?;
        check_field("operation_order", operation_order, OPERATION_MASK)?;

        Ok(Self(
            (i64::from(ledger_sequence) << LEDGER_SHIFT)
                | (i64::from(transaction_order) << TRANSACTION_SHIFT)
                | i64::from(operation_order),
        ))
    }

    /// Id of a ledger (transaction and operation order zero).
    pub fn ledger(sequence: u32) -> Result<Self, ToidError> {
        Self::encode(sequence, 0, 0)
    }

    /// Id of the last possible operation of a ledger.
    ///
    /// This is what the live-edge cursor `now` resolves to.
    pub fn end_of_ledger(sequence: u32) -> Result<Self, ToidError> {
        Self::encode(sequence, TRANSACTION_MASK, OPERATION_MASK)
    }

    /// Wrap a raw integer. Negative values are rejected.
    pub fn from_i64(value: i64) -> Result<Self, ToidError> {
        if value < 0 {
            return Err(ToidError::Negative(value));
        }
        Ok(Self(value))
    }

    /// The encoded integer.
    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Split into `(ledger_sequence, transaction_order, operation_order)`.
    pub fn decode(self) -> (u32, u32, u32) {
        let v = self.0;
        (
            ((v >> LEDGER_SHIFT) & i64::from(u32::MAX)) as u32,
            ((v >> TRANSACTION_SHIFT) & i64::from(TRANSACTION_MASK)) as u32,
            (v & i64::from(OPERATION_MASK)) as u32,
        )
    }

    pub fn ledger_sequence(self) -> u32 {
        self.decode().0
    }

    pub fn transaction_order(self) -> u32 {
        self.decode().1
    }

    pub fn operation_order(self) -> u32 {
        self.decode().2
    }

    /// Id of the transaction that owns this id (operation order cleared).
    pub fn transaction_id(self) -> Toid {
        Toid(self.0 & !i64::from(OPERATION_MASK))
    }
}

impl fmt::Display for Toid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Toid {
    type Err = ToidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s.parse().map_err(|_| ToidError::Unparseable(s.to_string()))?;
        Self::from_i64(value)
    }
}

impl From<Toid> for i64 {
    fn from(id: Toid) -> Self {
        id.0
    }
}

/// First id strictly greater than every id belonging to `sequence`.
///
/// Capped at `i64::MAX` for the last representable ledger, whose final
/// operation id is `i64::MAX` itself.
pub fn after_ledger(sequence: u32) -> Result<i64, ToidError> {
    Ok(Toid::end_of_ledger(sequence)?.as_i64().saturating_add(1))
}

/// Half-open id range covering a ledger and everything inside it.
pub fn ledger_range(sequence: u32) -> Result<Range<i64>, ToidError> {
    Ok(Toid::ledger(sequence)?.as_i64()..after_ledger(sequence)?)
}

/// Half-open id range covering the operations of a transaction.
///
/// Capped at `i64::MAX` like [`after_ledger`].
pub fn operations_of(transaction: Toid) -> Range<i64> {
    let start = transaction.transaction_id().as_i64();
    start..start.saturating_add(i64::from(OPERATION_MASK) + 1)
}

fn check_field(field: &'static str, value: u32, max: u32) -> Result<(), ToidError> {
    if value > max {
        return Err(ToidError::EncodingOverflow { field, value, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_inverts_encode_at_field_edges() {
        let samples = [
            (0, 0, 0),
            (1, 0, 0),
            (1, 1, 1),
            (200, TRANSACTION_MASK, OPERATION_MASK),
            (LEDGER_MASK, TRANSACTION_MASK, OPERATION_MASK),
            (LEDGER_MASK, 0, 0),
            (123_456, 789, 12),
        ];

        for (l, t, o) in samples {
            let id = Toid::encode(l, t, o).unwrap();
            assert_eq!(id.decode(), (l, t, o), "triple {l}/{t}/{o}");
            assert!(id.as_i64() >= 0);
        }
    }

    #[test]
    fn numeric_order_matches_triple_order() {
        let ordered = [
            (1, 0, 0),
            (1, 0, 1),
            (1, 0, OPERATION_MASK),
            (1, 1, 0),
            (1, TRANSACTION_MASK, OPERATION_MASK),
            (2, 0, 0),
            (2, 3, 4),
            (LEDGER_MASK, 0, 0),
        ];

        let ids: Vec<Toid> = ordered
            .iter()
            .map(|&(l, t, o)| Toid::encode(l, t, o).unwrap())
            .collect();

        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn overflow_is_reported_not_truncated() {
        let err = Toid::encode(1, TRANSACTION_MASK + 1, 0).unwrap_err();
        assert!(matches!(
            err,
            ToidError::EncodingOverflow { field: "transaction_order", .. }
        ));

        assert!(Toid::encode(1, 0, OPERATION_MASK + 1).is_err());
        assert!(Toid::encode(LEDGER_MASK + 1, 0, 0).is_err());
    }

    #[test]
    fn ledger_helpers_bracket_their_contents() {
        let range = ledger_range(7).unwrap();
        let inside = Toid::encode(7, 12, 3).unwrap().as_i64();
        assert!(range.contains(&inside));
        assert!(!range.contains(&Toid::ledger(8).unwrap().as_i64()));
        assert_eq!(range.end, Toid::ledger(8).unwrap().as_i64());

        let tx = Toid::encode(7, 12, 0).unwrap();
        let ops = operations_of(tx);
        assert!(ops.contains(&Toid::encode(7, 12, OPERATION_MASK).unwrap().as_i64()));
        assert_eq!(ops.end, Toid::encode(7, 13, 0).unwrap().as_i64());
    }

    #[test]
    fn parse_rejects_negative_and_garbage() {
        assert_eq!("4294967296".parse::<Toid>().unwrap().decode(), (1, 0, 0));
        assert!("-4".parse::<Toid>().is_err());
        assert!("12a".parse::<Toid>().is_err());
    }

    #[test]
    fn range_helpers_saturate_at_the_last_transaction() {
        let last = Toid::encode(LEDGER_MASK, TRANSACTION_MASK, 0).unwrap();
        let ops = operations_of(last);
        assert_eq!(ops.start, last.as_i64());
        assert_eq!(ops.end, i64::MAX);
        assert!(ops.contains(&Toid::encode(LEDGER_MASK, TRANSACTION_MASK, 7).unwrap().as_i64()));

        assert_eq!(after_ledger(LEDGER_MASK).unwrap(), i64::MAX);
        let ledger = ledger_range(LEDGER_MASK).unwrap();
        assert!(ledger.start < ledger.end);
    }

    #[test]
    fn transaction_id_clears_operation_bits() {
        let op = Toid::encode(9, 4, 2).unwrap();
        assert_eq!(op.transaction_id(), Toid::encode(9, 4, 0).unwrap());
    }
}
