//! JSON representations of history records and pages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use annals_core::ledger_state::HistorySnapshot;
use annals_core::models::{Ledger, Operation, OperationType, Transaction, TransactionResult};
use annals_core::ports::Connection;

// -----------------------------------------------------------------------------
// Records
// -----------------------------------------------------------------------------

// Ids are rendered as strings: TOIDs exceed the integer precision of
// JSON parsers that use doubles.

#[derive(Debug, Serialize)]
pub struct LedgerResource {
    pub id: String,
    pub sequence: u32,
    pub hash: String,
    pub previous_hash: Option<String>,
    pub transaction_count: u32,
    pub operation_count: u32,
    pub closed_at: DateTime<Utc>,
}

impl From<Ledger> for LedgerResource {
    fn from(l: Ledger) -> Self {
        Self {
            id: l.id.to_string(),
            sequence: l.sequence,
            hash: l.hash.to_hex(),
            previous_hash: l.previous_hash.map(|h| h.to_hex()),
            transaction_count: l.transaction_count,
            operation_count: l.operation_count,
            closed_at: l.closed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResource {
    pub id: String,
    pub hash: String,
    pub ledger: u32,
    pub application_order: u32,
    pub source_account: String,
    /// Decimal string, same reasoning as ids.
    pub source_account_sequence: String,
    pub fee_bid: i64,
    pub fee_charged: i64,
    pub operation_count: u32,
    pub result: TransactionResult,
    pub successful: bool,
}

impl From<Transaction> for TransactionResource {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id.to_string(),
            hash: t.hash.to_hex(),
            ledger: t.ledger_sequence,
            application_order: t.application_order,
            source_account: t.source_account,
            source_account_sequence: t.source_account_sequence.to_string(),
            fee_bid: t.fee_bid,
            fee_charged: t.fee_charged,
            operation_count: t.operation_count,
            successful: t.result.is_success(),
            result: t.result,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OperationResource {
    pub id: String,
    pub transaction_id: String,
    pub ledger: u32,
    pub application_order: u32,
    pub source_account: String,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub type_code: i16,
    pub details: BTreeMap<String, String>,
}

impl From<Operation> for OperationResource {
    fn from(o: Operation) -> Self {
        Self {
            id: o.id.to_string(),
            transaction_id: o.transaction_id.to_string(),
            ledger: o.ledger_sequence(),
            application_order: o.application_order,
            source_account: o.source_account,
            type_code: o.kind.code(),
            kind: o.kind,
            details: o.details,
        }
    }
}

/// Body of `GET /`.
#[derive(Debug, Serialize)]
pub struct StatusResource {
    pub elder_ledger: u32,
    pub latest_ledger: u32,
    pub empty: bool,
}

impl From<HistorySnapshot> for StatusResource {
    fn from(s: HistorySnapshot) -> Self {
        Self {
            elder_ledger: s.elder,
            latest_ledger: s.latest,
            empty: s.is_empty(),
        }
    }
}

// -----------------------------------------------------------------------------
// Pages
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// A record with the cursor that resumes after it.
#[derive(Debug, Serialize)]
pub struct Record<R> {
    #[serde(flatten)]
    pub node: R,
    pub paging_token: String,
}

/// One page of records.
///
/// `next_cursor` is absent at the end of the data; pass it back as
/// `cursor` to fetch the following page.
#[derive(Debug, Serialize)]
pub struct Page<R> {
    pub records: Vec<Record<R>>,
    pub next_cursor: Option<String>,
    pub page_info: PageInfo,
}

impl<C, R: From<C>> From<Connection<C>> for Page<R> {
    fn from(conn: Connection<C>) -> Self {
        let next_cursor = conn.next_cursor().map(str::to_string);
        Self {
            records: conn
                .edges
                .into_iter()
                .map(|e| Record {
                    node: R::from(e.node),
                    paging_token: e.cursor,
                })
                .collect(),
            next_cursor,
            page_info: PageInfo {
                has_next_page: conn.page_info.has_next_page,
                has_previous_page: conn.page_info.has_previous_page,
                start_cursor: conn.page_info.start_cursor,
                end_cursor: conn.page_info.end_cursor,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annals_core::ports::{Edge, PageInfo as CorePageInfo};
    use annals_core::testing;

    #[test]
    fn page_flattens_records_and_keeps_cursor() {
        let op = testing::operation(4, 2, 1);
        let cursor = op.id.to_string();
        let conn = Connection {
            edges: vec![Edge {
                node: op,
                cursor: cursor.clone(),
            }],
            page_info: CorePageInfo {
                has_next_page: true,
                has_previous_page: false,
                start_cursor: Some(cursor.clone()),
                end_cursor: Some(cursor.clone()),
            },
        };

        let page: Page<OperationResource> = conn.into();
        let json = serde_json::to_value(&page).unwrap();

        assert_eq!(json["next_cursor"], cursor);
        assert_eq!(json["records"][0]["paging_token"], cursor);
        assert_eq!(json["records"][0]["type"], "payment");
        assert_eq!(json["records"][0]["ledger"], 4);
        assert!(json["records"][0]["id"].is_string());
    }

    #[test]
    fn last_page_has_no_next_cursor() {
        let conn: Connection<Ledger> = Connection::empty(true);
        let page: Page<LedgerResource> = conn.into();
        let json = serde_json::to_value(&page).unwrap();
        assert!(json["next_cursor"].is_null());
        assert_eq!(json["page_info"]["has_previous_page"], true);
    }
}
