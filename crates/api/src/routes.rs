//! HTTP routes.
//!
//! Every list endpoint takes `cursor`, `order` and `limit` query parameters
//! and returns a [`Page`].

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use annals_core::error::DomainError;
use annals_core::ports::PageParams;
use annals_core::services::HistoryService;

use crate::problem::ApiError;
use crate::resources::{LedgerResource, OperationResource, Page, StatusResource, TransactionResource};

type ApiResult<T> = Result<Json<T>, ApiError>;
type Params = Result<Query<PageParams>, QueryRejection>;

/// Build the router over a shared history service.
pub fn router(service: Arc<HistoryService>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/health", get(health_check))
        .route("/ledgers", get(list_ledgers))
        .route("/ledgers/{seq}", get(get_ledger))
        .route("/ledgers/{seq}/transactions", get(list_ledger_transactions))
        .route("/ledgers/{seq}/operations", get(list_ledger_operations))
        .route("/transactions", get(list_transactions))
        .route("/transactions/{hash}", get(get_transaction))
        .route("/transactions/{hash}/operations", get(list_transaction_operations))
        .route("/operations", get(list_operations))
        .route("/operations/{id}", get(get_operation))
        .route("/accounts/{address}/transactions", get(list_account_transactions))
        .route("/accounts/{address}/operations", get(list_account_operations))
        .with_state(service)
}

fn page_params(params: Params) -> Result<PageParams, ApiError> {
    params
        .map(|Query(p)| p)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Sequences in paths are not cursors: anything unparseable simply names no ledger.
fn ledger_sequence(raw: &str) -> Result<u32, ApiError> {
    raw.parse()
        .map_err(|_| DomainError::NotFound(format!("ledger {raw}")).into())
}

async fn status(State(service): State<Arc<HistoryService>>) -> Json<StatusResource> {
    Json(service.history_status().into())
}

/// Health check endpoint.
async fn health_check(State(service): State<Arc<HistoryService>>) -> (StatusCode, &'static str) {
    if service.is_healthy().await {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
    }
}

// -----------------------------------------------------------------------------
// Ledgers
// -----------------------------------------------------------------------------

async fn list_ledgers(
    State(service): State<Arc<HistoryService>>,
    params: Params,
) -> ApiResult<Page<LedgerResource>> {
    let params = page_params(params)?;
    Ok(Json(service.list_ledgers(&params).await?.into()))
}

async fn get_ledger(
    State(service): State<Arc<HistoryService>>,
    Path(seq): Path<String>,
) -> ApiResult<LedgerResource> {
    let sequence = ledger_sequence(&seq)?;
    Ok(Json(service.get_ledger(sequence).await?.into()))
}

async fn list_ledger_transactions(
    State(service): State<Arc<HistoryService>>,
    Path(seq): Path<String>,
    params: Params,
) -> ApiResult<Page<TransactionResource>> {
    let params = page_params(params)?;
    let sequence = ledger_sequence(&seq)?;
    Ok(Json(
        service
            .list_transactions_for_ledger(sequence, &params)
            .await?
            .into(),
    ))
}

async fn list_ledger_operations(
    State(service): State<Arc<HistoryService>>,
    Path(seq): Path<String>,
    params: Params,
) -> ApiResult<Page<OperationResource>> {
    let params = page_params(params)?;
    let sequence = ledger_sequence(&seq)?;
    Ok(Json(
        service
            .list_operations_for_ledger(sequence, &params)
            .await?
            .into(),
    ))
}

// -----------------------------------------------------------------------------
// Transactions
// -----------------------------------------------------------------------------

async fn list_transactions(
    State(service): State<Arc<HistoryService>>,
    params: Params,
) -> ApiResult<Page<TransactionResource>> {
    let params = page_params(params)?;
    Ok(Json(service.list_transactions(&params).await?.into()))
}

async fn get_transaction(
    State(service): State<Arc<HistoryService>>,
    Path(hash): Path<String>,
) -> ApiResult<TransactionResource> {
    Ok(Json(service.get_transaction(&hash).await?.into()))
}

async fn list_transaction_operations(
    State(service): State<Arc<HistoryService>>,
    Path(hash): Path<String>,
    params: Params,
) -> ApiResult<Page<OperationResource>> {
    let params = page_params(params)?;
    Ok(Json(
        service
            .list_operations_for_transaction(&hash, &params)
            .await?
            .into(),
    ))
}

// -----------------------------------------------------------------------------
// Operations
// -----------------------------------------------------------------------------

async fn list_operations(
    State(service): State<Arc<HistoryService>>,
    params: Params,
) -> ApiResult<Page<OperationResource>> {
    let params = page_params(params)?;
    Ok(Json(service.list_operations(&params).await?.into()))
}

async fn get_operation(
    State(service): State<Arc<HistoryService>>,
    Path(id): Path<String>,
) -> ApiResult<OperationResource> {
    Ok(Json(service.get_operation(&id).await?.into()))
}

// -----------------------------------------------------------------------------
// Accounts
// -----------------------------------------------------------------------------

async fn list_account_transactions(
    State(service): State<Arc<HistoryService>>,
    Path(address): Path<String>,
    params: Params,
) -> ApiResult<Page<TransactionResource>> {
    let params = page_params(params)?;
    Ok(Json(
        service
            .list_transactions_for_account(&address, &params)
            .await?
            .into(),
    ))
}

async fn list_account_operations(
    State(service): State<Arc<HistoryService>>,
    Path(address): Path<String>,
    params: Params,
) -> ApiResult<Page<OperationResource>> {
    let params = page_params(params)?;
    Ok(Json(
        service
            .list_operations_for_account(&address, &params)
            .await?
            .into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use annals_core::ledger_state::LedgerState;
    use annals_core::services::HistoryConfig;
    use annals_core::testing::{self, MemoryRepositories};
    use annals_core::toid::Toid;

    struct Harness {
        app: Router,
        repos: Arc<MemoryRepositories>,
    }

    /// Ledgers 1..=6 ingested, 1 and 2 pruned.
    fn harness() -> Harness {
        let repos = Arc::new(MemoryRepositories::populated(1..=6, 2, 2));
        repos.prune_before(3);
        let state = Arc::new(LedgerState::new());
        state.publish(3, 6).unwrap();
        let service = HistoryService::new(repos.clone(), state, HistoryConfig::default());
        Harness {
            app: router(Arc::new(service)),
            repos,
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn bad_paging_input_is_400_with_distinct_types() {
        let cases = [
            ("/ledgers?cursor=abc", "malformed_cursor"),
            ("/ledgers?cursor=1-", "malformed_cursor"),
            ("/ledgers?cursor=", "malformed_cursor"),
            ("/operations?order=sideways", "invalid_order"),
            ("/operations?limit=0", "invalid_limit"),
            ("/operations?limit=201", "invalid_limit"),
            ("/operations?limit=-1", "invalid_limit"),
            ("/operations?limit=ten", "invalid_limit"),
            ("/operations?limit=99999999999999999999", "invalid_limit"),
            ("/ledgers?limit=1&limit=2", "invalid_request"),
        ];
        for (uri, kind) in cases {
            let (status, body) = get_json(harness().app, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["type"], kind, "{uri}");
            assert_eq!(body["status"], 400);
        }
    }

    #[tokio::test]
    async fn pruned_history_is_410() {
        let cursor = Toid::ledger(2).unwrap();
        let uri = format!("/operations?order=desc&cursor={cursor}");
        let (status, body) = get_json(harness().app, &uri).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["type"], "before_history");

        let (status, _) = get_json(harness().app, "/ledgers/1").await;
        assert_eq!(status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn ascending_from_pruned_cursor_resumes_at_window() {
        let cursor = Toid::ledger(1).unwrap();
        let uri = format!("/ledgers?cursor={cursor}&limit=2");
        let (status, body) = get_json(harness().app, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"][0]["sequence"], 3);
        assert_eq!(body["records"][1]["sequence"], 4);
        assert_eq!(body["next_cursor"], Toid::ledger(4).unwrap().to_string());
    }

    #[tokio::test]
    async fn missing_records_are_404() {
        for uri in [
            "/ledgers/99",
            "/ledgers/abc",
            "/transactions/nothex",
            "/operations/12x",
        ] {
            let (status, body) = get_json(harness().app, uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["type"], "not_found");
        }
    }

    #[tokio::test]
    async fn now_descending_starts_at_newest() {
        let (status, body) = get_json(harness().app, "/transactions?cursor=now&order=desc&limit=3").await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body["records"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        let expected: Vec<String> = [(6, 2), (6, 1), (5, 2)]
            .iter()
            .map(|&(l, t)| Toid::encode(l, t, 0).unwrap().to_string())
            .collect();
        assert_eq!(ids, expected);
        assert!(body["next_cursor"].is_string());
    }

    #[tokio::test]
    async fn nested_collections() {
        let hash = testing::transaction_hash(4, 2).to_hex();
        let (status, body) = get_json(harness().app, &format!("/transactions/{hash}/operations")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"].as_array().unwrap().len(), 2);
        assert!(body["next_cursor"].is_null());

        let (status, body) = get_json(harness().app, "/ledgers/5/transactions").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"][0]["ledger"], 5);

        let address = testing::source_address(3, 1);
        let (status, body) =
            get_json(harness().app, &format!("/accounts/{address}/operations?limit=1")).await;
        assert_eq!(status, StatusCode::OK);
        let token = body["records"][0]["paging_token"].as_str().unwrap();
        assert!(token.contains('-'), "{token}");
    }

    #[tokio::test]
    async fn storage_outage_is_503() {
        let h = harness();
        h.repos.set_unavailable(true);

        let (status, body) = get_json(h.app.clone(), "/ledgers").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["type"], "storage_unavailable");

        let response = h
            .app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn status_reports_window() {
        let (status, body) = get_json(harness().app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["elder_ledger"], 3);
        assert_eq!(body["latest_ledger"], 6);
    }
}
