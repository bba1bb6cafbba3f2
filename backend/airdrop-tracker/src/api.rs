//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::entry::AirdropEntry;
use crate::projector::{self, DisplayRow};
use crate::stake::StakeTable;
use crate::tracker::{TrackerHandle, TrackerSnapshot};

pub struct ApiState {
    pub entries: Vec<AirdropEntry>,
    pub tracker: TrackerHandle,
    pub stake_table: StakeTable,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RowsResponse {
    pub count: usize,
    pub rows: Vec<DisplayRow>,
}

#[derive(Serialize)]
pub struct RetryResponse {
    pub retrying: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub program: usize,
    /// Decimal string; deposits exceed JSON number precision.
    pub amount: String,
    /// Unix seconds the stake was opened.
    pub start: i64,
    /// Defaults to the current time.
    pub now: Option<i64>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /airdrop/rows`
///
/// One row per recipient with the status of the batch that carries it.
pub async fn get_rows(State(state): State<Arc<ApiState>>) -> Json<RowsResponse> {
    let snapshot = state.tracker.snapshot();
    let rows = projector::project(&state.entries, &snapshot.submitted);
    Json(RowsResponse {
        count: rows.len(),
        rows,
    })
}

/// `GET /airdrop/batches`
pub async fn get_batches(State(state): State<Arc<ApiState>>) -> Json<TrackerSnapshot> {
    Json(state.tracker.snapshot())
}

/// `POST /airdrop/retry`
///
/// Resend the batch whose submission was rejected.
pub async fn retry(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    if state.tracker.request_retry() {
        (StatusCode::ACCEPTED, Json(RetryResponse { retrying: true })).into_response()
    } else {
        (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "submission is not halted".to_string(),
            }),
        )
            .into_response()
    }
}

/// `GET /stake/quote?program=&amount=&start=`
pub async fn stake_quote(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<QuoteParams>,
) -> impl IntoResponse {
    let Ok(amount) = params.amount.parse::<u128>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("invalid amount {:?}", params.amount),
            }),
        )
            .into_response();
    };
    let now = params.now.unwrap_or_else(|| chrono::Utc::now().timestamp());

    match state
        .stake_table
        .quote(amount, params.program, params.start, now)
    {
        Ok(quote) => (StatusCode::OK, Json(quote)).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::planner;
    use crate::projector::DisplayStatus;
    use crate::tracker::tests::{entries, ScriptedChain};
    use crate::tracker::SubmissionTracker;

    async fn state(n: usize) -> (Arc<ApiState>, SubmissionTracker) {
        let input = entries(n);
        let tracker = SubmissionTracker::resume(
            Arc::new(ScriptedChain::default()),
            db::memory_pool().await,
            planner::plan(&input, planner::capacity(2)),
        )
        .await
        .unwrap();
        let state = Arc::new(ApiState {
            entries: input,
            tracker: tracker.handle(),
            stake_table: StakeTable::default(),
        });
        (state, tracker)
    }

    #[tokio::test]
    async fn rows_follow_tracker_snapshot() {
        let (state, mut tracker) = state(3).await;

        let Json(before) = get_rows(State(state.clone())).await;
        assert_eq!(before.count, 3);
        assert!(before.rows.iter().all(|r| r.status == DisplayStatus::Unknown));

        tracker.step().await.unwrap();
        let Json(after) = get_rows(State(state.clone())).await;
        let statuses: Vec<_> = after.rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                DisplayStatus::Pending,
                DisplayStatus::Pending,
                DisplayStatus::Unknown
            ]
        );

        let Json(batches) = get_batches(State(state)).await;
        assert_eq!(batches.total_batches, 2);
        assert_eq!(batches.submitted.len(), 1);
    }

    #[tokio::test]
    async fn retry_conflicts_when_not_halted() {
        let (state, _tracker) = state(1).await;
        let resp = retry(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn stake_quote_validates_amount() {
        let (state, _tracker) = state(1).await;
        let bad = QuoteParams {
            program: 0,
            amount: "abc".into(),
            start: 0,
            now: Some(0),
        };
        let resp = stake_quote(State(state.clone()), Query(bad)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let good = QuoteParams {
            program: 0,
            amount: "1000".into(),
            start: 0,
            now: Some(0),
        };
        let resp = stake_quote(State(state), Query(good)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
