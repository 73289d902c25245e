// handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::analytics::{self, AggregationWindow, AnalyticsSummary};
use crate::error::{AppError, AppResult};
use crate::models::{DashboardQuery, NewShare, ShareRequest};
use crate::state::AppState;

const DEFAULT_TIMEFRAME_DAYS: i64 = 7;

/// Parse the `timeframe` query parameter and clamp it to the configured maximum.
fn window_from_query(query: &DashboardQuery, max_days: i64) -> AppResult<AggregationWindow> {
    let days = match query.timeframe.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_TIMEFRAME_DAYS,
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            AppError::Validation(format!("timeframe must be a whole number of days, got {raw:?}"))
        })?,
    };

    Ok(AggregationWindow::new(days.min(max_days))?)
}

/// Aggregated dashboard analytics for the requested window
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> AppResult<Json<AnalyticsSummary>> {
    let window = window_from_query(&query, state.max_timeframe_days)?;
    let now = Utc::now();

    let (total_polls, polls, all_events, windowed_events) = tokio::try_join!(
        state.polls.count_polls(),
        state.polls.fetch_polls(),
        state.events.fetch_all_events(None),
        state.events.fetch_events(window.range(now)),
    )?;

    debug!(
        days = window.days(),
        total_shares = all_events.len(),
        recent_shares = windowed_events.len(),
        polls = polls.len(),
        "Aggregating dashboard analytics"
    );

    Ok(Json(analytics::aggregate_at(
        &all_events,
        &windowed_events,
        &polls,
        total_polls,
        window,
        now,
    )))
}

/// Track a share/click event for a poll
pub async fn track_share(
    State(state): State<AppState>,
    Json(request): Json<ShareRequest>,
) -> AppResult<impl IntoResponse> {
    let share = NewShare::from_request(request)
        .ok_or_else(|| AppError::Validation("poll_id and platform are required".to_string()))?;

    if !state.polls.poll_exists(share.poll_id).await? {
        return Err(AppError::NotFound("Poll not found".to_string()));
    }

    let body = match state.events.record_share(&share).await? {
        Some(event) => {
            info!(poll_id = %share.poll_id, platform = %share.platform, "Share tracked");
            json!({ "message": "Share tracked successfully", "share": event })
        }
        None => {
            info!(poll_id = %share.poll_id, "Share not stored, no events table yet");
            json!({ "message": "Share tracked (table not yet created)", "share": share })
        }
    };

    Ok((StatusCode::CREATED, Json(body)))
}

/// Record one vote and return the stored option so clients can reconcile
/// an optimistic update
pub async fn vote(
    State(state): State<AppState>,
    Path((poll_id, option_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    if !state.polls.poll_exists(poll_id).await? {
        return Err(AppError::NotFound("Poll not found".to_string()));
    }

    let option = state.polls.cast_vote(poll_id, option_id).await?;
    debug!(%poll_id, %option_id, vote_count = option.vote_count, "Vote recorded");

    Ok(Json(json!({ "status": "Vote recorded", "option": option })))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "eventSource": state.events.source() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(timeframe: Option<&str>) -> DashboardQuery {
        DashboardQuery {
            timeframe: timeframe.map(str::to_string),
        }
    }

    #[test]
    fn timeframe_defaults_to_a_week() {
        assert_eq!(window_from_query(&query(None), 365).unwrap().days(), 7);
        assert_eq!(window_from_query(&query(Some("")), 365).unwrap().days(), 7);
    }

    #[test]
    fn timeframe_is_clamped_to_maximum() {
        assert_eq!(window_from_query(&query(Some("30")), 365).unwrap().days(), 30);
        assert_eq!(window_from_query(&query(Some("9000")), 365).unwrap().days(), 365);
    }

    #[test]
    fn huge_timeframe_stays_within_window_limit() {
        let window = window_from_query(&query(Some("200000000")), analytics::MAX_WINDOW_DAYS).unwrap();
        assert_eq!(i64::from(window.days()), analytics::MAX_WINDOW_DAYS);

        let range = window.range(Utc::now());
        assert!(range.start < range.end);
    }

    #[test]
    fn invalid_timeframes_are_rejected() {
        for raw in ["0", "-2", "week", "7.5"] {
            assert!(matches!(
                window_from_query(&query(Some(raw)), 365),
                Err(AppError::Validation(_))
            ));
        }
    }
}
