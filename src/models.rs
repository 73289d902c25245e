// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One tracked share/click. Rows from either event table are projected onto
/// this shape, with their timestamp column aliased to `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShareEvent {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub platform: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PollOption {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub name: String,
    pub vote_count: i64,
    pub display_order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub options: Vec<PollOption>,
}

impl Poll {
    pub fn total_votes(&self) -> i64 {
        self.options.iter().map(|option| option.vote_count).sum()
    }
}

/// Row shape of the `polls` table, before options are attached.
#[derive(Debug, sqlx::FromRow)]
pub struct PollRow {
    pub id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/analytics/shares`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShareRequest {
    pub poll_id: Option<Uuid>,
    pub platform: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A validated share, ready to be written to the event store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewShare {
    pub poll_id: Uuid,
    pub platform: String,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewShare {
    /// Returns `None` when the poll id is missing or the platform is blank.
    pub fn from_request(request: ShareRequest) -> Option<Self> {
        let poll_id = request.poll_id?;
        let platform = non_empty(request.platform)?.to_lowercase();

        Some(Self {
            poll_id,
            platform,
            referrer: non_empty(request.referrer),
            utm_source: non_empty(request.utm_source),
            utm_medium: non_empty(request.utm_medium),
            utm_campaign: non_empty(request.utm_campaign),
            ip_address: non_empty(request.ip_address),
            user_agent: non_empty(request.user_agent),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub timeframe: Option<String>,
}
