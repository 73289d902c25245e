// store/mod.rs
//! Read/write access to share events and polls.
//!
//! The event table has existed under two names with different timestamp
//! columns. Which one is live is decided once at startup
//! ([`postgres::detect_event_store`]); the rest of the service only sees
//! [`EventStore`] and always gets events with a `created_at`.
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::analytics::TimeRange;
use crate::error::StoreResult;
use crate::models::{NewShare, Poll, PollOption, ShareEvent};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    PollShares,
    SocialMediaClicks,
    Memory,
    Unavailable,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventSource::PollShares => "poll_shares",
            EventSource::SocialMediaClicks => "social_media_clicks",
            EventSource::Memory => "memory",
            EventSource::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    fn source(&self) -> EventSource;

    /// Every event, oldest first, optionally limited to one poll.
    async fn fetch_all_events(&self, poll_id: Option<Uuid>) -> StoreResult<Vec<ShareEvent>>;

    /// Events with `created_at` inside `range`, oldest first.
    async fn fetch_events(&self, range: TimeRange) -> StoreResult<Vec<ShareEvent>>;

    /// Returns `None` when there is nowhere to write the event.
    async fn record_share(&self, share: &NewShare) -> StoreResult<Option<ShareEvent>>;
}

#[async_trait]
pub trait PollStore: Send + Sync {
    async fn count_polls(&self) -> StoreResult<i64>;

    /// All polls with their options in display order.
    async fn fetch_polls(&self) -> StoreResult<Vec<Poll>>;

    async fn poll_exists(&self, poll_id: Uuid) -> StoreResult<bool>;

    /// Adds one vote to an option and returns the stored option.
    async fn cast_vote(&self, poll_id: Uuid, option_id: Uuid) -> StoreResult<PollOption>;
}

/// Installed when neither event table exists yet.
pub struct UnavailableEventStore;

#[async_trait]
impl EventStore for UnavailableEventStore {
    fn source(&self) -> EventSource {
        EventSource::Unavailable
    }

    async fn fetch_all_events(&self, _poll_id: Option<Uuid>) -> StoreResult<Vec<ShareEvent>> {
        Ok(Vec::new())
    }

    async fn fetch_events(&self, _range: TimeRange) -> StoreResult<Vec<ShareEvent>> {
        Ok(Vec::new())
    }

    async fn record_share(&self, _share: &NewShare) -> StoreResult<Option<ShareEvent>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn unavailable_store_reads_empty_and_drops_writes() {
        let store = UnavailableEventStore;
        let now = Utc::now();

        assert!(store.fetch_all_events(None).await.unwrap().is_empty());
        assert!(store
            .fetch_events(TimeRange { start: now, end: now })
            .await
            .unwrap()
            .is_empty());

        let share = NewShare {
            poll_id: Uuid::new_v4(),
            platform: "facebook".to_string(),
            referrer: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            ip_address: None,
            user_agent: None,
        };
        assert_eq!(store.record_share(&share).await.unwrap(), None);
        assert_eq!(store.source().to_string(), "unavailable");
    }
}
