// store/memory.rs
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{EventSource, EventStore, PollStore};
use crate::analytics::TimeRange;
use crate::error::{StoreError, StoreResult};
use crate::models::{NewShare, Poll, PollOption, ShareEvent};

/// Initial contents for a [`MemoryStore`], read from a JSON file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MemorySeed {
    pub polls: Vec<Poll>,
    pub events: Vec<ShareEvent>,
}

/// Keeps events and polls in process memory. Used by tests and by
/// `STORE_BACKEND=memory` for running the service without a database,
/// optionally seeded from `MEMORY_SEED_PATH`.
#[derive(Default)]
pub struct MemoryStore {
    events: RwLock<Vec<ShareEvent>>,
    polls: RwLock<Vec<Poll>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(events: Vec<ShareEvent>, polls: Vec<Poll>) -> Self {
        Self {
            events: RwLock::new(events),
            polls: RwLock::new(polls),
        }
    }

    pub async fn load_seed(path: &Path) -> StoreResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Seed(format!("{}: {}", path.display(), e)))?;
        let seed: MemorySeed = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Seed(format!("{}: {}", path.display(), e)))?;

        info!(
            polls = seed.polls.len(),
            events = seed.events.len(),
            "Loaded memory store seed from {}",
            path.display()
        );
        Ok(Self::with_data(seed.events, seed.polls))
    }

    #[cfg(test)]
    pub async fn insert_poll(&self, poll: Poll) {
        self.polls.write().await.push(poll);
    }
}

fn oldest_first(mut events: Vec<ShareEvent>) -> Vec<ShareEvent> {
    events.sort_by_key(|event| event.created_at);
    events
}

#[async_trait]
impl EventStore for MemoryStore {
    fn source(&self) -> EventSource {
        EventSource::Memory
    }

    async fn fetch_all_events(&self, poll_id: Option<Uuid>) -> StoreResult<Vec<ShareEvent>> {
        let events = self.events.read().await;
        Ok(oldest_first(
            events
                .iter()
                .filter(|event| poll_id.map_or(true, |id| event.poll_id == id))
                .cloned()
                .collect(),
        ))
    }

    async fn fetch_events(&self, range: TimeRange) -> StoreResult<Vec<ShareEvent>> {
        let events = self.events.read().await;
        Ok(oldest_first(
            events
                .iter()
                .filter(|event| range.contains(event.created_at))
                .cloned()
                .collect(),
        ))
    }

    async fn record_share(&self, share: &NewShare) -> StoreResult<Option<ShareEvent>> {
        let event = ShareEvent {
            id: Uuid::new_v4(),
            poll_id: share.poll_id,
            platform: Some(share.platform.clone()),
            referrer: share.referrer.clone(),
            utm_source: share.utm_source.clone(),
            utm_medium: share.utm_medium.clone(),
            utm_campaign: share.utm_campaign.clone(),
            created_at: Utc::now(),
        };
        self.events.write().await.push(event.clone());
        Ok(Some(event))
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn count_polls(&self) -> StoreResult<i64> {
        Ok(self.polls.read().await.len() as i64)
    }

    async fn fetch_polls(&self) -> StoreResult<Vec<Poll>> {
        let mut polls = self.polls.read().await.clone();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        for poll in &mut polls {
            poll.options.sort_by_key(|option| option.display_order);
        }
        Ok(polls)
    }

    async fn poll_exists(&self, poll_id: Uuid) -> StoreResult<bool> {
        Ok(self.polls.read().await.iter().any(|poll| poll.id == poll_id))
    }

    async fn cast_vote(&self, poll_id: Uuid, option_id: Uuid) -> StoreResult<PollOption> {
        let mut polls = self.polls.write().await;
        let option = polls
            .iter_mut()
            .filter(|poll| poll.id == poll_id)
            .flat_map(|poll| poll.options.iter_mut())
            .find(|option| option.id == option_id)
            .ok_or_else(|| StoreError::NotFound(format!("option {option_id} on poll {poll_id}")))?;

        option.vote_count += 1;
        Ok(option.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    fn event_at(poll_id: Uuid, created_at: DateTime<Utc>) -> ShareEvent {
        ShareEvent {
            id: Uuid::new_v4(),
            poll_id,
            platform: Some("facebook".to_string()),
            referrer: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            created_at,
        }
    }

    fn single_option_poll() -> Poll {
        let id = Uuid::new_v4();
        Poll {
            id,
            title: "Favourite colour".to_string(),
            created_at: Utc::now(),
            options: vec![PollOption {
                id: Uuid::new_v4(),
                poll_id: id,
                name: "Teal".to_string(),
                vote_count: 4,
                display_order: 0,
            }],
        }
    }

    #[tokio::test]
    async fn fetch_events_is_bounded_and_ordered() {
        let now = Utc::now();
        let poll = Uuid::new_v4();
        let store = MemoryStore::with_data(
            vec![
                event_at(poll, now),
                event_at(poll, now - Duration::days(10)),
                event_at(poll, now - Duration::days(2)),
            ],
            Vec::new(),
        );

        let range = TimeRange {
            start: now - Duration::days(7),
            end: now,
        };
        let windowed = store.fetch_events(range).await.unwrap();
        assert_eq!(windowed.len(), 2);
        assert!(windowed[0].created_at < windowed[1].created_at);

        assert_eq!(store.fetch_all_events(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn fetch_all_events_filters_by_poll() {
        let now = Utc::now();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let store = MemoryStore::with_data(
            vec![event_at(first, now), event_at(second, now), event_at(first, now)],
            Vec::new(),
        );

        assert_eq!(store.fetch_all_events(Some(first)).await.unwrap().len(), 2);
        assert_eq!(store.fetch_all_events(Some(second)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recorded_shares_are_readable() {
        let store = MemoryStore::new();
        let share = NewShare {
            poll_id: Uuid::new_v4(),
            platform: "reddit".to_string(),
            referrer: Some("https://www.reddit.com/r/polls".to_string()),
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            ip_address: None,
            user_agent: None,
        };

        let recorded = store.record_share(&share).await.unwrap().unwrap();
        assert_eq!(recorded.platform.as_deref(), Some("reddit"));

        let all = store.fetch_all_events(None).await.unwrap();
        assert_eq!(all, vec![recorded]);
    }

    #[tokio::test]
    async fn cast_vote_increments_option() {
        let poll = single_option_poll();
        let (poll_id, option_id) = (poll.id, poll.options[0].id);
        let store = MemoryStore::new();
        store.insert_poll(poll).await;

        let option = store.cast_vote(poll_id, option_id).await.unwrap();
        assert_eq!(option.vote_count, 5);

        let polls = store.fetch_polls().await.unwrap();
        assert_eq!(polls[0].total_votes(), 5);
        assert_eq!(store.count_polls().await.unwrap(), 1);
        assert!(store.poll_exists(poll_id).await.unwrap());
    }

    #[tokio::test]
    async fn seed_file_populates_polls_and_events() {
        let poll = single_option_poll();
        let seed = serde_json::json!({
            "polls": [poll],
            "events": [event_at(poll.id, Utc::now())],
        });
        let path = std::env::temp_dir().join(format!("poll-analytics-seed-{}.json", Uuid::new_v4()));
        tokio::fs::write(&path, seed.to_string()).await.unwrap();

        let store = MemoryStore::load_seed(&path).await;
        tokio::fs::remove_file(&path).await.unwrap();
        let store = store.unwrap();

        assert!(store.poll_exists(poll.id).await.unwrap());
        assert_eq!(store.fetch_all_events(Some(poll.id)).await.unwrap().len(), 1);
        let option = store.cast_vote(poll.id, poll.options[0].id).await.unwrap();
        assert_eq!(option.vote_count, 5);
    }

    #[tokio::test]
    async fn unreadable_seed_is_reported() {
        let missing = std::env::temp_dir().join(format!("poll-analytics-missing-{}.json", Uuid::new_v4()));
        let err = MemoryStore::load_seed(&missing).await.err().unwrap();
        assert!(matches!(err, StoreError::Seed(_)));

        let path = std::env::temp_dir().join(format!("poll-analytics-bad-{}.json", Uuid::new_v4()));
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let result = MemoryStore::load_seed(&path).await;
        tokio::fs::remove_file(&path).await.unwrap();
        assert!(matches!(result.err().unwrap(), StoreError::Seed(_)));
    }

    #[tokio::test]
    async fn cast_vote_on_unknown_option_is_not_found() {
        let poll = single_option_poll();
        let poll_id = poll.id;
        let store = MemoryStore::new();
        store.insert_poll(poll).await;

        let err = store.cast_vote(poll_id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
