// store/postgres.rs
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::{EventSource, EventStore, PollStore, UnavailableEventStore};
use crate::analytics::TimeRange;
use crate::error::{StoreError, StoreResult};
use crate::models::{NewShare, Poll, PollOption, PollRow, ShareEvent};

/// Physical layout of an event table.
pub trait ShareTable: Send + Sync + 'static {
    const TABLE: &'static str;
    const TIMESTAMP: &'static str;
    const SOURCE: EventSource;
}

pub struct PollSharesTable;

impl ShareTable for PollSharesTable {
    const TABLE: &'static str = "poll_shares";
    const TIMESTAMP: &'static str = "created_at";
    const SOURCE: EventSource = EventSource::PollShares;
}

pub struct SocialMediaClicksTable;

impl ShareTable for SocialMediaClicksTable {
    const TABLE: &'static str = "social_media_clicks";
    const TIMESTAMP: &'static str = "clicked_at";
    const SOURCE: EventSource = EventSource::SocialMediaClicks;
}

pub struct PgEventStore<T: ShareTable> {
    pool: PgPool,
    _table: PhantomData<T>,
}

pub type PollSharesStore = PgEventStore<PollSharesTable>;
pub type SocialMediaClicksStore = PgEventStore<SocialMediaClicksTable>;

impl<T: ShareTable> PgEventStore<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _table: PhantomData,
        }
    }

    fn columns() -> String {
        format!(
            "id, poll_id, platform, referrer, utm_source, utm_medium, utm_campaign, {} AS created_at",
            T::TIMESTAMP
        )
    }

    /// Fails with 42P01 when the table does not exist.
    async fn check_table(pool: &PgPool) -> StoreResult<()> {
        let sql = format!("SELECT id, {} FROM {} LIMIT 1", T::TIMESTAMP, T::TABLE);
        sqlx::query(&sql).fetch_optional(pool).await?;
        Ok(())
    }
}

#[async_trait]
impl<T: ShareTable> EventStore for PgEventStore<T> {
    fn source(&self) -> EventSource {
        T::SOURCE
    }

    async fn fetch_all_events(&self, poll_id: Option<Uuid>) -> StoreResult<Vec<ShareEvent>> {
        let events = match poll_id {
            Some(poll_id) => {
                let sql = format!(
                    "SELECT {} FROM {} WHERE poll_id = $1 ORDER BY {} ASC",
                    Self::columns(),
                    T::TABLE,
                    T::TIMESTAMP
                );
                sqlx::query_as::<_, ShareEvent>(&sql)
                    .bind(poll_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM {} ORDER BY {} ASC",
                    Self::columns(),
                    T::TABLE,
                    T::TIMESTAMP
                );
                sqlx::query_as::<_, ShareEvent>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(events)
    }

    async fn fetch_events(&self, range: TimeRange) -> StoreResult<Vec<ShareEvent>> {
        let sql = format!(
            "SELECT {cols} FROM {table} WHERE {ts} >= $1 AND {ts} <= $2 ORDER BY {ts} ASC",
            cols = Self::columns(),
            table = T::TABLE,
            ts = T::TIMESTAMP
        );

        let events = sqlx::query_as::<_, ShareEvent>(&sql)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.pool)
            .await?;

        Ok(events)
    }

    async fn record_share(&self, share: &NewShare) -> StoreResult<Option<ShareEvent>> {
        let sql = format!(
            r#"
            INSERT INTO {} (poll_id, platform, referrer, utm_source, utm_medium, utm_campaign, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            T::TABLE,
            Self::columns()
        );

        let event = sqlx::query_as::<_, ShareEvent>(&sql)
            .bind(share.poll_id)
            .bind(&share.platform)
            .bind(&share.referrer)
            .bind(&share.utm_source)
            .bind(&share.utm_medium)
            .bind(&share.utm_campaign)
            .bind(&share.ip_address)
            .bind(&share.user_agent)
            .fetch_one(&self.pool)
            .await?;

        Ok(Some(event))
    }
}

/// Decides the event source from the outcome of checking each table.
/// A missing table (42P01) falls through to the next candidate; any other
/// failure on a table that is still in the running is returned.
pub fn choose_event_source(
    poll_shares: StoreResult<()>,
    social_media_clicks: StoreResult<()>,
) -> StoreResult<EventSource> {
    match poll_shares {
        Ok(()) => return Ok(EventSource::PollShares),
        Err(err) if err.is_undefined_table() => {}
        Err(err) => return Err(err),
    }

    match social_media_clicks {
        Ok(()) => Ok(EventSource::SocialMediaClicks),
        Err(err) if err.is_undefined_table() => Ok(EventSource::Unavailable),
        Err(err) => Err(err),
    }
}

/// Picks the event table that exists, preferring `poll_shares`.
pub async fn detect_event_store(pool: &PgPool) -> StoreResult<Arc<dyn EventStore>> {
    let poll_shares = PollSharesStore::check_table(pool).await;
    let social_media_clicks = SocialMediaClicksStore::check_table(pool).await;

    let store: Arc<dyn EventStore> = match choose_event_source(poll_shares, social_media_clicks)? {
        EventSource::PollShares => Arc::new(PollSharesStore::new(pool.clone())),
        EventSource::SocialMediaClicks => Arc::new(SocialMediaClicksStore::new(pool.clone())),
        EventSource::Unavailable | EventSource::Memory => {
            warn!("No share events table found (poll_shares or social_media_clicks); analytics will be empty");
            Arc::new(UnavailableEventStore)
        }
    };

    info!("Using {} for share events", store.source());
    Ok(store)
}

pub struct PgPollStore {
    pool: PgPool,
}

impl PgPollStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PollStore for PgPollStore {
    async fn count_polls(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM polls")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn fetch_polls(&self) -> StoreResult<Vec<Poll>> {
        let rows = sqlx::query_as::<_, PollRow>(
            "SELECT id, title, created_at FROM polls ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let options = sqlx::query_as::<_, PollOption>(
            r#"
            SELECT id, poll_id, name,
                   COALESCE(vote_count, 0)::BIGINT AS vote_count,
                   COALESCE(display_order, 0)::INT AS display_order
            FROM poll_options
            ORDER BY poll_id, display_order
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_poll: HashMap<Uuid, Vec<PollOption>> = HashMap::new();
        for option in options {
            by_poll.entry(option.poll_id).or_default().push(option);
        }

        Ok(rows
            .into_iter()
            .map(|row| Poll {
                options: by_poll.remove(&row.id).unwrap_or_default(),
                id: row.id,
                title: row.title.unwrap_or_default(),
                created_at: row.created_at,
            })
            .collect())
    }

    async fn poll_exists(&self, poll_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM polls WHERE id = $1)")
            .bind(poll_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn cast_vote(&self, poll_id: Uuid, option_id: Uuid) -> StoreResult<PollOption> {
        let option = sqlx::query_as::<_, PollOption>(
            r#"
            UPDATE poll_options
            SET vote_count = COALESCE(vote_count, 0) + 1
            WHERE id = $1 AND poll_id = $2
            RETURNING id, poll_id, name,
                      vote_count::BIGINT AS vote_count,
                      COALESCE(display_order, 0)::INT AS display_order
            "#,
        )
        .bind(option_id)
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?;

        option.ok_or_else(|| StoreError::NotFound(format!("option {option_id} on poll {poll_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    use sqlx::error::{DatabaseError, ErrorKind};

    #[derive(Debug, thiserror::Error)]
    #[error("database error {code}")]
    struct CodedError {
        code: &'static str,
    }

    impl DatabaseError for CodedError {
        fn message(&self) -> &str {
            "database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> StoreResult<()> {
        Err(StoreError::Database(sqlx::Error::Database(Box::new(CodedError { code }))))
    }

    fn missing_table() -> StoreResult<()> {
        db_error("42P01")
    }

    #[test]
    fn undefined_table_is_recognised_by_sqlstate() {
        assert!(missing_table().unwrap_err().is_undefined_table());
        assert!(!db_error("42501").unwrap_err().is_undefined_table());
    }

    #[test]
    fn poll_shares_wins_when_present() {
        assert_eq!(choose_event_source(Ok(()), Ok(())).unwrap(), EventSource::PollShares);
        assert_eq!(
            choose_event_source(Ok(()), missing_table()).unwrap(),
            EventSource::PollShares
        );
        assert_eq!(
            choose_event_source(Ok(()), db_error("42501")).unwrap(),
            EventSource::PollShares
        );
    }

    #[test]
    fn social_media_clicks_used_when_poll_shares_missing() {
        assert_eq!(
            choose_event_source(missing_table(), Ok(())).unwrap(),
            EventSource::SocialMediaClicks
        );
    }

    #[test]
    fn neither_table_means_unavailable() {
        assert_eq!(
            choose_event_source(missing_table(), missing_table()).unwrap(),
            EventSource::Unavailable
        );
    }

    #[test]
    fn other_database_errors_abort_detection() {
        let err = choose_event_source(db_error("28P01"), Ok(())).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));

        let err = choose_event_source(missing_table(), db_error("42501")).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        assert!(!err.is_undefined_table());
    }

    #[test]
    fn timestamp_column_is_projected_as_created_at() {
        let clicks = SocialMediaClicksStore::columns();
        assert!(clicks.ends_with("clicked_at AS created_at"));
        assert!(clicks.starts_with("id, poll_id, platform"));

        assert!(PollSharesStore::columns().ends_with("created_at AS created_at"));
        assert_eq!(SocialMediaClicksTable::TABLE, "social_media_clicks");
        assert_eq!(PollSharesTable::TABLE, "poll_shares");
    }
}
