// analytics.rs
//! Turns share/click events and a poll snapshot into the dashboard summary.
//!
//! Everything here is pure: callers fetch the inputs, this module only
//! buckets, groups and ranks them.
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AnalyticsError;
use crate::models::{Poll, ShareEvent};

pub const TOP_REFERRERS: usize = 10;
pub const TOP_POLLS: usize = 10;
pub const UNTITLED_POLL: &str = "Untitled Poll";
/// Upper bound on a window, about a century.
pub const MAX_WINDOW_DAYS: i64 = 36_500;

const UNKNOWN_PLATFORM: &str = "unknown";
const DIRECT: &str = "direct";

/// Inclusive `[start, end]` bound on `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// A trailing window of whole days ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationWindow {
    days: u32,
}

impl AggregationWindow {
    pub fn new(days: i64) -> Result<Self, AnalyticsError> {
        if days <= 0 || days > MAX_WINDOW_DAYS {
            return Err(AnalyticsError::InvalidWindow(days));
        }
        let days = u32::try_from(days).map_err(|_| AnalyticsError::InvalidWindow(days))?;
        Ok(Self { days })
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn range(&self, now: DateTime<Utc>) -> TimeRange {
        TimeRange {
            start: now - Duration::days(i64::from(self.days)),
            end: now,
        }
    }

    /// The calendar days of the series, oldest first, ending on `today`.
    fn dates(&self, today: NaiveDate) -> Vec<NaiveDate> {
        (0..i64::from(self.days))
            .rev()
            .map(|back| today - Duration::days(back))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_polls: i64,
    pub total_votes: i64,
    pub total_shares: usize,
    pub recent_shares: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformCount {
    pub platform: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UtmSourceStats {
    pub source: String,
    pub clicks: usize,
    pub campaigns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferrerCount {
    pub referrer: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPoll {
    pub id: Uuid,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub total_votes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub overview: Overview,
    pub daily_shares: Vec<DailyCount>,
    pub platform_stats: Vec<PlatformCount>,
    pub utm_sources: Vec<UtmSourceStats>,
    pub referrers: Vec<ReferrerCount>,
    pub top_polls: Vec<TopPoll>,
    pub timeframe: u32,
}

pub fn aggregate(
    all_events: &[ShareEvent],
    windowed_events: &[ShareEvent],
    polls: &[Poll],
    total_poll_count: i64,
    window: AggregationWindow,
) -> AnalyticsSummary {
    aggregate_at(
        all_events,
        windowed_events,
        polls,
        total_poll_count,
        window,
        Utc::now(),
    )
}

/// Same as [`aggregate`] with an explicit clock.
pub fn aggregate_at(
    all_events: &[ShareEvent],
    windowed_events: &[ShareEvent],
    polls: &[Poll],
    total_poll_count: i64,
    window: AggregationWindow,
    now: DateTime<Utc>,
) -> AnalyticsSummary {
    AnalyticsSummary {
        overview: Overview {
            total_polls: total_poll_count,
            total_votes: polls.iter().map(Poll::total_votes).sum(),
            total_shares: all_events.len(),
            recent_shares: windowed_events.len(),
        },
        daily_shares: daily_shares(windowed_events, window, now.date_naive()),
        platform_stats: platform_stats(all_events),
        utm_sources: utm_sources(windowed_events),
        referrers: referrers(windowed_events),
        top_polls: top_polls(polls),
        timeframe: window.days(),
    }
}

fn daily_shares(events: &[ShareEvent], window: AggregationWindow, today: NaiveDate) -> Vec<DailyCount> {
    let dates = window.dates(today);
    let mut counts = vec![0usize; dates.len()];
    let index: HashMap<NaiveDate, usize> = dates
        .iter()
        .enumerate()
        .map(|(i, date)| (*date, i))
        .collect();

    for event in events {
        if let Some(&i) = index.get(&event.created_at.date_naive()) {
            counts[i] += 1;
        }
    }

    dates
        .into_iter()
        .zip(counts)
        .map(|(date, count)| DailyCount {
            date: date.format("%Y-%m-%d").to_string(),
            count,
        })
        .collect()
}

/// Counts keys in first-seen order, so a stable sort afterwards keeps ties
/// in encounter order.
struct Tally {
    order: Vec<(String, usize)>,
    index: HashMap<String, usize>,
}

impl Tally {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn add(&mut self, key: &str) -> usize {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.order.push((key.to_string(), 0));
                self.index.insert(key.to_string(), self.order.len() - 1);
                self.order.len() - 1
            }
        };
        self.order[slot].1 += 1;
        slot
    }

    fn ranked(mut self) -> Vec<(String, usize)> {
        self.order.sort_by(|a, b| b.1.cmp(&a.1));
        self.order
    }
}

fn or_default<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default,
    }
}

fn platform_stats(events: &[ShareEvent]) -> Vec<PlatformCount> {
    let mut tally = Tally::new();
    for event in events {
        tally.add(or_default(event.platform.as_deref(), UNKNOWN_PLATFORM));
    }
    tally
        .ranked()
        .into_iter()
        .map(|(platform, count)| PlatformCount { platform, count })
        .collect()
}

fn utm_sources(events: &[ShareEvent]) -> Vec<UtmSourceStats> {
    let mut tally = Tally::new();
    let mut campaigns: Vec<HashSet<&str>> = Vec::new();

    for event in events {
        let slot = tally.add(or_default(event.utm_source.as_deref(), DIRECT));
        if slot == campaigns.len() {
            campaigns.push(HashSet::new());
        }
        if let Some(campaign) = event.utm_campaign.as_deref().filter(|c| !c.is_empty()) {
            campaigns[slot].insert(campaign);
        }
    }

    let mut sources: Vec<UtmSourceStats> = tally
        .order
        .into_iter()
        .zip(campaigns)
        .map(|((source, clicks), campaigns)| UtmSourceStats {
            source,
            clicks,
            campaigns: campaigns.len(),
        })
        .collect();
    sources.sort_by(|a, b| b.clicks.cmp(&a.clicks));
    sources
}

/// Display domain for a referrer: the URL host without a leading `www.`,
/// the raw value when it does not parse as a URL with a host, or `direct`.
pub fn referrer_domain(referrer: Option<&str>) -> String {
    let raw = match referrer {
        Some(r) if !r.is_empty() && r != DIRECT => r,
        _ => return DIRECT.to_string(),
    };

    match url::Url::parse(raw) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) if !host.is_empty() => {
                host.strip_prefix("www.").unwrap_or(host).to_string()
            }
            _ => raw.to_string(),
        },
        Err(_) => raw.to_string(),
    }
}

fn referrers(events: &[ShareEvent]) -> Vec<ReferrerCount> {
    let mut tally = Tally::new();
    for event in events {
        tally.add(&referrer_domain(event.referrer.as_deref()));
    }
    tally
        .ranked()
        .into_iter()
        .take(TOP_REFERRERS)
        .map(|(referrer, count)| ReferrerCount { referrer, count })
        .collect()
}

/// Only the most recently created polls are candidates; an older poll with
/// more votes never makes the list.
fn top_polls(polls: &[Poll]) -> Vec<TopPoll> {
    let mut candidates: Vec<&Poll> = polls.iter().collect();
    candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    candidates.truncate(TOP_POLLS);

    let mut ranked: Vec<TopPoll> = candidates
        .into_iter()
        .map(|poll| TopPoll {
            id: poll.id,
            question: if poll.title.is_empty() {
                UNTITLED_POLL.to_string()
            } else {
                poll.title.clone()
            },
            created_at: poll.created_at,
            total_votes: poll.total_votes(),
        })
        .collect();
    ranked.sort_by(|a, b| b.total_votes.cmp(&a.total_votes));
    ranked.truncate(TOP_POLLS);
    ranked
}
