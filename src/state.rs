// state.rs
use std::sync::Arc;

use crate::store::{EventStore, PollStore};

#[derive(Clone)]
pub struct AppState {
    pub events: Arc<dyn EventStore>,
    pub polls: Arc<dyn PollStore>,
    pub max_timeframe_days: i64,
}

impl AppState {
    pub fn new(events: Arc<dyn EventStore>, polls: Arc<dyn PollStore>, max_timeframe_days: i64) -> Self {
        Self {
            events,
            polls,
            max_timeframe_days,
        }
    }
}
