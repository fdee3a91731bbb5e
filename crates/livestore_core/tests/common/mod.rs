#![allow(dead_code)]

use futures::StreamExt;
use livestore_core::{
    FatalError, FatalHandler, Identifiable, RepoResult, SqliteHandleProvider, SqliteRepository,
    StoreConfig, Subscription, WorkerOptions,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub name: String,
    pub rank: i64,
    #[serde(default)]
    pub deck: Option<String>,
}

impl Card {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            rank: 0,
            deck: None,
        }
    }

    pub fn ranked(id: &str, name: &str, rank: i64) -> Self {
        Self {
            rank,
            ..Self::new(id, name)
        }
    }
}

impl Identifiable for Card {
    const COLLECTION: &'static str = "card";
    const FIELDS: &'static [&'static str] = &["id", "name", "rank", "deck"];

    fn identity(&self) -> String {
        self.id.clone()
    }
}

/// Collects fatal errors instead of aborting the test process.
#[derive(Clone, Default)]
pub struct FatalLog {
    seen: Arc<Mutex<Vec<String>>>,
}

impl FatalLog {
    pub fn handler(&self) -> FatalHandler {
        let seen = Arc::clone(&self.seen);
        Arc::new(move |err: &FatalError| {
            seen.lock().unwrap().push(err.to_string());
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

pub fn options(fatal: &FatalLog) -> WorkerOptions {
    WorkerOptions::new("livestore.test")
        .change_poll_interval(Duration::from_millis(20))
        .fatal_handler(fatal.handler())
}

pub fn repo_with(config: StoreConfig, fatal: &FatalLog) -> SqliteRepository<Card> {
    SqliteRepository::with_provider(SqliteHandleProvider::new(config), options(fatal)).unwrap()
}

pub fn memory_repo() -> SqliteRepository<Card> {
    repo_with(StoreConfig::in_memory(), &FatalLog::default())
}

/// Waits for the next snapshot, failing the test on timeout or stream end.
pub async fn next_snapshot<T: Identifiable>(subscription: &mut Subscription<T>) -> Vec<T> {
    try_next_snapshot(subscription)
        .await
        .expect("stream ended")
        .expect("snapshot failed")
}

pub async fn try_next_snapshot<T: Identifiable>(
    subscription: &mut Subscription<T>,
) -> Option<RepoResult<Vec<T>>> {
    tokio::time::timeout(STEP_TIMEOUT, subscription.next())
        .await
        .expect("timed out waiting for snapshot")
}

/// Asserts that no snapshot arrives within `window`.
pub async fn assert_quiet<T: Identifiable>(subscription: &mut Subscription<T>, window: Duration) {
    if let Ok(item) = tokio::time::timeout(window, subscription.next()).await {
        panic!("expected no snapshot, got {:?}", item.map(|r| r.map(|v| v.len())));
    }
}

pub fn names(cards: &[Card]) -> Vec<&str> {
    cards.iter().map(|card| card.name.as_str()).collect()
}

pub fn ids(cards: &[Card]) -> Vec<&str> {
    cards.iter().map(|card| card.id.as_str()).collect()
}
