//! Shared test doubles for the sync integration suites.

// Each suite uses a different subset of the doubles.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use castio_core::types::{AccountKind, MediaKind, PlatformKind, StatPeriod};
use castio_platform::{
    PlatformClient, PlatformError, PlatformResult, RemoteInsight, RemoteMedia, RemoteProfile,
};
use castio_store::store::{EdgeStore, RowKey, StoredRow};
use castio_store::{MemoryEdgeStore, StoreError, StoreResult};
use chrono::{DateTime, Utc};

/// How a mocked call should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Answer from the configured data.
    Ok,
    /// Fail permission-class.
    Permission,
    /// Fail with a generic API error.
    Generic,
}

/// Configurable platform client double with per-call counters.
pub struct MockPlatformClient {
    platform: PlatformKind,
    profile: RemoteProfile,
    posts: Mutex<Vec<RemoteMedia>>,
    stories: Mutex<Vec<RemoteMedia>>,
    insights: Mutex<HashMap<String, Vec<RemoteInsight>>>,
    behaviors: Mutex<HashMap<&'static str, Behavior>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockPlatformClient {
    pub fn new(external_id: &str, username: &str, followers: i64) -> Self {
        Self {
            platform: PlatformKind::Instagram,
            profile: RemoteProfile {
                external_id: external_id.to_string(),
                username: username.to_string(),
                account_kind: AccountKind::User,
                follower_count: Some(followers),
                media_count: None,
            },
            posts: Mutex::new(Vec::new()),
            stories: Mutex::new(Vec::new()),
            insights: Mutex::new(HashMap::new()),
            behaviors: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_post(&self, external_id: &str, likes: i64, posted_at: DateTime<Utc>) {
        let mut item = RemoteMedia::new(external_id, MediaKind::Post, posted_at);
        item.like_count = likes;
        item.media_url = Some(format!("https://cdn/{external_id}.jpg"));
        self.posts.lock().unwrap().push(item);
    }

    pub fn add_story(&self, external_id: &str, posted_at: DateTime<Utc>) {
        let item = RemoteMedia::new(external_id, MediaKind::Story, posted_at);
        self.stories.lock().unwrap().push(item);
    }

    /// Configure the lifetime insight series for one media item.
    pub fn add_insights(
        &self,
        media_external_id: &str,
        engagements: i64,
        impressions: i64,
        reach: i64,
        saves: i64,
    ) {
        let end = Utc::now();
        let series = vec![
            RemoteInsight::single("engagements", StatPeriod::Lifetime, engagements, end),
            RemoteInsight::single("impressions", StatPeriod::Lifetime, impressions, end),
            RemoteInsight::single("reach", StatPeriod::Lifetime, reach, end),
            RemoteInsight::single("saves", StatPeriod::Lifetime, saves, end),
        ];
        self.insights
            .lock()
            .unwrap()
            .insert(media_external_id.to_string(), series);
    }

    /// Override the behavior of one call kind: `profile`, `posts`,
    /// `stories`, `insights`, `daily` or `lifetime`.
    pub fn set_behavior(&self, call: &'static str, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(call, behavior);
    }

    /// How many times a call kind was invoked.
    pub fn calls(&self, call: &'static str) -> usize {
        self.calls.lock().unwrap().get(call).copied().unwrap_or(0)
    }

    fn record_call(&self, call: &'static str) -> PlatformResult<()> {
        *self.calls.lock().unwrap().entry(call).or_insert(0) += 1;
        match self
            .behaviors
            .lock()
            .unwrap()
            .get(call)
            .copied()
            .unwrap_or(Behavior::Ok)
        {
            Behavior::Ok => Ok(()),
            Behavior::Permission => Err(PlatformError::permission("scope revoked")),
            Behavior::Generic => Err(PlatformError::api("internal platform error")),
        }
    }
}

#[async_trait]
impl PlatformClient for MockPlatformClient {
    fn platform(&self) -> PlatformKind {
        self.platform
    }

    async fn fetch_profile(
        &self,
        _token: &str,
        _external_id: &str,
        honor_cache: bool,
    ) -> PlatformResult<Option<RemoteProfile>> {
        self.record_call("profile")?;
        if honor_cache {
            return Ok(None);
        }
        Ok(Some(self.profile.clone()))
    }

    async fn fetch_media(
        &self,
        _token: &str,
        _external_id: &str,
        kind: MediaKind,
        _since: Option<&str>,
    ) -> PlatformResult<Vec<RemoteMedia>> {
        match kind {
            MediaKind::Story => {
                self.record_call("stories")?;
                Ok(self.stories.lock().unwrap().clone())
            }
            _ => {
                self.record_call("posts")?;
                Ok(self.posts.lock().unwrap().clone())
            }
        }
    }

    async fn fetch_media_insights(
        &self,
        _token: &str,
        media_external_id: &str,
        _period: StatPeriod,
    ) -> PlatformResult<Vec<RemoteInsight>> {
        self.record_call("insights")?;
        Ok(self
            .insights
            .lock()
            .unwrap()
            .get(media_external_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_daily_insights(
        &self,
        _token: &str,
        _external_id: &str,
    ) -> PlatformResult<Vec<RemoteInsight>> {
        self.record_call("daily")?;
        Ok(vec![RemoteInsight::single(
            "impressions",
            StatPeriod::Day,
            900,
            Utc::now(),
        )])
    }

    async fn fetch_lifetime_insights(
        &self,
        _token: &str,
        _external_id: &str,
    ) -> PlatformResult<Vec<RemoteInsight>> {
        self.record_call("lifetime")?;
        Ok(vec![RemoteInsight::single(
            "followers",
            StatPeriod::Lifetime,
            10_000,
            Utc::now(),
        )])
    }
}

/// Store wrapper that can be told to fail writes on one partition; used to
/// drive the compensating-restore path of identity conversions.
pub struct FlakyStore {
    inner: Arc<MemoryEdgeStore>,
    fail_writes_on: Mutex<Option<String>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryEdgeStore>) -> Self {
        Self {
            inner,
            fail_writes_on: Mutex::new(None),
        }
    }

    /// Fail every write against this partition until cleared.
    pub fn fail_writes_on(&self, partition: &str) {
        *self.fail_writes_on.lock().unwrap() = Some(partition.to_string());
    }

    fn check(&self, partition: &str) -> StoreResult<()> {
        let failing = self.fail_writes_on.lock().unwrap();
        if failing.as_deref() == Some(partition) {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "injected write failure".into(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EdgeStore for FlakyStore {
    async fn get(&self, partition: &str, edge: &str) -> StoreResult<Option<StoredRow>> {
        self.inner.get(partition, edge).await
    }

    async fn put(
        &self,
        partition: &str,
        edge: &str,
        value: serde_json::Value,
    ) -> StoreResult<StoredRow> {
        self.inner.put(partition, edge, value).await
    }

    async fn put_if_version(
        &self,
        partition: &str,
        edge: &str,
        value: serde_json::Value,
        expected: Option<DateTime<Utc>>,
    ) -> StoreResult<StoredRow> {
        self.check(partition)?;
        self.inner.put_if_version(partition, edge, value, expected).await
    }

    async fn mark_deleted(&self, partition: &str, edge: &str) -> StoreResult<()> {
        self.inner.mark_deleted(partition, edge).await
    }

    async fn remove(&self, partition: &str, edge: &str) -> StoreResult<()> {
        self.inner.remove(partition, edge).await
    }

    async fn scan_prefix(&self, partition: &str, edge_prefix: &str) -> StoreResult<Vec<StoredRow>> {
        self.inner.scan_prefix(partition, edge_prefix).await
    }

    async fn batch_get(&self, keys: &[RowKey]) -> StoreResult<Vec<StoredRow>> {
        self.inner.batch_get(keys).await
    }

    async fn batch_put(&self, rows: Vec<(RowKey, serde_json::Value)>) -> StoreResult<()> {
        for (key, _) in &rows {
            self.check(&key.partition)?;
        }
        self.inner.batch_put(rows).await
    }
}
