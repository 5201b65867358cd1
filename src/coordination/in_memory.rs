use crate::coordination::CoordinationStore;
use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

#[derive(Default)]
struct State {
    strings: HashMap<String, (String, Option<Instant>)>,
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    lists: HashMap<String, VecDeque<String>>,
}

impl State {
    fn live_string(&mut self, key: &str) -> Option<&String> {
        let expired = self
            .strings
            .get(key)
            .is_some_and(|(_, expires)| expires.is_some_and(|t| Instant::now() >= t));
        if expired {
            self.strings.remove(key);
        }
        self.strings.get(key).map(|(v, _)| v)
    }
}

/// Process-local implementation of the coordination primitives.
///
/// Expiry follows tokio's clock, so paused-time tests can step past TTLs.
#[derive(Clone, Default)]
pub struct InMemoryCoordinationStore {
    state: Arc<Mutex<State>>,
    pushed: Arc<Notify>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        Ok(state.live_string(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<std::time::Duration>) -> Result<()> {
        let mut state = self.state.lock().await;
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        state.strings.insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.strings.remove(key);
        state.hashes.remove(key);
        state.zsets.remove(key);
        state.lists.remove(key);
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        let state = self.state.lock().await;
        let hash = state.hashes.get(key);
        Ok(fields
            .iter()
            .map(|field| hash.and_then(|h| h.get(field)).cloned())
            .collect())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: Option<f64>,
        max_exclusive: Option<f64>,
    ) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let Some(zset) = state.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<(&String, f64)> = zset
            .iter()
            .map(|(member, score)| (member, *score))
            .filter(|(_, score)| min.map_or(true, |m| *score >= m))
            .filter(|(_, score)| max_exclusive.map_or(true, |m| *score < m))
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        Ok(hits.into_iter().map(|(member, _)| member.clone()).collect())
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state
                .lists
                .entry(key.to_string())
                .or_default()
                .push_back(value.to_string());
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blpop(&self, key: &str, wait: std::time::Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(value) = state.lists.get_mut(key).and_then(VecDeque::pop_front) {
                    return Ok(Some(value));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state.lists.get(key).map_or(0, |l| l.len() as u64))
    }

    async fn try_lock(&self, key: &str, owner: &str, ttl: std::time::Duration) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.live_string(key).is_some() {
            return Ok(false);
        }
        state
            .strings
            .insert(key.to_string(), (owner.to_string(), Some(Instant::now() + ttl)));
        Ok(true)
    }

    async fn unlock(&self, key: &str, owner: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.live_string(key).is_some_and(|held| held == owner) {
            state.strings.remove(key);
        }
        Ok(())
    }
}
