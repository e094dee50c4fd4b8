use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::DrawResult;
use crate::error::Result;

/// A cap on items drawn since a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawLimit {
    pub since: DateTime<Utc>,
    pub max: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(DrawResult),
    /// A result for the same request id was already stored.
    Duplicate(DrawResult),
    LimitReached { drawn: u64 },
}

#[async_trait]
pub trait GachaStore: Send + Sync {
    /// Store a result. The limit check, the duplicate check and the insert
    /// are one atomic step.
    async fn insert(&self, result: DrawResult, limit: Option<DrawLimit>) -> Result<InsertOutcome>;

    async fn find_by_request(&self, user_id: &str, request_id: &str) -> Result<Option<DrawResult>>;

    /// Newest first.
    async fn history(&self, user_id: &str) -> Result<Vec<DrawResult>>;

    /// Items drawn by the user at or after `since`.
    async fn items_drawn_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone, Default)]
pub struct InMemoryGachaStore {
    results: Arc<RwLock<Vec<DrawResult>>>,
}

impl InMemoryGachaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GachaStore for InMemoryGachaStore {
    async fn insert(&self, result: DrawResult, limit: Option<DrawLimit>) -> Result<InsertOutcome> {
        let mut results = self.results.write().await;
        if let Some(existing) = results
            .iter()
            .find(|r| r.user_id == result.user_id && r.request_id == result.request_id)
        {
            return Ok(InsertOutcome::Duplicate(existing.clone()));
        }
        if let Some(limit) = limit {
            let drawn = count_since(&results, &result.user_id, limit.since);
            if drawn + result.items.len() as u64 > limit.max {
                return Ok(InsertOutcome::LimitReached { drawn });
            }
        }
        results.push(result.clone());
        Ok(InsertOutcome::Inserted(result))
    }

    async fn find_by_request(&self, user_id: &str, request_id: &str) -> Result<Option<DrawResult>> {
        Ok(self
            .results
            .read()
            .await
            .iter()
            .find(|r| r.user_id == user_id && r.request_id == request_id)
            .cloned())
    }

    async fn history(&self, user_id: &str) -> Result<Vec<DrawResult>> {
        Ok(self
            .results
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn items_drawn_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64> {
        Ok(count_since(&self.results.read().await, user_id, since))
    }
}

fn count_since(results: &[DrawResult], user_id: &str, since: DateTime<Utc>) -> u64 {
    results
        .iter()
        .filter(|r| r.user_id == user_id && r.created_at >= since)
        .map(|r| r.items.len() as u64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gacha::{GachaItem, Rarity};

    fn result(request_id: &str, items: usize) -> DrawResult {
        let item = GachaItem {
            id: "aoi-n".into(),
            name: "Aoi (casual)".into(),
            rarity: Rarity::N,
            weight: 1,
        };
        DrawResult {
            id: format!("draw-{}", request_id),
            user_id: "u1".into(),
            request_id: request_id.into(),
            items: vec![item; items],
            points_spent: 30,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_respects_limit_and_duplicates() {
        let store = InMemoryGachaStore::new();
        let limit = Some(DrawLimit {
            since: Utc::now() - chrono::Duration::hours(1),
            max: 10,
        });

        let first = store.insert(result("r1", 9), limit).await.unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        let over = store.insert(result("r2", 2), limit).await.unwrap();
        assert_eq!(over, InsertOutcome::LimitReached { drawn: 9 });

        let again = store.insert(result("r1", 1), limit).await.unwrap();
        match again {
            InsertOutcome::Duplicate(existing) => assert_eq!(existing.items.len(), 9),
            other => panic!("unexpected outcome {:?}", other),
        }

        assert!(matches!(
            store.insert(result("r3", 1), limit).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
        let since = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(store.items_drawn_since("u1", since).await.unwrap(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_never_exceed_limit() {
        let store = Arc::new(InMemoryGachaStore::new());
        let limit = Some(DrawLimit {
            since: Utc::now() - chrono::Duration::hours(1),
            max: 10,
        });

        let handles: Vec<_> = (0..32)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move { store.insert(result(&format!("r{}", n), 1), limit).await })
            })
            .collect();
        let mut inserted = 0;
        for handle in handles {
            if let InsertOutcome::Inserted(_) = handle.await.unwrap().unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 10);
    }
}
