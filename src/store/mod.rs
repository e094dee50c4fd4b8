//! Storage abstraction for user-owned CRUD records
//!
//! Each personal aggregate (oshi, diary entries, expenses, goods, schedules)
//! is kept in a [`Repository`]. The in-memory implementation backs the binary
//! and the tests; a database-backed implementation only has to implement the
//! same trait.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{OsikatuError, Result};

/// A record owned by a single user
pub trait Record: Clone + Send + Sync + 'static {
    /// Used in not-found messages
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn owner_id(&self) -> &str;
}

/// Mutation applied by [`Repository::update_many`]; returns whether it changed the record
pub type RecordUpdate<'a, T> = dyn Fn(&mut T) -> bool + Send + Sync + 'a;

#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Insert a new record. Conflict when the id is taken.
    async fn insert(&self, record: T) -> Result<T>;

    async fn get(&self, id: &str) -> Result<Option<T>>;

    /// Replace an existing record. NotFound when it does not exist.
    async fn update(&self, record: T) -> Result<T>;

    async fn delete(&self, id: &str) -> Result<Option<T>>;

    /// Records of `owner_id` in insertion order
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<T>>;

    async fn count_by_owner(&self, owner_id: &str) -> Result<u64>;

    /// Apply `update` to every record of `owner_id`; returns how many changed.
    async fn update_many(&self, owner_id: &str, update: &RecordUpdate<'_, T>) -> Result<usize>;
}

/// `RwLock`-guarded vector keeping insertion order
pub struct InMemoryRepository<T> {
    records: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for InMemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
        }
    }
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<T: Record> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed as a trait object, the form services take.
    pub fn shared() -> Arc<dyn Repository<T>> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl<T: Record> Repository<T> for InMemoryRepository<T> {
    async fn insert(&self, record: T) -> Result<T> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id() == record.id()) {
            return Err(OsikatuError::conflict(format!(
                "{} {} already exists",
                T::KIND,
                record.id()
            )));
        }
        records.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.records.read().await.iter().find(|r| r.id() == id).cloned())
    }

    async fn update(&self, record: T) -> Result<T> {
        let mut records = self.records.write().await;
        let slot = records
            .iter_mut()
            .find(|r| r.id() == record.id())
            .ok_or_else(|| OsikatuError::not_found(format!("{} not found", T::KIND)))?;
        *slot = record.clone();
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<Option<T>> {
        let mut records = self.records.write().await;
        Ok(records
            .iter()
            .position(|r| r.id() == id)
            .map(|index| records.remove(index)))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<T>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.owner_id() == owner_id)
            .cloned()
            .collect())
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<u64> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.owner_id() == owner_id)
            .count() as u64)
    }

    async fn update_many(&self, owner_id: &str, update: &RecordUpdate<'_, T>) -> Result<usize> {
        let mut records = self.records.write().await;
        let mut changed = 0;
        for record in records.iter_mut().filter(|r| r.owner_id() == owner_id) {
            if update(record) {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

/// Fetch a record and check that `user_id` owns it.
///
/// Records of other users are reported as missing so that ids cannot be
/// probed.
pub async fn get_owned<T, R>(repo: &R, user_id: &str, id: &str) -> Result<T>
where
    T: Record,
    R: Repository<T> + ?Sized,
{
    repo.get(id)
        .await?
        .filter(|record| record.owner_id() == user_id)
        .ok_or_else(|| OsikatuError::not_found(format!("{} not found", T::KIND)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: String,
        user_id: String,
        pinned: bool,
    }

    impl Record for Note {
        const KIND: &'static str = "Note";

        fn id(&self) -> &str {
            &self.id
        }

        fn owner_id(&self) -> &str {
            &self.user_id
        }
    }

    fn note(id: &str, user_id: &str) -> Note {
        Note {
            id: id.to_string(),
            user_id: user_id.to_string(),
            pinned: false,
        }
    }

    #[tokio::test]
    async fn test_crud() {
        let repo = InMemoryRepository::new();
        repo.insert(note("n1", "u1")).await.unwrap();
        assert!(matches!(
            repo.insert(note("n1", "u1")).await,
            Err(OsikatuError::Conflict(_))
        ));

        let mut n = repo.get("n1").await.unwrap().unwrap();
        n.pinned = true;
        repo.update(n).await.unwrap();
        assert!(repo.get("n1").await.unwrap().unwrap().pinned);

        assert!(repo.delete("n1").await.unwrap().is_some());
        assert!(repo.delete("n1").await.unwrap().is_none());
        assert!(matches!(
            repo.update(note("n1", "u1")).await,
            Err(OsikatuError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_owner_scoping() {
        let repo = InMemoryRepository::new();
        repo.insert(note("n1", "u1")).await.unwrap();
        repo.insert(note("n2", "u2")).await.unwrap();
        repo.insert(note("n3", "u1")).await.unwrap();

        let mine = repo.list_by_owner("u1").await.unwrap();
        assert_eq!(mine.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), vec!["n1", "n3"]);
        assert_eq!(repo.count_by_owner("u2").await.unwrap(), 1);

        assert!(get_owned(&repo, "u1", "n1").await.is_ok());
        assert!(matches!(
            get_owned(&repo, "u1", "n2").await,
            Err(OsikatuError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_many() {
        let repo = InMemoryRepository::new();
        repo.insert(note("n1", "u1")).await.unwrap();
        repo.insert(note("n2", "u1")).await.unwrap();
        repo.insert(note("n3", "u2")).await.unwrap();

        let changed = repo
            .update_many("u1", &|n: &mut Note| {
                n.pinned = true;
                true
            })
            .await
            .unwrap();
        assert_eq!(changed, 2);
        assert!(!repo.get("n3").await.unwrap().unwrap().pinned);
    }
}
