use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{OsikatuError, Result};

/// A registered account.
#[derive(Clone)]
pub struct User {
    pub id: String,
    /// Always stored lowercased.
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Public view of a user, without credentials.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            created_at: user.created_at,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Insert a new user. Fails with `Conflict` when the email is taken.
    async fn create_user(&self, user: User) -> Result<User>;

    async fn update_password_hash(&self, user_id: &str, hash: &str) -> Result<()>;
}

#[derive(Default)]
struct UsersInner {
    users: HashMap<String, User>,
    by_email: HashMap<String, String>,
}

/// In-memory user store
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    inner: Arc<RwLock<UsersInner>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_email
            .get(&email.to_lowercase())
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(id).cloned())
    }

    async fn create_user(&self, user: User) -> Result<User> {
        let mut inner = self.inner.write().await;
        let email = user.email.to_lowercase();
        if inner.by_email.contains_key(&email) {
            return Err(OsikatuError::conflict("Email is already registered"));
        }
        inner.by_email.insert(email, user.id.clone());
        inner.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update_password_hash(&self, user_id: &str, hash: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| OsikatuError::not_found("User not found"))?;
        user.password_hash = hash.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            display_name: "Fan".to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let store = InMemoryUserStore::new();
        store.create_user(user("u1", "fan@example.com")).await.unwrap();
        let err = store.create_user(user("u2", "FAN@example.com")).await.unwrap_err();
        assert!(matches!(err, OsikatuError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_find_by_email_is_case_insensitive() {
        let store = InMemoryUserStore::new();
        store.create_user(user("u1", "fan@example.com")).await.unwrap();
        let found = store.find_by_email("Fan@Example.com").await.unwrap().unwrap();
        assert_eq!(found.id, "u1");
    }

    #[test]
    fn test_debug_hides_credentials() {
        let rendered = format!("{:?}", user("u1", "fan@example.com"));
        assert!(!rendered.contains("hash"));
        assert!(!rendered.contains("fan@example.com"));
    }
}
