//! Circle and membership storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Circle, CircleMembership, CircleRole};
use crate::error::{OsikatuError, Result};

/// Result of [`CircleStore::add_member`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddMemberOutcome {
    Added,
    AlreadyMember,
    /// The circle already holds `limit` members.
    Full { limit: u64 },
}

#[async_trait]
pub trait CircleStore: Send + Sync {
    /// Insert a circle together with its owner membership.
    async fn create(&self, circle: Circle, owner: CircleMembership) -> Result<()>;

    async fn get(&self, circle_id: &str) -> Result<Option<Circle>>;

    async fn find_by_invite_code(&self, code: &str) -> Result<Option<Circle>>;

    async fn update(&self, circle: Circle) -> Result<()>;

    /// Remove a circle and all of its memberships.
    async fn delete(&self, circle_id: &str) -> Result<()>;

    async fn count_owned_by(&self, user_id: &str) -> Result<u64>;

    /// Add a member unless present or the circle already holds `limit` members.
    /// The check and the insert happen atomically.
    async fn add_member(
        &self,
        membership: CircleMembership,
        limit: Option<u64>,
    ) -> Result<AddMemberOutcome>;

    async fn membership(&self, circle_id: &str, user_id: &str) -> Result<Option<CircleMembership>>;

    async fn members(&self, circle_id: &str) -> Result<Vec<CircleMembership>>;

    async fn member_count(&self, circle_id: &str) -> Result<u64>;

    /// Memberships of `user_id`, oldest first.
    async fn memberships_of(&self, user_id: &str) -> Result<Vec<CircleMembership>>;

    async fn set_role(&self, circle_id: &str, user_id: &str, role: CircleRole) -> Result<()>;

    /// Returns whether a membership was removed.
    async fn remove_member(&self, circle_id: &str, user_id: &str) -> Result<bool>;
}

#[derive(Default)]
struct CircleState {
    circles: HashMap<String, Circle>,
    /// circle id -> memberships in join order
    members: HashMap<String, Vec<CircleMembership>>,
}

#[derive(Clone, Default)]
pub struct InMemoryCircleStore {
    state: Arc<RwLock<CircleState>>,
}

impl InMemoryCircleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CircleStore for InMemoryCircleStore {
    async fn create(&self, circle: Circle, owner: CircleMembership) -> Result<()> {
        let mut state = self.state.write().await;
        if state.circles.values().any(|c| c.invite_code == circle.invite_code) {
            return Err(OsikatuError::conflict("Invite code already in use"));
        }
        state.members.insert(circle.id.clone(), vec![owner]);
        state.circles.insert(circle.id.clone(), circle);
        Ok(())
    }

    async fn get(&self, circle_id: &str) -> Result<Option<Circle>> {
        Ok(self.state.read().await.circles.get(circle_id).cloned())
    }

    async fn find_by_invite_code(&self, code: &str) -> Result<Option<Circle>> {
        Ok(self
            .state
            .read()
            .await
            .circles
            .values()
            .find(|c| c.invite_code == code)
            .cloned())
    }

    async fn update(&self, circle: Circle) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .circles
            .values()
            .any(|c| c.id != circle.id && c.invite_code == circle.invite_code)
        {
            return Err(OsikatuError::conflict("Invite code already in use"));
        }
        match state.circles.get_mut(&circle.id) {
            Some(slot) => {
                *slot = circle;
                Ok(())
            }
            None => Err(OsikatuError::not_found("Circle not found")),
        }
    }

    async fn delete(&self, circle_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.circles.remove(circle_id);
        state.members.remove(circle_id);
        Ok(())
    }

    async fn count_owned_by(&self, user_id: &str) -> Result<u64> {
        Ok(self
            .state
            .read()
            .await
            .circles
            .values()
            .filter(|c| c.owner_id == user_id)
            .count() as u64)
    }

    async fn add_member(
        &self,
        membership: CircleMembership,
        limit: Option<u64>,
    ) -> Result<AddMemberOutcome> {
        let mut state = self.state.write().await;
        let members = state
            .members
            .get_mut(&membership.circle_id)
            .ok_or_else(|| OsikatuError::not_found("Circle not found"))?;

        if members.iter().any(|m| m.user_id == membership.user_id) {
            return Ok(AddMemberOutcome::AlreadyMember);
        }
        if let Some(limit) = limit {
            if members.len() as u64 >= limit {
                return Ok(AddMemberOutcome::Full { limit });
            }
        }

        members.push(membership);
        Ok(AddMemberOutcome::Added)
    }

    async fn membership(&self, circle_id: &str, user_id: &str) -> Result<Option<CircleMembership>> {
        Ok(self
            .state
            .read()
            .await
            .members
            .get(circle_id)
            .and_then(|members| members.iter().find(|m| m.user_id == user_id))
            .cloned())
    }

    async fn members(&self, circle_id: &str) -> Result<Vec<CircleMembership>> {
        Ok(self
            .state
            .read()
            .await
            .members
            .get(circle_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn member_count(&self, circle_id: &str) -> Result<u64> {
        Ok(self
            .state
            .read()
            .await
            .members
            .get(circle_id)
            .map_or(0, |members| members.len() as u64))
    }

    async fn memberships_of(&self, user_id: &str) -> Result<Vec<CircleMembership>> {
        let state = self.state.read().await;
        let mut found: Vec<CircleMembership> = state
            .members
            .values()
            .flat_map(|members| members.iter().filter(|m| m.user_id == user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.circle_id.cmp(&b.circle_id)));
        Ok(found)
    }

    async fn set_role(&self, circle_id: &str, user_id: &str, role: CircleRole) -> Result<()> {
        let mut state = self.state.write().await;
        let member = state
            .members
            .get_mut(circle_id)
            .and_then(|members| members.iter_mut().find(|m| m.user_id == user_id))
            .ok_or_else(|| OsikatuError::not_found("Membership not found"))?;
        member.role = role;
        Ok(())
    }

    async fn remove_member(&self, circle_id: &str, user_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(members) = state.members.get_mut(circle_id) else {
            return Ok(false);
        };
        let before = members.len();
        members.retain(|m| m.user_id != user_id);
        Ok(members.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn circle(id: &str, code: &str) -> Circle {
        Circle {
            id: id.into(),
            name: "circle".into(),
            description: None,
            owner_id: "owner".into(),
            invite_code: code.into(),
            is_public: false,
            created_at: Utc::now(),
        }
    }

    fn membership(circle_id: &str, user_id: &str, role: CircleRole) -> CircleMembership {
        CircleMembership {
            circle_id: circle_id.into(),
            user_id: user_id.into(),
            role,
            joined_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = InMemoryCircleStore::new();
        store
            .create(circle("c1", "AAAA2222"), membership("c1", "owner", CircleRole::Owner))
            .await
            .unwrap();

        assert!(store.find_by_invite_code("AAAA2222").await.unwrap().is_some());
        assert_eq!(store.member_count("c1").await.unwrap(), 1);
        assert_eq!(store.count_owned_by("owner").await.unwrap(), 1);

        let dup = store
            .create(circle("c2", "AAAA2222"), membership("c2", "owner", CircleRole::Owner))
            .await;
        assert!(matches!(dup, Err(OsikatuError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_add_member_respects_limit() {
        let store = InMemoryCircleStore::new();
        store
            .create(circle("c1", "AAAA2222"), membership("c1", "owner", CircleRole::Owner))
            .await
            .unwrap();

        let added = store
            .add_member(membership("c1", "u2", CircleRole::Member), Some(2))
            .await
            .unwrap();
        assert_eq!(added, AddMemberOutcome::Added);

        let again = store
            .add_member(membership("c1", "u2", CircleRole::Member), Some(5))
            .await
            .unwrap();
        assert_eq!(again, AddMemberOutcome::AlreadyMember);

        let full = store
            .add_member(membership("c1", "u3", CircleRole::Member), Some(2))
            .await
            .unwrap();
        assert_eq!(full, AddMemberOutcome::Full { limit: 2 });
    }

    #[tokio::test]
    async fn test_delete_removes_memberships() {
        let store = InMemoryCircleStore::new();
        store
            .create(circle("c1", "AAAA2222"), membership("c1", "owner", CircleRole::Owner))
            .await
            .unwrap();
        store.delete("c1").await.unwrap();

        assert!(store.get("c1").await.unwrap().is_none());
        assert!(store.memberships_of("owner").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_role_changes_and_removal() {
        let store = InMemoryCircleStore::new();
        store
            .create(circle("c1", "AAAA2222"), membership("c1", "owner", CircleRole::Owner))
            .await
            .unwrap();
        store
            .add_member(membership("c1", "u2", CircleRole::Member), None)
            .await
            .unwrap();

        store.set_role("c1", "u2", CircleRole::Admin).await.unwrap();
        assert_eq!(
            store.membership("c1", "u2").await.unwrap().unwrap().role,
            CircleRole::Admin
        );

        assert!(store.remove_member("c1", "u2").await.unwrap());
        assert!(!store.remove_member("c1", "u2").await.unwrap());
    }
}
