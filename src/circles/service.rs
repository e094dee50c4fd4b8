//! Circle management with role checks and plan limits.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::error::CircleError;
use super::store::{AddMemberOutcome, CircleStore};
use super::types::{
    Circle, CircleMembership, CircleRole, CircleView, CreateCircleRequest, MemberView,
    UpdateCircleRequest,
};
use super::{CircleCleanup, generate_invite_code};
use crate::auth::UserStore;
use crate::billing::{EntitlementsManager, limits};
use crate::error::{OsikatuError, Result};
use crate::oplog::{NewOperation, OperationLogger};

/// Attempts at drawing an unused invite code before giving up.
const INVITE_CODE_ATTEMPTS: usize = 5;

/// Circle lifecycle and membership operations.
///
/// Every operation takes the acting user first and checks their role
/// before touching the store.
pub struct CircleService {
    store: Arc<dyn CircleStore>,
    users: Arc<dyn UserStore>,
    entitlements: Arc<EntitlementsManager>,
    oplog: Arc<OperationLogger>,
    cleanups: Vec<Arc<dyn CircleCleanup>>,
}

impl CircleService {
    pub fn new(
        store: Arc<dyn CircleStore>,
        users: Arc<dyn UserStore>,
        entitlements: Arc<EntitlementsManager>,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self {
            store,
            users,
            entitlements,
            oplog,
            cleanups: Vec::new(),
        }
    }

    /// Register data that must go away together with a circle.
    pub fn with_cleanup(mut self, cleanup: Arc<dyn CircleCleanup>) -> Self {
        self.cleanups.push(cleanup);
        self
    }

    /// The membership of `user_id`, or `Forbidden` when they are not a member.
    pub async fn require_member(&self, circle_id: &str, user_id: &str) -> Result<CircleMembership> {
        self.load(circle_id).await?;
        self.store
            .membership(circle_id, user_id)
            .await?
            .ok_or_else(|| CircleError::NotMember.into())
    }

    /// Like [`require_member`](Self::require_member) but also checks the role.
    pub async fn require_role(
        &self,
        circle_id: &str,
        user_id: &str,
        required: CircleRole,
    ) -> Result<CircleMembership> {
        let membership = self.require_member(circle_id, user_id).await?;
        if !membership.role.has_at_least(&required) {
            debug!(circle_id, user_id, role = %membership.role, %required, "Role check failed");
            return Err(CircleError::InsufficientRole { required }.into());
        }
        Ok(membership)
    }

    pub async fn is_member(&self, circle_id: &str, user_id: &str) -> Result<bool> {
        Ok(self.store.membership(circle_id, user_id).await?.is_some())
    }

    /// User ids of the current members.
    pub async fn member_ids(&self, circle_id: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .members(circle_id)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .collect())
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, actor_id: &str, request: CreateCircleRequest) -> Result<CircleView> {
        let owned = self.store.count_owned_by(actor_id).await?;
        self.entitlements
            .require_limit(actor_id, limits::CIRCLES_OWNED, owned)
            .await?;

        let now = crate::utils::now();
        let mut circle = Circle {
            id: crate::utils::new_id(),
            name: request.name.trim().to_string(),
            description: request.description,
            owner_id: actor_id.to_string(),
            invite_code: String::new(),
            is_public: request.is_public,
            created_at: now,
        };
        let owner = CircleMembership {
            circle_id: circle.id.clone(),
            user_id: actor_id.to_string(),
            role: CircleRole::Owner,
            joined_at: now,
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            circle.invite_code = self.unused_invite_code().await?;
            match self.store.create(circle.clone(), owner.clone()).await {
                Ok(()) => break,
                Err(OsikatuError::Conflict(_)) if attempts < INVITE_CODE_ATTEMPTS => continue,
                Err(e) => return Err(e),
            }
        }

        info!(circle_id = %circle.id, owner_id = actor_id, "Circle created");
        self.record(actor_id, "circle.create", &circle.id, json!({ "name": circle.name }))
            .await;

        Ok(CircleView::new(circle, 1, Some(CircleRole::Owner)))
    }

    pub async fn list_mine(&self, actor_id: &str) -> Result<Vec<CircleView>> {
        let mut views = Vec::new();
        for membership in self.store.memberships_of(actor_id).await? {
            let Some(circle) = self.store.get(&membership.circle_id).await? else {
                continue;
            };
            let count = self.store.member_count(&circle.id).await?;
            views.push(CircleView::new(circle, count, Some(membership.role)));
        }
        Ok(views)
    }

    /// Members see any circle they belong to; everyone sees public circles.
    pub async fn get(&self, actor_id: &str, circle_id: &str) -> Result<CircleView> {
        let circle = self.load(circle_id).await?;
        let role = self
            .store
            .membership(circle_id, actor_id)
            .await?
            .map(|m| m.role);

        if role.is_none() && !circle.is_public {
            return Err(CircleError::NotFound {
                circle_id: circle_id.to_string(),
            }
            .into());
        }

        let count = self.store.member_count(circle_id).await?;
        Ok(CircleView::new(circle, count, role))
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        actor_id: &str,
        circle_id: &str,
        request: UpdateCircleRequest,
    ) -> Result<CircleView> {
        let membership = self.require_role(circle_id, actor_id, CircleRole::Admin).await?;
        let mut circle = self.load(circle_id).await?;

        if let Some(name) = request.name {
            circle.name = name.trim().to_string();
        }
        if let Some(description) = request.description {
            circle.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(is_public) = request.is_public {
            circle.is_public = is_public;
        }
        self.store.update(circle.clone()).await?;

        info!(circle_id, actor_id, "Circle updated");
        self.record(actor_id, "circle.update", circle_id, json!({ "name": circle.name }))
            .await;

        let count = self.store.member_count(circle_id).await?;
        Ok(CircleView::new(circle, count, Some(membership.role)))
    }

    /// Owner only. Removes memberships and all circle-scoped data.
    #[instrument(skip(self))]
    pub async fn delete(&self, actor_id: &str, circle_id: &str) -> Result<()> {
        let membership = self.require_member(circle_id, actor_id).await?;
        if !membership.role.can_delete_circle() {
            return Err(CircleError::InsufficientRole {
                required: CircleRole::Owner,
            }
            .into());
        }

        for cleanup in &self.cleanups {
            cleanup.purge_circle(circle_id).await?;
        }
        self.store.delete(circle_id).await?;

        info!(circle_id, actor_id, "Circle deleted");
        self.record(actor_id, "circle.delete", circle_id, json!({})).await;
        Ok(())
    }

    /// Join by invite code. The member limit comes from the owner's plan.
    #[instrument(skip(self, invite_code))]
    pub async fn join(&self, actor_id: &str, invite_code: &str) -> Result<CircleView> {
        let code = invite_code.trim().to_ascii_uppercase();
        let circle = self
            .store
            .find_by_invite_code(&code)
            .await?
            .ok_or(CircleError::InvalidInviteCode)?;

        let owner_plan = self.entitlements.for_user(&circle.owner_id).await?;
        let membership = CircleMembership {
            circle_id: circle.id.clone(),
            user_id: actor_id.to_string(),
            role: CircleRole::Member,
            joined_at: crate::utils::now(),
        };

        match self
            .store
            .add_member(membership, owner_plan.limits.circle_members)
            .await?
        {
            AddMemberOutcome::Added => {}
            AddMemberOutcome::AlreadyMember => return Err(CircleError::AlreadyMember.into()),
            AddMemberOutcome::Full { limit } => {
                warn!(circle_id = %circle.id, limit, "Circle is full");
                return Err(CircleError::MemberLimitReached { limit }.into());
            }
        }

        info!(circle_id = %circle.id, user_id = actor_id, "Member joined");
        self.record(actor_id, "circle.join", &circle.id, json!({})).await;

        let count = self.store.member_count(&circle.id).await?;
        Ok(CircleView::new(circle, count, Some(CircleRole::Member)))
    }

    #[instrument(skip(self))]
    pub async fn leave(&self, actor_id: &str, circle_id: &str) -> Result<()> {
        let membership = self.require_member(circle_id, actor_id).await?;
        if membership.role == CircleRole::Owner {
            return Err(CircleError::OwnerCannotLeave.into());
        }

        self.store.remove_member(circle_id, actor_id).await?;
        info!(circle_id, user_id = actor_id, "Member left");
        self.record(actor_id, "circle.leave", circle_id, json!({})).await;
        Ok(())
    }

    /// Members only; owner first, then admins, then by join time.
    pub async fn members(&self, actor_id: &str, circle_id: &str) -> Result<Vec<MemberView>> {
        self.require_member(circle_id, actor_id).await?;

        let mut members = self.store.members(circle_id).await?;
        members.sort_by(|a, b| {
            b.role
                .hierarchy_level()
                .cmp(&a.role.hierarchy_level())
                .then_with(|| a.joined_at.cmp(&b.joined_at))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        let mut views = Vec::with_capacity(members.len());
        for member in members {
            let display_name = self
                .users
                .find_by_id(&member.user_id)
                .await?
                .map(|u| u.display_name);
            views.push(MemberView {
                user_id: member.user_id,
                display_name,
                role: member.role,
                joined_at: member.joined_at,
            });
        }
        Ok(views)
    }

    /// Owner only. The owner's own role and ownership itself are fixed.
    #[instrument(skip(self))]
    pub async fn change_role(
        &self,
        actor_id: &str,
        circle_id: &str,
        target_id: &str,
        role: CircleRole,
    ) -> Result<()> {
        self.require_role(circle_id, actor_id, CircleRole::Owner).await?;
        let target = self.target_membership(circle_id, target_id).await?;

        if target.role == CircleRole::Owner {
            return Err(CircleError::CannotChangeOwnerRole.into());
        }
        if role == CircleRole::Owner {
            return Err(CircleError::CannotAssignOwner.into());
        }

        self.store.set_role(circle_id, target_id, role).await?;
        info!(circle_id, target_id, %role, "Member role changed");
        self.record(
            actor_id,
            "circle.role_change",
            circle_id,
            json!({ "user_id": target_id, "from": target.role.as_str(), "to": role.as_str() }),
        )
        .await;
        Ok(())
    }

    /// Admin+. The owner cannot be removed and admins cannot remove admins.
    #[instrument(skip(self))]
    pub async fn remove_member(&self, actor_id: &str, circle_id: &str, target_id: &str) -> Result<()> {
        let actor = self.require_role(circle_id, actor_id, CircleRole::Admin).await?;
        let target = self.target_membership(circle_id, target_id).await?;

        if target.role == CircleRole::Owner {
            return Err(CircleError::CannotRemoveOwner.into());
        }
        if actor.role == CircleRole::Admin && target.role == CircleRole::Admin && actor_id != target_id {
            return Err(CircleError::CannotRemovePeer.into());
        }

        self.store.remove_member(circle_id, target_id).await?;
        info!(circle_id, target_id, actor_id, "Member removed");
        self.record(
            actor_id,
            "circle.member_remove",
            circle_id,
            json!({ "user_id": target_id }),
        )
        .await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn regenerate_invite_code(&self, actor_id: &str, circle_id: &str) -> Result<CircleView> {
        let membership = self.require_role(circle_id, actor_id, CircleRole::Admin).await?;
        let mut circle = self.load(circle_id).await?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            circle.invite_code = self.unused_invite_code().await?;
            match self.store.update(circle.clone()).await {
                Ok(()) => break,
                Err(OsikatuError::Conflict(_)) if attempts < INVITE_CODE_ATTEMPTS => continue,
                Err(e) => return Err(e),
            }
        }

        info!(circle_id, actor_id, "Invite code regenerated");
        self.record(actor_id, "circle.invite_regenerate", circle_id, json!({}))
            .await;

        let count = self.store.member_count(circle_id).await?;
        Ok(CircleView::new(circle, count, Some(membership.role)))
    }

    async fn load(&self, circle_id: &str) -> Result<Circle> {
        self.store.get(circle_id).await?.ok_or_else(|| {
            CircleError::NotFound {
                circle_id: circle_id.to_string(),
            }
            .into()
        })
    }

    async fn target_membership(&self, circle_id: &str, user_id: &str) -> Result<CircleMembership> {
        self.store.membership(circle_id, user_id).await?.ok_or_else(|| {
            CircleError::MemberNotFound {
                user_id: user_id.to_string(),
            }
            .into()
        })
    }

    async fn unused_invite_code(&self) -> Result<String> {
        for _ in 0..INVITE_CODE_ATTEMPTS {
            let code = generate_invite_code(&mut rand::thread_rng());
            if self.store.find_by_invite_code(&code).await?.is_none() {
                return Ok(code);
            }
        }
        Err(OsikatuError::internal("Could not allocate an invite code"))
    }

    async fn record(&self, actor_id: &str, action: &str, circle_id: &str, metadata: serde_json::Value) {
        self.oplog
            .record(
                NewOperation::new(action)
                    .actor(actor_id)
                    .target("circle", circle_id)
                    .metadata(metadata),
            )
            .await;
    }
}
