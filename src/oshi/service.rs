use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, instrument};

use super::{CreateOshiRequest, Oshi, OshiLinked, UpdateOshiRequest, non_empty};
use crate::billing::{EntitlementsManager, limits};
use crate::error::{OsikatuError, Result};
use crate::oplog::{NewOperation, OperationLogger};
use crate::store::{Repository, get_owned};

/// Records that must forget an oshi when it is deleted.
#[async_trait]
pub trait OshiReferences: Send + Sync {
    /// Clear `oshi_id` on every record of `user_id` pointing at it.
    async fn detach_oshi(&self, user_id: &str, oshi_id: &str) -> Result<usize>;
}

/// [`OshiReferences`] over any repository of [`OshiLinked`] records
pub struct OshiDetacher<T: OshiLinked> {
    repo: Arc<dyn Repository<T>>,
    _record: PhantomData<fn() -> T>,
}

impl<T: OshiLinked> OshiDetacher<T> {
    pub fn new(repo: Arc<dyn Repository<T>>) -> Self {
        Self {
            repo,
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<T: OshiLinked> OshiReferences for OshiDetacher<T> {
    async fn detach_oshi(&self, user_id: &str, oshi_id: &str) -> Result<usize> {
        self.repo
            .update_many(user_id, &|record: &mut T| {
                let slot = record.oshi_id_mut();
                if slot.as_deref() == Some(oshi_id) {
                    *slot = None;
                    true
                } else {
                    false
                }
            })
            .await
    }
}

/// Check that `oshi_id`, when given, names one of the user's oshi.
pub async fn ensure_oshi_ref(
    repo: &dyn Repository<Oshi>,
    user_id: &str,
    oshi_id: Option<&str>,
) -> Result<()> {
    let Some(oshi_id) = oshi_id else {
        return Ok(());
    };
    match repo.get(oshi_id).await? {
        Some(oshi) if oshi.user_id == user_id => Ok(()),
        _ => Err(OsikatuError::bad_request(format!("Unknown oshi_id: {}", oshi_id))),
    }
}

pub struct OshiService {
    repo: Arc<dyn Repository<Oshi>>,
    entitlements: Arc<EntitlementsManager>,
    oplog: Arc<OperationLogger>,
    references: Vec<Arc<dyn OshiReferences>>,
}

impl OshiService {
    pub fn new(
        repo: Arc<dyn Repository<Oshi>>,
        entitlements: Arc<EntitlementsManager>,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self {
            repo,
            entitlements,
            oplog,
            references: Vec::new(),
        }
    }

    pub fn with_references(mut self, references: Arc<dyn OshiReferences>) -> Self {
        self.references.push(references);
        self
    }

    /// Primary first, then oldest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Oshi>> {
        let mut oshi = self.repo.list_by_owner(user_id).await?;
        oshi.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(oshi)
    }

    pub async fn get(&self, user_id: &str, oshi_id: &str) -> Result<Oshi> {
        get_owned(self.repo.as_ref(), user_id, oshi_id).await
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, user_id: &str, request: CreateOshiRequest) -> Result<Oshi> {
        let count = self.repo.count_by_owner(user_id).await?;
        self.entitlements
            .require_limit(user_id, limits::OSHI, count)
            .await?;

        let now = crate::utils::now();
        let oshi = self
            .repo
            .insert(Oshi {
                id: crate::utils::new_id(),
                user_id: user_id.to_string(),
                name: request.name.trim().to_string(),
                nickname: non_empty(request.nickname),
                category: request.category,
                color: request.color.to_ascii_uppercase(),
                birthday: request.birthday,
                memo: non_empty(request.memo),
                is_primary: count == 0,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(oshi_id = %oshi.id, primary = oshi.is_primary, "Oshi created");
        self.oplog
            .record(
                NewOperation::new("oshi.create")
                    .actor(user_id)
                    .target("oshi", &oshi.id)
                    .metadata(json!({ "name": oshi.name, "category": oshi.category })),
            )
            .await;
        Ok(oshi)
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, user_id: &str, oshi_id: &str, request: UpdateOshiRequest) -> Result<Oshi> {
        let mut oshi = self.get(user_id, oshi_id).await?;

        if let Some(name) = request.name {
            oshi.name = name.trim().to_string();
        }
        if let Some(nickname) = request.nickname {
            oshi.nickname = non_empty(Some(nickname));
        }
        if let Some(category) = request.category {
            oshi.category = category;
        }
        if let Some(color) = request.color {
            oshi.color = color.to_ascii_uppercase();
        }
        if let Some(birthday) = request.birthday {
            oshi.birthday = Some(birthday);
        }
        if let Some(memo) = request.memo {
            oshi.memo = non_empty(Some(memo));
        }
        oshi.updated_at = crate::utils::now();

        let oshi = self.repo.update(oshi).await?;
        self.oplog
            .record(
                NewOperation::new("oshi.update")
                    .actor(user_id)
                    .target("oshi", &oshi.id),
            )
            .await;
        Ok(oshi)
    }

    /// Delete an oshi, detach it from the user's records and promote the
    /// oldest remaining oshi if the deleted one was primary.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: &str, oshi_id: &str) -> Result<()> {
        let oshi = self.get(user_id, oshi_id).await?;
        self.repo.delete(&oshi.id).await?;

        let mut detached = 0;
        for references in &self.references {
            detached += references.detach_oshi(user_id, &oshi.id).await?;
        }

        if oshi.is_primary {
            let remaining = self.repo.list_by_owner(user_id).await?;
            if let Some(mut oldest) = remaining.into_iter().min_by_key(|o| o.created_at) {
                oldest.is_primary = true;
                oldest.updated_at = crate::utils::now();
                let promoted = self.repo.update(oldest).await?;
                debug!(oshi_id = %promoted.id, "Promoted to primary");
            }
        }

        info!(oshi_id = %oshi.id, detached, "Oshi deleted");
        self.oplog
            .record(
                NewOperation::new("oshi.delete")
                    .actor(user_id)
                    .target("oshi", &oshi.id)
                    .metadata(json!({ "detached_records": detached })),
            )
            .await;
        Ok(())
    }

    /// Make `oshi_id` the only primary oshi of the user.
    #[instrument(skip(self))]
    pub async fn set_primary(&self, user_id: &str, oshi_id: &str) -> Result<Oshi> {
        let oshi = self.get(user_id, oshi_id).await?;
        let now = crate::utils::now();
        self.repo
            .update_many(user_id, &|o: &mut Oshi| {
                let primary = o.id == oshi.id;
                if o.is_primary == primary {
                    return false;
                }
                o.is_primary = primary;
                o.updated_at = now;
                true
            })
            .await?;

        self.oplog
            .record(
                NewOperation::new("oshi.set_primary")
                    .actor(user_id)
                    .target("oshi", &oshi.id),
            )
            .await;
        self.get(user_id, oshi_id).await
    }
}
