use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use super::redaction::RedactionPolicy;
use crate::error::Result;
use crate::http::{PaginatedData, PaginationQuery};
use crate::middleware::current_request_id;

/// A stored audit entry.
#[derive(Debug, Clone, Serialize)]
pub struct OperationLog {
    pub id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub metadata: Value,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An operation to record, built by the service performing it.
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub action: String,
    pub user_id: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub metadata: Value,
}

impl NewOperation {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            user_id: None,
            target_type: None,
            target_id: None,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn actor(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn target(mut self, target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self.target_id = Some(target_id.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[async_trait]
pub trait OperationLogStore: Send + Sync {
    async fn insert(&self, log: OperationLog) -> Result<()>;

    /// Entries recorded for `user_id`, newest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<OperationLog>>;
}

#[derive(Clone, Default)]
pub struct InMemoryOperationLogStore {
    logs: Arc<RwLock<Vec<OperationLog>>>,
}

impl InMemoryOperationLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OperationLogStore for InMemoryOperationLogStore {
    async fn insert(&self, log: OperationLog) -> Result<()> {
        self.logs.write().await.push(log);
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<OperationLog>> {
        let logs = self.logs.read().await;
        Ok(logs
            .iter()
            .rev()
            .filter(|log| log.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }
}

/// Records redacted audit entries for mutating operations
pub struct OperationLogger {
    store: Arc<dyn OperationLogStore>,
    policy: RedactionPolicy,
}

impl OperationLogger {
    pub fn new(store: Arc<dyn OperationLogStore>, policy: RedactionPolicy) -> Self {
        Self { store, policy }
    }

    /// Store `op` after redacting its metadata.
    ///
    /// A storage failure is logged and swallowed; the audited operation has
    /// already happened.
    pub async fn record(&self, op: NewOperation) {
        let log = OperationLog {
            id: crate::utils::new_id(),
            user_id: op.user_id,
            action: op.action,
            target_type: op.target_type,
            target_id: op.target_id,
            metadata: self.policy.apply(&op.metadata),
            request_id: current_request_id(),
            created_at: Utc::now(),
        };

        let action = log.action.clone();
        if let Err(e) = self.store.insert(log).await {
            tracing::warn!(action = %action, error = %e, "Failed to record operation log");
        }
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        page: &PaginationQuery,
    ) -> Result<PaginatedData<OperationLog>> {
        page.validate()?;
        let logs = self.store.list_for_user(user_id).await?;
        Ok(PaginatedData::from_vec(logs, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OsikatuError;
    use serde_json::json;

    struct FailingStore;

    #[async_trait]
    impl OperationLogStore for FailingStore {
        async fn insert(&self, _log: OperationLog) -> Result<()> {
            Err(OsikatuError::service_unavailable("log store down"))
        }

        async fn list_for_user(&self, _user_id: &str) -> Result<Vec<OperationLog>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_record_redacts_metadata() {
        let store = Arc::new(InMemoryOperationLogStore::new());
        let logger = OperationLogger::new(store.clone(), RedactionPolicy::default());

        logger
            .record(
                NewOperation::new("oshi.create")
                    .actor("user-1")
                    .target("oshi", "oshi-1")
                    .metadata(json!({"name": "Aoi", "memo": "secret note"})),
            )
            .await;

        let logs = store.list_for_user("user-1").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "oshi.create");
        assert_eq!(logs[0].target_id.as_deref(), Some("oshi-1"));
        assert_eq!(logs[0].metadata["name"], "Aoi");
        assert_eq!(logs[0].metadata["memo"], "[REDACTED]");
    }

    #[tokio::test]
    async fn test_record_failure_is_swallowed() {
        let logger = OperationLogger::new(Arc::new(FailingStore), RedactionPolicy::default());
        logger.record(NewOperation::new("oshi.delete").actor("user-1")).await;
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_scoped() {
        let store = Arc::new(InMemoryOperationLogStore::new());
        let logger = OperationLogger::new(store, RedactionPolicy::default());
        logger.record(NewOperation::new("first").actor("user-1")).await;
        logger.record(NewOperation::new("other").actor("user-2")).await;
        logger.record(NewOperation::new("second").actor("user-1")).await;

        let page = logger
            .list_for_user("user-1", &PaginationQuery::default())
            .await
            .unwrap();
        let actions: Vec<_> = page.items.iter().map(|l| l.action.as_str()).collect();
        assert_eq!(actions, vec!["second", "first"]);
    }
}
