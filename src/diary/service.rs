use std::sync::Arc;

use tracing::{info, instrument};

use super::{
    CreateDiaryRequest, CreatedDiaryEntry, DiaryEntry, DiaryFilter, UpdateDiaryRequest,
    normalize_tags,
};
use crate::error::{OsikatuError, Result};
use crate::http::{PaginatedData, PaginationQuery};
use crate::oplog::{NewOperation, OperationLogger};
use crate::oshi::{Oshi, ensure_oshi_ref, non_empty};
use crate::points::PointsService;
use crate::store::{Repository, get_owned};

pub struct DiaryService {
    repo: Arc<dyn Repository<DiaryEntry>>,
    oshi: Arc<dyn Repository<Oshi>>,
    points: Arc<PointsService>,
    oplog: Arc<OperationLogger>,
}

impl DiaryService {
    pub fn new(
        repo: Arc<dyn Repository<DiaryEntry>>,
        oshi: Arc<dyn Repository<Oshi>>,
        points: Arc<PointsService>,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self {
            repo,
            oshi,
            points,
            oplog,
        }
    }

    /// Newest `entry_date` first; ties keep the most recently written on top.
    pub async fn list(
        &self,
        user_id: &str,
        filter: &DiaryFilter,
        page: &PaginationQuery,
    ) -> Result<PaginatedData<DiaryEntry>> {
        page.validate()?;
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(OsikatuError::validation("from", "must not be after `to`"));
            }
        }

        let mut entries: Vec<_> = self
            .repo
            .list_by_owner(user_id)
            .await?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        entries.sort_by(|a, b| {
            b.entry_date
                .cmp(&a.entry_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(PaginatedData::from_vec(entries, page))
    }

    pub async fn get(&self, user_id: &str, entry_id: &str) -> Result<DiaryEntry> {
        get_owned(self.repo.as_ref(), user_id, entry_id).await
    }

    /// Writes the entry and grants the diary bonus for the first entry of the day.
    #[instrument(skip(self, request))]
    pub async fn create(&self, user_id: &str, request: CreateDiaryRequest) -> Result<CreatedDiaryEntry> {
        let oshi_id = non_empty(request.oshi_id);
        ensure_oshi_ref(self.oshi.as_ref(), user_id, oshi_id.as_deref()).await?;

        let now = crate::utils::now();
        let entry = self
            .repo
            .insert(DiaryEntry {
                id: crate::utils::new_id(),
                user_id: user_id.to_string(),
                oshi_id,
                title: request.title.trim().to_string(),
                body: request.body,
                entry_date: request.entry_date.unwrap_or_else(|| now.date_naive()),
                mood: request.mood,
                tags: normalize_tags(request.tags),
                created_at: now,
                updated_at: now,
            })
            .await?;

        let points_awarded = match self.points.grant_diary_bonus(user_id, now.date_naive()).await? {
            Some(outcome) if outcome.created => outcome.entry.delta,
            _ => 0,
        };

        info!(entry_id = %entry.id, points_awarded, "Diary entry created");
        self.oplog
            .record(
                NewOperation::new("diary.create")
                    .actor(user_id)
                    .target("diary_entry", &entry.id),
            )
            .await;

        Ok(CreatedDiaryEntry {
            entry,
            points_awarded,
        })
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        user_id: &str,
        entry_id: &str,
        request: UpdateDiaryRequest,
    ) -> Result<DiaryEntry> {
        let mut entry = self.get(user_id, entry_id).await?;

        if let Some(oshi_id) = request.oshi_id {
            let oshi_id = non_empty(Some(oshi_id));
            ensure_oshi_ref(self.oshi.as_ref(), user_id, oshi_id.as_deref()).await?;
            entry.oshi_id = oshi_id;
        }
        if let Some(title) = request.title {
            entry.title = title.trim().to_string();
        }
        if let Some(body) = request.body {
            entry.body = body;
        }
        if let Some(entry_date) = request.entry_date {
            entry.entry_date = entry_date;
        }
        if let Some(mood) = request.mood {
            entry.mood = Some(mood);
        }
        if let Some(tags) = request.tags {
            entry.tags = normalize_tags(tags);
        }
        entry.updated_at = crate::utils::now();

        let entry = self.repo.update(entry).await?;
        self.oplog
            .record(
                NewOperation::new("diary.update")
                    .actor(user_id)
                    .target("diary_entry", &entry.id),
            )
            .await;
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: &str, entry_id: &str) -> Result<()> {
        let entry = self.get(user_id, entry_id).await?;
        self.repo.delete(&entry.id).await?;
        info!(entry_id = %entry.id, "Diary entry deleted");
        self.oplog
            .record(
                NewOperation::new("diary.delete")
                    .actor(user_id)
                    .target("diary_entry", &entry.id),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oplog::{InMemoryOperationLogStore, RedactionPolicy};
    use crate::points::{InMemoryLedgerStore, PointsConfig};
    use crate::store::InMemoryRepository;
    use chrono::{NaiveDate, Utc};
    use serde_json::json;

    struct Fixture {
        diary: DiaryService,
        oshi: Arc<dyn Repository<Oshi>>,
        points: Arc<PointsService>,
    }

    fn fixture() -> Fixture {
        let oplog = Arc::new(OperationLogger::new(
            Arc::new(InMemoryOperationLogStore::new()),
            RedactionPolicy::default(),
        ));
        let points = Arc::new(PointsService::new(
            Arc::new(InMemoryLedgerStore::new()),
            PointsConfig::default(),
            oplog.clone(),
        ));
        let oshi: Arc<dyn Repository<Oshi>> = InMemoryRepository::shared();
        Fixture {
            diary: DiaryService::new(InMemoryRepository::shared(), oshi.clone(), points.clone(), oplog),
            oshi,
            points,
        }
    }

    fn request(value: serde_json::Value) -> CreateDiaryRequest {
        serde_json::from_value(value).unwrap()
    }

    async fn insert_oshi(repo: &dyn Repository<Oshi>, id: &str, user_id: &str) {
        let now = Utc::now();
        repo.insert(Oshi {
            id: id.into(),
            user_id: user_id.into(),
            name: "Rin".into(),
            nickname: None,
            category: Default::default(),
            color: crate::oshi::DEFAULT_COLOR.into(),
            birthday: None,
            memo: None,
            is_primary: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_first_entry_of_the_day_earns_bonus() {
        let f = fixture();
        let first = f
            .diary
            .create("u1", request(json!({ "title": "Live", "body": "Great show" })))
            .await
            .unwrap();
        let second = f
            .diary
            .create("u1", request(json!({ "title": "Again", "body": "Still great" })))
            .await
            .unwrap();

        let bonus = PointsConfig::default().diary_daily_bonus;
        assert_eq!(first.points_awarded, bonus);
        assert_eq!(second.points_awarded, 0);
        assert_eq!(f.points.balance("u1").await.unwrap(), bonus);
    }

    #[tokio::test]
    async fn test_foreign_oshi_is_rejected() {
        let f = fixture();
        insert_oshi(f.oshi.as_ref(), "o1", "u2").await;

        let err = f
            .diary
            .create("u1", request(json!({ "title": "t", "body": "b", "oshi_id": "o1" })))
            .await
            .unwrap_err();
        assert!(matches!(err, OsikatuError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let f = fixture();
        insert_oshi(f.oshi.as_ref(), "o1", "u1").await;
        for (title, date, oshi_id) in [
            ("old", "2024-05-01", Some("o1")),
            ("new", "2024-05-20", None),
            ("mid", "2024-05-10", Some("o1")),
        ] {
            f.diary
                .create(
                    "u1",
                    request(json!({
                        "title": title,
                        "body": "b",
                        "entry_date": date,
                        "oshi_id": oshi_id,
                        "tags": ["live"],
                    })),
                )
                .await
                .unwrap();
        }

        let page = PaginationQuery::default();
        let all = f.diary.list("u1", &DiaryFilter::default(), &page).await.unwrap();
        let titles: Vec<_> = all.items.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);

        let filter = DiaryFilter {
            oshi_id: Some("o1".into()),
            from: NaiveDate::from_ymd_opt(2024, 5, 5),
            ..Default::default()
        };
        let filtered = f.diary.list("u1", &filter, &page).await.unwrap();
        assert_eq!(filtered.items.len(), 1);
        assert_eq!(filtered.items[0].title, "mid");

        let bad = DiaryFilter {
            from: NaiveDate::from_ymd_opt(2024, 6, 1),
            to: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..Default::default()
        };
        assert!(matches!(
            f.diary.list("u1", &bad, &page).await,
            Err(OsikatuError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_are_owner_scoped() {
        let f = fixture();
        let created = f
            .diary
            .create("u1", request(json!({ "title": "t", "body": "b" })))
            .await
            .unwrap();
        let id = created.entry.id;

        assert!(matches!(
            f.diary.delete("u2", &id).await,
            Err(OsikatuError::NotFound(_))
        ));

        let updated = f
            .diary
            .update(
                "u1",
                &id,
                UpdateDiaryRequest {
                    mood: Some(4),
                    tags: Some(vec![" tour ".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.mood, Some(4));
        assert_eq!(updated.tags, vec!["tour"]);

        f.diary.delete("u1", &id).await.unwrap();
        assert!(matches!(f.diary.get("u1", &id).await, Err(OsikatuError::NotFound(_))));
    }
}
