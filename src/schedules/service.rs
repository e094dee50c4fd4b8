use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use super::{
    CreateScheduleRequest, MAX_UPCOMING_LIMIT, Schedule, ScheduleRange, UpdateScheduleRequest,
};
use crate::error::{OsikatuError, Result};
use crate::oplog::{NewOperation, OperationLogger};
use crate::oshi::{Oshi, ensure_oshi_ref, non_empty};
use crate::store::{Repository, get_owned};

pub struct ScheduleService {
    repo: Arc<dyn Repository<Schedule>>,
    oshi: Arc<dyn Repository<Oshi>>,
    oplog: Arc<OperationLogger>,
}

fn check_order(starts_at: DateTime<Utc>, ends_at: Option<DateTime<Utc>>) -> Result<()> {
    match ends_at {
        Some(ends_at) if ends_at < starts_at => Err(OsikatuError::validation(
            "ends_at",
            "must not be before starts_at",
        )),
        _ => Ok(()),
    }
}

impl ScheduleService {
    pub fn new(
        repo: Arc<dyn Repository<Schedule>>,
        oshi: Arc<dyn Repository<Oshi>>,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self { repo, oshi, oplog }
    }

    /// Schedules overlapping the range, earliest first.
    pub async fn list(&self, user_id: &str, range: &ScheduleRange) -> Result<Vec<Schedule>> {
        if let (Some(from), Some(to)) = (range.from, range.to) {
            if from > to {
                return Err(OsikatuError::validation("from", "must not be after `to`"));
            }
        }

        let mut schedules: Vec<_> = self
            .repo
            .list_by_owner(user_id)
            .await?
            .into_iter()
            .filter(|s| range.from.is_none_or(|from| s.effective_end() >= from))
            .filter(|s| range.to.is_none_or(|to| s.starts_at <= to))
            .collect();
        schedules.sort_by_key(|s| s.starts_at);
        Ok(schedules)
    }

    /// The next `limit` schedules starting at or after `now`.
    pub async fn upcoming(&self, user_id: &str, now: DateTime<Utc>, limit: u32) -> Result<Vec<Schedule>> {
        if limit == 0 || limit > MAX_UPCOMING_LIMIT {
            return Err(OsikatuError::validation(
                "limit",
                format!("must be between 1 and {}", MAX_UPCOMING_LIMIT),
            ));
        }

        let mut schedules: Vec<_> = self
            .repo
            .list_by_owner(user_id)
            .await?
            .into_iter()
            .filter(|s| s.starts_at >= now)
            .collect();
        schedules.sort_by_key(|s| s.starts_at);
        schedules.truncate(limit as usize);
        Ok(schedules)
    }

    pub async fn get(&self, user_id: &str, schedule_id: &str) -> Result<Schedule> {
        get_owned(self.repo.as_ref(), user_id, schedule_id).await
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, user_id: &str, request: CreateScheduleRequest) -> Result<Schedule> {
        check_order(request.starts_at, request.ends_at)?;
        let oshi_id = non_empty(request.oshi_id);
        ensure_oshi_ref(self.oshi.as_ref(), user_id, oshi_id.as_deref()).await?;

        let schedule = self
            .repo
            .insert(Schedule {
                id: crate::utils::new_id(),
                user_id: user_id.to_string(),
                oshi_id,
                title: request.title.trim().to_string(),
                starts_at: request.starts_at,
                ends_at: request.ends_at,
                all_day: request.all_day,
                location: non_empty(request.location),
                memo: non_empty(request.memo),
                remind_before_minutes: request.remind_before_minutes,
                created_at: crate::utils::now(),
            })
            .await?;

        info!(schedule_id = %schedule.id, starts_at = %schedule.starts_at, "Schedule created");
        self.oplog
            .record(
                NewOperation::new("schedule.create")
                    .actor(user_id)
                    .target("schedule", &schedule.id),
            )
            .await;
        Ok(schedule)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        user_id: &str,
        schedule_id: &str,
        request: UpdateScheduleRequest,
    ) -> Result<Schedule> {
        let mut schedule = self.get(user_id, schedule_id).await?;

        if let Some(oshi_id) = request.oshi_id {
            let oshi_id = non_empty(Some(oshi_id));
            ensure_oshi_ref(self.oshi.as_ref(), user_id, oshi_id.as_deref()).await?;
            schedule.oshi_id = oshi_id;
        }
        if let Some(title) = request.title {
            schedule.title = title.trim().to_string();
        }
        if let Some(starts_at) = request.starts_at {
            schedule.starts_at = starts_at;
        }
        if let Some(ends_at) = request.ends_at {
            schedule.ends_at = Some(ends_at);
        }
        if let Some(all_day) = request.all_day {
            schedule.all_day = all_day;
        }
        if let Some(location) = request.location {
            schedule.location = non_empty(Some(location));
        }
        if let Some(memo) = request.memo {
            schedule.memo = non_empty(Some(memo));
        }
        if let Some(minutes) = request.remind_before_minutes {
            schedule.remind_before_minutes = Some(minutes);
        }
        check_order(schedule.starts_at, schedule.ends_at)?;

        let schedule = self.repo.update(schedule).await?;
        self.oplog
            .record(
                NewOperation::new("schedule.update")
                    .actor(user_id)
                    .target("schedule", &schedule.id),
            )
            .await;
        Ok(schedule)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: &str, schedule_id: &str) -> Result<()> {
        let schedule = self.get(user_id, schedule_id).await?;
        self.repo.delete(&schedule.id).await?;
        info!(schedule_id = %schedule.id, "Schedule deleted");
        self.oplog
            .record(
                NewOperation::new("schedule.delete")
                    .actor(user_id)
                    .target("schedule", &schedule.id),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oplog::{InMemoryOperationLogStore, RedactionPolicy};
    use crate::store::InMemoryRepository;
    use chrono::TimeZone;
    use serde_json::json;

    fn service() -> ScheduleService {
        let oplog = Arc::new(OperationLogger::new(
            Arc::new(InMemoryOperationLogStore::new()),
            RedactionPolicy::default(),
        ));
        ScheduleService::new(InMemoryRepository::shared(), InMemoryRepository::shared(), oplog)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    fn request(title: &str, starts_at: DateTime<Utc>, ends_at: Option<DateTime<Utc>>) -> CreateScheduleRequest {
        serde_json::from_value(json!({
            "title": title,
            "starts_at": starts_at,
            "ends_at": ends_at,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_end_before_start_is_rejected() {
        let schedules = service();
        let err = schedules
            .create("u1", request("Live", at(10, 18), Some(at(10, 17))))
            .await
            .unwrap_err();
        assert!(matches!(err, OsikatuError::Validation(_)));

        let live = schedules
            .create("u1", request("Live", at(10, 18), Some(at(10, 21))))
            .await
            .unwrap();
        let err = schedules
            .update(
                "u1",
                &live.id,
                UpdateScheduleRequest {
                    starts_at: Some(at(11, 0)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OsikatuError::Validation(_)));
    }

    #[tokio::test]
    async fn test_range_uses_overlap() {
        let schedules = service();
        schedules
            .create("u1", request("Tour", at(1, 0), Some(at(5, 0))))
            .await
            .unwrap();
        schedules.create("u1", request("Release", at(8, 0), None)).await.unwrap();
        schedules.create("u1", request("Fan meeting", at(20, 0), None)).await.unwrap();

        let range = ScheduleRange {
            from: Some(at(4, 0)),
            to: Some(at(10, 0)),
        };
        let titles: Vec<_> = schedules
            .list("u1", &range)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Tour", "Release"]);
    }

    #[tokio::test]
    async fn test_upcoming() {
        let schedules = service();
        for (title, day) in [("c", 30), ("past", 1), ("a", 10), ("b", 20)] {
            schedules.create("u1", request(title, at(day, 12), None)).await.unwrap();
        }

        let next = schedules.upcoming("u1", at(10, 12), 2).await.unwrap();
        let titles: Vec<_> = next.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);

        assert!(schedules.upcoming("u1", at(1, 0), 0).await.is_err());
        assert!(schedules.upcoming("u1", at(1, 0), 51).await.is_err());
    }

    #[tokio::test]
    async fn test_other_users_schedule_is_not_found() {
        let schedules = service();
        let live = schedules.create("u1", request("Live", at(10, 18), None)).await.unwrap();
        assert!(matches!(
            schedules.delete("u2", &live.id).await,
            Err(OsikatuError::NotFound(_))
        ));
    }
}
