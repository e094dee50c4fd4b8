//! Diary entries about oshi activities.

mod routes;
mod service;

pub use routes::DiaryModule;
pub use service::DiaryService;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::oshi::OshiLinked;
use crate::store::Record;
use crate::validation::{validate_not_blank, validate_tags};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: String,
    pub user_id: String,
    pub oshi_id: Option<String>,
    pub title: String,
    pub body: String,
    pub entry_date: NaiveDate,
    pub mood: Option<u8>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for DiaryEntry {
    const KIND: &'static str = "Diary entry";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

impl OshiLinked for DiaryEntry {
    fn oshi_id_mut(&mut self) -> &mut Option<String> {
        &mut self.oshi_id
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDiaryRequest {
    pub oshi_id: Option<String>,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub title: String,
    #[validate(length(min = 1, max = 10000), custom(function = "validate_not_blank"))]
    pub body: String,
    /// Defaults to today (UTC).
    pub entry_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 5))]
    pub mood: Option<u8>,
    #[serde(default)]
    #[validate(custom(function = "validate_tags"))]
    pub tags: Vec<String>,
}

/// Partial update. An empty `oshi_id` detaches the entry.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateDiaryRequest {
    pub oshi_id: Option<String>,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 10000), custom(function = "validate_not_blank"))]
    pub body: Option<String>,
    pub entry_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 5))]
    pub mood: Option<u8>,
    #[validate(custom(function = "validate_tags"))]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiaryFilter {
    pub oshi_id: Option<String>,
    pub tag: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DiaryFilter {
    fn matches(&self, entry: &DiaryEntry) -> bool {
        if let Some(oshi_id) = &self.oshi_id {
            if entry.oshi_id.as_ref() != Some(oshi_id) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !entry.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        self.from.is_none_or(|from| entry.entry_date >= from)
            && self.to.is_none_or(|to| entry.entry_date <= to)
    }
}

/// Response of a create: the entry and the points it earned.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedDiaryEntry {
    #[serde(flatten)]
    pub entry: DiaryEntry,
    pub points_awarded: i64,
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter().map(|t| t.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_rules() {
        let req: CreateDiaryRequest = serde_json::from_str(
            r#"{"title":"","body":"live report","mood":6,"tags":["a","a"]}"#,
        )
        .unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("mood"));
        assert!(fields.contains_key("tags"));
        assert!(!fields.contains_key("body"));
    }

    #[test]
    fn test_filter_date_range_is_inclusive() {
        let date = |d: u32| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
        let entry = DiaryEntry {
            id: "d1".into(),
            user_id: "u1".into(),
            oshi_id: None,
            title: "t".into(),
            body: "b".into(),
            entry_date: date(10),
            mood: None,
            tags: vec!["live".into()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let filter = DiaryFilter {
            from: Some(date(10)),
            to: Some(date(10)),
            ..Default::default()
        };
        assert!(filter.matches(&entry));

        let filter = DiaryFilter {
            tag: Some("tour".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&entry));
    }
}
