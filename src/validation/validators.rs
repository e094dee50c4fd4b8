//! Custom validators for Osikatu request payloads

use std::borrow::Cow;
use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use validator::ValidationError;

pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_LEN: usize = 30;

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// `#RRGGBB` hex color
///
/// ```rust,no_run
/// use osikatu::validation::validate_hex_color;
/// use validator::Validate;
///
/// #[derive(Validate)]
/// struct Request {
///     #[validate(custom(function = "validate_hex_color"))]
///     color: String,
/// }
/// ```
pub fn validate_hex_color(color: &str) -> Result<(), ValidationError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(error("hex_color", "must be a color like #FF88AA"))
    }
}

/// `YYYY-MM` calendar month
pub fn validate_month(month: &str) -> Result<(), ValidationError> {
    parse_month(month)
        .map(|_| ())
        .ok_or_else(|| error("month", "must be a month like 2024-05"))
}

/// Parse `YYYY-MM` into the first day of that month and the first day of the next.
pub fn parse_month(month: &str) -> Option<(NaiveDate, NaiveDate)> {
    if month.len() != 7 || month.as_bytes().get(4) != Some(&b'-') {
        return None;
    }
    let start = NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d").ok()?;
    let end = if start.month() == 12 {
        NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)?
    };
    Some((start, end))
}

/// At most 10 tags, each 1..=30 characters, no duplicates.
pub fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS {
        return Err(error("tags", "at most 10 tags are allowed"));
    }

    let mut seen = HashSet::new();
    for tag in tags {
        let len = tag.trim().chars().count();
        if len == 0 || len > MAX_TAG_LEN {
            return Err(error("tags", "each tag must be 1 to 30 characters"));
        }
        if !seen.insert(tag.trim()) {
            return Err(error("tags", "tags must be unique"));
        }
    }

    Ok(())
}

/// Invite codes are 8 characters from the unambiguous alphabet.
pub fn validate_invite_code(code: &str) -> Result<(), ValidationError> {
    let valid = code.len() == crate::circles::INVITE_CODE_LEN
        && code
            .bytes()
            .all(|b| crate::circles::INVITE_CODE_ALPHABET.contains(&b));
    if valid {
        Ok(())
    } else {
        Err(error("invite_code", "must be an 8 character invite code"))
    }
}

/// Rejects strings that are only whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(error("blank", "must not be blank"))
    } else {
        Ok(())
    }
}
