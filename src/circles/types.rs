//! Circle types: roles, circles and memberships.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::validate_not_blank;

/// Role of a member inside a circle.
///
/// ```rust
/// use osikatu::circles::CircleRole;
///
/// let role = CircleRole::Admin;
/// assert!(role.can_manage_members());
/// assert!(!role.can_delete_circle());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircleRole {
    Owner,
    Admin,
    #[default]
    Member,
}

impl CircleRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    /// Higher means more permissions.
    #[must_use]
    pub fn hierarchy_level(&self) -> u8 {
        match self {
            Self::Owner => 3,
            Self::Admin => 2,
            Self::Member => 1,
        }
    }

    #[must_use]
    pub fn has_at_least(&self, other: &Self) -> bool {
        self.hierarchy_level() >= other.hierarchy_level()
    }

    #[must_use]
    pub fn can_manage_members(&self) -> bool {
        self.has_at_least(&Self::Admin)
    }

    #[must_use]
    pub fn can_manage_settings(&self) -> bool {
        self.has_at_least(&Self::Admin)
    }

    #[must_use]
    pub fn can_delete_circle(&self) -> bool {
        *self == Self::Owner
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError {
    invalid_value: String,
}

impl fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid role: '{}' (expected: owner, admin, or member)",
            self.invalid_value
        )
    }
}

impl std::error::Error for ParseRoleError {}

impl FromStr for CircleRole {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            _ => Err(ParseRoleError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CircleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Circle {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub invite_code: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircleMembership {
    pub circle_id: String,
    pub user_id: String,
    pub role: CircleRole,
    pub joined_at: DateTime<Utc>,
}

/// A circle as seen by one user.
#[derive(Debug, Clone, Serialize)]
pub struct CircleView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub is_public: bool,
    pub member_count: u64,
    /// `None` when the viewer is not a member.
    pub my_role: Option<CircleRole>,
    /// Only members see the invite code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CircleView {
    pub fn new(circle: Circle, member_count: u64, my_role: Option<CircleRole>) -> Self {
        Self {
            invite_code: my_role.map(|_| circle.invite_code),
            id: circle.id,
            name: circle.name,
            description: circle.description,
            owner_id: circle.owner_id,
            is_public: circle.is_public,
            member_count,
            my_role,
            created_at: circle.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub user_id: String,
    pub display_name: Option<String>,
    pub role: CircleRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCircleRequest {
    #[validate(length(min = 1, max = 50), custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCircleRequest {
    #[validate(length(min = 1, max = 50), custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JoinCircleRequest {
    #[validate(custom(function = "crate::validation::validate_invite_code"))]
    pub invite_code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangeRoleRequest {
    pub role: CircleRole,
}
