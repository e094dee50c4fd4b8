//! Query parameter helpers

use serde::{Deserialize, Serialize};

use crate::error::{OsikatuError, Result};

pub const MAX_PER_PAGE: u32 = 100;

/// Pagination query parameters (`?page=1&per_page=20`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationQuery {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: u32,

    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationQuery {
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> u32 {
        self.per_page
    }

    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(OsikatuError::validation("page", "must be >= 1"));
        }
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(OsikatuError::validation(
                "per_page",
                format!("must be between 1 and {}", MAX_PER_PAGE),
            ));
        }
        Ok(())
    }
}
