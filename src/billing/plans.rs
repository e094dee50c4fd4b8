//! Subscription plans: free, premium and plus.
//!
//! Plans are defined in code. The Stripe price ids of the paid plans come
//! from configuration so the same build works against test and live mode.

use std::collections::BTreeSet;

use serde::Serialize;

/// Feature flags granted by paid plans.
pub mod features {
    pub const AD_FREE: &str = "ad_free";
    pub const EXPENSE_SUMMARY: &str = "expense_summary";
    pub const TEN_PULL: &str = "ten_pull";
    pub const PRIORITY_SUPPORT: &str = "priority_support";
}

/// Names of the countable limits.
pub mod limits {
    pub const OSHI: &str = "oshi";
    pub const CIRCLES_OWNED: &str = "circles_owned";
    pub const CIRCLE_MEMBERS: &str = "circle_members";
    pub const GACHA_DAILY_DRAWS: &str = "gacha_daily_draws";
}

pub const FREE: &str = "free";
pub const PREMIUM: &str = "premium";
pub const PLUS: &str = "plus";

/// The plan catalogue, in display order.
#[derive(Clone, Debug, Default)]
pub struct Plans {
    plans: Vec<PlanConfig>,
}

impl Plans {
    #[must_use]
    pub fn new(plans: Vec<PlanConfig>) -> Self {
        Self { plans }
    }

    /// The standard free / premium / plus catalogue.
    #[must_use]
    pub fn standard(premium_price_id: Option<String>, plus_price_id: Option<String>) -> Self {
        let paid_features = [
            features::AD_FREE,
            features::EXPENSE_SUMMARY,
            features::TEN_PULL,
        ];

        Self::new(vec![
            PlanConfig {
                id: FREE.to_string(),
                display_name: "Free".to_string(),
                stripe_price_id: None,
                monthly_price_yen: 0,
                features: BTreeSet::new(),
                limits: PlanLimits {
                    oshi: Some(3),
                    circles_owned: Some(1),
                    circle_members: Some(10),
                    gacha_daily_draws: Some(10),
                },
            },
            PlanConfig {
                id: PREMIUM.to_string(),
                display_name: "Premium".to_string(),
                stripe_price_id: premium_price_id,
                monthly_price_yen: 480,
                features: paid_features.iter().map(|f| f.to_string()).collect(),
                limits: PlanLimits {
                    oshi: Some(10),
                    circles_owned: Some(5),
                    circle_members: Some(50),
                    gacha_daily_draws: Some(50),
                },
            },
            PlanConfig {
                id: PLUS.to_string(),
                display_name: "Plus".to_string(),
                stripe_price_id: plus_price_id,
                monthly_price_yen: 980,
                features: paid_features
                    .iter()
                    .chain([features::PRIORITY_SUPPORT].iter())
                    .map(|f| f.to_string())
                    .collect(),
                limits: PlanLimits {
                    oshi: None,
                    circles_owned: Some(20),
                    circle_members: Some(200),
                    gacha_daily_draws: None,
                },
            },
        ])
    }

    #[must_use]
    pub fn get(&self, plan_id: &str) -> Option<&PlanConfig> {
        self.plans.iter().find(|p| p.id == plan_id)
    }

    /// The plan every user without an active subscription is on.
    ///
    /// Falls back to a limitless-free-of-features plan if the catalogue has
    /// no `free` entry.
    #[must_use]
    pub fn free(&self) -> PlanConfig {
        self.get(FREE).cloned().unwrap_or_else(|| PlanConfig {
            id: FREE.to_string(),
            display_name: "Free".to_string(),
            stripe_price_id: None,
            monthly_price_yen: 0,
            features: BTreeSet::new(),
            limits: PlanLimits::default(),
        })
    }

    #[must_use]
    pub fn find_by_stripe_price(&self, price_id: &str) -> Option<&PlanConfig> {
        self.plans
            .iter()
            .find(|p| p.stripe_price_id.as_deref() == Some(price_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanConfig> {
        self.plans.iter()
    }
}

/// A single plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlanConfig {
    pub id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_price_id: Option<String>,
    pub monthly_price_yen: i64,
    pub features: BTreeSet<String>,
    pub limits: PlanLimits,
}

impl PlanConfig {
    #[must_use]
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    #[must_use]
    pub fn check_limit(&self, resource: &str, current: u64) -> LimitCheckResult {
        self.limits.check(resource, current)
    }
}

/// Countable limits of a plan. `None` means unlimited.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub oshi: Option<u64>,
    pub circles_owned: Option<u64>,
    pub circle_members: Option<u64>,
    pub gacha_daily_draws: Option<u64>,
}

impl PlanLimits {
    #[must_use]
    pub fn get(&self, resource: &str) -> Option<u64> {
        match resource {
            limits::OSHI => self.oshi,
            limits::CIRCLES_OWNED => self.circles_owned,
            limits::CIRCLE_MEMBERS => self.circle_members,
            limits::GACHA_DAILY_DRAWS => self.gacha_daily_draws,
            _ => None,
        }
    }

    /// Whether one more unit may be added on top of `current`.
    #[must_use]
    pub fn check(&self, resource: &str, current: u64) -> LimitCheckResult {
        match self.get(resource) {
            None => LimitCheckResult::Unlimited,
            Some(max) if current < max => LimitCheckResult::WithinLimit { current, max },
            Some(max) => LimitCheckResult::AtLimit { current, max },
        }
    }
}

/// Result of checking a resource limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LimitCheckResult {
    Unlimited,
    WithinLimit { current: u64, max: u64 },
    AtLimit { current: u64, max: u64 },
}

impl LimitCheckResult {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Unlimited | Self::WithinLimit { .. })
    }

    /// Remaining headroom; `None` when unlimited.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        match self {
            Self::Unlimited => None,
            Self::WithinLimit { current, max } | Self::AtLimit { current, max } => {
                Some(max.saturating_sub(*current))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plans() -> Plans {
        Plans::standard(Some("price_premium".into()), Some("price_plus".into()))
    }

    #[test]
    fn test_standard_features() {
        let plans = plans();
        let free = plans.get(FREE).unwrap();
        let premium = plans.get(PREMIUM).unwrap();
        let plus = plans.get(PLUS).unwrap();

        assert!(!free.has_feature(features::TEN_PULL));
        assert!(premium.has_feature(features::TEN_PULL));
        assert!(premium.has_feature(features::EXPENSE_SUMMARY));
        assert!(!premium.has_feature(features::PRIORITY_SUPPORT));
        assert!(plus.has_feature(features::PRIORITY_SUPPORT));
        assert!(plus.has_feature(features::AD_FREE));
    }

    #[test]
    fn test_limit_checks() {
        let plans = plans();
        let free = plans.get(FREE).unwrap();

        assert_eq!(
            free.check_limit(limits::OSHI, 2),
            LimitCheckResult::WithinLimit { current: 2, max: 3 }
        );
        assert_eq!(
            free.check_limit(limits::OSHI, 3),
            LimitCheckResult::AtLimit { current: 3, max: 3 }
        );
        assert_eq!(
            plans.get(PLUS).unwrap().check_limit(limits::OSHI, 1000),
            LimitCheckResult::Unlimited
        );
        assert_eq!(
            free.check_limit(limits::GACHA_DAILY_DRAWS, 4).remaining(),
            Some(6)
        );
    }

    #[test]
    fn test_find_by_stripe_price() {
        let plans = plans();
        assert_eq!(plans.find_by_stripe_price("price_plus").unwrap().id, PLUS);
        assert!(plans.find_by_stripe_price("price_unknown").is_none());
    }

    #[test]
    fn test_catalogue_order() {
        let ids: Vec<_> = plans().iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![FREE, PREMIUM, PLUS]);
    }
}
