//! Billing-specific error types.

use crate::error::OsikatuError;

/// Errors raised by plan gating and webhook processing.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// The plan does not include the requested feature.
    #[error("Your {plan_id} plan does not include {feature}")]
    FeatureNotIncluded { feature: String, plan_id: String },

    /// A countable plan limit has been reached.
    #[error("Your {plan_id} plan allows at most {max} {limit}")]
    LimitReached {
        limit: String,
        plan_id: String,
        max: u64,
    },

    /// The signature header is missing, malformed, stale or wrong.
    #[error("Invalid webhook signature: {reason}")]
    InvalidSignature { reason: String },

    /// The payload could not be interpreted.
    #[error("Invalid webhook payload: {message}")]
    InvalidWebhookPayload { message: String },

    /// A subscription event whose owner cannot be determined yet.
    #[error("No user linked to customer {customer_id}")]
    UnknownCustomer { customer_id: String },

    /// Webhooks arrive but no signing secret is configured.
    #[error("Billing webhooks are not configured")]
    NotConfigured,
}

impl From<BillingError> for OsikatuError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::FeatureNotIncluded { .. } | BillingError::LimitReached { .. } => {
                OsikatuError::PaymentRequired(err.to_string())
            }
            BillingError::InvalidSignature { .. }
            | BillingError::InvalidWebhookPayload { .. }
            | BillingError::UnknownCustomer { .. } => OsikatuError::BadRequest(err.to_string()),
            BillingError::NotConfigured => OsikatuError::ServiceUnavailable(err.to_string()),
        }
    }
}
