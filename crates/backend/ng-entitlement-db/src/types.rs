use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-user entitlement ledger row.
///
/// `unlimited` is an explicit flag rather than a sentinel credit value, so
/// credit arithmetic can never accidentally exhaust a subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntitlementAccount {
    pub user_id: Uuid,
    pub credits: i32,
    pub unlimited: bool,
    pub updated_at: DateTime<Utc>,
}

impl EntitlementAccount {
    /// Zero-balance account for users with no ledger row yet.
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            credits: 0,
            unlimited: false,
            updated_at: Utc::now(),
        }
    }

    pub fn can_generate(&self) -> bool {
        self.unlimited || self.credits > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_subscription_id: String,
    pub provider_customer_id: String,
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerMapping {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_customer_id: String,
    pub created_at: DateTime<Utc>,
}

/// Input for subscription upserts, keyed by `(provider, provider_subscription_id)`.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_subscription_id: String,
    pub provider_customer_id: String,
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
}
