use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which payment provider a resource belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mollie,
    Stripe,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Mollie => "mollie",
            ProviderKind::Stripe => "stripe",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of resource a webhook id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Payment,
    Subscription,
    Unknown,
}

/// Provider-reported payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Open,
    Pending,
    Authorized,
    Paid,
    Expired,
    Canceled,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Open => "open",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Unknown => "unknown",
        }
    }
}

/// Provider-reported subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Canceled,
    Suspended,
    Completed,
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// Whether this status entitles the user to unlimited generations.
    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Completed => "completed",
            SubscriptionStatus::Unknown => "unknown",
        }
    }
}

/// Discriminator carried in payment metadata so the webhook handler knows
/// which entitlement mutation a paid payment maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Credits,
    SubscriptionFirstPayment,
}

/// Attribution metadata attached to every payment this service creates.
///
/// A paid payment without a parseable `user_id` cannot be attributed and is
/// treated as an unrecoverable per-event error by the webhook handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMetadata {
    pub user_id: Uuid,
    pub product_type: ProductType,
}

/// Payments that establish a reusable mandate for recurring charges use
/// sequence type `first`; plain one-time purchases omit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceType {
    Oneoff,
    First,
    Recurring,
}

/// Customer in the provider's system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCustomer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Request to create a provider-side payment (checkout attempt).
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub customer_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub metadata: PaymentMetadata,
    pub sequence_type: Option<SequenceType>,
    pub redirect_url: String,
    pub webhook_url: String,
}

/// Authoritative payment state read back from the provider.
#[derive(Debug, Clone)]
pub struct PaymentDetails {
    pub id: String,
    pub status: PaymentStatus,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub customer_id: Option<String>,
    /// Populated when the provider links the payment to a subscription
    /// (Stripe subscription-mode checkout sessions do this).
    pub subscription_id: Option<String>,
    pub metadata: Option<PaymentMetadata>,
    pub checkout_url: Option<String>,
    pub sequence_type: Option<SequenceType>,
}

/// Plan parameters for the recurring subscription a first payment sets up.
#[derive(Debug, Clone)]
pub struct SubscriptionPlan {
    pub amount_cents: i64,
    pub currency: String,
    /// Provider interval notation, e.g. `1 month`.
    pub interval: String,
    pub description: String,
    pub webhook_url: String,
}

/// Authoritative subscription state read back from the provider.
#[derive(Debug, Clone)]
pub struct ProviderSubscription {
    pub id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
}
