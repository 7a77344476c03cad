//! Persistence port for the checkout and reconciliation logic.
//!
//! The HTTP handlers and the webhook state machine only see this trait, so
//! the state machine is testable against an in-memory implementation while
//! production wires in Postgres via [`crate::store::PostgresEntitlementStore`].

use anyhow::Result;
use async_trait::async_trait;
use ng_entitlement_db::{CustomerMapping, EntitlementAccount, NewSubscription, SubscriptionRecord};
use uuid::Uuid;

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn get_account(&self, user_id: Uuid) -> Result<EntitlementAccount>;

    /// Debit one credit unless the account is unlimited. `None` means the
    /// balance was already exhausted; the balance never goes negative.
    async fn consume_credit(&self, user_id: Uuid) -> Result<Option<EntitlementAccount>>;

    async fn get_customer_mapping(
        &self,
        provider: &str,
        user_id: Uuid,
    ) -> Result<Option<CustomerMapping>>;

    async fn save_customer_mapping(
        &self,
        provider: &str,
        user_id: Uuid,
        provider_customer_id: &str,
    ) -> Result<CustomerMapping>;

    async fn find_subscription(
        &self,
        provider: &str,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>>;

    async fn latest_subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionRecord>>;

    async fn was_event_processed(
        &self,
        provider: &str,
        resource_id: &str,
        resulting_state: &str,
    ) -> Result<bool>;

    /// Dedup marker plus credit increment, atomically. Returns `false` when
    /// the event was already processed and nothing was applied.
    async fn apply_credit_grant(
        &self,
        provider: &str,
        payment_id: &str,
        user_id: Uuid,
        credits: i32,
    ) -> Result<bool>;

    /// Dedup marker, subscription upsert and unlimited grant, atomically.
    async fn apply_subscription_activation(
        &self,
        payment_id: &str,
        subscription: &NewSubscription,
    ) -> Result<bool>;

    /// Dedup marker plus subscription upsert; re-grants unlimited when asked.
    async fn apply_subscription_sync(
        &self,
        resulting_state: &str,
        subscription: &NewSubscription,
        grant_unlimited: bool,
    ) -> Result<bool>;
}
