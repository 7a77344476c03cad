use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ng_entitlement_db::{
    CustomerMapping, DatabaseManager, EntitlementAccount, NewSubscription, SubscriptionRecord,
};
use uuid::Uuid;

use crate::ports::EntitlementStore;

/// Production [`EntitlementStore`] backed by Postgres.
pub struct PostgresEntitlementStore {
    db: Arc<DatabaseManager>,
}

impl PostgresEntitlementStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn get_account(&self, user_id: Uuid) -> Result<EntitlementAccount> {
        Ok(self.db.get_account(user_id).await?)
    }

    async fn consume_credit(&self, user_id: Uuid) -> Result<Option<EntitlementAccount>> {
        Ok(self.db.consume_credit(user_id).await?)
    }

    async fn get_customer_mapping(
        &self,
        provider: &str,
        user_id: Uuid,
    ) -> Result<Option<CustomerMapping>> {
        Ok(self.db.get_customer_mapping(provider, user_id).await?)
    }

    async fn save_customer_mapping(
        &self,
        provider: &str,
        user_id: Uuid,
        provider_customer_id: &str,
    ) -> Result<CustomerMapping> {
        Ok(self
            .db
            .save_customer_mapping(provider, user_id, provider_customer_id)
            .await?)
    }

    async fn find_subscription(
        &self,
        provider: &str,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>> {
        Ok(self
            .db
            .find_subscription(provider, provider_subscription_id)
            .await?)
    }

    async fn latest_subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionRecord>> {
        Ok(self.db.latest_subscription_for_user(user_id).await?)
    }

    async fn was_event_processed(
        &self,
        provider: &str,
        resource_id: &str,
        resulting_state: &str,
    ) -> Result<bool> {
        Ok(self
            .db
            .was_event_processed(provider, resource_id, resulting_state)
            .await?)
    }

    async fn apply_credit_grant(
        &self,
        provider: &str,
        payment_id: &str,
        user_id: Uuid,
        credits: i32,
    ) -> Result<bool> {
        Ok(self
            .db
            .apply_credit_grant(provider, payment_id, user_id, credits)
            .await?)
    }

    async fn apply_subscription_activation(
        &self,
        payment_id: &str,
        subscription: &NewSubscription,
    ) -> Result<bool> {
        Ok(self
            .db
            .apply_subscription_activation(payment_id, subscription)
            .await?)
    }

    async fn apply_subscription_sync(
        &self,
        resulting_state: &str,
        subscription: &NewSubscription,
        grant_unlimited: bool,
    ) -> Result<bool> {
        Ok(self
            .db
            .apply_subscription_sync(resulting_state, subscription, grant_unlimited)
            .await?)
    }
}
