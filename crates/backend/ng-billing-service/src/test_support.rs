//! In-memory store and scripted provider used by the reconciliation and
//! router tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use ng_billing_core::{
    CreatePayment, PaymentDetails, PaymentProvider, ProviderCustomer, ProviderError, ProviderKind,
    ProviderSubscription, ResourceKind, SubscriptionPlan,
};
use ng_entitlement_db::{CustomerMapping, EntitlementAccount, NewSubscription, SubscriptionRecord};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::ports::EntitlementStore;

pub fn test_config() -> BillingConfig {
    BillingConfig {
        mollie_api_key: Some("test_key".to_string()),
        stripe_secret_key: None,
        frontend_url: "http://localhost:5173".to_string(),
        public_url: "http://localhost:3003".to_string(),
        credit_pack_amount_cents: 299,
        subscription_amount_cents: 799,
        currency: "EUR".to_string(),
    }
}

#[derive(Default)]
struct StoreInner {
    accounts: HashMap<Uuid, (i32, bool)>,
    mappings: HashMap<(String, Uuid), String>,
    subscriptions: HashMap<(String, String), SubscriptionRecord>,
    processed: HashSet<(String, String, String)>,
}

/// Mirrors the Postgres store's semantics: dedup marker and mutation apply
/// together or not at all, upserts key on `(provider, subscription_id)`.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    pub fn set_credits(&self, user_id: Uuid, credits: i32) {
        let mut inner = self.inner.lock().unwrap();
        inner.accounts.entry(user_id).or_insert((0, false)).0 = credits;
    }

    pub fn credits(&self, user_id: Uuid) -> i32 {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .get(&user_id)
            .map(|(c, _)| *c)
            .unwrap_or(0)
    }

    pub fn unlimited(&self, user_id: Uuid) -> bool {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .get(&user_id)
            .map(|(_, u)| *u)
            .unwrap_or(false)
    }

    pub fn set_unlimited(&self, user_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        inner.accounts.entry(user_id).or_insert((0, false)).1 = true;
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .values()
            .cloned()
            .collect()
    }

    pub fn insert_subscription(
        &self,
        user_id: Uuid,
        provider: &str,
        subscription_id: &str,
        customer_id: &str,
        status: &str,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.subscriptions.insert(
            (provider.to_string(), subscription_id.to_string()),
            SubscriptionRecord {
                id: Uuid::new_v4(),
                user_id,
                provider: provider.to_string(),
                provider_subscription_id: subscription_id.to_string(),
                provider_customer_id: customer_id.to_string(),
                status: status.to_string(),
                price_id: None,
                current_period_end: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
    }

    pub fn customer_mapping(&self, provider: &str, user_id: Uuid) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .mappings
            .get(&(provider.to_string(), user_id))
            .cloned()
    }
}

fn account_of(user_id: Uuid, credits: i32, unlimited: bool) -> EntitlementAccount {
    EntitlementAccount {
        user_id,
        credits,
        unlimited,
        updated_at: Utc::now(),
    }
}

fn upsert_record(inner: &mut StoreInner, record: &NewSubscription) {
    let key = (
        record.provider.clone(),
        record.provider_subscription_id.clone(),
    );
    inner
        .subscriptions
        .entry(key)
        .and_modify(|existing| {
            existing.status = record.status.clone();
            if record.price_id.is_some() {
                existing.price_id = record.price_id.clone();
            }
            existing.current_period_end = record.current_period_end;
            existing.updated_at = Utc::now();
        })
        .or_insert_with(|| SubscriptionRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            provider: record.provider.clone(),
            provider_subscription_id: record.provider_subscription_id.clone(),
            provider_customer_id: record.provider_customer_id.clone(),
            status: record.status.clone(),
            price_id: record.price_id.clone(),
            current_period_end: record.current_period_end,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
}

#[async_trait]
impl EntitlementStore for InMemoryStore {
    async fn get_account(&self, user_id: Uuid) -> Result<EntitlementAccount> {
        let inner = self.inner.lock().unwrap();
        let (credits, unlimited) = inner.accounts.get(&user_id).copied().unwrap_or((0, false));
        Ok(account_of(user_id, credits, unlimited))
    }

    async fn consume_credit(&self, user_id: Uuid) -> Result<Option<EntitlementAccount>> {
        let mut inner = self.inner.lock().unwrap();
        let (credits, unlimited) = inner.accounts.entry(user_id).or_insert((0, false));
        if *unlimited {
            return Ok(Some(account_of(user_id, *credits, true)));
        }
        if *credits == 0 {
            return Ok(None);
        }
        *credits -= 1;
        Ok(Some(account_of(user_id, *credits, false)))
    }

    async fn get_customer_mapping(
        &self,
        provider: &str,
        user_id: Uuid,
    ) -> Result<Option<CustomerMapping>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .mappings
            .get(&(provider.to_string(), user_id))
            .map(|customer_id| CustomerMapping {
                user_id,
                provider: provider.to_string(),
                provider_customer_id: customer_id.clone(),
                created_at: Utc::now(),
            }))
    }

    async fn save_customer_mapping(
        &self,
        provider: &str,
        user_id: Uuid,
        provider_customer_id: &str,
    ) -> Result<CustomerMapping> {
        let mut inner = self.inner.lock().unwrap();
        inner.mappings.insert(
            (provider.to_string(), user_id),
            provider_customer_id.to_string(),
        );
        Ok(CustomerMapping {
            user_id,
            provider: provider.to_string(),
            provider_customer_id: provider_customer_id.to_string(),
            created_at: Utc::now(),
        })
    }

    async fn find_subscription(
        &self,
        provider: &str,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .subscriptions
            .get(&(provider.to_string(), provider_subscription_id.to_string()))
            .cloned())
    }

    async fn latest_subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .subscriptions
            .values()
            .filter(|record| record.user_id == user_id)
            .max_by_key(|record| record.updated_at)
            .cloned())
    }

    async fn was_event_processed(
        &self,
        provider: &str,
        resource_id: &str,
        resulting_state: &str,
    ) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.processed.contains(&(
            provider.to_string(),
            resource_id.to_string(),
            resulting_state.to_string(),
        )))
    }

    async fn apply_credit_grant(
        &self,
        provider: &str,
        payment_id: &str,
        user_id: Uuid,
        credits: i32,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let key = (
            provider.to_string(),
            payment_id.to_string(),
            "paid".to_string(),
        );
        if !inner.processed.insert(key) {
            return Ok(false);
        }
        inner.accounts.entry(user_id).or_insert((0, false)).0 += credits;
        Ok(true)
    }

    async fn apply_subscription_activation(
        &self,
        payment_id: &str,
        subscription: &NewSubscription,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let key = (
            subscription.provider.clone(),
            payment_id.to_string(),
            "paid".to_string(),
        );
        if !inner.processed.insert(key) {
            return Ok(false);
        }
        upsert_record(&mut inner, subscription);
        inner
            .accounts
            .entry(subscription.user_id)
            .or_insert((0, false))
            .1 = true;
        Ok(true)
    }

    async fn apply_subscription_sync(
        &self,
        resulting_state: &str,
        subscription: &NewSubscription,
        grant_unlimited: bool,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let key = (
            subscription.provider.clone(),
            subscription.provider_subscription_id.clone(),
            resulting_state.to_string(),
        );
        if !inner.processed.insert(key) {
            return Ok(false);
        }
        upsert_record(&mut inner, subscription);
        if grant_unlimited {
            inner
                .accounts
                .entry(subscription.user_id)
                .or_insert((0, false))
                .1 = true;
        }
        Ok(true)
    }
}

/// Scripted Mollie-shaped provider. Returns the configured payment or
/// subscription by id and counts `activate_subscription` calls.
#[derive(Default)]
pub struct MockProvider {
    payments: Mutex<HashMap<String, PaymentDetails>>,
    subscriptions: Mutex<HashMap<String, ProviderSubscription>>,
    activation_result: Mutex<Option<ProviderSubscription>>,
    activation_calls: AtomicUsize,
}

impl MockProvider {
    pub fn with_payment(self, payment: PaymentDetails) -> Self {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id.clone(), payment);
        self
    }

    pub fn with_subscription(self, subscription: ProviderSubscription) -> Self {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
        self
    }

    pub fn with_activation_result(self, subscription: ProviderSubscription) -> Self {
        *self.activation_result.lock().unwrap() = Some(subscription);
        self
    }

    pub fn activation_calls(&self) -> usize {
        self.activation_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mollie
    }

    fn classify_resource(&self, resource_id: &str) -> ResourceKind {
        if resource_id.starts_with("tr_") {
            ResourceKind::Payment
        } else if resource_id.starts_with("sub_") {
            ResourceKind::Subscription
        } else {
            ResourceKind::Unknown
        }
    }

    async fn create_customer(
        &self,
        name: &str,
        email: &str,
    ) -> std::result::Result<ProviderCustomer, ProviderError> {
        Ok(ProviderCustomer {
            id: format!("cst_{}", &Uuid::new_v4().simple().to_string()[..8]),
            email: Some(email.to_string()),
            name: Some(name.to_string()),
        })
    }

    async fn create_payment(
        &self,
        request: CreatePayment,
    ) -> std::result::Result<PaymentDetails, ProviderError> {
        let payment = PaymentDetails {
            id: format!("tr_{}", &Uuid::new_v4().simple().to_string()[..8]),
            status: ng_billing_core::PaymentStatus::Open,
            amount_cents: Some(request.amount_cents),
            currency: Some(request.currency),
            description: Some(request.description),
            customer_id: Some(request.customer_id),
            subscription_id: None,
            metadata: Some(request.metadata),
            checkout_url: Some("https://pay.example.test/checkout".to_string()),
            sequence_type: request.sequence_type,
        };
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    async fn get_payment(
        &self,
        payment_id: &str,
    ) -> std::result::Result<PaymentDetails, ProviderError> {
        self.payments
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or(ProviderError::Api {
                status: 404,
                message: "No payment exists with this id".to_string(),
            })
    }

    async fn activate_subscription(
        &self,
        _first_payment: &PaymentDetails,
        _plan: &SubscriptionPlan,
    ) -> std::result::Result<ProviderSubscription, ProviderError> {
        self.activation_calls.fetch_add(1, Ordering::SeqCst);
        let subscription = self
            .activation_result
            .lock()
            .unwrap()
            .clone()
            .ok_or(ProviderError::MissingField("activation result"))?;
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn get_subscription(
        &self,
        _customer_id: &str,
        subscription_id: &str,
    ) -> std::result::Result<ProviderSubscription, ProviderError> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or(ProviderError::Api {
                status: 404,
                message: "No subscription exists with this id".to_string(),
            })
    }
}
