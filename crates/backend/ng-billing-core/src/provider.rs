use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CreatePayment, PaymentDetails, ProviderCustomer, ProviderKind, ProviderSubscription,
    ResourceKind, SubscriptionPlan,
};

/// Port over a payment provider's REST API.
///
/// Webhook payloads from either provider carry only an opaque resource id;
/// the read-back methods here are the source of truth, and callers must
/// re-fetch before applying any entitlement mutation.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Classifies a webhook resource id by its provider-specific shape.
    fn classify_resource(&self, resource_id: &str) -> ResourceKind;

    /// Creates a provider-side customer. Customer identity is best-effort:
    /// concurrent calls for the same email may create duplicates, which is
    /// why callers keep their own user-to-customer mapping.
    async fn create_customer(&self, name: &str, email: &str) -> Result<ProviderCustomer>;

    /// Creates a payment (checkout attempt) and returns it including the
    /// provider-hosted checkout URL the user must be redirected to.
    async fn create_payment(&self, request: CreatePayment) -> Result<PaymentDetails>;

    /// Authoritative payment read-back.
    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails>;

    /// Turns a paid `first` payment into a recurring subscription.
    ///
    /// Mollie registers a new subscription against the mandate the first
    /// payment established; Stripe already created the subscription during
    /// the checkout session, so its implementation resolves the linked one.
    async fn activate_subscription(
        &self,
        first_payment: &PaymentDetails,
        plan: &SubscriptionPlan,
    ) -> Result<ProviderSubscription>;

    /// Authoritative subscription read-back. Mollie scopes subscriptions
    /// under their customer, hence the `customer_id` parameter.
    async fn get_subscription(
        &self,
        customer_id: &str,
        subscription_id: &str,
    ) -> Result<ProviderSubscription>;
}
