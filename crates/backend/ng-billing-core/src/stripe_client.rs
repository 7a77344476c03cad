use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::DateTime;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CheckoutSessionPaymentStatus, CheckoutSessionStatus,
    Client, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionLineItemsPriceDataRecurring,
    CreateCheckoutSessionLineItemsPriceDataRecurringInterval, CreateCustomer, Currency, Customer,
    Subscription,
};
use uuid::Uuid;

use crate::error::{ProviderError, Result};
use crate::provider::PaymentProvider;
use crate::types::{
    CreatePayment, PaymentDetails, PaymentMetadata, PaymentStatus, ProductType, ProviderCustomer,
    ProviderKind, ProviderSubscription, ResourceKind, SequenceType, SubscriptionPlan,
    SubscriptionStatus,
};

/// Stripe implementation of the provider port.
///
/// Stripe has no direct analogue of Mollie's payment object, so a "payment"
/// here is a Checkout Session: `create_payment` opens one (subscription mode
/// when the caller asks for a `first` payment) and `get_payment` reads it
/// back by its `cs_` id.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    fn classify_resource(&self, resource_id: &str) -> ResourceKind {
        if resource_id.starts_with("cs_") {
            ResourceKind::Payment
        } else if resource_id.starts_with("sub_") {
            ResourceKind::Subscription
        } else {
            ResourceKind::Unknown
        }
    }

    async fn create_customer(&self, name: &str, email: &str) -> Result<ProviderCustomer> {
        let mut create_customer = CreateCustomer::new();
        create_customer.email = Some(email);
        create_customer.name = Some(name);

        let customer = Customer::create(&self.client, create_customer).await?;

        Ok(ProviderCustomer {
            id: customer.id.to_string(),
            email: customer.email,
            name: customer.name,
        })
    }

    async fn create_payment(&self, request: CreatePayment) -> Result<PaymentDetails> {
        let currency: Currency = request
            .currency
            .to_lowercase()
            .parse()
            .map_err(|_| ProviderError::InvalidResponse(format!("bad currency {}", request.currency)))?;

        let is_first = matches!(request.sequence_type, Some(SequenceType::First));

        let mut price_data = CreateCheckoutSessionLineItemsPriceData {
            currency,
            unit_amount: Some(request.amount_cents),
            product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                name: request.description.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };
        if is_first {
            price_data.recurring = Some(CreateCheckoutSessionLineItemsPriceDataRecurring {
                interval: CreateCheckoutSessionLineItemsPriceDataRecurringInterval::Month,
                interval_count: Some(1),
            });
        }

        let line_items = vec![CreateCheckoutSessionLineItems {
            price_data: Some(price_data),
            quantity: Some(1),
            ..Default::default()
        }];

        let metadata: HashMap<String, String> = HashMap::from([
            ("user_id".to_string(), request.metadata.user_id.to_string()),
            (
                "product_type".to_string(),
                match request.metadata.product_type {
                    ProductType::Credits => "credits".to_string(),
                    ProductType::SubscriptionFirstPayment => {
                        "subscription_first_payment".to_string()
                    }
                },
            ),
        ]);

        let customer_id = stripe::CustomerId::from_str(&request.customer_id)
            .map_err(|_| ProviderError::InvalidResponse("invalid customer id".to_string()))?;

        let mut create_session = CreateCheckoutSession::new();
        create_session.mode = Some(if is_first {
            CheckoutSessionMode::Subscription
        } else {
            CheckoutSessionMode::Payment
        });
        create_session.line_items = Some(line_items);
        create_session.success_url = Some(&request.redirect_url);
        create_session.cancel_url = Some(&request.redirect_url);
        create_session.customer = Some(customer_id);
        create_session.metadata = Some(metadata);

        let session = CheckoutSession::create(&self.client, create_session).await?;

        Ok(session_to_payment(session, Some(request.metadata)))
    }

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails> {
        let session_id = payment_id
            .parse()
            .map_err(|_| ProviderError::InvalidResponse("invalid session id".to_string()))?;

        let session = CheckoutSession::retrieve(&self.client, &session_id, &[]).await?;
        let metadata = session.metadata.as_ref().and_then(metadata_from_map);

        Ok(session_to_payment(session, metadata))
    }

    async fn activate_subscription(
        &self,
        first_payment: &PaymentDetails,
        _plan: &SubscriptionPlan,
    ) -> Result<ProviderSubscription> {
        // Subscription-mode checkout sessions create the subscription as part
        // of payment; resolve the one the session is linked to.
        let subscription_id = first_payment
            .subscription_id
            .as_deref()
            .ok_or(ProviderError::MissingField("subscription"))?;

        self.get_subscription("", subscription_id).await
    }

    async fn get_subscription(
        &self,
        _customer_id: &str,
        subscription_id: &str,
    ) -> Result<ProviderSubscription> {
        let id = subscription_id
            .parse()
            .map_err(|_| ProviderError::InvalidResponse("invalid subscription id".to_string()))?;

        let subscription = Subscription::retrieve(&self.client, &id, &[]).await?;

        Ok(ProviderSubscription {
            id: subscription.id.to_string(),
            customer_id: subscription.customer.id().to_string(),
            status: map_subscription_status(subscription.status),
            price_id: subscription
                .items
                .data
                .first()
                .and_then(|item| item.price.as_ref())
                .map(|price| price.id.to_string()),
            current_period_end: DateTime::from_timestamp(subscription.current_period_end, 0),
        })
    }
}

fn session_to_payment(
    session: CheckoutSession,
    metadata: Option<PaymentMetadata>,
) -> PaymentDetails {
    let status = match session.payment_status {
        CheckoutSessionPaymentStatus::Paid | CheckoutSessionPaymentStatus::NoPaymentRequired => {
            PaymentStatus::Paid
        }
        CheckoutSessionPaymentStatus::Unpaid => match session.status {
            Some(CheckoutSessionStatus::Expired) => PaymentStatus::Expired,
            _ => PaymentStatus::Open,
        },
    };

    PaymentDetails {
        id: session.id.to_string(),
        status,
        amount_cents: session.amount_total,
        currency: session.currency.map(|c| c.to_string().to_uppercase()),
        description: None,
        customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
        subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
        metadata,
        checkout_url: session.url,
        sequence_type: sequence_for_mode(session.mode),
    }
}

/// Subscription-mode sessions are the Stripe analogue of a Mollie `first`
/// payment: they establish the recurring mandate.
fn sequence_for_mode(mode: CheckoutSessionMode) -> Option<SequenceType> {
    match mode {
        CheckoutSessionMode::Subscription => Some(SequenceType::First),
        _ => None,
    }
}

fn metadata_from_map(map: &HashMap<String, String>) -> Option<PaymentMetadata> {
    let user_id = Uuid::parse_str(map.get("user_id")?).ok()?;
    let product_type = match map.get("product_type")?.as_str() {
        "credits" => ProductType::Credits,
        "subscription_first_payment" => ProductType::SubscriptionFirstPayment,
        _ => return None,
    };
    Some(PaymentMetadata {
        user_id,
        product_type,
    })
}

fn map_subscription_status(status: stripe::SubscriptionStatus) -> SubscriptionStatus {
    use stripe::SubscriptionStatus as S;
    match status {
        S::Active | S::Trialing => SubscriptionStatus::Active,
        S::Canceled | S::IncompleteExpired => SubscriptionStatus::Canceled,
        S::PastDue | S::Unpaid | S::Paused => SubscriptionStatus::Suspended,
        S::Incomplete => SubscriptionStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_stripe_resource_ids() {
        let client = StripeClient::new("sk_test_fake");
        assert_eq!(
            client.classify_resource("cs_test_a1b2c3"),
            ResourceKind::Payment
        );
        assert_eq!(
            client.classify_resource("sub_1MowQVLkdIwHu7ix"),
            ResourceKind::Subscription
        );
        assert_eq!(client.classify_resource("evt_123"), ResourceKind::Unknown);
    }

    #[test]
    fn metadata_map_parsing() {
        let user_id = Uuid::new_v4();
        let map = HashMap::from([
            ("user_id".to_string(), user_id.to_string()),
            ("product_type".to_string(), "credits".to_string()),
        ]);
        let metadata = metadata_from_map(&map).unwrap();
        assert_eq!(metadata.user_id, user_id);
        assert_eq!(metadata.product_type, ProductType::Credits);

        // Missing attribution parses to None, never to a default user.
        let map = HashMap::from([("product_type".to_string(), "credits".to_string())]);
        assert!(metadata_from_map(&map).is_none());
    }

    #[test]
    fn sequence_type_follows_session_mode() {
        assert_eq!(
            sequence_for_mode(CheckoutSessionMode::Subscription),
            Some(SequenceType::First)
        );
        assert_eq!(sequence_for_mode(CheckoutSessionMode::Payment), None);
        assert_eq!(sequence_for_mode(CheckoutSessionMode::Setup), None);
    }

    #[test]
    fn subscription_status_mapping() {
        use stripe::SubscriptionStatus as S;
        assert_eq!(map_subscription_status(S::Active), SubscriptionStatus::Active);
        assert_eq!(map_subscription_status(S::Trialing), SubscriptionStatus::Active);
        assert_eq!(
            map_subscription_status(S::Canceled),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            map_subscription_status(S::PastDue),
            SubscriptionStatus::Suspended
        );
    }
}
