//! Checkout initiation: resolve a provider customer, create the payment,
//! hand the provider-hosted checkout URL back to the caller.
//!
//! Subscription checkouts only create the *first* payment here. The
//! recurring mandate is established inside the webhook handler once that
//! payment clears, because card details are only tokenized during payment.

use ng_billing_core::{
    CreatePayment, PaymentMetadata, PaymentProvider, ProductType, SequenceType,
};
use tracing::info;
use uuid::Uuid;

use crate::config::{BillingConfig, CREDITS_PER_PACK};
use crate::error::BillingError;
use crate::ports::EntitlementStore;
use crate::types::{CheckoutResponse, OfferType};

pub async fn initiate_checkout(
    store: &dyn EntitlementStore,
    provider: &dyn PaymentProvider,
    config: &BillingConfig,
    user_id: Uuid,
    email: &str,
    name: &str,
    offer: OfferType,
) -> Result<CheckoutResponse, BillingError> {
    if email.is_empty() {
        return Err(BillingError::Config(
            "user has no email address on file".to_string(),
        ));
    }

    let customer_id = resolve_customer(store, provider, user_id, name, email).await?;

    let request = match offer {
        OfferType::Credits => CreatePayment {
            customer_id,
            amount_cents: config.credit_pack_amount_cents,
            currency: config.currency.clone(),
            description: format!("NailGenie credit pack ({CREDITS_PER_PACK} credits)"),
            metadata: PaymentMetadata {
                user_id,
                product_type: ProductType::Credits,
            },
            sequence_type: None,
            redirect_url: config.redirect_url(),
            webhook_url: config.webhook_url(provider.kind()),
        },
        OfferType::Subscription => CreatePayment {
            customer_id,
            amount_cents: config.subscription_amount_cents,
            currency: config.currency.clone(),
            description: "NailGenie unlimited subscription".to_string(),
            metadata: PaymentMetadata {
                user_id,
                product_type: ProductType::SubscriptionFirstPayment,
            },
            sequence_type: Some(SequenceType::First),
            redirect_url: config.redirect_url(),
            webhook_url: config.webhook_url(provider.kind()),
        },
    };

    let payment = provider.create_payment(request).await?;

    let url = payment
        .checkout_url
        .ok_or(BillingError::Provider(
            ng_billing_core::ProviderError::MissingField("checkout url"),
        ))?;

    info!(
        provider = %provider.kind(),
        %user_id,
        payment_id = %payment.id,
        ?offer,
        "Checkout initiated"
    );

    Ok(CheckoutResponse {
        url,
        payment_id: payment.id,
    })
}

/// O(1) customer resolution through the local mapping table. Provider-side
/// identity stays best-effort: two racing checkouts may create two provider
/// customers, and the mapping keeps whichever saved last.
async fn resolve_customer(
    store: &dyn EntitlementStore,
    provider: &dyn PaymentProvider,
    user_id: Uuid,
    name: &str,
    email: &str,
) -> Result<String, BillingError> {
    let provider_name = provider.kind().as_str();

    if let Some(mapping) = store.get_customer_mapping(provider_name, user_id).await? {
        return Ok(mapping.provider_customer_id);
    }

    let customer = provider.create_customer(name, email).await?;
    store
        .save_customer_mapping(provider_name, user_id, &customer.id)
        .await?;

    Ok(customer.id)
}
