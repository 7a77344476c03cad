//! Webhook reconciliation.
//!
//! A webhook body is only a signal that something changed: it carries an
//! opaque resource id and nothing trustworthy beyond it. The handler
//! re-fetches authoritative state from the provider and applies the matching
//! entitlement mutation through the store's dedup-guarded operations, so
//! at-least-once delivery never double-credits.

use ng_billing_core::{PaymentDetails, PaymentProvider, ProductType, ResourceKind};
use ng_entitlement_db::NewSubscription;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{BillingConfig, CREDITS_PER_PACK};
use crate::error::BillingError;
use crate::ports::EntitlementStore;

#[derive(Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    CreditsGranted { user_id: Uuid, credits: i32 },
    SubscriptionActivated { user_id: Uuid, subscription_id: String },
    SubscriptionSynced { subscription_id: String, status: String, granted_unlimited: bool },
    AlreadyProcessed,
    /// Non-paid payment status, or a subscription event we cannot yet map
    /// to a user. Acknowledged and dropped.
    NoOp,
    /// Paid payment without parseable attribution metadata. Money received
    /// but no entitlement granted; logged for manual reconciliation.
    Unattributed,
    UnknownResource,
}

pub async fn reconcile_webhook(
    store: &dyn EntitlementStore,
    provider: &dyn PaymentProvider,
    config: &BillingConfig,
    resource_id: &str,
) -> Result<ReconcileOutcome, BillingError> {
    match provider.classify_resource(resource_id) {
        ResourceKind::Payment => reconcile_payment(store, provider, config, resource_id).await,
        ResourceKind::Subscription => reconcile_subscription(store, provider, resource_id).await,
        ResourceKind::Unknown => {
            warn!(provider = %provider.kind(), resource_id, "Webhook for unrecognized resource id");
            Ok(ReconcileOutcome::UnknownResource)
        }
    }
}

async fn reconcile_payment(
    store: &dyn EntitlementStore,
    provider: &dyn PaymentProvider,
    config: &BillingConfig,
    payment_id: &str,
) -> Result<ReconcileOutcome, BillingError> {
    let payment = provider.get_payment(payment_id).await?;

    if !payment.status.is_paid() {
        info!(
            provider = %provider.kind(),
            payment_id,
            status = payment.status.as_str(),
            "Payment not paid, nothing to apply"
        );
        return Ok(ReconcileOutcome::NoOp);
    }

    let Some(metadata) = payment.metadata.clone() else {
        error!(
            provider = %provider.kind(),
            payment_id,
            "Paid payment carries no user attribution, cannot grant entitlement"
        );
        return Ok(ReconcileOutcome::Unattributed);
    };

    match metadata.product_type {
        ProductType::Credits => {
            let applied = store
                .apply_credit_grant(
                    provider.kind().as_str(),
                    payment_id,
                    metadata.user_id,
                    CREDITS_PER_PACK,
                )
                .await?;
            if applied {
                info!(
                    provider = %provider.kind(),
                    payment_id,
                    user_id = %metadata.user_id,
                    credits = CREDITS_PER_PACK,
                    "Credits granted"
                );
                Ok(ReconcileOutcome::CreditsGranted {
                    user_id: metadata.user_id,
                    credits: CREDITS_PER_PACK,
                })
            } else {
                Ok(ReconcileOutcome::AlreadyProcessed)
            }
        }
        ProductType::SubscriptionFirstPayment => {
            activate_subscription(store, provider, config, payment_id, &payment, metadata.user_id)
                .await
        }
    }
}

/// Second phase of subscription setup: the first payment is paid, so the
/// card mandate now exists and the recurring subscription can be created
/// provider-side, recorded locally, and unlimited granted.
async fn activate_subscription(
    store: &dyn EntitlementStore,
    provider: &dyn PaymentProvider,
    config: &BillingConfig,
    payment_id: &str,
    payment: &PaymentDetails,
    user_id: Uuid,
) -> Result<ReconcileOutcome, BillingError> {
    let provider_name = provider.kind().as_str();

    // The dedup marker inside apply_subscription_activation is the hard
    // guard; this read just avoids creating a second provider-side
    // subscription on an obvious redelivery.
    if store
        .was_event_processed(provider_name, payment_id, "paid")
        .await?
    {
        return Ok(ReconcileOutcome::AlreadyProcessed);
    }

    let plan = config.subscription_plan(provider.kind());
    let subscription = provider.activate_subscription(payment, &plan).await?;

    let customer_id = if subscription.customer_id.is_empty() {
        payment.customer_id.clone().unwrap_or_default()
    } else {
        subscription.customer_id.clone()
    };

    let record = NewSubscription {
        user_id,
        provider: provider_name.to_string(),
        provider_subscription_id: subscription.id.clone(),
        provider_customer_id: customer_id,
        status: subscription.status.as_str().to_string(),
        price_id: subscription.price_id.clone(),
        current_period_end: subscription.current_period_end,
    };

    let applied = store
        .apply_subscription_activation(payment_id, &record)
        .await?;
    if applied {
        info!(
            provider = %provider.kind(),
            payment_id,
            %user_id,
            subscription_id = %subscription.id,
            "Subscription activated, unlimited granted"
        );
        Ok(ReconcileOutcome::SubscriptionActivated {
            user_id,
            subscription_id: subscription.id,
        })
    } else {
        Ok(ReconcileOutcome::AlreadyProcessed)
    }
}

async fn reconcile_subscription(
    store: &dyn EntitlementStore,
    provider: &dyn PaymentProvider,
    subscription_id: &str,
) -> Result<ReconcileOutcome, BillingError> {
    let provider_name = provider.kind().as_str();

    // Attribution comes from the locally stored record. A subscription event
    // arriving before the first-payment event has been processed cannot be
    // mapped to a user yet; the activation path will establish the record,
    // and the next renewal event lands normally.
    let Some(existing) = store
        .find_subscription(provider_name, subscription_id)
        .await?
    else {
        warn!(
            provider = %provider.kind(),
            subscription_id,
            "Subscription event for unknown subscription, dropping"
        );
        return Ok(ReconcileOutcome::NoOp);
    };

    let subscription = provider
        .get_subscription(&existing.provider_customer_id, subscription_id)
        .await?;

    // Dedup key includes the period end so monthly renewals (same id, same
    // `active` status, new period) re-grant while redeliveries of the same
    // event do not.
    let resulting_state = match subscription.current_period_end {
        Some(period_end) => format!("{}:{}", subscription.status.as_str(), period_end.to_rfc3339()),
        None => subscription.status.as_str().to_string(),
    };

    let grant_unlimited = subscription.status.grants_access();

    let record = NewSubscription {
        user_id: existing.user_id,
        provider: provider_name.to_string(),
        provider_subscription_id: subscription_id.to_string(),
        provider_customer_id: existing.provider_customer_id.clone(),
        status: subscription.status.as_str().to_string(),
        price_id: subscription.price_id.clone(),
        current_period_end: subscription.current_period_end,
    };

    let applied = store
        .apply_subscription_sync(&resulting_state, &record, grant_unlimited)
        .await?;
    if applied {
        info!(
            provider = %provider.kind(),
            subscription_id,
            status = subscription.status.as_str(),
            grant_unlimited,
            "Subscription synced"
        );
        Ok(ReconcileOutcome::SubscriptionSynced {
            subscription_id: subscription_id.to_string(),
            status: subscription.status.as_str().to_string(),
            granted_unlimited: grant_unlimited,
        })
    } else {
        Ok(ReconcileOutcome::AlreadyProcessed)
    }
}
