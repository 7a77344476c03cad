use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use ng_billing_core::{ProductType, ProviderKind};
use tracing::error;

use crate::auth::AuthUser;
use crate::checkout::initiate_checkout;
use crate::config::CREDITS_PER_PACK;
use crate::error::BillingError;
use crate::reconcile::reconcile_webhook;
use crate::service::AppState;
use crate::types::{
    CheckoutRequest, CheckoutResponse, ConsumeResponse, EntitlementResponse,
    PaymentStatusRequest, PaymentStatusResponse, WebhookAck, WebhookBody,
};

// ---------------------------------------------------------------------------
// POST /billing/checkout
// ---------------------------------------------------------------------------

pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, BillingError> {
    let user_id = claims
        .user_id()
        .map_err(|e| BillingError::Unauthorized(e.to_string()))?;

    let provider = state.resolve_provider(body.provider)?;
    let email = body.email.as_deref().unwrap_or(&claims.email);
    let name = body.name.as_deref().unwrap_or(email);

    let response = initiate_checkout(
        state.store.as_ref(),
        provider.as_ref(),
        &state.config,
        user_id,
        email,
        name,
        body.offer_type,
    )
    .await?;

    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// POST /billing/webhook/{mollie,stripe}
// ---------------------------------------------------------------------------

pub async fn webhook_mollie(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<WebhookAck>, BillingError> {
    handle_webhook(state, ProviderKind::Mollie, body).await
}

pub async fn webhook_stripe(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<WebhookAck>, BillingError> {
    handle_webhook(state, ProviderKind::Stripe, body).await
}

/// Providers deliver either `id=tr_x` form bodies or `{"id": "tr_x"}` JSON.
/// Once the id is durably read the response is 200 regardless of the
/// reconciliation result, so the provider does not retry forever; only
/// malformed bodies 4xx.
async fn handle_webhook(
    state: Arc<AppState>,
    kind: ProviderKind,
    body: String,
) -> Result<Json<WebhookAck>, BillingError> {
    let resource_id = parse_webhook_body(&body)
        .ok_or(BillingError::Validation("webhook body carries no resource id"))?;

    let provider = state.provider(kind)?;

    if let Err(e) = reconcile_webhook(
        state.store.as_ref(),
        provider.as_ref(),
        &state.config,
        &resource_id,
    )
    .await
    {
        // Money may have been received without entitlement granted; this log
        // line is the manual-reconciliation trail.
        error!(
            provider = %kind,
            resource_id = %resource_id,
            error = %e,
            "Webhook reconciliation failed"
        );
    }

    Ok(Json(WebhookAck { received: true }))
}

fn parse_webhook_body(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_urlencoded::from_str::<WebhookBody>(body) {
        if !parsed.id.is_empty() {
            return Some(parsed.id);
        }
    }
    if let Ok(parsed) = serde_json::from_str::<WebhookBody>(body) {
        if !parsed.id.is_empty() {
            return Some(parsed.id);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// POST /billing/payment-status
// ---------------------------------------------------------------------------

/// Read-only confirmation poll after redirect-back. Entitlement mutation is
/// the webhook handler's exclusive responsibility; this endpoint only
/// reports what the provider says right now.
pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(body): Json<PaymentStatusRequest>,
) -> Result<Json<PaymentStatusResponse>, BillingError> {
    let user_id = claims
        .user_id()
        .map_err(|e| BillingError::Unauthorized(e.to_string()))?;

    let provider = state.resolve_provider(body.provider)?;
    let payment = provider.get_payment(&body.payment_id).await?;

    // A payment attributed to another user is indistinguishable from an
    // unknown id, so callers cannot probe other users' payments.
    if let Some(metadata) = &payment.metadata {
        if metadata.user_id != user_id {
            return Err(BillingError::Provider(
                ng_billing_core::ProviderError::Api {
                    status: 404,
                    message: "No payment exists with this id".to_string(),
                },
            ));
        }
    }

    let success = payment.status.is_paid();
    let is_subscription = matches!(
        payment.metadata.as_ref().map(|m| m.product_type),
        Some(ProductType::SubscriptionFirstPayment)
    );
    let credits_added = if success && !is_subscription {
        CREDITS_PER_PACK
    } else {
        0
    };

    Ok(Json(PaymentStatusResponse {
        success,
        is_subscription,
        credits_added,
    }))
}

// ---------------------------------------------------------------------------
// GET /billing/entitlement
// ---------------------------------------------------------------------------

pub async fn get_entitlement(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<EntitlementResponse>, BillingError> {
    let user_id = claims
        .user_id()
        .map_err(|e| BillingError::Unauthorized(e.to_string()))?;

    let account = state.store.get_account(user_id).await?;
    let subscription = state.store.latest_subscription_for_user(user_id).await?;

    Ok(Json(EntitlementResponse {
        credits: account.credits,
        unlimited: account.unlimited,
        subscription_status: subscription.map(|record| record.status),
    }))
}

// ---------------------------------------------------------------------------
// POST /billing/consume
// ---------------------------------------------------------------------------

pub async fn consume_credit(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ConsumeResponse>, BillingError> {
    let user_id = claims
        .user_id()
        .map_err(|e| BillingError::Unauthorized(e.to_string()))?;

    let account = state
        .store
        .consume_credit(user_id)
        .await?
        .ok_or(BillingError::CreditsExhausted)?;

    Ok(Json(ConsumeResponse {
        credits: account.credits,
        unlimited: account.unlimited,
    }))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub async fn health() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_body_parses_form_and_json() {
        assert_eq!(
            parse_webhook_body("id=tr_abc123").as_deref(),
            Some("tr_abc123")
        );
        assert_eq!(
            parse_webhook_body(r#"{"id": "cs_test_xyz"}"#).as_deref(),
            Some("cs_test_xyz")
        );
        assert_eq!(parse_webhook_body("id="), None);
        assert_eq!(parse_webhook_body("not a body at all"), None);
        assert_eq!(parse_webhook_body(r#"{"other": "field"}"#), None);
    }
}
