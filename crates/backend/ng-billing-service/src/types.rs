use ng_billing_core::ProviderKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferType {
    Credits,
    Subscription,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub offer_type: OfferType,
    pub provider: Option<ProviderKind>,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub payment_id: String,
}

/// Webhook bodies carry only an opaque resource id, form-encoded or JSON.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub payment_id: String,
    pub provider: Option<ProviderKind>,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub success: bool,
    pub is_subscription: bool,
    pub credits_added: i32,
}

#[derive(Debug, Serialize)]
pub struct EntitlementResponse {
    pub credits: i32,
    pub unlimited: bool,
    pub subscription_status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    pub credits: i32,
    pub unlimited: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_request_defaults_provider_to_none() {
        let request: CheckoutRequest =
            serde_json::from_str(r#"{"offer_type": "credits"}"#).unwrap();
        assert_eq!(request.offer_type, OfferType::Credits);
        assert!(request.provider.is_none());
    }

    #[test]
    fn checkout_request_parses_provider() {
        let request: CheckoutRequest =
            serde_json::from_str(r#"{"offer_type": "subscription", "provider": "stripe"}"#)
                .unwrap();
        assert_eq!(request.offer_type, OfferType::Subscription);
        assert_eq!(request.provider, Some(ProviderKind::Stripe));
    }
}
