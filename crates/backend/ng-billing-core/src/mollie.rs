use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ProviderError, Result};
use crate::provider::PaymentProvider;
use crate::types::{
    CreatePayment, PaymentDetails, PaymentMetadata, PaymentStatus, ProviderCustomer, ProviderKind,
    ProviderSubscription, ResourceKind, SequenceType, SubscriptionPlan, SubscriptionStatus,
};

const DEFAULT_BASE_URL: &str = "https://api.mollie.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for the Mollie v2 REST API.
#[derive(Clone)]
pub struct MollieClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl MollieClient {
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<MollieErrorBody>().await {
                Ok(body) => body.detail.unwrap_or(body.title),
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unexpected response")
                    .to_string(),
            };
            tracing::warn!(status = status.as_u16(), %message, "Mollie API rejected request");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for MollieClient {
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

    async fn create_customer(&self, name: &str, email: &str) -> Result<ProviderCustomer> {
        let customer: MollieCustomer = self
            .post("/v2/customers", &json!({ "name": name, "email": email }))
            .await?;

        Ok(customer.into())
    }

    async fn create_payment(&self, request: CreatePayment) -> Result<PaymentDetails> {
        let mut body = json!({
            "amount": MollieAmount::from_cents(request.amount_cents, &request.currency),
            "description": request.description,
            "redirectUrl": request.redirect_url,
            "webhookUrl": request.webhook_url,
            "customerId": request.customer_id,
            "metadata": request.metadata,
        });
        if let Some(sequence_type) = request.sequence_type {
            body["sequenceType"] = json!(sequence_type);
        }

        let payment: MolliePayment = self.post("/v2/payments", &body).await?;
        Ok(payment.into())
    }

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails> {
        let payment: MolliePayment = self.get(&format!("/v2/payments/{}", payment_id)).await?;
        Ok(payment.into())
    }

    async fn activate_subscription(
        &self,
        first_payment: &PaymentDetails,
        plan: &SubscriptionPlan,
    ) -> Result<ProviderSubscription> {
        let customer_id = first_payment
            .customer_id
            .as_deref()
            .ok_or(ProviderError::MissingField("customerId"))?;
        let metadata = first_payment
            .metadata
            .as_ref()
            .ok_or(ProviderError::MissingField("metadata"))?;

        let body = json!({
            "amount": MollieAmount::from_cents(plan.amount_cents, &plan.currency),
            "interval": plan.interval,
            "description": plan.description,
            "webhookUrl": plan.webhook_url,
            "metadata": { "user_id": metadata.user_id },
        });

        let subscription: MollieSubscription = self
            .post(&format!("/v2/customers/{}/subscriptions", customer_id), &body)
            .await?;

        Ok(subscription.into())
    }

    async fn get_subscription(
        &self,
        customer_id: &str,
        subscription_id: &str,
    ) -> Result<ProviderSubscription> {
        let subscription: MollieSubscription = self
            .get(&format!(
                "/v2/customers/{}/subscriptions/{}",
                customer_id, subscription_id
            ))
            .await?;

        Ok(subscription.into())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Mollie represents money as a decimal string plus an ISO currency code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MollieAmount {
    pub currency: String,
    pub value: String,
}

impl MollieAmount {
    pub fn from_cents(cents: i64, currency: &str) -> Self {
        Self {
            currency: currency.to_string(),
            value: format!("{}.{:02}", cents / 100, cents % 100),
        }
    }

    pub fn to_cents(&self) -> Option<i64> {
        let (whole, frac) = self.value.split_once('.')?;
        if frac.len() != 2 {
            return None;
        }
        let whole: i64 = whole.parse().ok()?;
        let frac: i64 = frac.parse().ok()?;
        Some(whole * 100 + frac)
    }
}

#[derive(Debug, Deserialize)]
struct MollieErrorBody {
    title: String,
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MollieCustomer {
    id: String,
    name: Option<String>,
    email: Option<String>,
}

impl From<MollieCustomer> for ProviderCustomer {
    fn from(customer: MollieCustomer) -> Self {
        ProviderCustomer {
            id: customer.id,
            email: customer.email,
            name: customer.name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MolliePayment {
    id: String,
    status: PaymentStatus,
    amount: Option<MollieAmount>,
    description: Option<String>,
    customer_id: Option<String>,
    subscription_id: Option<String>,
    sequence_type: Option<SequenceType>,
    metadata: Option<serde_json::Value>,
    #[serde(rename = "_links")]
    links: Option<MollieLinks>,
}

#[derive(Debug, Deserialize)]
struct MollieLinks {
    checkout: Option<MollieLink>,
}

#[derive(Debug, Deserialize)]
struct MollieLink {
    href: String,
}

impl From<MolliePayment> for PaymentDetails {
    fn from(payment: MolliePayment) -> Self {
        // Metadata set by third parties (or absent entirely) parses to None;
        // the webhook handler decides whether that is fatal.
        let metadata = payment
            .metadata
            .and_then(|value| serde_json::from_value::<PaymentMetadata>(value).ok());

        PaymentDetails {
            id: payment.id,
            status: payment.status,
            amount_cents: payment.amount.as_ref().and_then(MollieAmount::to_cents),
            currency: payment.amount.map(|a| a.currency),
            description: payment.description,
            customer_id: payment.customer_id,
            subscription_id: payment.subscription_id,
            metadata,
            checkout_url: payment.links.and_then(|l| l.checkout).map(|l| l.href),
            sequence_type: payment.sequence_type,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MollieSubscription {
    id: String,
    status: SubscriptionStatus,
    customer_id: Option<String>,
    next_payment_date: Option<NaiveDate>,
}

impl From<MollieSubscription> for ProviderSubscription {
    fn from(subscription: MollieSubscription) -> Self {
        ProviderSubscription {
            id: subscription.id,
            customer_id: subscription.customer_id.unwrap_or_default(),
            status: subscription.status,
            price_id: None,
            current_period_end: subscription.next_payment_date.map(midnight_utc),
        }
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
