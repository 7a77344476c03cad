use axum::http::HeaderValue;
use ng_billing_core::{ProviderKind, SubscriptionPlan};

/// How many generation credits one credit-pack purchase grants.
pub const CREDITS_PER_PACK: i32 = 10;

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub mollie_api_key: Option<String>,
    pub stripe_secret_key: Option<String>,
    /// Origin the browser redirects back to after checkout; also the CORS origin.
    pub frontend_url: String,
    /// Publicly reachable base URL of this service, used to build webhook URLs.
    pub public_url: String,
    pub credit_pack_amount_cents: i64,
    pub subscription_amount_cents: i64,
    pub currency: String,
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, crate::error::BillingError> {
        let mollie_api_key = std::env::var("MOLLIE_API_KEY").ok();
        let stripe_secret_key = std::env::var("STRIPE_SECRET_KEY").ok();

        if mollie_api_key.is_none() && stripe_secret_key.is_none() {
            return Err(crate::error::BillingError::Config(
                "at least one of MOLLIE_API_KEY or STRIPE_SECRET_KEY must be set".into(),
            ));
        }

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

        HeaderValue::from_str(&frontend_url).map_err(|e| {
            crate::error::BillingError::Config(format!(
                "FRONTEND_URL '{frontend_url}' is not a valid header value: {e}"
            ))
        })?;

        let public_url =
            std::env::var("PUBLIC_URL").unwrap_or_else(|_| "http://localhost:3003".to_string());

        let credit_pack_amount_cents = env_cents("CREDIT_PACK_AMOUNT_CENTS", 299)?;
        let subscription_amount_cents = env_cents("SUBSCRIPTION_AMOUNT_CENTS", 799)?;

        let currency = std::env::var("BILLING_CURRENCY").unwrap_or_else(|_| "EUR".to_string());

        Ok(Self {
            mollie_api_key,
            stripe_secret_key,
            frontend_url,
            public_url,
            credit_pack_amount_cents,
            subscription_amount_cents,
            currency,
        })
    }

    /// Provider used when the checkout request does not name one.
    pub fn default_provider(&self) -> ProviderKind {
        if self.mollie_api_key.is_some() {
            ProviderKind::Mollie
        } else {
            ProviderKind::Stripe
        }
    }

    pub fn redirect_url(&self) -> String {
        format!("{}/payment/success", self.frontend_url)
    }

    pub fn webhook_url(&self, provider: ProviderKind) -> String {
        format!("{}/billing/webhook/{provider}", self.public_url)
    }

    pub fn subscription_plan(&self, provider: ProviderKind) -> SubscriptionPlan {
        SubscriptionPlan {
            amount_cents: self.subscription_amount_cents,
            currency: self.currency.clone(),
            interval: "1 month".to_string(),
            description: "NailGenie unlimited subscription".to_string(),
            webhook_url: self.webhook_url(provider),
        }
    }
}

fn env_cents(name: &str, default: i64) -> Result<i64, crate::error::BillingError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => {
            let cents: i64 = raw.parse().map_err(|_| {
                crate::error::BillingError::Config(format!("{name} '{raw}' is not a valid amount"))
            })?;
            if cents <= 0 {
                return Err(crate::error::BillingError::Config(format!(
                    "{name} must be positive"
                )));
            }
            Ok(cents)
        }
    }
}
