use std::sync::Arc;

use ng_auth_core::JwtConfig;
use ng_billing_core::{MollieClient, PaymentProvider, ProviderKind, StripeClient};
use ng_entitlement_db::DatabaseManager;

use crate::config::BillingConfig;
use crate::error::BillingError;
use crate::ports::EntitlementStore;
use crate::store::PostgresEntitlementStore;

pub struct AppState {
    pub store: Arc<dyn EntitlementStore>,
    pub config: BillingConfig,
    pub jwt_config: Arc<JwtConfig>,
    providers: Vec<(ProviderKind, Arc<dyn PaymentProvider>)>,
}

impl AppState {
    pub fn from_env(db: Arc<DatabaseManager>) -> Result<Self, BillingError> {
        let config = BillingConfig::from_env()?;
        let jwt_config = Arc::new(
            JwtConfig::from_env().map_err(|e| BillingError::Config(e.to_string()))?,
        );

        let mut providers: Vec<(ProviderKind, Arc<dyn PaymentProvider>)> = Vec::new();
        if let Some(api_key) = &config.mollie_api_key {
            let client = MollieClient::new(api_key).map_err(|e| {
                BillingError::Config(format!("Failed to build Mollie client: {e}"))
            })?;
            providers.push((ProviderKind::Mollie, Arc::new(client)));
        }
        if let Some(secret_key) = &config.stripe_secret_key {
            providers.push((ProviderKind::Stripe, Arc::new(StripeClient::new(secret_key))));
        }

        Ok(Self {
            store: Arc::new(PostgresEntitlementStore::new(db)),
            config,
            jwt_config,
            providers,
        })
    }

    pub fn with_parts(
        store: Arc<dyn EntitlementStore>,
        config: BillingConfig,
        jwt_config: Arc<JwtConfig>,
        providers: Vec<(ProviderKind, Arc<dyn PaymentProvider>)>,
    ) -> Self {
        Self {
            store,
            config,
            jwt_config,
            providers,
        }
    }

    pub fn provider(
        &self,
        kind: ProviderKind,
    ) -> Result<&Arc<dyn PaymentProvider>, BillingError> {
        self.providers
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, p)| p)
            .ok_or(BillingError::ProviderNotConfigured(kind))
    }

    /// Provider to use when the request names none: the explicit kind if
    /// given, otherwise the configuration default.
    pub fn resolve_provider(
        &self,
        requested: Option<ProviderKind>,
    ) -> Result<&Arc<dyn PaymentProvider>, BillingError> {
        self.provider(requested.unwrap_or_else(|| self.config.default_provider()))
    }
}
