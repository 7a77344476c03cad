//! Payment provider clients for the billing service.
//!
//! Exposes a single [`PaymentProvider`] port with Mollie and Stripe
//! implementations behind it. Callers hold `Arc<dyn PaymentProvider>` and
//! never branch on the concrete provider outside of wiring code.

pub mod error;
pub mod mollie;
pub mod provider;
pub mod stripe_client;
pub mod types;

pub use error::ProviderError;
pub use mollie::MollieClient;
pub use provider::PaymentProvider;
pub use stripe_client::StripeClient;
pub use types::{
    CreatePayment, PaymentDetails, PaymentMetadata, PaymentStatus, ProductType, ProviderCustomer,
    ProviderKind, ProviderSubscription, ResourceKind, SequenceType, SubscriptionPlan,
    SubscriptionStatus,
};
