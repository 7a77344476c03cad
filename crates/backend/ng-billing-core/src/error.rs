use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Failure talking to a payment provider. API rejections keep the provider's
/// literal message so card/payment failures stay diagnosable downstream.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Stripe API error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("Provider response missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Client-caused rejections (4xx) are safe to surface verbatim; anything
    /// else is a provider/transport fault the caller may retry.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ProviderError::Api { status, .. } if (400..500).contains(status))
    }
}
