use crate::error::app_error::AppError;
use std::sync::Arc;

/// Identity asserted by an external provider after a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub email: String,
}

/// Exchanges an authorization code for the caller's profile.
#[async_trait::async_trait]
pub trait OAuthProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn exchange_code(&self, code: &str) -> Result<OAuthProfile, AppError>;
}

/// Managed state for the OAuth callback. `None` when no provider is configured.
///
/// The server binary starts without a provider; code embedding the crate plugs one in
/// through `build_rocket_with_oauth`.
#[derive(Clone, Default)]
pub struct OAuthState {
    pub provider: Option<Arc<dyn OAuthProvider>>,
}

impl OAuthState {
    pub fn new(provider: Arc<dyn OAuthProvider>) -> Self {
        Self { provider: Some(provider) }
    }
}
