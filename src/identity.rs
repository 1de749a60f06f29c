//! Identity-provider adapter: bridges an untrusted external credential to a
//! trusted email address. See spec §4.5.
//!
//! No concrete upstream client ships here — providers are external
//! collaborators (spec §1). The doc comment on [`EmailProvider::resolve`]
//! sketches the shape a GitHub-backed implementation would take.

use async_trait::async_trait;

use crate::error::{Result, TvmError};

/// Opaque context carried through a resolve call. A thin wrapper today; left
/// open for callers to thread request-scoped data (trace id, raw credential)
/// through without changing the trait signature later.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub trace_id: Option<String>,
}

/// Bridges an external identity provider to the email address the core
/// trusts as a user's verified identity.
///
/// A GitHub-backed implementation would use the credential in `ctx` to call
/// `GET /user` and return the `email` field; failures of any kind (network,
/// malformed response, revoked token) map to [`TvmError::Exchange`] — the
/// core does not distinguish provider-internal failure modes (spec §4.5).
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn resolve(&self, ctx: &RequestContext) -> Result<String>;
}

/// Test double that always resolves to a fixed email.
pub struct StaticEmailProvider {
    email: String,
}

impl StaticEmailProvider {
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into() }
    }
}

#[async_trait]
impl EmailProvider for StaticEmailProvider {
    async fn resolve(&self, _ctx: &RequestContext) -> Result<String> {
        Ok(self.email.clone())
    }
}

/// Test double that always fails, as an upstream IdP outage would.
#[derive(Debug, Default)]
pub struct FailingEmailProvider;

#[async_trait]
impl EmailProvider for FailingEmailProvider {
    async fn resolve(&self, _ctx: &RequestContext) -> Result<String> {
        Err(TvmError::Exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_resolves_fixed_email() {
        let provider = StaticEmailProvider::new("a@example.com");
        assert_eq!(provider.resolve(&RequestContext::default()).await.unwrap(), "a@example.com");
    }

    #[tokio::test]
    async fn failing_provider_returns_exchange_error() {
        let provider = FailingEmailProvider;
        assert_eq!(
            provider.resolve(&RequestContext::default()).await.unwrap_err(),
            TvmError::Exchange
        );
    }
}
