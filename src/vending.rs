//! The stateful core: `Exchange`, `Issue`, `IssueWithLoginToken`, `Verify`,
//! `VerifyWithEntity`, `Revoke`, `ListTokensForEntity`, plus the background
//! expiry reaper. Composes the scope algebra, the store, and the identity
//! adapter. See spec §4.3–§4.4.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::VendingConfig;
use crate::error::{Result, TvmError};
use crate::identity::{EmailProvider, RequestContext};
use crate::scope::{is_satisfied, EntityScope, EntityType, ParentContext};
use crate::store::{Querier, StoreTokenParams};
use crate::token::{generate_token, TokenHead};

/// Races `fut` against cancellation, mapping a cancellation win to
/// `TvmError::Cancelled`. Every store call on the hot path goes through
/// this so that a cancelled caller returns promptly instead of waiting out
/// a slow or hung store (spec §5 "Cancellation").
async fn race<T>(fut: impl Future<Output = Result<T>>, cancellation: &CancellationToken) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(TvmError::Cancelled),
        result = fut => result,
    }
}

/// Resolve the `ParentContext` the scope algebra needs to evaluate
/// `required`, making at most one store round-trip — zero for
/// `Organization`/`User`/`System`, one for `Workspace`, one for `Resource`
/// (spec §5's "suspends at most twice" budget: one for the token row, one
/// here).
async fn parent_context_for<Q: Querier>(
    store: &Q,
    required: EntityScope,
    cancellation: &CancellationToken,
) -> Result<ParentContext> {
    match required.entity_type {
        EntityType::Organization | EntityType::User | EntityType::System => {
            Ok(ParentContext::default())
        }
        EntityType::Workspace => {
            let org_id = race(
                store.get_organization_id_by_workspace_id(required.entity_id),
                cancellation,
            )
            .await?;
            Ok(ParentContext { organization_id: Some(org_id), ..Default::default() })
        }
        EntityType::Resource => {
            let (workspace_id, organization_id) = race(
                store.get_workspace_organization_id_by_resource_id(required.entity_id),
                cancellation,
            )
            .await?;
            Ok(ParentContext {
                resource_parents: Some(crate::scope::ResourceParents { workspace_id, organization_id }),
                ..Default::default()
            })
        }
    }
}

async fn check_all<Q: Querier>(
    store: &Q,
    granted: &[EntityScope],
    required: &[EntityScope],
    cancellation: &CancellationToken,
) -> Result<()> {
    for &r in required {
        let parents = parent_context_for(store, r, cancellation).await?;
        if !is_satisfied(granted, r, parents)? {
            return Err(TvmError::InsufficientPermissions);
        }
    }
    Ok(())
}

/// A principal to issue or act as: typically `User` for login tokens, but
/// may be an Organization/Workspace/Resource for on-behalf-of service
/// tokens (spec §3 `Token` field description).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub entity_type: EntityType,
    pub entity_id: i64,
}

impl Principal {
    pub fn new(entity_type: EntityType, entity_id: i64) -> Self {
        Self { entity_type, entity_id }
    }
}

/// The stateful token vending machine. Holds an owned, cheaply-cloned
/// `Arc<Q>` rather than the weak/borrowed reference spec §3 describes —
/// nothing else in this crate owns the store, and a truly dangling
/// reference would only turn a configuration mistake into a harder-to-read
/// panic down the line; see DESIGN.md for the full justification of this
/// substitution.
pub struct VendingMachine<Q: Querier + 'static> {
    store: Arc<Q>,
    config: VendingConfig,
    reaper_cancellation: CancellationToken,
    reaper_handle: Option<tokio::task::JoinHandle<()>>,
}

impl<Q: Querier + 'static> VendingMachine<Q> {
    /// Construct the machine and start its background reaper task.
    pub fn new(store: Arc<Q>, config: VendingConfig) -> Self {
        let reaper_cancellation = CancellationToken::new();
        let reaper_handle = spawn_reaper(store.clone(), config.reaper_tick_interval(), reaper_cancellation.clone());
        Self { store, config, reaper_cancellation, reaper_handle: Some(reaper_handle) }
    }

    /// Cancel the reaper and wait for it to stop. Idempotent.
    pub async fn shutdown(&mut self) {
        self.reaper_cancellation.cancel();
        if let Some(handle) = self.reaper_handle.take() {
            let _ = handle.await;
        }
    }

    /// `email_response` comes from an identity provider's `resolve` call:
    /// either a trusted email or an error the caller has already decided to
    /// trust (spec §4.5). No permission self-check — a user may always
    /// obtain a token over its own full scope set.
    pub async fn exchange(
        &self,
        provider: &dyn EmailProvider,
        ctx: &RequestContext,
        cancellation: &CancellationToken,
    ) -> Result<String> {
        let email = race(provider.resolve(ctx), cancellation).await.map_err(|e| match e {
            TvmError::Cancelled => TvmError::Cancelled,
            _ => TvmError::Exchange,
        })?;

        let user_scopes = race(self.store.get_user_scopes_by_email(&email), cancellation).await?;
        let user_id = user_scopes.first().ok_or(TvmError::UserNotFound)?.user_id;
        let scopes: Vec<EntityScope> = user_scopes.iter().map(|s| s.as_entity_scope()).collect();

        self.issue_unchecked(
            "login",
            Principal::new(EntityType::User, user_id),
            scopes,
            self.config.login_token_duration(),
            cancellation,
        )
        .await
    }

    /// Run the permission self-check, then issue. Spec §4.3: for each
    /// requested scope, the requesting user's own grants must satisfy it —
    /// this check is not optional by construction (see spec §9's note on
    /// the dropped-check leak in earlier revisions).
    pub async fn issue(
        &self,
        name: &str,
        requesting_user_id: i64,
        target: Principal,
        requested_scopes: Vec<EntityScope>,
        duration: std::time::Duration,
        cancellation: &CancellationToken,
    ) -> Result<String> {
        if duration > self.config.max_token_duration() {
            return Err(TvmError::DurationExceedsMaxAllowed);
        }

        let user_scopes = race(self.store.get_user_scopes(requesting_user_id), cancellation).await?;
        let granted: Vec<EntityScope> = user_scopes.iter().map(|s| s.as_entity_scope()).collect();
        check_all(&*self.store, &granted, &requested_scopes, cancellation).await?;

        self.issue_unchecked(name, target, requested_scopes, duration, cancellation).await
    }

    /// Resolve `login_token` to its acting user, then delegate to `issue`.
    pub async fn issue_with_login_token(
        &self,
        name: &str,
        login_token: &str,
        target: Principal,
        requested_scopes: Vec<EntityScope>,
        duration: std::time::Duration,
        cancellation: &CancellationToken,
    ) -> Result<String> {
        let row = self.resolve_live_token(login_token, cancellation).await?;
        if row.entity_type != EntityType::User {
            return Err(TvmError::ImproperUsage);
        }
        self.issue(name, row.entity_id, target, requested_scopes, duration, cancellation).await
    }

    /// Resolve `token`, check `required` against its recorded scopes.
    pub async fn verify(
        &self,
        token: &str,
        required: EntityScope,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        self.verify_with_entity(token, required, cancellation).await.map(|_| ())
    }

    /// As [`Self::verify`], additionally returning the token's principal so
    /// the interceptor can populate request context even on a trivial
    /// success (spec §4.3).
    pub async fn verify_with_entity(
        &self,
        token: &str,
        required: EntityScope,
        cancellation: &CancellationToken,
    ) -> Result<(EntityType, i64)> {
        let row = self.resolve_live_token(token, cancellation).await?;
        let parents = parent_context_for(&*self.store, required, cancellation).await?;
        if !is_satisfied(&row.scopes, required, parents)? {
            return Err(TvmError::InsufficientPermissions);
        }
        Ok((row.entity_type, row.entity_id))
    }

    /// For interceptors that want to publish identity without enforcing a
    /// specific scope yet (spec §6).
    pub async fn get_token(
        &self,
        token: &str,
        cancellation: &CancellationToken,
    ) -> Result<(EntityType, i64, Vec<EntityScope>)> {
        let row = self.resolve_live_token(token, cancellation).await?;
        Ok((row.entity_type, row.entity_id, row.scopes))
    }

    /// Delete a token. Missing row is not an error.
    pub async fn revoke(&self, token: &str, cancellation: &CancellationToken) -> Result<()> {
        race(self.store.delete_token(token), cancellation).await
    }

    /// Non-secret headers for every live token acting as `entity`. Callers
    /// must have verified sufficient scope themselves before calling this.
    pub async fn list_tokens_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        cancellation: &CancellationToken,
    ) -> Result<Vec<TokenHead>> {
        race(self.store.list_tokens_for_entity(entity_type, entity_id), cancellation).await
    }

    async fn issue_unchecked(
        &self,
        name: &str,
        target: Principal,
        scopes: Vec<EntityScope>,
        duration: std::time::Duration,
        cancellation: &CancellationToken,
    ) -> Result<String> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(duration).map_err(|_| TvmError::IssueToken)?;
        let token = generate_token(now);
        let params = StoreTokenParams {
            token: token.clone(),
            name: name.to_string(),
            entity_type: target.entity_type,
            entity_id: target.entity_id,
            scopes,
            expires_at,
            created_at: now,
        };
        race(self.store.store_token(params), cancellation).await?;
        Ok(token)
    }

    /// Resolve a token and treat it as not-found-if-expired, regardless of
    /// whether the reaper has gotten to it yet (spec §4.3, §8).
    async fn resolve_live_token(
        &self,
        token: &str,
        cancellation: &CancellationToken,
    ) -> Result<crate::token::Token> {
        let row = race(self.store.get_token(token), cancellation).await?;
        if row.is_expired_at(Utc::now()) {
            return Err(TvmError::TokenExpired);
        }
        Ok(row)
    }
}

impl<Q: Querier + 'static> Drop for VendingMachine<Q> {
    fn drop(&mut self) {
        self.reaper_cancellation.cancel();
    }
}

fn spawn_reaper<Q: Querier + 'static>(
    store: Arc<Q>,
    tick: std::time::Duration,
    cancellation: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    debug!("reaper stopped");
                    break;
                }
                _ = interval.tick() => {
                    match store.delete_expired_tokens(Utc::now()).await {
                        Ok(()) => debug!("reaper swept expired tokens"),
                        Err(e) => warn!(error = %e, "reaper sweep failed, retrying next tick"),
                    }
                }
            }
        }
        info!("reaper task exited");
    })
}
