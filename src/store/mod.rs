//! The persistence contract (`Querier`): the eight operations the vending
//! machine needs from a backing store, abstracted so the core never depends
//! on a concrete database. See spec §4.2.

pub mod lmdb;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::scope::{EntityScope, EntityType, UserScope};
use crate::token::{Token, TokenHead};

/// Parameters for [`Querier::store_token`]. A plain struct rather than a
/// long argument list, mirroring how the action table groups related data.
#[derive(Debug, Clone)]
pub struct StoreTokenParams {
    pub token: String,
    pub name: String,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub scopes: Vec<EntityScope>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// The abstract store the vending machine is built against. Implementations
/// back onto a relational database or, in tests, an in-memory map — the
/// machine holds one (shared) reference to a `Querier`; it never owns
/// authoritative state itself (spec §3).
///
/// Every operation is a single store call: no cross-row transactions are
/// required of implementations (spec §5).
#[async_trait]
pub trait Querier: Send + Sync {
    /// All scopes directly granted to a user. `UserNotFound` if the user has
    /// no rows (including if the user id itself is unknown to the store).
    async fn get_user_scopes(&self, user_id: i64) -> Result<Vec<UserScope>>;

    /// All scopes directly granted to the user owning `email`. All returned
    /// rows share a single `user_id`.
    async fn get_user_scopes_by_email(&self, email: &str) -> Result<Vec<UserScope>>;

    /// The organization a workspace belongs to. `EntityNotFound` if the
    /// workspace is unknown.
    async fn get_organization_id_by_workspace_id(&self, workspace_id: i64) -> Result<i64>;

    /// The `(workspace_id, organization_id)` a resource belongs to.
    /// `EntityNotFound` if the resource is unknown.
    async fn get_workspace_organization_id_by_resource_id(
        &self,
        resource_id: i64,
    ) -> Result<(i64, i64)>;

    /// Persist a freshly-issued token. `StoreToken` on conflict or I/O.
    async fn store_token(&self, params: StoreTokenParams) -> Result<()>;

    /// Resolve a token to its full row. `TokenNotFound` if it does not
    /// resolve to anything, whether never issued, revoked, or already
    /// reaped.
    async fn get_token(&self, token: &str) -> Result<Token>;

    /// Delete a token. Missing row is not an error (idempotent).
    async fn delete_token(&self, token: &str) -> Result<()>;

    /// Sweep every token whose `expires_at <= now`. Best-effort: failures
    /// here are swallowed and logged by the reaper, never surfaced to a
    /// `Verify` caller.
    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<()>;

    /// Non-secret headers for every live token acting as `entity`.
    async fn list_tokens_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: i64,
    ) -> Result<Vec<TokenHead>>;
}
