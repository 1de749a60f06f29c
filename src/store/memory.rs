//! An in-process `Querier` backed by `HashMap`s behind a `tokio::sync::RwLock`.
//!
//! Used by this crate's own test suite and suitable as a quick-start store
//! for callers who do not need durability, the same role the teacher's
//! global LMDB env plays for its own doctests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{Result, TvmError};
use crate::scope::{EntityType, UserScope};
use crate::token::{Token, TokenHead};

use super::{Querier, StoreTokenParams};

#[derive(Default)]
struct State {
    user_scopes: HashMap<i64, Vec<UserScope>>,
    emails: HashMap<String, i64>,
    workspace_parents: HashMap<i64, i64>,
    resource_parents: HashMap<i64, (i64, i64)>,
    tokens: HashMap<String, Token>,
}

/// A `Querier` whose state lives entirely in process memory. Seed
/// topology (workspace/resource parents, user scopes) is set up directly
/// through the `seed_*` helpers rather than through a generic write API,
/// since those rows are owned out-of-band by the permission-management
/// subsystem in the real system (spec §3) and this store exists only to
/// exercise the vending machine in tests.
#[derive(Default)]
pub struct InMemoryQuerier {
    state: RwLock<State>,
}

impl InMemoryQuerier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user's full grant set, keyed by both id and email.
    pub async fn seed_user(&self, user_id: i64, email: &str, scopes: Vec<UserScope>) {
        let mut state = self.state.write().await;
        state.user_scopes.insert(user_id, scopes);
        state.emails.insert(email.to_string(), user_id);
    }

    /// Seed a workspace's owning organization.
    pub async fn seed_workspace(&self, workspace_id: i64, organization_id: i64) {
        self.state.write().await.workspace_parents.insert(workspace_id, organization_id);
    }

    /// Seed a resource's owning workspace and organization.
    pub async fn seed_resource(&self, resource_id: i64, workspace_id: i64, organization_id: i64) {
        self.state
            .write()
            .await
            .resource_parents
            .insert(resource_id, (workspace_id, organization_id));
    }
}

#[async_trait]
impl Querier for InMemoryQuerier {
    async fn get_user_scopes(&self, user_id: i64) -> Result<Vec<UserScope>> {
        let state = self.state.read().await;
        state.user_scopes.get(&user_id).cloned().ok_or(TvmError::UserNotFound)
    }

    async fn get_user_scopes_by_email(&self, email: &str) -> Result<Vec<UserScope>> {
        let state = self.state.read().await;
        let user_id = *state.emails.get(email).ok_or(TvmError::UserNotFound)?;
        state.user_scopes.get(&user_id).cloned().ok_or(TvmError::UserNotFound)
    }

    async fn get_organization_id_by_workspace_id(&self, workspace_id: i64) -> Result<i64> {
        let state = self.state.read().await;
        state.workspace_parents.get(&workspace_id).copied().ok_or(TvmError::EntityNotFound)
    }

    async fn get_workspace_organization_id_by_resource_id(
        &self,
        resource_id: i64,
    ) -> Result<(i64, i64)> {
        let state = self.state.read().await;
        state.resource_parents.get(&resource_id).copied().ok_or(TvmError::EntityNotFound)
    }

    async fn store_token(&self, params: StoreTokenParams) -> Result<()> {
        let mut state = self.state.write().await;
        if state.tokens.contains_key(&params.token) {
            return Err(TvmError::StoreToken);
        }
        state.tokens.insert(
            params.token.clone(),
            Token {
                token: params.token,
                name: params.name,
                entity_type: params.entity_type,
                entity_id: params.entity_id,
                scopes: params.scopes,
                expires_at: params.expires_at,
                created_at: params.created_at,
            },
        );
        Ok(())
    }

    async fn get_token(&self, token: &str) -> Result<Token> {
        let state = self.state.read().await;
        state.tokens.get(token).cloned().ok_or(TvmError::TokenNotFound)
    }

    async fn delete_token(&self, token: &str) -> Result<()> {
        self.state.write().await.tokens.remove(token);
        Ok(())
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        state.tokens.retain(|_, t| !t.is_expired_at(now));
        Ok(())
    }

    async fn list_tokens_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: i64,
    ) -> Result<Vec<TokenHead>> {
        let state = self.state.read().await;
        Ok(state
            .tokens
            .values()
            .filter(|t| t.entity_type == entity_type && t.entity_id == entity_id)
            .map(Token::head)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = InMemoryQuerier::new();
        assert_eq!(store.get_user_scopes(1).await.unwrap_err(), TvmError::UserNotFound);
    }

    #[tokio::test]
    async fn seeded_user_round_trips_by_id_and_email() {
        let store = InMemoryQuerier::new();
        let scopes = vec![UserScope {
            user_id: 1,
            entity_type: EntityType::Organization,
            entity_id: 1,
            scope: Scope::Admin,
        }];
        store.seed_user(1, "a@example.com", scopes.clone()).await;
        assert_eq!(store.get_user_scopes(1).await.unwrap(), scopes);
        assert_eq!(store.get_user_scopes_by_email("a@example.com").await.unwrap(), scopes);
    }

    #[tokio::test]
    async fn store_token_rejects_duplicate_id() {
        let store = InMemoryQuerier::new();
        let now = Utc::now();
        let params = StoreTokenParams {
            token: "t1".into(),
            name: "n".into(),
            entity_type: EntityType::User,
            entity_id: 1,
            scopes: vec![],
            expires_at: now + chrono::Duration::hours(1),
            created_at: now,
        };
        store.store_token(params.clone()).await.unwrap();
        assert_eq!(store.store_token(params).await.unwrap_err(), TvmError::StoreToken);
    }

    #[tokio::test]
    async fn delete_expired_tokens_is_idempotent() {
        let store = InMemoryQuerier::new();
        let now = Utc::now();
        store
            .store_token(StoreTokenParams {
                token: "expired".into(),
                name: "n".into(),
                entity_type: EntityType::User,
                entity_id: 1,
                scopes: vec![],
                expires_at: now - chrono::Duration::seconds(1),
                created_at: now - chrono::Duration::hours(1),
            })
            .await
            .unwrap();
        store.delete_expired_tokens(now).await.unwrap();
        assert_eq!(store.get_token("expired").await.unwrap_err(), TvmError::TokenNotFound);
        // second sweep, nothing left to do, still succeeds
        store.delete_expired_tokens(now).await.unwrap();
    }
}
