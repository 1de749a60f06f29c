//! LMDB-backed `Querier`, grounded in the teacher's `core.rs`/`db.rs`
//! transaction helpers (`with_read_txn`/`with_write_txn`, slash-joined
//! string keys for prefix scans) but adapted to this spec's schema and
//! owning its `heed::Env` as a struct field instead of a process-global
//! `OnceLock` — the vending machine only ever holds a shared reference to a
//! `Querier` (spec §3), which only makes sense if stores are independently
//! constructible values rather than singletons.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use heed::types::{SerdeJson, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};

use crate::error::{Result, TvmError};
use crate::scope::{EntityType, UserScope};
use crate::token::Token;

use super::{Querier, StoreTokenParams};

fn err<E: std::error::Error>(_e: E) -> TvmError {
    TvmError::StoreToken
}

fn entity_tag(t: EntityType) -> &'static str {
    match t {
        EntityType::System => "system",
        EntityType::Organization => "organization",
        EntityType::Workspace => "workspace",
        EntityType::Resource => "resource",
        EntityType::User => "user",
    }
}

fn entity_prefix(entity_type: EntityType, entity_id: i64) -> String {
    format!("{}/{}/", entity_tag(entity_type), entity_id)
}

struct Dbs {
    user_scopes: Database<Str, SerdeJson<Vec<UserScope>>>,
    emails: Database<Str, Str>,
    workspace_parents: Database<Str, Str>,
    resource_parents: Database<Str, Str>,
    tokens: Database<Str, SerdeJson<Token>>,
    /// `{entity_type}/{entity_id}/{token}` -> token. A secondary index kept
    /// in sync with `tokens` so `list_tokens_for_entity` can prefix-scan
    /// instead of walking the whole table, the same shape the teacher's
    /// `relationships_rev` index plays for `list_subjects`.
    tokens_by_entity: Database<Str, Str>,
}

/// An LMDB-backed store. One `Env` per instance; safe to open several
/// pointed at different paths within the same process (e.g. in tests).
pub struct LmdbQuerier {
    env: Env,
    dbs: Dbs,
}

impl LmdbQuerier {
    /// Open (creating if needed) an LMDB environment at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(err)?;

        // SAFETY: the caller guarantees no other process touches this path
        // concurrently while this environment is open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(10 * 1024 * 1024 * 1024)
                .max_dbs(6)
                .open(path)
                .map_err(err)?
        };

        let mut wtxn = env.write_txn().map_err(err)?;
        let dbs = Dbs {
            user_scopes: env.create_database(&mut wtxn, Some("user_scopes")).map_err(err)?,
            emails: env.create_database(&mut wtxn, Some("emails")).map_err(err)?,
            workspace_parents: env
                .create_database(&mut wtxn, Some("workspace_parents"))
                .map_err(err)?,
            resource_parents: env
                .create_database(&mut wtxn, Some("resource_parents"))
                .map_err(err)?,
            tokens: env.create_database(&mut wtxn, Some("tokens")).map_err(err)?,
            tokens_by_entity: env
                .create_database(&mut wtxn, Some("tokens_by_entity"))
                .map_err(err)?,
        };
        wtxn.commit().map_err(err)?;

        Ok(Self { env, dbs })
    }

    fn read_txn(&self) -> Result<RoTxn<'_>> {
        self.env.read_txn().map_err(err)
    }

    fn write_txn(&self) -> Result<RwTxn<'_>> {
        self.env.write_txn().map_err(err)
    }

    /// Seed a user's full grant set (out-of-band admin data in the real
    /// system — spec §3 — exposed here so tests/fixtures can populate it).
    pub fn seed_user(&self, user_id: i64, email: &str, scopes: &[UserScope]) -> Result<()> {
        let mut txn = self.write_txn()?;
        self.dbs
            .user_scopes
            .put(&mut txn, &user_id.to_string(), &scopes.to_vec())
            .map_err(err)?;
        self.dbs.emails.put(&mut txn, email, &user_id.to_string()).map_err(err)?;
        txn.commit().map_err(err)
    }

    pub fn seed_workspace(&self, workspace_id: i64, organization_id: i64) -> Result<()> {
        let mut txn = self.write_txn()?;
        self.dbs
            .workspace_parents
            .put(&mut txn, &workspace_id.to_string(), &organization_id.to_string())
            .map_err(err)?;
        txn.commit().map_err(err)
    }

    pub fn seed_resource(&self, resource_id: i64, workspace_id: i64, organization_id: i64) -> Result<()> {
        let mut txn = self.write_txn()?;
        self.dbs
            .resource_parents
            .put(
                &mut txn,
                &resource_id.to_string(),
                &format!("{}:{}", workspace_id, organization_id),
            )
            .map_err(err)?;
        txn.commit().map_err(err)
    }
}

#[async_trait]
impl Querier for LmdbQuerier {
    async fn get_user_scopes(&self, user_id: i64) -> Result<Vec<UserScope>> {
        let txn = self.read_txn()?;
        self.dbs
            .user_scopes
            .get(&txn, &user_id.to_string())
            .map_err(err)?
            .ok_or(TvmError::UserNotFound)
    }

    async fn get_user_scopes_by_email(&self, email: &str) -> Result<Vec<UserScope>> {
        let txn = self.read_txn()?;
        let user_id = self.dbs.emails.get(&txn, email).map_err(err)?.ok_or(TvmError::UserNotFound)?;
        self.dbs
            .user_scopes
            .get(&txn, user_id)
            .map_err(err)?
            .ok_or(TvmError::UserNotFound)
    }

    async fn get_organization_id_by_workspace_id(&self, workspace_id: i64) -> Result<i64> {
        let txn = self.read_txn()?;
        let org = self
            .dbs
            .workspace_parents
            .get(&txn, &workspace_id.to_string())
            .map_err(err)?
            .ok_or(TvmError::EntityNotFound)?;
        org.parse().map_err(|_| TvmError::EntityNotFound)
    }

    async fn get_workspace_organization_id_by_resource_id(
        &self,
        resource_id: i64,
    ) -> Result<(i64, i64)> {
        let txn = self.read_txn()?;
        let raw = self
            .dbs
            .resource_parents
            .get(&txn, &resource_id.to_string())
            .map_err(err)?
            .ok_or(TvmError::EntityNotFound)?;
        let (ws, org) = raw.split_once(':').ok_or(TvmError::EntityNotFound)?;
        Ok((
            ws.parse().map_err(|_| TvmError::EntityNotFound)?,
            org.parse().map_err(|_| TvmError::EntityNotFound)?,
        ))
    }

    async fn store_token(&self, params: StoreTokenParams) -> Result<()> {
        let mut txn = self.write_txn()?;
        if self.dbs.tokens.get(&txn, &params.token).map_err(err)?.is_some() {
            return Err(TvmError::StoreToken);
        }
        let index_key = format!(
            "{}{}",
            entity_prefix(params.entity_type, params.entity_id),
            params.token
        );
        let token_row = Token {
            token: params.token.clone(),
            name: params.name,
            entity_type: params.entity_type,
            entity_id: params.entity_id,
            scopes: params.scopes,
            expires_at: params.expires_at,
            created_at: params.created_at,
        };
        self.dbs.tokens.put(&mut txn, &params.token, &token_row).map_err(err)?;
        self.dbs.tokens_by_entity.put(&mut txn, &index_key, &params.token).map_err(err)?;
        txn.commit().map_err(err)
    }

    async fn get_token(&self, token: &str) -> Result<Token> {
        let txn = self.read_txn()?;
        self.dbs.tokens.get(&txn, token).map_err(err)?.ok_or(TvmError::TokenNotFound)
    }

    async fn delete_token(&self, token: &str) -> Result<()> {
        let mut txn = self.write_txn()?;
        if let Some(row) = self.dbs.tokens.get(&txn, token).map_err(err)? {
            let index_key = format!("{}{}", entity_prefix(row.entity_type, row.entity_id), token);
            self.dbs.tokens_by_entity.delete(&mut txn, &index_key).map_err(err)?;
        }
        self.dbs.tokens.delete(&mut txn, token).map_err(err)?;
        txn.commit().map_err(err)
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<()> {
        let mut txn = self.write_txn()?;
        let mut expired = Vec::new();
        for item in self.dbs.tokens.iter(&txn).map_err(err)? {
            let (token, row) = item.map_err(err)?;
            if row.is_expired_at(now) {
                expired.push((token.to_string(), row.entity_type, row.entity_id));
            }
        }
        for (token, entity_type, entity_id) in expired {
            let index_key = format!("{}{}", entity_prefix(entity_type, entity_id), token);
            self.dbs.tokens_by_entity.delete(&mut txn, &index_key).map_err(err)?;
            self.dbs.tokens.delete(&mut txn, &token).map_err(err)?;
        }
        txn.commit().map_err(err)
    }

    async fn list_tokens_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: i64,
    ) -> Result<Vec<crate::token::TokenHead>> {
        let txn = self.read_txn()?;
        let prefix = entity_prefix(entity_type, entity_id);
        let mut heads = Vec::new();
        for item in self.dbs.tokens_by_entity.prefix_iter(&txn, &prefix).map_err(err)? {
            let (_, token) = item.map_err(err)?;
            if let Some(row) = self.dbs.tokens.get(&txn, token).map_err(err)? {
                heads.push(row.head());
            }
        }
        Ok(heads)
    }
}

/// Helper used only by tests to pin a fixed instant without depending on
/// wall-clock time drifting between the write and the assertion.
#[cfg(test)]
fn fixed_now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}
