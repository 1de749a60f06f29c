//! # tvm
//!
//! A token vending machine: issuance, verification, revocation, and
//! garbage collection of opaque bearer tokens tied to a caller identity and
//! a set of entity-scoped permissions, enforcing hierarchical authorization
//! across a four-level resource tree (System → Organization → Workspace →
//! Resource, plus a separate User root).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tvm::config::VendingConfig;
//! use tvm::scope::{EntityScope, EntityType, Scope, UserScope};
//! use tvm::store::memory::InMemoryQuerier;
//! use tvm::vending::{Principal, VendingMachine};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> tvm::error::Result<()> {
//! let store = Arc::new(InMemoryQuerier::new());
//! store
//!     .seed_user(1, "alice@example.com", vec![UserScope {
//!         user_id: 1,
//!         entity_type: EntityType::Organization,
//!         entity_id: 1,
//!         scope: Scope::Admin,
//!     }])
//!     .await;
//!
//! let machine = VendingMachine::new(store, VendingConfig::default());
//! let cancellation = CancellationToken::new();
//! let token = machine
//!     .issue(
//!         "ci",
//!         1,
//!         Principal::new(EntityType::Organization, 1),
//!         vec![EntityScope::new(EntityType::Organization, 1, Scope::Admin)],
//!         std::time::Duration::from_secs(3600),
//!         &cancellation,
//!     )
//!     .await?;
//! machine
//!     .verify(&token, EntityScope::new(EntityType::Organization, 1, Scope::Admin), &cancellation)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod interceptor;
pub mod scope;
pub mod store;
pub mod token;
pub mod vending;

pub use error::{ErrorKind, Result, TvmError};
pub use vending::{Principal, VendingMachine};
