//! The shape this crate exposes to surrounding RPC code (spec §6): thin
//! wrappers over [`VendingMachine`] plus, under the `server` feature, an
//! axum extractor that pulls the bearer token out of a request the way the
//! teacher's own axum binary does (`src/bin/server.rs`).

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::scope::{EntityScope, EntityType};
use crate::store::Querier;
use crate::vending::VendingMachine;

/// For interceptors that want to publish identity without enforcing a
/// specific scope yet.
pub async fn get_token<Q: Querier + 'static>(
    machine: &VendingMachine<Q>,
    token: &str,
    cancellation: &CancellationToken,
) -> Result<(EntityType, i64, Vec<EntityScope>)> {
    machine.get_token(token, cancellation).await
}

/// For per-route enforcement.
pub async fn verify<Q: Querier + 'static>(
    machine: &VendingMachine<Q>,
    token: &str,
    required: EntityScope,
    cancellation: &CancellationToken,
) -> Result<()> {
    machine.verify(token, required, cancellation).await
}

#[cfg(feature = "server")]
pub mod server {
    //! Axum extraction of the bearer token from either channel spec §6
    //! names: the `Authorization: Bearer` header, or the `loco_token`
    //! cookie. Grounded in the teacher's `src/bin/server.rs` header/cookie
    //! handling.

    use async_trait::async_trait;
    use axum::extract::FromRequestParts;
    use axum::http::request::Parts;
    use axum::http::StatusCode;
    use axum_extra::extract::cookie::CookieJar;
    use axum_extra::headers::{authorization::Bearer, Authorization};
    use axum_extra::TypedHeader;

    /// The raw token string extracted from a request, before resolution.
    pub struct BearerOrCookie(pub String);

    #[async_trait]
    impl<S> FromRequestParts<S> for BearerOrCookie
    where
        S: Send + Sync,
    {
        type Rejection = (StatusCode, &'static str);

        async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
            if let Ok(TypedHeader(Authorization(bearer))) =
                TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
            {
                return Ok(BearerOrCookie(bearer.token().to_string()));
            }

            let jar = CookieJar::from_headers(&parts.headers);
            if let Some(cookie) = jar.get("loco_token") {
                return Ok(BearerOrCookie(cookie.value().to_string()));
            }

            Err((StatusCode::UNAUTHORIZED, "missing bearer token or loco_token cookie"))
        }
    }
}
