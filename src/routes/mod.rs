//! HTTP surface (spec.md §6.1): one `Router<ApiContext>` per component,
//! merged here with the request authenticator layered on exactly per the
//! endpoint table — public, HMAC-only, HMAC+bearer, and the one
//! bearer-only route. Mirrors the teacher's `routes/*.rs` + `router()`
//! pattern (`examples/mtergel-nevermind/src/routes/auth.rs`), generalized
//! to the two-stage gate `app::middleware` implements.

pub mod chat;
pub mod documents;
pub mod identity;

use axum::middleware::from_fn_with_state;
use axum::Router;

use crate::app::middleware::{bearer_required, hmac_required};
use crate::app::ApiContext;

pub fn router(ctx: ApiContext) -> Router<ApiContext> {
    Router::new()
        .merge(identity::public_router())
        .merge(identity::bearer_only_router().route_layer(from_fn_with_state(ctx.clone(), bearer_required)))
        .merge(identity::hmac_router().route_layer(from_fn_with_state(ctx.clone(), hmac_required)))
        .merge(
            identity::hmac_bearer_router()
                .route_layer(from_fn_with_state(ctx.clone(), bearer_required))
                .route_layer(from_fn_with_state(ctx.clone(), hmac_required)),
        )
        .merge(documents::router().route_layer(from_fn_with_state(ctx.clone(), bearer_required)))
        .merge(
            chat::router()
                .route_layer(from_fn_with_state(ctx.clone(), bearer_required))
                .route_layer(from_fn_with_state(ctx, hmac_required)),
        )
}
