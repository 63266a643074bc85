mod healthcheck;
mod movies;
mod tokens;

use crate::api::Call;
use crate::data::permissions::{MOVIES_READ, MOVIES_WRITE};
use crate::error::ApiError;
use crate::middleware::Access;
use crate::routing::{handler, Router};
use http::Method;

/// The public route table.
pub fn routes() -> Router {
    Router::new()
        .route(
            Method::GET,
            "/v1/healthcheck",
            Access::Public,
            handler(healthcheck::show),
        )
        .route(
            Method::GET,
            "/v1/movies",
            Access::Permission(MOVIES_READ),
            handler(movies::list),
        )
        .route(
            Method::POST,
            "/v1/movies",
            Access::Permission(MOVIES_WRITE),
            handler(movies::create),
        )
        .route(
            Method::GET,
            "/v1/movies/:id",
            Access::Permission(MOVIES_READ),
            handler(movies::show),
        )
        .route(
            Method::PATCH,
            "/v1/movies/:id",
            Access::Permission(MOVIES_WRITE),
            handler(movies::update),
        )
        .route(
            Method::DELETE,
            "/v1/movies/:id",
            Access::Permission(MOVIES_WRITE),
            handler(movies::delete),
        )
        .route(
            Method::POST,
            "/v1/tokens/authentication",
            Access::Public,
            handler(tokens::create_authentication),
        )
        .route(
            Method::DELETE,
            "/v1/tokens/authentication",
            Access::Authenticated,
            handler(tokens::revoke_authentication),
        )
}

/// The `:id` path parameter. Anything that is not a positive integer is
/// treated as a missing resource.
fn read_id(call: &Call) -> Result<i64, ApiError> {
    call.params
        .get("id")
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|id| *id >= 1)
        .ok_or(ApiError::NotFound)
}
