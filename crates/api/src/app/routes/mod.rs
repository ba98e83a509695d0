use axum::Router;

pub mod charge_outs;
pub mod deliveries;
pub mod parts;
pub mod system;

/// Router for all endpoints that act on behalf of a user.
pub fn router() -> Router {
    Router::new()
        .nest("/parts", parts::router())
        .nest("/deliveries", deliveries::router())
        .nest("/charge-outs", charge_outs::router())
}
