//! HTTP surface

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

mod auth;
mod bookings;
mod classes;
pub mod error;
mod extract;
mod health;
mod memberships;
mod middleware_auth;
pub mod response;
pub mod state;
mod users;

pub use error::AppError;
pub use state::AppState;

/// Build the application router with every route nested under `prefix`
pub fn router(state: AppState, prefix: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/health", get(health::health_check))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login));

    let protected = Router::new()
        // Bookings
        .route("/bookings", post(bookings::create))
        .route("/bookings/search", post(bookings::search))
        .route("/bookings/:id", get(bookings::get).delete(bookings::cancel))
        // Classes
        .route("/classes", post(classes::create))
        .route("/classes/search", post(classes::search))
        .route(
            "/classes/:id",
            get(classes::get)
                .patch(classes::update)
                .delete(classes::delete),
        )
        // Users
        .route("/users/me", get(users::me).patch(users::update_me))
        .route("/users/me/password", patch(users::change_password))
        .route("/users/me/credits", get(users::my_credits))
        .route("/users/search", post(users::search))
        .route(
            "/users/:id",
            get(users::get).patch(users::update).delete(users::delete),
        )
        .route("/users/:id/credits", get(users::credits))
        // Memberships
        .route("/memberships", post(memberships::grant))
        .route("/memberships/search", post(memberships::search))
        .route("/memberships/:id", axum::routing::delete(memberships::revoke))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_auth::require_auth,
        ));

    let api = public.merge(protected);
    let app = match prefix.trim_matches('/') {
        "" => api,
        prefix => Router::new().nest(&format!("/{prefix}"), api),
    };

    app.layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
