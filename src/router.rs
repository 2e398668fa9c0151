use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir};

use crate::{handlers, middleware, state::AppState};

pub fn app_router(state: AppState) -> Router {
    let max_body = state.config.server.max_body_bytes;
    let static_dir = state.config.storage.static_dir.clone();

    // Everything here needs a signed-in user
    let protected = Router::new()
        .route("/users/me", get(handlers::read_users_me))
        .route("/generate", post(handlers::generate_worksheet))
        .route(
            "/worksheets",
            get(handlers::list_worksheets).delete(handlers::delete_all_worksheets),
        )
        .route(
            "/worksheets/:worksheet_id",
            get(handlers::view_worksheet).delete(handlers::delete_worksheet),
        )
        .route(
            "/worksheets/:worksheet_id/status",
            get(handlers::get_worksheet_status),
        )
        .route(
            "/worksheets/:worksheet_id/download",
            get(handlers::download_worksheet),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .route("/", get(handlers::serve_index))
        .route("/login", get(handlers::serve_login_page))
        .route("/signup", get(handlers::serve_signup_page))
        .route("/token", post(handlers::handle_login))
        .route("/register", post(handlers::handle_register))
        .route("/logout", post(handlers::handle_logout))
        .merge(protected)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body))
        .with_state(state)
}
