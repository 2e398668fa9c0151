use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::errors::{AppError, AppResult};
use crate::models::CurrentUser;
use crate::services::auth::ACCESS_TOKEN_COOKIE;
use crate::state::AppState;

/// Resolves the `access_token` cookie to a user and stores it as a
/// `CurrentUser` extension for the handlers behind this layer.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> AppResult<Response> {
    let token = jar
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| AppError::Auth("Not authenticated".into()))?;

    let claims = state.keys.decode_access_token(&token)?;
    let user = state
        .db
        .get_user_by_username(&claims.sub)
        .await?
        .ok_or_else(|| {
            tracing::debug!("Token subject {} no longer exists", claims.sub);
            AppError::Auth("Could not validate credentials".into())
        })?;

    if user.disabled {
        return Err(AppError::InactiveUser);
    }

    tracing::trace!("Authenticated {} for {}", user.username, req.uri().path());
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
