use axum::{
    extract::{Form, Query, State},
    response::Html,
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{AppError, AppResult};
use crate::models::{CurrentUser, LoginForm, PublicUser, RegisterRequest};
use crate::services::auth::{self, ACCESS_TOKEN_COOKIE};
use crate::services::escape_html;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub error: Option<String>,
}

/// The generation form for signed-in browsers, the login page otherwise.
pub async fn serve_index(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<Html<String>> {
    if jar.get(ACCESS_TOKEN_COOKIE).is_none() {
        return render_login(&state, None).await;
    }
    let html = state
        .pages
        .render(
            "index.html",
            &[("max_problems", state.config.worker.max_problems.to_string())],
        )
        .await?;
    Ok(Html(html))
}

pub async fn serve_login_page(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<String>> {
    render_login(&state, query.error.as_deref()).await
}

pub async fn serve_signup_page(State(state): State<AppState>) -> AppResult<Html<String>> {
    Ok(Html(state.pages.render("signup.html", &[]).await?))
}

async fn render_login(state: &AppState, error: Option<&str>) -> AppResult<Html<String>> {
    let error = error.map(escape_html).unwrap_or_default();
    Ok(Html(state.pages.render("login.html", &[("error", error)]).await?))
}

/// Exchanges a username and password for an access token, returned in the
/// body and stored in the `access_token` cookie.
pub async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> AppResult<(CookieJar, Json<Value>)> {
    tracing::info!("Login attempt for user: {}", form.username);

    let user = auth::authenticate(&state.db, &form.username, &form.password)
        .await?
        .ok_or_else(|| {
            tracing::info!("Rejected credentials for user: {}", form.username);
            AppError::InvalidCredentials
        })?;

    let minutes = state.config.auth.access_token_expire_minutes;
    let token = state
        .keys
        .create_access_token(&user.username, Some(chrono::Duration::minutes(minutes)))?;

    let cookie = Cookie::build((ACCESS_TOKEN_COOKIE, format!("Bearer {}", token)))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.auth.secure_cookie)
        .max_age(time::Duration::minutes(minutes));

    tracing::info!("User {} logged in", user.username);
    Ok((
        jar.add(cookie),
        Json(json!({
            "message": "Login successful",
            "access_token": token,
        })),
    ))
}

pub async fn handle_register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<Json<PublicUser>> {
    request.validate()?;
    let username = request.username.trim();

    if state.db.get_user_by_username(username).await?.is_some() {
        return Err(AppError::UsernameTaken);
    }

    let hashed = auth::hash_password(&request.password, state.config.auth.bcrypt_cost).await?;
    let full_name = request
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let user = state.db.create_user(username, full_name, &hashed).await?;

    tracing::info!("Registered user {} (id {})", user.username, user.id);
    Ok(Json(PublicUser::from(&user)))
}

pub async fn handle_logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = jar.remove(Cookie::build((ACCESS_TOKEN_COOKIE, "")).path("/"));
    (jar, Json(json!({ "message": "Logged out successfully" })))
}

pub async fn read_users_me(Extension(user): Extension<CurrentUser>) -> Json<PublicUser> {
    Json(PublicUser::from(&user.0))
}
