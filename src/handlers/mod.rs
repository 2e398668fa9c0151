mod auth;
mod dashboard;
mod worksheet;

pub use auth::{
    handle_login, handle_logout, handle_register, read_users_me, serve_index, serve_login_page,
    serve_signup_page,
};
pub use dashboard::{delete_all_worksheets, delete_worksheet, list_worksheets, view_worksheet};
pub use worksheet::{download_worksheet, generate_worksheet, get_worksheet_status};

use crate::errors::AppResult;
use crate::models::{CurrentUser, Worksheet};
use crate::state::AppState;

/// Looks up a worksheet the caller owns. Other users' worksheets are
/// reported as absent.
pub(crate) async fn owned_worksheet(
    state: &AppState,
    user: &CurrentUser,
    worksheet_id: i64,
) -> AppResult<Option<Worksheet>> {
    Ok(state
        .db
        .get_worksheet(worksheet_id)
        .await?
        .filter(|worksheet| worksheet.user_id == user.id()))
}

pub(crate) async fn remove_files(paths: &[String]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!("Removed {}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", path, e),
        }
    }
}
