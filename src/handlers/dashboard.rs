use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Extension,
};

use crate::errors::{AppError, AppResult};
use crate::handlers::{owned_worksheet, remove_files};
use crate::models::{CurrentUser, Worksheet, WorksheetStatus};
use crate::services::escape_html;
use crate::state::AppState;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub async fn list_worksheets(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Html<String>> {
    let worksheets = state.db.list_worksheets_for_user(user.id()).await?;
    tracing::debug!("User {} has {} worksheets", user.username(), worksheets.len());

    let rows = if worksheets.is_empty() {
        r#"<tr><td colspan="6" class="empty">No worksheets yet.</td></tr>"#.to_string()
    } else {
        worksheets.iter().map(worksheet_row).collect::<Vec<_>>().join("\n")
    };

    let html = state
        .pages
        .render(
            "worksheet_list.html",
            &[
                ("username", escape_html(user.username())),
                ("worksheets", rows),
            ],
        )
        .await?;
    Ok(Html(html))
}

fn worksheet_row(worksheet: &Worksheet) -> String {
    let download = if worksheet.status == WorksheetStatus::Completed {
        format!(
            r#"<a href="/worksheets/{}/download" class="download-btn">Download</a>"#,
            worksheet.id
        )
    } else {
        String::new()
    };
    format!(
        r#"<tr>
                <td>{subject}</td>
                <td>{difficulty}</td>
                <td>{count}</td>
                <td>{created}</td>
                <td class="status status-{status}">{status}</td>
                <td class="action-cell">
                    <a href="/worksheets/{id}" class="view-btn">View</a>
                    {download}
                    <button class="delete-btn" data-worksheet-id="{id}">Delete</button>
                </td>
            </tr>"#,
        subject = escape_html(&worksheet.subject),
        difficulty = escape_html(&worksheet.difficulty),
        count = worksheet.num_problems,
        created = worksheet.created_at.format(TIME_FORMAT),
        status = worksheet.status,
        id = worksheet.id,
        download = download,
    )
}

pub async fn view_worksheet(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(worksheet_id): Path<i64>,
) -> AppResult<Response> {
    let Some(worksheet) = owned_worksheet(&state, &user, worksheet_id).await? else {
        tracing::info!("Worksheet {} not found for {}", worksheet_id, user.username());
        let html = state
            .pages
            .render(
                "not_found.html",
                &[("message", "Worksheet not found".to_string())],
            )
            .await?;
        return Ok((StatusCode::NOT_FOUND, Html(html)).into_response());
    };

    let completed = worksheet
        .completed_at
        .map_or_else(|| "-".to_string(), |t| t.format(TIME_FORMAT).to_string());
    let html = state
        .pages
        .render(
            "worksheet_detail.html",
            &[
                ("id", worksheet.id.to_string()),
                ("subject", escape_html(&worksheet.subject)),
                ("difficulty", escape_html(&worksheet.difficulty)),
                ("num_problems", worksheet.num_problems.to_string()),
                (
                    "additional_info",
                    escape_html(worksheet.additional_info.as_deref().unwrap_or("-")),
                ),
                ("status", worksheet.status.to_string()),
                ("created_at", worksheet.created_at.format(TIME_FORMAT).to_string()),
                ("completed_at", completed),
                ("owner", escape_html(user.username())),
            ],
        )
        .await?;
    Ok(Html(html).into_response())
}

/// Removes every worksheet the caller owns along with its PDF.
pub async fn delete_all_worksheets(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<StatusCode> {
    let paths = state.db.delete_worksheets_for_user(user.id()).await?;
    tracing::info!("Deleted all worksheets of {} ({} files)", user.username(), paths.len());
    remove_files(&paths).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_worksheet(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(worksheet_id): Path<i64>,
) -> AppResult<StatusCode> {
    if owned_worksheet(&state, &user, worksheet_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Worksheet {} not found", worksheet_id)));
    }
    let removed = state.db.delete_worksheet(worksheet_id).await?;
    if let Some(Some(path)) = removed {
        remove_files(&[path]).await;
    }
    tracing::info!("Deleted worksheet {} for {}", worksheet_id, user.username());
    Ok(StatusCode::NO_CONTENT)
}
