use axum::{
    body::Body,
    extract::{Form, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use serde_json::{json, Value};
use tokio::fs::File;
use tokio::io::BufReader;
use tokio_util::io::ReaderStream;

use crate::errors::{AppError, AppResult};
use crate::handlers::owned_worksheet;
use crate::models::{CurrentUser, GenerateForm, WorksheetRequest, WorksheetStatus};
use crate::services::GenerationJob;
use crate::state::AppState;

/// Records a pending worksheet, queues its generation and sends the browser
/// to the worksheet page.
pub async fn generate_worksheet(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<GenerateForm>,
) -> AppResult<Redirect> {
    form.validate(state.config.worker.max_problems)?;

    let request = WorksheetRequest {
        subject: form.subject.trim().to_string(),
        difficulty: form.difficulty.trim().to_string(),
        num_problems: form.num_problems,
        additional_info: form.add_info.trim().to_string(),
    };
    let worksheet = state.db.create_worksheet(user.id(), &request).await?;
    tracing::info!(
        "User {} requested worksheet {} ({} x {})",
        user.username(),
        worksheet.id,
        request.num_problems,
        request.subject
    );

    if let Err(e) = state.jobs.enqueue(GenerationJob { worksheet_id: worksheet.id }) {
        tracing::error!("Failed to queue worksheet {}: {}", worksheet.id, e);
        state
            .db
            .set_worksheet_status(worksheet.id, WorksheetStatus::Failed)
            .await?;
        return Err(e.into());
    }

    Ok(Redirect::to(&format!("/worksheets/{}", worksheet.id)))
}

pub async fn get_worksheet_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(worksheet_id): Path<i64>,
) -> AppResult<Json<Value>> {
    let worksheet = owned_worksheet(&state, &user, worksheet_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Worksheet {} not found", worksheet_id)))?;

    tracing::debug!("Worksheet {} status: {}", worksheet.id, worksheet.status);
    Ok(Json(json!({
        "id": worksheet.id,
        "status": worksheet.status,
        "subject": worksheet.subject,
        "created_at": worksheet.created_at,
        "completed_at": worksheet.completed_at,
        "download_url": (worksheet.status == WorksheetStatus::Completed)
            .then(|| format!("/worksheets/{}/download", worksheet.id)),
    })))
}

fn file_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "File not found" })),
    )
        .into_response()
}

/// Streams the generated PDF as an attachment.
pub async fn download_worksheet(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(worksheet_id): Path<i64>,
) -> AppResult<Response> {
    let Some(worksheet) = owned_worksheet(&state, &user, worksheet_id).await? else {
        tracing::warn!("Download of unknown worksheet {}", worksheet_id);
        return Ok(file_not_found());
    };
    let Some(file_path) = worksheet.file_path else {
        tracing::debug!("Worksheet {} has no file yet", worksheet_id);
        return Ok(file_not_found());
    };

    let file = match File::open(&file_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("File for worksheet {} is missing: {}", worksheet_id, file_path);
            return Ok(file_not_found());
        }
        Err(e) => {
            tracing::error!("Failed to open {}: {}", file_path, e);
            return Err(AppError::File(e));
        }
    };
    let file_size = file.metadata().await?.len();

    let body = Body::from_stream(ReaderStream::new(BufReader::new(file)));
    let filename = format!("worksheet_{}.pdf", worksheet.id);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .header(header::CONTENT_LENGTH, file_size.to_string())
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build download response: {}", e)))?;

    tracing::info!("Sending {} ({} bytes) to {}", filename, file_size, user.username());
    Ok(response)
}
