//! Job API Handlers
//!
//! Client-facing endpoints: submission, status and result download.

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use framecast_core::dto::job::{ReportedStatus, ResultUnavailable, StatusResponse, SubmitResponse};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::job::{self as job_service, ResultLookup};
use crate::state::AppState;

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "image";

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// POST /generate
/// Accept an image upload and enqueue a video generation job
pub async fn generate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let mut upload: Option<(Option<String>, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Err(ApiError::BadRequest(format!(
            "Missing multipart field '{}'",
            IMAGE_FIELD
        )));
    };

    tracing::info!(
        filename = filename.as_deref().unwrap_or("<none>"),
        size = bytes.len(),
        "Received upload"
    );

    let job = job_service::submit(&state, filename.as_deref(), &bytes).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id: job.id,
            status: job.status,
            output_ref: job.output_ref,
        }),
    ))
}

/// GET /status/{id}
/// Report the status of a job; unknown ids report `not_found`
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Json<StatusResponse> {
    let status = job_service::status(&state, id).await;
    tracing::debug!(job_id = %id, status = %status.status, "Fetched job status");
    Json(status)
}

/// GET /results/{id}
/// Stream the generated video, or explain why it is unavailable
pub async fn get_result(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Response> {
    let unavailable = |code: StatusCode, status: ReportedStatus, error: String| {
        (
            code,
            Json(ResultUnavailable {
                task_id: id,
                status,
                error,
            }),
        )
            .into_response()
    };

    let response = match job_service::result(&state, id).await {
        ResultLookup::Ready {
            path,
            size,
            content_type,
        } => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| ApiError::InternalError(format!("Failed to open result: {}", e)))?;

            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| id.to_string());

            tracing::info!(job_id = %id, size, "Returning result");

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, size.to_string())
                .header(
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                )
                .body(Body::from_stream(ReaderStream::new(file)))
                .map_err(|e| ApiError::InternalError(e.to_string()))?
        }
        ResultLookup::Pending(status) => unavailable(
            StatusCode::ACCEPTED,
            status,
            format!("Job is {}", status),
        ),
        ResultLookup::Failed(error) => unavailable(StatusCode::CONFLICT, ReportedStatus::Failed, error),
        ResultLookup::Missing => unavailable(
            StatusCode::NOT_FOUND,
            ReportedStatus::Succeeded,
            "Job finished but output file is missing".to_string(),
        ),
        ResultLookup::NotFound => unavailable(
            StatusCode::NOT_FOUND,
            ReportedStatus::NotFound,
            "Job not found".to_string(),
        ),
    };

    Ok(response)
}
