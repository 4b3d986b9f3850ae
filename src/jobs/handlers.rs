//! # Handlers HTTP para Jobs
//! src/jobs/handlers.rs
//!
//! Implementa los endpoints del sistema de jobs:
//! - `POST /process-image`
//! - `GET /status/{id}`
//! - `GET /result/{id}`
//!
//! Los handlers solo traducen entre HTTP y el `JobBackend`; toda la
//! lógica de estados vive en el backend.

use crate::error::JobError;
use crate::http::{Request, Response, StatusCode};
use crate::jobs::backend::JobBackend;
use crate::jobs::params::{GenerationParams, InputImage};
use crate::jobs::types::{JobId, ResultView};

/// Segundos sugeridos al cliente cuando la cola está llena
pub const RETRY_AFTER_SECS: u32 = 5;

const BUSY_MESSAGE: &str = "Server is currently busy. Please try again in a moment.";
const NOT_FOUND_MESSAGE: &str = "Job ID not found.";
const MISSING_RESULT_MESSAGE: &str = "Result for this job is missing.";

fn busy_response() -> Response {
    Response::error(StatusCode::ServiceUnavailable, BUSY_MESSAGE)
        .with_header("Retry-After", &RETRY_AFTER_SECS.to_string())
}

/// Traduce un error del backend a su respuesta HTTP
pub fn error_response(error: &JobError) -> Response {
    match error {
        JobError::QueueFull { .. } => busy_response(),
        JobError::Validation(message) => Response::error(StatusCode::BadRequest, message),
        JobError::NotFound(_) => Response::error(StatusCode::NotFound, NOT_FOUND_MESSAGE),
        JobError::MissingArtifact { job_id, path } => {
            tracing::error!(job_id = %job_id, path = %path.display(), "Completed job has no result file");
            Response::error(StatusCode::InternalServerError, MISSING_RESULT_MESSAGE)
        }
        JobError::Io(e) => {
            tracing::error!(error = %e, "I/O error while serving job");
            Response::error_with_message(
                StatusCode::InternalServerError,
                "An unexpected error occurred on the server.",
            )
        }
    }
}

/// Un ID que no es un UUID válido no puede existir en el store
fn parse_job_id(raw: &str) -> Result<JobId, Response> {
    raw.parse()
        .map_err(|_| Response::error(StatusCode::NotFound, NOT_FOUND_MESSAGE))
}

/// Handler para `POST /process-image?prompt=...&width=...`
///
/// El body es la imagen cruda; los parámetros van en la query string.
/// `filename` (opcional) se usa solo para validar la extensión.
///
/// # Ejemplo de response (202)
/// ```json
/// {
///   "message": "Request accepted and queued.",
///   "job_id": "0b7c...",
///   "status_url": "/status/0b7c...",
///   "result_url": "/result/0b7c..."
/// }
/// ```
pub fn submit_handler(req: &Request, backend: &dyn JobBackend) -> Response {
    // Rechazo barato antes de validar la imagen; la admisión vuelve a
    // verificar la capacidad de forma atómica.
    if backend.is_full() {
        tracing::warn!("Job queue is full. Rejecting new request.");
        return busy_response();
    }

    let params = InputImage::from_upload(req.body().to_vec(), req.query_param("filename"))
        .and_then(|image| GenerationParams::from_fields(req.query_params(), image));

    let params = match params {
        Ok(params) => params,
        Err(e) => {
            tracing::warn!(error = %e, "Bad request");
            return error_response(&e);
        }
    };

    match backend.submit(params) {
        Ok(job_id) => Response::json(
            StatusCode::Accepted,
            &serde_json::json!({
                "message": "Request accepted and queued.",
                "job_id": job_id,
                "status_url": format!("/status/{}", job_id),
                "result_url": format!("/result/{}", job_id),
            }),
        ),
        Err(e) => error_response(&e),
    }
}

/// Handler para `GET /status/{id}`
///
/// ```json
/// {"job_id": "0b7c...", "status": "queued", "queue_position": 3}
/// ```
pub fn status_handler(raw_id: &str, backend: &dyn JobBackend) -> Response {
    let job_id = match parse_job_id(raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match backend.status(&job_id) {
        Ok(view) => match serde_json::to_value(&view) {
            Ok(body) => {
                tracing::debug!(job_id = %job_id, status = %view.status, "Status polled");
                Response::json(StatusCode::Ok, &body)
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Could not serialize status");
                Response::error_with_message(
                    StatusCode::InternalServerError,
                    "An unexpected error occurred on the server.",
                )
            }
        },
        Err(e) => error_response(&e),
    }
}

/// Handler para `GET /result/{id}`
///
/// - 200 con el PNG y un `ETag` (SHA-256 del archivo)
/// - 304 si `If-None-Match` coincide con el ETag
/// - 202 si el job aún no termina
/// - 500 si el job falló o el archivo desapareció
pub fn result_handler(req: &Request, raw_id: &str, backend: &dyn JobBackend) -> Response {
    let job_id = match parse_job_id(raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match backend.result(&job_id) {
        Ok(ResultView::Ready(file)) => {
            let etag = format!("\"{}\"", file.etag);

            if req.header("If-None-Match") == Some(etag.as_str()) {
                return Response::new(StatusCode::NotModified).with_header("ETag", &etag);
            }

            Response::new(StatusCode::Ok)
                .with_header("Content-Type", "image/png")
                .with_header("ETag", &etag)
                .with_body(file.bytes)
        }
        Ok(ResultView::Pending(status)) => Response::error(
            StatusCode::Accepted,
            &format!("Job is not yet complete. Current status: {}", status),
        ),
        Ok(ResultView::Failed(message)) => {
            Response::error(StatusCode::InternalServerError, &message)
        }
        Err(e) => error_response(&e),
    }
}
