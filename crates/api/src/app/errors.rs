use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tablepos_export::ExportError;
use tablepos_infra::jobs::JobStoreError;
use tablepos_sequence::SequenceError;

use super::directory::DirectoryError;

pub fn export_error_to_response(err: ExportError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        ExportError::Params(_) => json_error(StatusCode::BAD_REQUEST, "invalid_params", message),
        ExportError::EmptyRange => {
            json_error(StatusCode::BAD_REQUEST, "nothing_to_export", message)
        }
        ExportError::Timeout(_) => json_error(StatusCode::GATEWAY_TIMEOUT, "timeout", message),
        ExportError::Store { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
        ExportError::Submission(_) => {
            json_error(StatusCode::BAD_GATEWAY, "submission_failed", message)
        }
    }
}

pub fn sequence_error_to_response(err: SequenceError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        SequenceError::Unavailable { .. } => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "sequence_unavailable",
            message,
        ),
        SequenceError::Timeout { .. } => {
            json_error(StatusCode::GATEWAY_TIMEOUT, "timeout", message)
        }
    }
}

pub fn directory_error_to_response(err: DirectoryError) -> axum::response::Response {
    match err {
        DirectoryError::Sequence(e) => sequence_error_to_response(e),
        DirectoryError::DuplicateCode { .. } => {
            json_error(StatusCode::CONFLICT, "duplicate_code", err.to_string())
        }
        DirectoryError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn job_store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        // Another tenant's job looks the same as a missing one.
        JobStoreError::TenantIsolation => {
            json_error(StatusCode::NOT_FOUND, "not_found", "not found")
        }
        other => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "job_store_error",
            other.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablepos_export::SubmitError;

    #[test]
    fn export_errors_map_to_distinct_statuses() {
        let cases = [
            (ExportError::params("bad"), StatusCode::BAD_REQUEST),
            (ExportError::EmptyRange, StatusCode::BAD_REQUEST),
            (ExportError::Timeout("resolve_range"), StatusCode::GATEWAY_TIMEOUT),
            (ExportError::store("resolve_range", "down"), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ExportError::Submission(SubmitError::Rejected("full".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(export_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn sequence_outage_is_retryable() {
        let err = SequenceError::Unavailable {
            scope: "backend_role_seq".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(
            sequence_error_to_response(err).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
