//! `Error` -> HTTP response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::Error;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = match &self {
            Error::ValidationFailed(violations) => json!({ "detail": violations }),
            other => json!({ "detail": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Violation, Violations};

    async fn body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_body_lists_violations() {
        let violations: Violations = vec![
            Violation::new("spatial_unit", "required_with", "'spatial_unit' is required when 'distance' is set"),
            Violation::new("relation_type", "required", "'relation_type' is required"),
        ]
        .into_iter()
        .collect();
        let resp = Error::ValidationFailed(violations).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let detail = body(resp).await["detail"].clone();
        assert_eq!(detail.as_array().map(Vec::len), Some(2));
        assert_eq!(detail[0]["field"], "spatial_unit");
        assert_eq!(detail[0]["rule"], "required_with");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (Error::NotFound("Concept 4:mem:9".into()), StatusCode::NOT_FOUND),
            (Error::ConflictFailed("dup".into()), StatusCode::CONFLICT),
            (Error::Unsupported("fixed".into()), StatusCode::METHOD_NOT_ALLOWED),
            (Error::StoreUnavailable("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let resp = err.into_response();
            assert_eq!(resp.status(), status);
        }
        let resp = Error::NotFound("Concept 4:mem:9".into()).into_response();
        assert_eq!(body(resp).await["detail"], "Not found: Concept 4:mem:9");
    }
}
