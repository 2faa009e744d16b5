use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pipeline_core::error::PipelineError;

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Status code for this error; anything that is not a `PipelineError`
    /// is an internal error.
    pub fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<PipelineError>() {
            Some(e) => status_for(e),
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn status_for(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::DuplicateKey(_) => StatusCode::CONFLICT,
        PipelineError::InvalidState { .. } | PipelineError::CorrelationMismatch { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PipelineError::InvalidArgument(_)
        | PipelineError::InvalidQuery(_)
        | PipelineError::UnknownFunction(_)
        | PipelineError::NotInitialized => StatusCode::BAD_REQUEST,
        PipelineError::Deserialization(_)
        | PipelineError::Cursor(_)
        | PipelineError::Store(_)
        | PipelineError::Io(_)
        | PipelineError::Yaml(_)
        | PipelineError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{:#}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: PipelineError) -> StatusCode {
        AppError(e.into()).into_response().status()
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(
            status_of(PipelineError::NotFound("Bug 7".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn duplicate_key_maps_to_409() {
        assert_eq!(
            status_of(PipelineError::DuplicateKey("Bug 7".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn invalid_state_maps_to_422() {
        let err = PipelineError::InvalidState {
            action: "begin design".into(),
            item: "Bug 7".into(),
            expected: "assigned".into(),
            actual: "developing".into(),
        };
        assert_eq!(status_of(err), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn correlation_mismatch_maps_to_422() {
        let err = PipelineError::CorrelationMismatch {
            action: "begin verification".into(),
            item: "Bug 7".into(),
            field: "developer_name".into(),
            actual: "Raj".into(),
            supplied: "WrongName".into(),
        };
        assert_eq!(status_of(err), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn caller_mistakes_map_to_400() {
        for err in [
            PipelineError::InvalidArgument("assign expects 4 arguments, got 2".into()),
            PipelineError::InvalidQuery("bad selector".into()),
            PipelineError::UnknownFunction("delete".into()),
            PipelineError::NotInitialized,
        ] {
            assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn store_failures_map_to_500() {
        for err in [
            PipelineError::Store("disk full".into()),
            PipelineError::Cursor("snapshot gone".into()),
            PipelineError::Deserialization("bad payload".into()),
            PipelineError::Io(std::io::Error::other("disk full")),
        ] {
            assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn non_pipeline_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn response_body_is_json() {
        let response = AppError(PipelineError::NotFound("Bug 7".into()).into()).into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
