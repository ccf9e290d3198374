use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::BizgraphError;

/// Handler error rendered as `{"detail": ...}`
#[derive(Debug)]
pub struct ApiError(pub BizgraphError);

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self(BizgraphError::NotFound(what.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BizgraphError::NotFound(_) => StatusCode::NOT_FOUND,
            BizgraphError::Conflict(_) => StatusCode::CONFLICT,
            BizgraphError::InvalidInput(_)
            | BizgraphError::SchemaMismatch(_)
            | BizgraphError::Literal(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BizgraphError> for ApiError {
    fn from(err: BizgraphError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "detail": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
