//! Maps [`CoreError`] onto the axum response surface (§6 exit codes: 200 on
//! success including graceful `no_qualified_models`, 400 on field
//! validation, 500 otherwise). Grounded on `agents::edge_function`'s
//! `ApiError`/`IntoResponse` pair.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::domain::{CoreError, ErrorBody};

pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, body: ErrorBody { code, message: message.into(), details: None } }
    }
}

impl From<&CoreError> for ApiError {
    fn from(err: &CoreError) -> Self {
        let status = match err {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::BudgetExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::NoQualifiedModels(_) => StatusCode::OK,
            CoreError::PortfolioCoverageInvalid(_) => StatusCode::CONFLICT,
            CoreError::CalibrationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Execution(_) => StatusCode::BAD_GATEWAY,
            CoreError::Serialization(_) | CoreError::Io(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, body: ErrorBody::from(err) }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::from(&err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
