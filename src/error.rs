use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use tracing::error;

use crate::repo::StoreError;
use crate::validation::ValidationErrors;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorBody<'a> {
    pub validation_error: &'a ValidationErrors,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")] NotFound,
    #[error("validation failed")] Validation(ValidationErrors),
    #[error("bad request: {0}")] BadRequest(String),
    #[error("internal error")] Internal,
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Validation(errs) => ApiError::Validation(errs),
            other => {
                error!(error = %other, "store failure");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::NotFound => HttpResponse::NotFound().finish(),
            ApiError::Validation(errs) => {
                HttpResponse::BadRequest().json(ValidationErrorBody { validation_error: errs })
            }
            ApiError::BadRequest(_) => HttpResponse::BadRequest().json(ApiErrorBody { error: self.to_string() }),
            ApiError::Internal => HttpResponse::InternalServerError().json(ApiErrorBody { error: self.to_string() }),
        }
    }
}
