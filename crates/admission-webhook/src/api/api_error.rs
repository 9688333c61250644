use axum::{http::StatusCode, response::IntoResponse};

use crate::errors::DecodeError;

#[derive(Debug)]
/// An error raised before the webhook is reached, when there's no AdmissionReview to answer
/// to. It is returned as plain text.
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ApiError {
    pub(crate) fn no_body() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "no body found".to_owned(),
        }
    }
}

impl From<DecodeError> for ApiError {
    fn from(error: DecodeError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
