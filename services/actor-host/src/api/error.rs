//! RFC 7807 problem responses.

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::actors::ActorError;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub code: String,
    pub request_id: String,
    pub retryable: bool,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://engage.social/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
            code,
            request_id: "unknown".to_string(),
            retryable: false,
        }
    }

    fn set_request_id(&mut self, request_id: impl Into<String>) {
        let request_id = request_id.into();
        self.request_id = request_id.clone();
        if self.instance.is_none() {
            self.instance = Some(request_id);
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn method_not_allowed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::METHOD_NOT_ALLOWED, code, message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::with_status(StatusCode::SERVICE_UNAVAILABLE, code, message);
        err.problem.retryable = true;
        err
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.problem.set_request_id(request_id);
        self
    }
}

impl From<ActorError> for ApiError {
    fn from(err: ActorError) -> Self {
        let message = err.to_string();
        match err {
            ActorError::InvalidPayload(_) => Self::bad_request("invalid_payload", message),
            ActorError::UnknownCommand(_) => Self::not_found("unknown_command", message),
            ActorError::StoreUnavailable(_) => {
                Self::service_unavailable("store_unavailable", message)
            }
            ActorError::ActorStopped => Self::service_unavailable("actor_stopped", message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_error_mapping() {
        let cases = [
            (ActorError::InvalidPayload("x".into()), StatusCode::BAD_REQUEST, false),
            (ActorError::UnknownCommand("x".into()), StatusCode::NOT_FOUND, false),
            (ActorError::StoreUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE, true),
            (ActorError::ActorStopped, StatusCode::SERVICE_UNAVAILABLE, true),
        ];
        for (err, status, retryable) in cases {
            let expected_retryable = err.is_retryable();
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.problem.retryable, retryable);
            assert_eq!(api.problem.retryable, expected_retryable);
        }
    }

    #[test]
    fn test_request_id_fills_instance() {
        let err = ApiError::bad_request("invalid_payload", "nope").with_request_id("req_1");
        assert_eq!(err.problem.request_id, "req_1");
        assert_eq!(err.problem.instance.as_deref(), Some("req_1"));
        assert_eq!(err.problem.r#type, "https://engage.social/problems/invalid_payload");
    }
}
