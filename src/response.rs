use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// The JSON envelope every endpoint answers with.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip)]
    status: StatusCode,
    status_code: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            status,
            status_code: status.as_u16(),
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::new(StatusCode::OK, message, data)
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::new(StatusCode::CREATED, message, data)
    }
}

impl ApiResponse<()> {
    /// Envelope without a `data` field.
    pub fn message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            status_code: status.as_u16(),
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_missing_data() {
        let body = serde_json::to_value(ApiResponse::message(StatusCode::FORBIDDEN, "nope")).unwrap();
        assert_eq!(body, serde_json::json!({ "statusCode": 403, "message": "nope" }));
    }

    #[test]
    fn envelope_carries_data() {
        let body = serde_json::to_value(ApiResponse::created("Successful", "tok")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "statusCode": 201, "message": "Successful", "data": "tok" })
        );
    }
}
