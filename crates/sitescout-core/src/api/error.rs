use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape: `{"detail": "..."}` or `{"detail": [{"loc": [...], "msg": "..."}]}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Fields(Vec<FieldError>),
}

#[derive(Debug, Deserialize)]
struct FieldError {
    #[serde(default)]
    loc: Vec<Value>,
    msg: String,
}

impl FieldError {
    fn describe(&self) -> String {
        let loc: Vec<String> = self
            .loc
            .iter()
            .map(|part| match part {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        if loc.is_empty() {
            self.msg.clone()
        } else {
            format!("{}: {}", loc.join("."), self.msg)
        }
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Human-readable message from an error body's `detail` field.
    /// Field errors are joined as `loc.path: msg, ...`.
    pub fn detail_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        match parsed.detail? {
            ErrorDetail::Message(msg) => Some(msg),
            ErrorDetail::Fields(fields) if !fields.is_empty() => Some(
                fields
                    .iter()
                    .map(FieldError::describe)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            ErrorDetail::Fields(_) => None,
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = Self::detail_message(body);
        let message = detail.clone().unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            400 => ApiError::BadRequest(detail.unwrap_or_else(|| "Invalid credentials".to_string())),
            401 => ApiError::Unauthorized(detail.unwrap_or_else(|| "Invalid credentials".to_string())),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            422 => ApiError::Validation(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// The backend rejected the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_detail_string() {
        assert_eq!(
            ApiError::detail_message(r#"{"detail": "Invalid credentials"}"#).as_deref(),
            Some("Invalid credentials")
        );
    }

    #[test]
    fn test_detail_field_errors_joined() {
        let body = r#"{"detail": [
            {"loc": ["body", "username"], "msg": "field required", "type": "value_error.missing"},
            {"loc": ["body", "preferred_land_use", 0], "msg": "invalid choice"}
        ]}"#;
        assert_eq!(
            ApiError::detail_message(body).as_deref(),
            Some("body.username: field required, body.preferred_land_use.0: invalid choice")
        );
    }

    #[test]
    fn test_detail_missing_or_not_json() {
        assert_eq!(ApiError::detail_message("{}"), None);
        assert_eq!(ApiError::detail_message("<html>"), None);
        assert_eq!(ApiError::detail_message(r#"{"detail": []}"#), None);
    }

    #[test]
    fn test_from_status_login_failures() {
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"detail": "Invalid credentials"}"#);
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "Invalid credentials"));

        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"detail": "Could not validate credentials"}"#);
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "Could not validate credentials");

        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[test]
    fn test_from_status_other_codes() {
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, r#"{"detail": "No suitable sites found"}"#),
            ApiError::NotFound(ref m) if m == "No suitable sites found"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail": [{"loc": ["body"], "msg": "bad"}]}"#),
            ApiError::Validation(ref m) if m == "body: bad"
        ));
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(ApiError::from_status(StatusCode::BAD_GATEWAY, "oops"), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(StatusCode::IM_A_TEAPOT, ""), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated"));
    }
}
