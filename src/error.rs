// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::hierarchy::HierarchyError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::ValidationError(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServerError(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        ApiError::ValidationError(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }
}

impl From<HierarchyError> for ApiError {
    fn from(err: HierarchyError) -> Self {
        match err {
            HierarchyError::InvalidLevel(_) | HierarchyError::AmbiguousTarget => ApiError::bad_request(err.to_string()),
            HierarchyError::Validation(msg) => ApiError::validation_error(msg),
            HierarchyError::InvalidEmail(_) => ApiError::validation_error(err.to_string()),
            HierarchyError::UnknownUserType(_) => ApiError::bad_request(err.to_string()),
            HierarchyError::Unauthorized { .. } => ApiError::unauthorized(err.to_string()),
            HierarchyError::NoLicenseCapacity { .. }
            | HierarchyError::DuplicateSubject { .. }
            | HierarchyError::NameTaken(_) => ApiError::conflict(err.to_string()),
            HierarchyError::NodeNotFound { .. } | HierarchyError::UserNotFound(_) => {
                ApiError::not_found(err.to_string())
            }
            HierarchyError::DanglingAncestor { .. } | HierarchyError::InconsistentHierarchy { .. } => {
                // Integrity faults alert operators; callers only see a generic failure
                tracing::error!("hierarchy integrity fault: {}", err);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            HierarchyError::Store(store_err) => {
                tracing::error!("Store error: {}", store_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{LicenseKind, Tier};
    use crate::store::StoreError;

    #[test]
    fn business_errors_keep_their_message() {
        let err: ApiError = HierarchyError::NoLicenseCapacity {
            kind: LicenseKind::Seat,
            requested: 1,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.message(), "no licence available for seat: requested 1");

        let err: ApiError = HierarchyError::Unauthorized {
            requester_level: 4,
            target_level: 6,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err: ApiError = HierarchyError::InvalidLevel(9).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn integrity_faults_are_hidden() {
        let err: ApiError = HierarchyError::DanglingAncestor {
            tier: Tier::Division,
            from_id: 3,
            missing_id: 99,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message().contains("99"));

        let err: ApiError = HierarchyError::Store(StoreError::Conflict("x".into())).into();
        assert_eq!(err.error_code(), "INTERNAL_SERVER_ERROR");
    }
}
