//! API-key middleware for the protected routes.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::http::{ApiError, AppState};

const API_KEY_HEADER: &str = "x-api-key";

/// Checks a presented key against the configured one. `None` presented
/// key is an authentication failure, a mismatched key an authorization
/// failure.
pub fn check_api_key(expected: &str, presented: Option<&str>) -> Result<(), ApiError> {
    match presented {
        None => Err(ApiError::Unauthorized("missing API key".into())),
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(ApiError::Forbidden("invalid API key".into())),
    }
}

/// Rejects requests without a valid `x-api-key` header. A daemon started
/// without `--api-key` leaves the API open.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.config.api_key.as_deref() {
        let presented = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        check_api_key(expected, presented)?;
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_unauthorized() {
        let err = check_api_key("secret", None).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn wrong_key_is_forbidden() {
        let err = check_api_key("secret", Some("nope")).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn matching_key_passes() {
        assert!(check_api_key("secret", Some("secret")).is_ok());
    }
}
