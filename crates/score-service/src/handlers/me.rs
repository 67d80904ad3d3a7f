//! Current user handler.

use crate::auth::AuthenticatedSubject;
use crate::models::MeResponse;
use axum::Json;
use tracing::instrument;

/// Handler for GET /api/v1/me
///
/// Returns the subject the request was authenticated as. Requests whose
/// token named no subject are rejected by the `AuthenticatedSubject`
/// extractor with 401.
///
/// ## Response
///
/// ```json
/// { "sub": "user-42" }
/// ```
#[instrument(skip_all, name = "scores.handlers.me")]
pub async fn get_me(subject: AuthenticatedSubject) -> Json<MeResponse> {
    tracing::debug!(target: "scores.handlers.me", "Returning authenticated subject");

    Json(MeResponse { sub: subject.0 })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_me_returns_subject() {
        let Json(response) = get_me(AuthenticatedSubject("user-42".to_string())).await;
        assert_eq!(response.sub, "user-42");
    }
}
