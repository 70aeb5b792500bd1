//! Agent API authentication
//!
//! The agent surface is guarded by a single bearer token. A deployment with
//! no token configured rejects every agent request (fail-closed), so a
//! missing secret can never expose the console endpoints.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;

/// Authentication state for the agent route group
#[derive(Clone)]
pub struct AgentAuth {
    /// Expected bearer token. `None` disables the agent surface entirely.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AgentAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentAuth")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Middleware that validates the agent bearer token
pub async fn require_agent_auth(
    State(auth): State<AgentAuth>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected_token) = auth.bearer_token.as_deref() else {
        tracing::error!("Agent API has no token configured, rejecting request");
        return Err(ApiError::Unauthorized);
    };

    let presented = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected_token => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn guarded_router(token: Option<&str>) -> Router {
        let auth = AgentAuth {
            bearer_token: token.map(String::from),
        };
        Router::new()
            .route("/guarded", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(auth, require_agent_auth))
    }

    fn request(auth_header: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri("/guarded");
        if let Some(value) = auth_header {
            builder = builder.header("authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_debug_redacts_token() {
        let auth = AgentAuth {
            bearer_token: Some("secret-token".to_string()),
        };
        let debug_output = format!("{auth:?}");
        assert!(!debug_output.contains("secret-token"));
        assert!(debug_output.contains("[redacted]"));
    }

    #[tokio::test]
    async fn test_valid_token_passes() {
        let app = guarded_router(Some("secret-token"));
        let response = app
            .oneshot(request(Some("Bearer secret-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_wrong_token_rejected() {
        let app = guarded_router(Some("secret-token"));
        let response = app
            .oneshot(request(Some("Bearer wrong-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let app = guarded_router(Some("secret-token"));
        let response = app.oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_no_configured_token_fails_closed() {
        let app = guarded_router(None);
        let response = app
            .oneshot(request(Some("Bearer anything")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
