//! Authentication and authorization middleware.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use photosync_core::ContentHash;
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// The value is truncated to MAX_TRACE_ID_LEN characters and reduced to printable ASCII.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    /// Get the trace ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub token_id: Uuid,
}

impl AuthenticatedUser {
    /// Require administrator rights.
    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("admin access required".to_string()))
        }
    }
}

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Hash a raw API key the way it is stored.
pub fn hash_token(token: &str) -> String {
    ContentHash::compute(token.as_bytes()).to_hex()
}

/// Authentication middleware that validates tokens and sets up trace context.
///
/// Requests without a token pass through unauthenticated; handlers decide
/// whether they need an [`AuthenticatedUser`]. A token that is presented but
/// unknown or revoked is rejected here.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let trace_id_str = trace_id.0.clone();
    req.extensions_mut().insert(trace_id);

    if let Some(token_str) = extract_bearer_token(&req) {
        let token_hash = hash_token(token_str);

        let token = state
            .metadata
            .get_token_by_hash(&token_hash)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("invalid token".to_string()))?;
        if token.revoked_at.is_some() {
            return Err(ApiError::Unauthorized("token revoked".to_string()));
        }

        let user = state
            .metadata
            .get_user(token.user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("token owner no longer exists".to_string()))?;

        // Update last used time (fire and forget)
        let metadata = state.metadata.clone();
        let token_id = token.token_id;
        tokio::spawn(async move {
            if let Err(e) = metadata
                .touch_token(token_id, OffsetDateTime::now_utc())
                .await
            {
                tracing::debug!(token_id = %token_id, error = %e, "Failed to touch token");
            }
        });

        req.extensions_mut().insert(AuthenticatedUser {
            user_id: user.user_id,
            username: user.username,
            is_admin: user.is_admin,
            token_id: token.token_id,
        });
    }

    let response = next
        .run(req)
        .instrument(tracing::info_span!("request", trace_id = %trace_id_str))
        .await;

    Ok(response)
}

/// Require authentication (token must be present).
pub fn require_auth(req: &Request) -> ApiResult<&AuthenticatedUser> {
    req.extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
}

/// Require an authenticated administrator.
pub fn require_admin(req: &Request) -> ApiResult<&AuthenticatedUser> {
    let auth = require_auth(req)?;
    auth.require_admin()?;
    Ok(auth)
}

/// Get the trace ID from request extensions.
pub fn get_trace_id(req: &Request) -> Option<&TraceId> {
    req.extensions().get::<TraceId>()
}
