//! Admin token authentication middleware.
//!
//! This middleware guards the admin routes:
//! 1. Extract the token from the Authorization header
//! 2. Hash it and compare against the configured token's hash
//! 3. Reject mismatches with HTTP 401

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::{error::AppError, state::SharedState};

/// Hex-encoded SHA-256 digest of a token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Admin authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <token>` header from request
/// 2. Hash the `<token>` using SHA-256
/// 3. Compare with the stored digest of `ADMIN_API_TOKEN`
/// 4. If equal: call next handler
/// 5. Otherwise: return 401 Unauthorized error
///
/// # Headers
///
/// Expected header format:
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
pub async fn admin_auth_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidApiKey)?;

    if hash_token(token) != state.admin_token_hash {
        tracing::warn!("Rejected admin request with invalid token");
        return Err(AppError::InvalidApiKey);
    }

    Ok(next.run(request).await)
}
