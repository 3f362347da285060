use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tower::Service;

use crate::commands::{self, Actor, GetUser};

use super::{error::AppError, state::AppState};

/// Resolve the bearer token into an [`Actor`] request extension
///
/// The account is loaded again so that deleted users and role changes take effect before
/// the token expires.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))?;

    let claims = state.tokens.verify(token).map_err(|err| {
        tracing::warn!(error = %err, "rejected access token");
        AppError::Unauthorized("Invalid or expired token".into())
    })?;

    let user = state
        .logic
        .clone()
        .call(GetUser {
            user_id: claims.sub,
        })
        .await
        .map_err(|err| match err {
            commands::Error::NotFound(_) => {
                tracing::warn!(user_id = %claims.sub, "token for unknown user");
                AppError::Unauthorized("Invalid or expired token".into())
            }
            other => other.into(),
        })?;

    req.extensions_mut().insert(Actor {
        user_id: user.id,
        role: user.role,
    });

    Ok(next.run(req).await)
}
