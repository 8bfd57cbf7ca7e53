use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use mongodb::bson::doc;
use service_core::error::AppError;

use crate::models::Role;
use crate::startup::AppState;

/// The authenticated principal for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners and admins may mutate; everyone else gets 403.
    pub fn ensure_owner_or_admin(&self, owner_id: &str) -> Result<(), AppError> {
        if self.is_admin() || self.id == owner_id {
            Ok(())
        } else {
            Err(AppError::forbidden(
                "You are not allowed to modify this resource",
            ))
        }
    }

    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "Role '{}' is not allowed to perform this action",
                self.role.as_str()
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require_role(&[Role::Admin])
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        self.require_role(&[Role::Admin, Role::Staff])
    }
}

/// Resolve a bearer token into a [`CurrentUser`] request extension.
///
/// Requests without an `Authorization` header pass through anonymously and
/// are turned away by the [`CurrentUser`] extractor on protected handlers.
/// A header that is present but invalid is rejected here.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(header_value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(next.run(req).await);
    };

    let token = header_value
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Invalid Authorization header"))
        })?;

    let claims = state.jwt.validate_access_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
    })?;

    // Role and active flag come from the store, not the token.
    let user = state
        .db
        .users()
        .find_one(doc! { "_id": &claims.sub }, None)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User no longer exists")))?;

    if !user.is_active {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "User account is deactivated"
        )));
    }

    tracing::Span::current().record("user_id", user.id.as_str());

    req.extensions_mut().insert(CurrentUser {
        id: user.id,
        email: user.email,
        role: user.role,
    });

    Ok(next.run(req).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))
    }
}
