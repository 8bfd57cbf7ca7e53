use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use mongodb::bson::{self, doc};
use service_core::{error::AppError, utils::ValidatedJson};

use crate::dtos::{
    users::{LoginRequest, UserView},
    ApiResponse,
};
use crate::models::normalize_email;
use crate::services::metrics;
use crate::startup::AppState;
use crate::utils::{verify_password, verify_unknown_user, Password, PasswordHashString};

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&req.email);
    let invalid = || AppError::AuthError(anyhow::anyhow!("Invalid email or password"));

    let password = Password::new(req.password);
    let Some(mut user) = state
        .db
        .users()
        .find_one(doc! { "email": &email }, None)
        .await?
    else {
        verify_unknown_user(&password);
        metrics::record_login("unknown_user");
        return Err(invalid());
    };

    let hash = PasswordHashString::new(user.password_hash.clone());
    if !verify_password(&password, &hash)? {
        metrics::record_login("bad_password");
        tracing::warn!(user_id = %user.id, "Failed login attempt");
        return Err(invalid());
    }

    if !user.is_active {
        metrics::record_login("inactive");
        return Err(AppError::AuthError(anyhow::anyhow!(
            "User account is deactivated"
        )));
    }

    let now = Utc::now();
    state
        .db
        .users()
        .update_one(
            doc! { "_id": &user.id },
            doc! { "$set": { "last_login_at": bson::DateTime::from_chrono(now) } },
            None,
        )
        .await?;
    user.last_login_at = Some(now);

    let token = state.jwt.generate_access_token(&user)?;
    metrics::record_login("success");
    tracing::info!(user_id = %user.id, role = user.role.as_str(), "User logged in");

    Ok(Json(ApiResponse::with_token(UserView::from(user), token)))
}
