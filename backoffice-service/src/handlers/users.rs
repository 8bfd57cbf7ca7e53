use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use mongodb::bson::doc;
use service_core::{
    error::{is_duplicate_key, AppError},
    query::ListQuery,
    utils::ValidatedJson,
};

use super::{find_by_id, read_image, save_versioned};
use crate::dtos::{
    users::{
        CreateUserRequest, UpdateDetailsRequest, UpdatePasswordRequest, UpdateUserRequest,
        UserView, USER_QUERY,
    },
    ApiResponse, Empty,
};
use crate::middleware::CurrentUser;
use crate::models::User;
use crate::services::{blob_key, delete_blob_detached, StatsService};
use crate::startup::AppState;
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

const DUPLICATE_EMAIL: &str = "Email already registered";

fn ensure_self_or_admin(user: &CurrentUser, id: &str) -> Result<(), AppError> {
    if user.is_admin() || user.id == id {
        Ok(())
    } else {
        Err(AppError::forbidden("You can only access your own account"))
    }
}

/// Bump the version and write the user back with compare-and-swap.
async fn save_user(state: &AppState, user: &mut User) -> Result<(), AppError> {
    let loaded_version = user.version;
    user.version = loaded_version + 1;
    user.updated_at = Utc::now();
    save_versioned(
        &state.db.users(),
        &user.id,
        loaded_version,
        user,
        "user",
        DUPLICATE_EMAIL,
    )
    .await
}

pub async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;
    let query = ListQuery::parse(&params, &USER_QUERY)?;
    let page = query.fetch(&state.db.users()).await?;
    Ok(Json(page.into_response(&query, UserView::from)?))
}

pub async fn user_stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;
    let stats = StatsService::new(&state.db).users_by_role().await?;
    Ok(Json(ApiResponse::collection(stats)))
}

pub async fn get_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    ensure_self_or_admin(&user, &id)?;
    let found = find_by_id(&state.db.users(), &id, "User").await?;
    Ok(Json(ApiResponse::ok(UserView::from(found))))
}

/// Admin-only. The response carries a token for the new account.
pub async fn create_user(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;

    let password = Password::parse(req.password)?;
    let hash = hash_password(&password)?;
    let created = User::new(
        req.name.trim().to_string(),
        &req.email,
        req.phone.map(|p| p.trim().to_string()),
        hash.into_string(),
        req.role,
    );
    created.check()?;

    state
        .db
        .users()
        .insert_one(&created, None)
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::conflict(DUPLICATE_EMAIL)
            } else {
                AppError::from(e)
            }
        })?;

    let token = state.jwt.generate_access_token(&created)?;
    tracing::info!(
        user_id = %created.id,
        role = created.role.as_str(),
        created_by = %user.id,
        "User created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_token(UserView::from(created), token)),
    ))
}

pub async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_self_or_admin(&user, &id)?;
    if req.touches_privileges() && !user.is_admin() {
        return Err(AppError::forbidden("Only an admin can change role or status"));
    }

    let mut target = find_by_id(&state.db.users(), &id, "User").await?;
    req.merge_into(&mut target);
    target.check()?;
    save_user(&state, &mut target).await?;

    tracing::info!(user_id = %id, updated_by = %user.id, "User updated");
    Ok(Json(ApiResponse::ok(UserView::from(target))))
}

pub async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;
    if user.id == id {
        return Err(AppError::forbidden("You cannot delete your own account"));
    }

    let users = state.db.users();
    let target = find_by_id(&users, &id, "User").await?;

    let result = users.delete_one(doc! { "_id": &id }, None).await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found("User not found"));
    }

    if let Some(photo) = target.photo {
        delete_blob_detached(state.storage.clone(), photo);
    }

    tracing::info!(user_id = %id, deleted_by = %user.id, "User deleted");
    Ok(Json(ApiResponse::ok(Empty {})))
}

pub async fn upload_user_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    ensure_self_or_admin(&user, &id)?;
    let mut target = find_by_id(&state.db.users(), &id, "User").await?;

    let upload = read_image(&mut multipart, state.config.storage.max_upload_bytes).await?;
    let key = blob_key("users", &target.id, upload.file_name.as_deref());
    state.storage.upload(&key, upload.data).await?;

    let previous = target.photo.replace(key.clone());
    if let Err(e) = save_user(&state, &mut target).await {
        delete_blob_detached(state.storage.clone(), key);
        return Err(e);
    }

    if let Some(previous) = previous {
        delete_blob_detached(state.storage.clone(), previous);
    }

    tracing::info!(user_id = %id, "User photo replaced");
    Ok(Json(ApiResponse::ok(UserView::from(target))))
}

pub async fn me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let found = find_by_id(&state.db.users(), &user.id, "User").await?;
    Ok(Json(ApiResponse::ok(UserView::from(found))))
}

pub async fn update_details(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<UpdateDetailsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut target = find_by_id(&state.db.users(), &user.id, "User").await?;
    UpdateUserRequest::from(req).merge_into(&mut target);
    target.check()?;
    save_user(&state, &mut target).await?;

    tracing::info!(user_id = %user.id, "Account details updated");
    Ok(Json(ApiResponse::ok(UserView::from(target))))
}

/// Changes the password and returns a fresh token.
pub async fn update_password(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut target = find_by_id(&state.db.users(), &user.id, "User").await?;

    let current = Password::new(req.current_password);
    let stored = PasswordHashString::new(target.password_hash.clone());
    if !verify_password(&current, &stored)? {
        return Err(AppError::AuthError(anyhow::anyhow!(
            "Current password is incorrect"
        )));
    }

    let new_password = Password::parse(req.new_password)?;
    target.password_hash = hash_password(&new_password)?.into_string();
    save_user(&state, &mut target).await?;

    let token = state.jwt.generate_access_token(&target)?;
    tracing::info!(user_id = %user.id, "Password changed");
    Ok(Json(ApiResponse::with_token(UserView::from(target), token)))
}

pub async fn deactivate(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let mut target = find_by_id(&state.db.users(), &user.id, "User").await?;
    target.is_active = false;
    save_user(&state, &mut target).await?;

    tracing::info!(user_id = %user.id, "Account deactivated");
    Ok(Json(ApiResponse::ok(Empty {})))
}
