use serde::{Deserialize, Serialize};
use service_core::query::{Field, FieldKind, QuerySchema};
use validator::Validate;

use crate::models::{normalize_email, Role, User};

const USER_FIELDS: &[Field] = &[
    Field::new("id", FieldKind::Text),
    Field::new("name", FieldKind::Text),
    Field::new("email", FieldKind::Text),
    Field::new("phone", FieldKind::Text),
    Field::new("role", FieldKind::Text),
    Field::new("is_active", FieldKind::Bool),
    Field::new("photo", FieldKind::Text),
    Field::new("last_login_at", FieldKind::DateTime),
    Field::new("created_at", FieldKind::DateTime),
    Field::new("updated_at", FieldKind::DateTime),
];

pub const USER_QUERY: QuerySchema = QuerySchema::new(USER_FIELDS);

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Staff
}

/// Admin-facing partial update. Role and active flag are admin-only.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl UpdateUserRequest {
    pub fn touches_privileges(&self) -> bool {
        self.role.is_some() || self.is_active.is_some()
    }

    pub fn merge_into(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name.trim().to_string();
        }
        if let Some(email) = self.email {
            user.email = normalize_email(&email);
        }
        if let Some(phone) = self.phone {
            user.phone = Some(phone.trim().to_string());
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
    }
}

/// Self-service profile update.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateDetailsRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<UpdateDetailsRequest> for UpdateUserRequest {
    fn from(req: UpdateDetailsRequest) -> Self {
        Self {
            name: req.name,
            email: req.email,
            phone: req.phone,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub photo: Option<String>,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            is_active: user.is_active,
            photo: user.photo,
            last_login_at: user.last_login_at.map(|at| at.to_rfc3339()),
            created_at: user.created_at.to_rfc3339(),
            updated_at: user.updated_at.to_rfc3339(),
        }
    }
}
