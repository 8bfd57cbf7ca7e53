use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use crate::utils::formats::is_valid_phone;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Customer => "customer",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "customer" => Ok(Role::Customer),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Stored lower-cased; the unique index relies on it.
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::models::optional_bson_datetime"
    )]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        name: String,
        email: &str,
        phone: Option<String>,
        password_hash: String,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            email: normalize_email(email),
            phone,
            password_hash,
            role,
            is_active: true,
            photo: None,
            last_login_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Cross-field rules, checked on create and again after every merge.
    pub fn check(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::bad_request("Name is required"));
        }
        if self.email.is_empty() || !self.email.contains('@') {
            return Err(AppError::bad_request("Invalid email format"));
        }
        if let Some(phone) = &self.phone {
            if !is_valid_phone(phone) {
                return Err(AppError::bad_request(
                    "Phone must be a valid 10-digit Indian mobile number",
                ));
            }
        }
        Ok(())
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_is_active_with_lowercased_email() {
        let user = User::new(
            "Asha".to_string(),
            "  Asha@Example.COM ",
            None,
            "$argon2id$stub".to_string(),
            Role::Staff,
        );
        assert_eq!(user.email, "asha@example.com");
        assert!(user.is_active);
        assert_eq!(user.version, 0);
        assert!(!user.is_admin());
        assert!(user.check().is_ok());
    }

    #[test]
    fn invalid_phone_fails_check() {
        let mut user = User::new(
            "Asha".to_string(),
            "asha@example.com",
            Some("12345".to_string()),
            "$argon2id$stub".to_string(),
            Role::Customer,
        );
        assert!(user.check().is_err());
        user.phone = Some("9876543210".to_string());
        assert!(user.check().is_ok());
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Admin, Role::Staff, Role::Customer] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("owner".parse::<Role>().is_err());
    }
}
