pub mod formats;
pub mod password;

pub use password::{
    hash_password, verify_password, verify_unknown_user, Password, PasswordHashString,
};
