//! Local email/password credentials

pub mod local_auth;
pub mod password_service;

pub use local_auth::{normalize_email, LocalAuthService, LocalLogin};
pub use password_service::{Argon2Config, PasswordPolicy, PasswordService};
