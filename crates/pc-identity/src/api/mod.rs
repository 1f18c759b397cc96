//! HTTP surface

pub mod login_api;

pub use login_api::{login_router, LoginApiState, SessionCookieSettings};
