//! Shared infrastructure: errors, token helpers, MongoDB indexes.

pub mod crypto;
pub mod error;
pub mod indexes;
pub mod props;

pub use error::{AuthError, ErrorResponse, Result};
pub use indexes::{collections, initialize_indexes};
pub use props::Props;
