//! OAuth2 Token Aggregate

pub mod entity;
pub mod store;

pub use entity::{NewToken, OAuth2Token};
pub use store::{MemoryTokenStore, MongoTokenStore, TokenStore};
