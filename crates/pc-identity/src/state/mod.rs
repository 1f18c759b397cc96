//! Login State Aggregate

pub mod entity;
pub mod reaper;
pub mod store;

pub use entity::{AuthState, NewAuthState};
pub use reaper::StateReaper;
pub use store::{MemoryStateStore, MongoStateStore, StateStore};
