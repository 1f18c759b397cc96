//! Registered Client Aggregate

pub mod entity;
pub mod registry;
pub mod repository;

pub use entity::RegisteredClient;
pub use registry::{ClientRegistry, MemoryClientRegistry};
pub use repository::MongoClientRegistry;
