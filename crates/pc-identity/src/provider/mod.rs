//! Provider Aggregate

pub mod entity;
pub mod registry;

pub use entity::Provider;
pub use registry::ProviderRegistry;
