//! Identity / User / Session Ledger

pub mod identity;
pub mod memory;
pub mod mongo;
pub mod session;
pub mod store;
pub mod user;

pub use identity::{oauth_provider_type, Identity, IdentityClaim, IdentityStatus, EMAIL_PROVIDER_TYPE};
pub use memory::MemoryLedger;
pub use mongo::MongoLedger;
pub use session::{Session, SessionContext};
pub use store::Ledger;
pub use user::{DeleteMode, User, UserPatch, UserProfile, UserStatus};
