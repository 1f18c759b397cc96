//! Portcullis identity core
//!
//! Multi-tenant login against OAuth2 providers (authorization code + PKCE)
//! and local email/password credentials:
//! - **Provider**: registry of provider endpoints
//! - **Client**: per-tenant registered OAuth2 clients
//! - **State**: single-use, time-boxed login states
//! - **Token**: provider tokens per user, provider and client
//! - **Ledger**: identities, users and sessions
//! - **Flow**: `begin_login` / `complete_login`
//! - **Local**: password signup, login and reset
//! - **Api**: axum routes over the above

pub mod api;
pub mod client;
pub mod flow;
pub mod ledger;
pub mod local;
pub mod provider;
pub mod shared;
pub mod state;
pub mod token;

pub use pc_common::TsidGenerator;

pub use api::{login_router, LoginApiState, SessionCookieSettings};
pub use client::{ClientRegistry, MemoryClientRegistry, MongoClientRegistry, RegisteredClient};
pub use flow::{
    normalize_scope, CallbackRequest, FlowOrchestrator, FlowSettings, FlowStage, LoginOutcome,
    LoginRedirect, LoginRequest, PkceMethod, ProviderHttpClient, ScopeRequest,
};
pub use ledger::{
    DeleteMode, Identity, IdentityClaim, IdentityStatus, Ledger, MemoryLedger, MongoLedger, Session,
    SessionContext, User, UserPatch, UserProfile, UserStatus,
};
pub use local::{Argon2Config, LocalAuthService, LocalLogin, PasswordPolicy, PasswordService};
pub use provider::{Provider, ProviderRegistry};
pub use shared::error::{AuthError, Result};
pub use shared::indexes::initialize_indexes;
pub use shared::props::Props;
pub use state::{AuthState, MemoryStateStore, MongoStateStore, StateReaper, StateStore};
pub use token::{MemoryTokenStore, MongoTokenStore, NewToken, OAuth2Token, TokenStore};
