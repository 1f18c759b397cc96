//! OAuth2 authorization-code flow with PKCE.

pub mod orchestrator;
pub mod pkce;
pub mod provider_client;
pub mod scope;

pub use orchestrator::{
    CallbackRequest, FlowOrchestrator, FlowSettings, FlowStage, LoginOutcome, LoginRedirect, LoginRequest,
};
pub use pkce::{code_challenge, generate_code_verifier, PkceMethod};
pub use provider_client::{ProviderHttpClient, TokenResponse, UserInfo};
pub use scope::{normalize_scope, normalize_scope_list, ScopeRequest};
