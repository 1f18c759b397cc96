//! MongoDB Index Initialization
//!
//! Creates indexes for all collections on application startup.

use mongodb::{bson::doc, options::IndexOptions, Database, IndexModel};
use tracing::info;

/// Collection names.
pub mod collections {
    pub const USERS: &str = "users";
    pub const IDENTITIES: &str = "identities";
    pub const SESSIONS: &str = "sessions";
    pub const OAUTH2_CLIENTS: &str = "oauth2_clients";
    pub const OAUTH2_STATES: &str = "oauth2_states";
    pub const OAUTH2_TOKENS: &str = "oauth2_tokens";
}

/// Expired login states linger this long before the server drops them,
/// so a late callback still reports expiry rather than an unknown state.
const STATE_TTL_GRACE_SECONDS: u64 = 60 * 60;

/// Initialize all MongoDB indexes
pub async fn initialize_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    info!("Initializing MongoDB indexes...");

    create_identity_indexes(db).await?;
    create_user_indexes(db).await?;
    create_session_indexes(db).await?;
    create_oauth2_indexes(db).await?;

    info!("MongoDB indexes initialized successfully");
    Ok(())
}

async fn create_identity_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let identities = db.collection::<mongodb::bson::Document>(collections::IDENTITIES);

    // One identity per external account within a tenant
    identities.create_index(
        IndexModel::builder()
            .keys(doc! { "tenantId": 1, "providerType": 1, "providerUid": 1 })
            .options(IndexOptions::builder().unique(true).background(true).build())
            .build(),
    ).await?;

    // Identities of a user
    identities.create_index(
        IndexModel::builder()
            .keys(doc! { "tenantId": 1, "userId": 1 })
            .options(IndexOptions::builder().background(true).build())
            .build(),
    ).await?;

    info!("Created indexes on identities");
    Ok(())
}

async fn create_user_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let users = db.collection::<mongodb::bson::Document>(collections::USERS);

    users.create_index(
        IndexModel::builder()
            .keys(doc! { "tenantId": 1, "status": 1 })
            .options(IndexOptions::builder().background(true).build())
            .build(),
    ).await?;

    info!("Created indexes on users");
    Ok(())
}

async fn create_session_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let sessions = db.collection::<mongodb::bson::Document>(collections::SESSIONS);

    // Bearer lookup (unique)
    sessions.create_index(
        IndexModel::builder()
            .keys(doc! { "authToken": 1 })
            .options(IndexOptions::builder().unique(true).background(true).build())
            .build(),
    ).await?;

    sessions.create_index(
        IndexModel::builder()
            .keys(doc! { "tenantId": 1, "userId": 1 })
            .options(IndexOptions::builder().background(true).build())
            .build(),
    ).await?;

    info!("Created indexes on sessions");
    Ok(())
}

async fn create_oauth2_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let clients = db.collection::<mongodb::bson::Document>(collections::OAUTH2_CLIENTS);

    // Registration key (unique)
    clients.create_index(
        IndexModel::builder()
            .keys(doc! { "tenantId": 1, "providerId": 1, "clientId": 1 })
            .options(IndexOptions::builder().unique(true).background(true).build())
            .build(),
    ).await?;

    let states = db.collection::<mongodb::bson::Document>(collections::OAUTH2_STATES);

    // TTL index - backstop for the reaper
    states.create_index(
        IndexModel::builder()
            .keys(doc! { "expiresAt": 1 })
            .options(IndexOptions::builder()
                .expire_after(std::time::Duration::from_secs(STATE_TTL_GRACE_SECONDS))
                .background(true)
                .build())
            .build(),
    ).await?;

    let tokens = db.collection::<mongodb::bson::Document>(collections::OAUTH2_TOKENS);

    // Latest token per (user, provider, client)
    tokens.create_index(
        IndexModel::builder()
            .keys(doc! { "tenantId": 1, "userId": 1, "provider": 1, "clientId": 1, "createdAt": -1 })
            .options(IndexOptions::builder().background(true).build())
            .build(),
    ).await?;

    info!("Created indexes on oauth2 collections");
    Ok(())
}
