use anyhow::Result;
use std::sync::Arc;

pub mod auth;
pub mod cli;
pub mod display;
pub mod encoder;
pub mod error;
pub mod joiner;
pub mod logging;
pub mod manager;
pub mod models;
pub mod pipeline;
pub mod range;
pub mod resolver;
pub mod schema;
pub mod server;
pub mod settings;
pub mod store;

use crate::auth::JwtAuthorizer;
use crate::manager::AttendanceManager;
use crate::server::AppState;
use crate::settings::Settings;

pub fn create_default_manager(settings: &Settings) -> Result<AttendanceManager> {
    let manager =
        AttendanceManager::connect(&settings.database.url, settings.database.pool_size)?;
    Ok(manager)
}

pub fn create_authorizer(settings: &Settings) -> JwtAuthorizer {
    JwtAuthorizer::new(
        &settings.auth.jwt_secret,
        settings.auth.issuer.as_str(),
        settings.auth.token_minutes,
    )
}

/// Wires the SQLite store and JWT verification into the state the HTTP service runs on.
pub fn create_app_state(settings: &Settings) -> Result<AppState> {
    let manager = create_default_manager(settings)?;
    Ok(AppState::new(
        Arc::new(manager),
        Arc::new(create_authorizer(settings)),
        settings.auth.export_roles.clone(),
        settings.export.options(),
    ))
}
