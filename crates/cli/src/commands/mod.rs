//! Command implementations.

pub mod admin;
pub mod shop;

use camstore_storefront::backend::RemoteError;
use camstore_storefront::config::ConfigError;
use camstore_storefront::error::StoreError;
use camstore_storefront::models::{RegistrationForm, SignInCredentials};
use camstore_storefront::state::AppState;
use thiserror::Error;

/// Errors that end a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP clients could not be built.
    #[error("Client setup failed: {0}")]
    Setup(#[from] RemoteError),

    #[error("{}", .0.user_message())]
    Store(#[from] StoreError),

    /// No account given for a command that needs a session.
    #[error("Set CAMSTORE_EMAIL and CAMSTORE_PASSWORD (or pass --email/--password)")]
    MissingAccount,

    #[error("Not found: {0}")]
    NotFound(String),

    /// The authorization gate denied access.
    #[error("Access denied, sign in at {0}")]
    Denied(String),
}

/// Sign in with the given account.
pub async fn sign_in(
    state: &AppState,
    email: Option<&str>,
    password: Option<&str>,
) -> Result<(), CliError> {
    let (Some(email), Some(password)) = (email, password) else {
        return Err(CliError::MissingAccount);
    };

    let session = state
        .sessions()
        .sign_in(&SignInCredentials::new(email, password))
        .await
        .inspect_err(|e| e.report("sign in"))?;
    tracing::debug!(user_id = %session.id, "Signed in");
    Ok(())
}

/// Create an account for the given email and password and store its
/// contact details.
pub async fn register(
    state: &AppState,
    email: Option<&str>,
    password: Option<&str>,
    form: &RegistrationForm,
) -> Result<(), CliError> {
    let (Some(email), Some(password)) = (email, password) else {
        return Err(CliError::MissingAccount);
    };

    let session = state
        .registration()
        .register(&SignInCredentials::new(email, password), form)
        .await
        .inspect_err(|e| e.report("register"))?;
    tracing::info!("Registered {} ({})", session.email.masked(), session.id);
    Ok(())
}

/// End the session; failures are only logged since the command is done.
pub async fn sign_out(state: &AppState) {
    if let Err(e) = state.sessions().sign_out().await {
        tracing::warn!(error = %e, "Sign-out failed");
    }
}
