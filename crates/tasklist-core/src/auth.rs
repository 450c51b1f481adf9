//! Session lifecycle against the `/auth` endpoints.

use std::sync::Arc;

use reqwest::Method;
use tasklist_types::{LoginRequest, RegisterRequest, TokenResponse, User};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, Query, RequestOptions};
use crate::storage::{KeyValueStore, keys};

/// Registration, login, logout and identity checks.
///
/// Stores credentials through the client's [`CredentialStore`] and caches the
/// signed-in identity under the `auth_user` key.
///
/// [`CredentialStore`]: crate::api::CredentialStore
#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
    storage: Arc<dyn KeyValueStore>,
}

impl AuthService {
    pub fn new(api: ApiClient, storage: Arc<dyn KeyValueStore>) -> Self {
        Self { api, storage }
    }

    /// Creates an account. Does not sign in.
    ///
    /// # Errors
    /// Returns the server's error, e.g. when the email is taken.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<User, ApiError> {
        let payload = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.filter(|n| !n.trim().is_empty()).map(str::to_string),
        };
        let user: User = self.api.post("/auth/register", &payload).await?;
        info!(user_id = user.id, "registered");
        Ok(user)
    }

    /// Exchanges email and password for a credential pair and stores it.
    ///
    /// # Errors
    /// Returns the server's error unchanged, so its message can be shown.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let payload = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let tokens: TokenResponse = self.api.post("/auth/login", &payload).await?;
        self.api.credentials().apply_tokens(&tokens)?;
        if let Some(user) = &tokens.user {
            self.cache_identity(user);
        }
        info!("signed in");
        Ok(tokens)
    }

    /// Ends the session. Never fails: the server call is best-effort and
    /// local credentials are cleared regardless, so repeating it is harmless.
    pub async fn logout(&self) {
        if let Err(err) = self
            .api
            .request(Method::POST, "/auth/logout", &RequestOptions::default())
            .await
        {
            debug!(error = %err, "server logout failed; clearing local session anyway");
        }
        self.api.credentials().teardown();
        if let Err(err) = self.storage.remove(keys::USER) {
            warn!(error = %err, "failed to remove cached identity");
        }
        info!("signed out");
    }

    /// Asks the server who the current credential belongs to.
    ///
    /// # Errors
    /// Fails when the session is invalid or the server is unreachable.
    pub async fn identity(&self) -> Result<User, ApiError> {
        let user: User = self.api.get("/auth/me", Query::new()).await?;
        self.cache_identity(&user);
        Ok(user)
    }

    fn cache_identity(&self, user: &User) {
        let stored = serde_json::to_string(user)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.storage.set(keys::USER, &json));
        if let Err(err) = stored {
            warn!(error = %err, "failed to cache identity");
        }
    }
}
