//! Credential lifecycle
//!
//! Two credentials with very different lifetimes: the bearer token is
//! long-lived, set explicitly and persisted; the anti-forgery token is
//! short-lived, fetched lazily and never used past its TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::api::BackendApi;
use crate::storage::{Namespace, Storage};
use crewlink_utils::{CrewlinkError, Result};

/// Anti-forgery token time-to-live
pub const FORGERY_TTL: Duration = Duration::from_secs(3600);

/// Storage key for the persisted bearer token (sync namespace)
const BEARER_KEY: &str = "bearer_token";

struct ForgeryToken {
    token: String,
    expires_at: Instant,
}

/// Holds the bearer token and the cached anti-forgery token
pub struct CredentialStore {
    storage: Arc<dyn Storage>,
    bearer: Option<String>,
    forgery: Option<ForgeryToken>,
}

impl CredentialStore {
    /// Load the persisted bearer token, if any
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let bearer = storage
            .get(Namespace::Sync, BEARER_KEY)
            .ok()
            .flatten()
            .and_then(|v| v.as_str().map(str::to_string));
        Self {
            storage,
            bearer,
            forgery: None,
        }
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// Set and persist the bearer token; invalidates any cached
    /// anti-forgery token since it was minted for the old session
    pub fn set_bearer(&mut self, token: String) -> Result<()> {
        self.storage
            .set(Namespace::Sync, BEARER_KEY, token.clone().into())?;
        self.bearer = Some(token);
        self.forgery = None;
        Ok(())
    }

    /// Clear and unpersist the bearer token
    pub fn clear_bearer(&mut self) -> Result<()> {
        self.storage.remove(Namespace::Sync, BEARER_KEY)?;
        self.bearer = None;
        self.forgery = None;
        Ok(())
    }

    /// A guaranteed-fresh anti-forgery token: the cached one while it
    /// lives, a transparent refetch once it has expired. Refresh failure
    /// surfaces to the caller; the state-changing call must not proceed.
    pub async fn fresh_forgery_token(&mut self, api: &dyn BackendApi) -> Result<String> {
        let bearer = self
            .bearer
            .clone()
            .ok_or_else(|| CrewlinkError::auth("no bearer token"))?;

        if let Some(forgery) = &self.forgery {
            if Instant::now() < forgery.expires_at {
                return Ok(forgery.token.clone());
            }
            debug!("Anti-forgery token expired, refetching");
        }

        let token = api
            .fetch_forgery_token(&bearer)
            .await
            .map_err(|e| CrewlinkError::ForgeryTokenRefresh(e.to_string()))?;
        self.forgery = Some(ForgeryToken {
            token: token.clone(),
            expires_at: Instant::now() + FORGERY_TTL,
        });
        Ok(token)
    }
}
