//! Third-party authentication provider registry.

use crate::error::{CoreError, CoreResult};
use crate::queue::{Operation, OperationQueue};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// A source of third-party credentials, such as an OAuth login.
#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    /// Key the provider is registered under.
    fn auth_type(&self) -> &str;

    /// Anonymous providers have nothing to synchronize on registration.
    fn is_anonymous(&self) -> bool {
        false
    }

    /// Restores a session from stored auth data. Returns false if the data
    /// is no longer valid.
    fn restore_authentication(&self, auth_data: &HashMap<String, String>) -> bool;

    /// Logs out of the provider.
    async fn deauthenticate(&self) -> CoreResult<()>;
}

/// The signed-in user, as far as authentication is concerned.
#[async_trait]
pub trait AuthenticatedUser: Send + Sync {
    /// Pushes the user's stored auth data for `auth_type` into its provider.
    async fn synchronize_auth_data(&self, auth_type: &str) -> CoreResult<()>;
}

/// Access to the signed-in user.
#[async_trait]
pub trait CurrentUserController: Send + Sync {
    /// The signed-in user, if any.
    async fn current_user(&self) -> CoreResult<Option<Arc<dyn AuthenticatedUser>>>;
}

/// Keeps one provider per auth type and routes calls to it.
pub struct AuthenticationManager {
    current_user: Arc<dyn CurrentUserController>,
    providers: RwLock<HashMap<String, Arc<dyn AuthenticationProvider>>>,
    queue: OperationQueue,
}

impl AuthenticationManager {
    /// Creates a manager. Background synchronization runs on `runtime`.
    pub fn new(current_user: Arc<dyn CurrentUserController>, runtime: Handle) -> Self {
        Self {
            current_user,
            providers: RwLock::new(HashMap::new()),
            queue: OperationQueue::new(runtime),
        }
    }

    /// Registers a provider.
    ///
    /// For non-anonymous providers the current user's auth data is
    /// synchronized in the background; the returned operation tracks that.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PreconditionViolation`] if a provider is already
    /// registered for the same auth type.
    pub fn register(&self, provider: Arc<dyn AuthenticationProvider>) -> CoreResult<Operation<()>> {
        let auth_type = provider.auth_type().to_string();
        {
            let mut providers = self.providers.write();
            if providers.contains_key(&auth_type) {
                return Err(CoreError::precondition(format!(
                    "unable to register a provider for {auth_type} because one is already registered"
                )));
            }
            providers.insert(auth_type.clone(), Arc::clone(&provider));
        }
        debug!(%auth_type, "registered authentication provider");

        if provider.is_anonymous() {
            return Ok(Operation::ready(Ok(())));
        }

        let current_user = Arc::clone(&self.current_user);
        Ok(self.queue.enqueue(move |tail, token| async move {
            tail.wait(&token).await?;
            let result = match current_user.current_user().await {
                Ok(Some(user)) => user.synchronize_auth_data(&auth_type).await,
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            };
            if let Err(err) = &result {
                warn!(%auth_type, error = %err, "failed to synchronize auth data");
            }
            result
        }))
    }

    /// Returns true if a provider is registered for `auth_type`.
    pub fn is_registered(&self, auth_type: &str) -> bool {
        self.providers.read().contains_key(auth_type)
    }

    fn provider(&self, auth_type: &str) -> Option<Arc<dyn AuthenticationProvider>> {
        self.providers.read().get(auth_type).cloned()
    }

    /// Restores a session through the provider for `auth_type`.
    ///
    /// Without a registered provider there is nothing to restore, which
    /// counts as success.
    pub fn restore_authentication(&self, auth_type: &str, auth_data: &HashMap<String, String>) -> bool {
        self.provider(auth_type)
            .is_none_or(|provider| provider.restore_authentication(auth_data))
    }

    /// Logs out of the provider for `auth_type`, if one is registered.
    pub async fn deauthenticate(&self, auth_type: &str) -> CoreResult<()> {
        match self.provider(auth_type) {
            Some(provider) => provider.deauthenticate().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for AuthenticationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers = self.providers.read();
        let mut types: Vec<&String> = providers.keys().collect();
        types.sort();
        f.debug_struct("AuthenticationManager")
            .field("providers", &types)
            .finish_non_exhaustive()
    }
}
