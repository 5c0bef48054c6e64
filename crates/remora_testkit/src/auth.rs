//! Fake authentication collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use remora_core::{
    AuthenticatedUser, AuthenticationProvider, CoreResult, CurrentUserController,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Provider that records how it was used.
#[derive(Debug)]
pub struct StubAuthProvider {
    auth_type: String,
    anonymous: bool,
    restore_result: bool,
    restored: Mutex<Vec<HashMap<String, String>>>,
    deauthentications: AtomicUsize,
}

impl StubAuthProvider {
    /// A non-anonymous provider for `auth_type` that accepts restores.
    pub fn new(auth_type: impl Into<String>) -> Self {
        Self {
            auth_type: auth_type.into(),
            anonymous: false,
            restore_result: true,
            restored: Mutex::new(Vec::new()),
            deauthentications: AtomicUsize::new(0),
        }
    }

    /// An anonymous provider.
    pub fn anonymous() -> Self {
        Self {
            anonymous: true,
            ..Self::new("anonymous")
        }
    }

    /// Sets what `restore_authentication` returns.
    pub fn with_restore_result(mut self, result: bool) -> Self {
        self.restore_result = result;
        self
    }

    /// Auth data passed to `restore_authentication`, in call order.
    pub fn restored(&self) -> Vec<HashMap<String, String>> {
        self.restored.lock().clone()
    }

    /// Number of `deauthenticate` calls.
    pub fn deauthentications(&self) -> usize {
        self.deauthentications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthenticationProvider for StubAuthProvider {
    fn auth_type(&self) -> &str {
        &self.auth_type
    }

    fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    fn restore_authentication(&self, auth_data: &HashMap<String, String>) -> bool {
        self.restored.lock().push(auth_data.clone());
        self.restore_result
    }

    async fn deauthenticate(&self) -> CoreResult<()> {
        self.deauthentications.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// User that records which auth types it synchronized.
#[derive(Debug, Default)]
pub struct StubUser {
    synchronized: Mutex<Vec<String>>,
}

impl StubUser {
    /// Auth types synchronized so far.
    pub fn synchronized(&self) -> Vec<String> {
        self.synchronized.lock().clone()
    }
}

#[async_trait]
impl AuthenticatedUser for StubUser {
    async fn synchronize_auth_data(&self, auth_type: &str) -> CoreResult<()> {
        self.synchronized.lock().push(auth_type.to_string());
        Ok(())
    }
}

/// Current-user controller returning a fixed user.
#[derive(Debug, Default)]
pub struct StubCurrentUserController {
    user: Option<Arc<StubUser>>,
    lookups: AtomicUsize,
}

impl StubCurrentUserController {
    /// A controller with no signed-in user.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// A controller whose current user is `user`.
    pub fn signed_in(user: Arc<StubUser>) -> Self {
        Self {
            user: Some(user),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Number of current-user lookups.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CurrentUserController for StubCurrentUserController {
    async fn current_user(&self) -> CoreResult<Option<Arc<dyn AuthenticatedUser>>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .user
            .clone()
            .map(|user| user as Arc<dyn AuthenticatedUser>))
    }
}
