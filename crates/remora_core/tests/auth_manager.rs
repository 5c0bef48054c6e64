//! Authentication provider registry.

use remora_core::{AuthenticationManager, AuthenticationProvider, CoreError, CurrentUserController};
use remora_testkit::{init_tracing, StubAuthProvider, StubCurrentUserController, StubUser};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;

fn manager(users: &Arc<StubCurrentUserController>) -> AuthenticationManager {
    let users: Arc<dyn CurrentUserController> = users.clone();
    AuthenticationManager::new(users, Handle::current())
}

#[tokio::test]
async fn test_register_twice_fails() {
    init_tracing();
    let users = Arc::new(StubCurrentUserController::signed_out());
    let manager = manager(&users);

    let first: Arc<dyn AuthenticationProvider> = Arc::new(StubAuthProvider::new("facebook"));
    let second: Arc<dyn AuthenticationProvider> = Arc::new(StubAuthProvider::new("facebook"));
    manager.register(first).unwrap().await.unwrap();

    let err = manager.register(second).unwrap_err();
    assert!(matches!(err, CoreError::PreconditionViolation { .. }));
    assert!(manager.is_registered("facebook"));
}

#[tokio::test]
async fn test_register_anonymous_skips_user_lookup() {
    init_tracing();
    let users = Arc::new(StubCurrentUserController::signed_out());
    let manager = manager(&users);

    manager
        .register(Arc::new(StubAuthProvider::anonymous()))
        .unwrap()
        .await
        .unwrap();

    assert!(manager.is_registered("anonymous"));
    assert_eq!(users.lookups(), 0);
}

#[tokio::test]
async fn test_register_synchronizes_current_user() {
    init_tracing();
    let user = Arc::new(StubUser::default());
    let users = Arc::new(StubCurrentUserController::signed_in(Arc::clone(&user)));
    let manager = manager(&users);

    manager
        .register(Arc::new(StubAuthProvider::new("twitter")))
        .unwrap()
        .await
        .unwrap();
    manager
        .register(Arc::new(StubAuthProvider::new("github")))
        .unwrap()
        .await
        .unwrap();

    assert_eq!(users.lookups(), 2);
    assert_eq!(user.synchronized(), ["twitter", "github"]);
}

#[tokio::test]
async fn test_register_without_user_is_ok() {
    init_tracing();
    let users = Arc::new(StubCurrentUserController::signed_out());
    let manager = manager(&users);

    manager
        .register(Arc::new(StubAuthProvider::new("twitter")))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(users.lookups(), 1);
}

#[tokio::test]
async fn test_restore_authentication() {
    init_tracing();
    let users = Arc::new(StubCurrentUserController::signed_out());
    let manager = manager(&users);
    let provider = Arc::new(StubAuthProvider::new("facebook").with_restore_result(false));
    manager.register(provider.clone()).unwrap().await.unwrap();

    let auth_data = HashMap::from([("token".to_string(), "abc".to_string())]);
    assert!(!manager.restore_authentication("facebook", &auth_data));
    assert_eq!(provider.restored(), vec![auth_data.clone()]);

    // Nothing registered means nothing to invalidate.
    assert!(manager.restore_authentication("unknown", &auth_data));
}

#[tokio::test]
async fn test_deauthenticate() {
    init_tracing();
    let users = Arc::new(StubCurrentUserController::signed_out());
    let manager = manager(&users);
    let provider = Arc::new(StubAuthProvider::new("facebook"));
    manager.register(provider.clone()).unwrap().await.unwrap();

    manager.deauthenticate("facebook").await.unwrap();
    manager.deauthenticate("unknown").await.unwrap();

    assert_eq!(provider.deauthentications(), 1);
}
