//! Shared application state handed to every handler and middleware.

use std::sync::Arc;

use crate::clock::Clock;
use crate::services::{
    api_key_service::ApiKeyService, audit_service::AuditLogger, password::PasswordHasher,
    token_service::TokenService, user_service::UserService,
};
use crate::store::{ApiKeyStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
    pub tokens: TokenService,
    pub api_keys: ApiKeyService,
    pub audit: AuditLogger,
    /// Raw store handle for the health check.
    pub store: Arc<dyn UserStore>,
}

impl AppState {
    /// Wire the services over one backing store.
    pub fn new<S>(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        hasher: PasswordHasher,
        tokens: TokenService,
        audit: AuditLogger,
    ) -> Self
    where
        S: UserStore + ApiKeyStore + 'static,
    {
        let user_store: Arc<dyn UserStore> = store.clone();
        let key_store: Arc<dyn ApiKeyStore> = store;

        Self {
            users: UserService::new(user_store.clone(), hasher, tokens.clone(), clock.clone()),
            tokens,
            api_keys: ApiKeyService::new(key_store, clock),
            audit,
            store: user_store,
        }
    }
}
