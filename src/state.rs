use std::sync::Arc;

use crate::auth::{Argon2Verifier, CredentialVerifier};
use crate::completion::CompletionEngine;
use crate::config::Config;
use crate::store::{CertificateStore, ContentStore, CredentialStore, ProgressStore};
use crate::token::{TokenGenerator, UuidTokens};

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone; every capability sits behind an `Arc`. Sessions live in
/// the session layer, not here.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn CredentialStore>,
    pub content: Arc<dyn ContentStore>,
    pub progress: Arc<dyn ProgressStore>,
    pub engine: CompletionEngine,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires every capability from one store implementing all of them.
    pub fn new<S>(store: Arc<S>, config: Config) -> Self
    where
        S: CredentialStore + ContentStore + ProgressStore + CertificateStore + 'static,
    {
        let tokens: Arc<dyn TokenGenerator> = Arc::new(UuidTokens);
        let certificates: Arc<dyn CertificateStore> = store.clone();
        let engine = CompletionEngine::new(store.clone(), store.clone(), certificates, tokens);
        Self {
            users: store.clone(),
            content: store.clone(),
            progress: store,
            engine,
            verifier: Arc::new(Argon2Verifier),
            config: Arc::new(config),
        }
    }
}
