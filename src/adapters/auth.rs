//! Bearer token access for the connection handshake

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

/// Async accessor for the current bearer token
#[async_trait]
pub trait AuthTokenProvider: Send + Sync {
    /// Returns `None` when the user is not authenticated
    async fn token(&self) -> Option<String>;
}

/// Provider returning a fixed token
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn unauthenticated() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl AuthTokenProvider for StaticTokenProvider {
    async fn token(&self) -> Option<String> {
        self.token.clone()
    }
}

type TokenFuture = Pin<Box<dyn Future<Output = Option<String>> + Send>>;

/// Provider backed by an async closure, e.g. a secure-storage lookup
pub struct FnTokenProvider {
    fetch: Box<dyn Fn() -> TokenFuture + Send + Sync>,
}

impl FnTokenProvider {
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        Self {
            fetch: Box::new(move || Box::pin(fetch())),
        }
    }
}

#[async_trait]
impl AuthTokenProvider for FnTokenProvider {
    async fn token(&self) -> Option<String> {
        (self.fetch)().await
    }
}
