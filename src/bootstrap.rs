use axum::Router;
use thiserror::Error;
use tracing::info;

use crate::app::AppState;

/// Adds one application's routes to the router
pub type AppInit = fn(Router<AppState>) -> Router<AppState>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("application '{0}' is already registered")]
    DuplicateApp(String),
}

/// Applications mounted at startup, in registration order.
/// Built once by the composition root and never mutated afterwards.
#[derive(Default)]
pub struct AppRegistry {
    apps: Vec<(String, AppInit)>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, init: AppInit) -> Result<Self, BootstrapError> {
        let name = name.into();
        if self.apps.iter().any(|(existing, _)| *existing == name) {
            return Err(BootstrapError::DuplicateApp(name));
        }
        self.apps.push((name, init));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.apps.iter().map(|(name, _)| name.as_str())
    }

    pub fn mount(&self, router: Router<AppState>) -> Router<AppState> {
        self.apps.iter().fold(router, |router, (name, init)| {
            info!("Registering application: {}", name);
            init(router)
        })
    }
}
