// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, services::attempts::AttemptService, store::Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub attempts: AttemptService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let attempts = AttemptService::new(store.clone(), &config);
        Self { store, config, attempts }
    }
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for AttemptService {
    fn from_ref(state: &AppState) -> Self {
        state.attempts.clone()
    }
}
