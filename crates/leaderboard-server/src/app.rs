use std::sync::Arc;

use axum::http::StatusCode;
use game_controller::store::ScoreStore;
use tracing::error;

/// Shared handle to the score store. SQLite calls are short, so handlers
/// take the lock without yielding.
#[derive(Clone)]
pub struct AppState {
    store: Arc<parking_lot::Mutex<ScoreStore>>,
}

impl AppState {
    pub fn new(store: ScoreStore) -> Self {
        Self {
            store: Arc::new(parking_lot::Mutex::new(store)),
        }
    }

    /// Run `f` against the store, mapping failures to a 500.
    pub fn with_store<T>(
        &self,
        f: impl FnOnce(&ScoreStore) -> anyhow::Result<T>,
    ) -> Result<T, (StatusCode, String)> {
        let store = self.store.lock();
        f(&store).map_err(|err| {
            error!("store error: {err:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
        })
    }
}
