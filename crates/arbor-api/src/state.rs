use std::sync::Arc;

use arbor_db::Database;
use arbor_gateway::dispatcher::Dispatcher;
use arbor_notify::Notifier;

pub type AppState = Arc<AppStateInner>;

/// Explicitly constructed in the server binary and injected into every
/// handler; nothing here is ambient module state.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub notifier: Notifier,
    pub jwt_secret: String,
}
