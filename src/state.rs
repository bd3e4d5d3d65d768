use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::Clock;
use crate::config::SettingsStore;
use crate::history::SessionHistory;
use crate::messages::{RuntimeMessage, RuntimeResponse};

/// Background service state shared by the HTTP routes and the native-messaging loop.
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub history: Mutex<SessionHistory>,
    pub clock: Arc<dyn Clock>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(settings: Arc<SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        let history = SessionHistory::new(settings.current().max_history_entries);
        Self {
            settings,
            history: Mutex::new(history),
            clock,
        }
    }

    pub fn history(&self) -> MutexGuard<'_, SessionHistory> {
        match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn dispatch(&self, message: RuntimeMessage) -> RuntimeResponse {
        let now = self.clock.now_epoch_ms();
        self.history().handle(message, now)
    }
}
