//! Application state: quiz configuration, the sheet source (with its cache),
//! the shared progress store and the live sessions.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{load_config_from_env, QuizConfig};
use crate::progress::{JsonFileStore, ProgressStore};
use crate::session::SessionRegistry;
use crate::source::{SheetSource, SourceLocation};

pub struct AppState {
    pub config: QuizConfig,
    pub sheet: SheetSource,
    pub store: Arc<dyn ProgressStore>,
    pub sessions: SessionRegistry,
}

impl AppState {
    /// Build state from env: load config, set up the sheet source and the
    /// JSON progress file.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_config_from_env();

        let location = config.sheet_url.as_deref().map(SourceLocation::parse);
        match &location {
            Some(SourceLocation::Url(url)) => info!(target: "vocab_quiz", %url, ttl_secs = config.cache_ttl_secs, "Quiz sheet (remote)"),
            Some(SourceLocation::File(path)) => info!(target: "vocab_quiz", path = %path.display(), ttl_secs = config.cache_ttl_secs, "Quiz sheet (local file)"),
            None => warn!(target: "vocab_quiz", "No SHEET_URL configured; questions will fail until one is set."),
        }

        let store = JsonFileStore::new(&config.progress_path);
        info!(target: "vocab_quiz", path = %store.path().display(), "Progress file");

        for account in &config.accounts {
            info!(target: "vocab_quiz", user = %account.name, passwordless = account.password.is_none(), persist = account.persist, "Account");
        }
        info!(target: "vocab_quiz", session_ttl_secs = config.session_ttl_secs, "Session idle timeout");

        let sheet = SheetSource::new(location, config.cache_ttl());
        Self::from_parts(config, sheet, Arc::new(store))
    }

    pub fn from_parts(config: QuizConfig, sheet: SheetSource, store: Arc<dyn ProgressStore>) -> Self {
        let sessions = SessionRegistry::new(config.session_ttl());
        Self { config, sheet, store, sessions }
    }
}
