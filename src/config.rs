//! Loading quiz configuration (sheet location, progress file, accounts) from
//! TOML, with environment overrides.
//!
//! See `QuizConfig` and `AccountCfg` for the expected schema. Every field has
//! a default, so an empty file (or no file at all) is a valid configuration.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

const DEFAULT_PROGRESS_PATH: &str = "user_data.json";
const DEFAULT_TTL_SECS: u64 = 600;
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
const DEFAULT_STATIC_DIR: &str = "./static";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
  /// CSV URL (Google Sheets share links are accepted) or local CSV path.
  pub sheet_url: Option<String>,
  pub progress_path: String,
  pub cache_ttl_secs: u64,
  /// Idle time after which a session is dropped.
  pub session_ttl_secs: u64,
  pub static_dir: String,
  pub accounts: Vec<AccountCfg>,
}

/// Login account. `password = None` means passwordless.
/// `persist = false` keeps the account's progress in the session only.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct AccountCfg {
  pub name: String,
  #[serde(default)] pub password: Option<String>,
  #[serde(default = "default_persist")] pub persist: bool,
}

fn default_persist() -> bool { true }

impl Default for QuizConfig {
  fn default() -> Self {
    Self {
      sheet_url: None,
      progress_path: DEFAULT_PROGRESS_PATH.into(),
      cache_ttl_secs: DEFAULT_TTL_SECS,
      session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
      static_dir: DEFAULT_STATIC_DIR.into(),
      accounts: default_accounts(),
    }
  }
}

/// One owner account behind a shared secret, one passwordless guest.
pub fn default_accounts() -> Vec<AccountCfg> {
  vec![
    AccountCfg { name: "Faeng".into(), password: Some("36912".into()), persist: true },
    AccountCfg { name: "Guest".into(), password: None, persist: false },
  ]
}

impl QuizConfig {
  pub fn cache_ttl(&self) -> Duration {
    Duration::from_secs(self.cache_ttl_secs)
  }

  pub fn session_ttl(&self) -> Duration {
    Duration::from_secs(self.session_ttl_secs)
  }

  /// Apply SHEET_URL / PROGRESS_PATH / SHEET_TTL_SECS / SESSION_TTL_SECS overrides.
  pub fn apply_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
    if let Some(url) = var("SHEET_URL").filter(|s| !s.trim().is_empty()) {
      self.sheet_url = Some(url);
    }
    if let Some(path) = var("PROGRESS_PATH").filter(|s| !s.trim().is_empty()) {
      self.progress_path = path;
    }
    if let Some(ttl) = var("SHEET_TTL_SECS").and_then(|s| s.trim().parse::<u64>().ok()) {
      self.cache_ttl_secs = ttl;
    }
    if let Some(ttl) = var("SESSION_TTL_SECS").and_then(|s| s.trim().parse::<u64>().ok()) {
      self.session_ttl_secs = ttl;
    }
    self
  }
}

/// Attempt to parse a TOML config. On error, log and return None.
pub fn parse_config(path: &str, text: &str) -> Option<QuizConfig> {
  match toml::from_str::<QuizConfig>(text) {
    Ok(cfg) => {
      info!(target: "vocab_quiz", %path, accounts = cfg.accounts.len(), "Loaded quiz config (TOML)");
      Some(cfg)
    }
    Err(e) => {
      error!(target: "vocab_quiz", %path, error = %e, "Failed to parse TOML config");
      None
    }
  }
}

/// Load from QUIZ_CONFIG_PATH (if set), fall back to defaults on any IO or
/// parse error, then apply env overrides.
pub fn load_config_from_env() -> QuizConfig {
  let from_file = std::env::var("QUIZ_CONFIG_PATH").ok().and_then(|path| {
    match std::fs::read_to_string(&path) {
      Ok(s) => parse_config(&path, &s),
      Err(e) => {
        error!(target: "vocab_quiz", %path, error = %e, "Failed to read TOML config file");
        None
      }
    }
  });
  from_file
    .unwrap_or_default()
    .apply_env_overrides(|k| std::env::var(k).ok())
}
