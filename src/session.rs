//! Login and per-user quiz sessions.
//!
//! A session replaces implicit UI state with an explicit record: who is
//! playing, which lesson/policy is selected, the active question and whether
//! it has been answered. Accounts with `persist = false` get a private
//! in-memory progress store that disappears with the session.
//!
//! Sessions idle for longer than the registry TTL are treated as unknown and
//! swept whenever a new session is opened.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::AccountCfg;
use crate::domain::{LessonFilter, Policy, Question};
use crate::error::AuthError;
use crate::progress::{MemoryStore, ProgressStore};

/// Check a login against the configured accounts.
pub fn authenticate<'a>(accounts: &'a [AccountCfg], user: &str, password: &str) -> Result<&'a AccountCfg, AuthError> {
  let account = accounts
    .iter()
    .find(|a| a.name == user)
    .ok_or_else(|| AuthError::UnknownUser(user.to_string()))?;
  let ok = match &account.password {
    Some(secret) => secret == password,
    None => password.is_empty(),
  };
  if ok { Ok(account) } else { Err(AuthError::BadCredentials) }
}

#[derive(Clone)]
pub struct Session {
  pub user: String,
  pub persistent: bool,
  pub lesson: LessonFilter,
  pub policy: Policy,
  pub current: Option<Question>,
  pub answered: bool,
  scratch: Option<Arc<MemoryStore>>,
  last_seen: Instant,
}

impl Session {
  fn new(account: &AccountCfg) -> Self {
    Self {
      user: account.name.clone(),
      persistent: account.persist,
      lesson: LessonFilter::All,
      policy: Policy::Random,
      current: None,
      answered: false,
      scratch: (!account.persist).then(|| Arc::new(MemoryStore::new())),
      last_seen: Instant::now(),
    }
  }

  fn is_idle(&self, ttl: Duration) -> bool {
    self.last_seen.elapsed() > ttl
  }

  /// The store this session reads and writes progress through.
  pub fn store(&self, shared: &Arc<dyn ProgressStore>) -> Arc<dyn ProgressStore> {
    match &self.scratch {
      Some(mem) => mem.clone() as Arc<dyn ProgressStore>,
      None => shared.clone(),
    }
  }
}

pub struct SessionRegistry {
  sessions: RwLock<HashMap<String, Session>>,
  ttl: Duration,
}

impl SessionRegistry {
  pub fn new(ttl: Duration) -> Self {
    Self { sessions: RwLock::new(HashMap::new()), ttl }
  }

  /// Open a session for an authenticated account; returns its token.
  #[instrument(level = "info", skip(self, account), fields(user = %account.name))]
  pub async fn open(&self, account: &AccountCfg) -> String {
    let token = Uuid::new_v4().to_string();
    let mut sessions = self.sessions.write().await;
    let before = sessions.len();
    sessions.retain(|_, s| !s.is_idle(self.ttl));
    let evicted = before - sessions.len();
    if evicted > 0 {
      info!(target: "quiz", evicted, "Idle sessions expired");
    }
    sessions.insert(token.clone(), Session::new(account));
    info!(target: "quiz", user = %account.name, persistent = account.persist, live = sessions.len(), "Session opened");
    token
  }

  #[instrument(level = "info", skip(self, token))]
  pub async fn close(&self, token: &str) -> bool {
    match self.sessions.write().await.remove(token) {
      Some(s) => {
        info!(target: "quiz", user = %s.user, "Session closed");
        true
      }
      None => {
        warn!(target: "quiz", "Logout for unknown session");
        false
      }
    }
  }

  /// Snapshot of a live session; touching it counts as activity.
  pub async fn get(&self, token: &str) -> Option<Session> {
    self.update(token, |s| s.clone()).await
  }

  /// Mutate a session in place; None if the token is unknown or idle
  /// past the TTL (the idle entry is removed).
  pub async fn update<T>(&self, token: &str, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
    let mut sessions = self.sessions.write().await;
    if sessions.get(token)?.is_idle(self.ttl) {
      if let Some(s) = sessions.remove(token) {
        info!(target: "quiz", user = %s.user, "Session expired");
      }
      return None;
    }
    let session = sessions.get_mut(token)?;
    session.last_seen = Instant::now();
    Some(f(session))
  }
}
