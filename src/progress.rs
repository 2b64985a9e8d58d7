//! Per-user progress persistence.
//!
//! `ProgressStore` is the narrow seam between selection and persistence:
//! keyed get/put plus the few compound operations the quiz needs. Two
//! adapters live here:
//!   - `JsonFileStore`: the whole book in one JSON file, read fully before
//!     each mutation and replaced fully after (temp file + rename).
//!   - `MemoryStore`: process memory only (guest sessions, tests).
//!
//! Store calls are synchronous; async callers go through `run_blocking`.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, instrument, warn};

use crate::domain::Progress;
use crate::error::StoreError;

/// item id -> progress, for one user.
pub type UserProgress = BTreeMap<String, Progress>;
/// user -> item id -> progress.
pub type ProgressBook = BTreeMap<String, UserProgress>;

/// One user's entries, plus a message for the player when the backing data
/// had to be reset.
#[derive(Debug, Default)]
pub struct UserSnapshot {
  pub entries: HashMap<String, Progress>,
  pub warning: Option<String>,
}

pub trait ProgressStore: Send + Sync {
  fn get(&self, user: &str, item_id: &str) -> Result<Option<Progress>, StoreError>;
  fn put(&self, user: &str, item_id: &str, progress: Progress) -> Result<(), StoreError>;

  /// Snapshot of one user's entries.
  fn user_progress(&self, user: &str) -> Result<UserSnapshot, StoreError>;

  /// Create zero-default entries for every id the user has not seen yet and
  /// return the user's full map. Entries are never removed.
  fn ensure_items(&self, user: &str, ids: &[&str]) -> Result<UserSnapshot, StoreError>;

  /// Apply one answer to (user, item) and persist. Returns the new counters.
  fn record_answer(&self, user: &str, item_id: &str, correct: bool) -> Result<Progress, StoreError>;
}

/// Run a store call on the blocking pool.
pub async fn run_blocking<T, F>(store: Arc<dyn ProgressStore>, f: F) -> Result<T, StoreError>
where
  T: Send + 'static,
  F: FnOnce(&dyn ProgressStore) -> Result<T, StoreError> + Send + 'static,
{
  tokio::task::spawn_blocking(move || f(store.as_ref())).await?
}

// Shared book operations so both adapters behave identically.

fn ensure_in(book: &mut ProgressBook, user: &str, ids: &[&str]) -> (HashMap<String, Progress>, usize) {
  let entries = book.entry(user.to_string()).or_default();
  let mut created = 0usize;
  for id in ids {
    if !entries.contains_key(*id) {
      entries.insert((*id).to_string(), Progress::default());
      created += 1;
    }
  }
  let snapshot = entries.iter().map(|(k, v)| (k.clone(), *v)).collect();
  (snapshot, created)
}

fn record_in(book: &mut ProgressBook, user: &str, item_id: &str, correct: bool) -> Progress {
  let entry = book
    .entry(user.to_string())
    .or_default()
    .entry(item_id.to_string())
    .or_default();
  entry.record(correct);
  *entry
}

fn snapshot_of(book: &ProgressBook, user: &str) -> HashMap<String, Progress> {
  book
    .get(user)
    .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
    .unwrap_or_default()
}

/// JSON-file-backed store. A mutex serializes read-modify-write inside this
/// process; other processes writing the same file are not coordinated.
pub struct JsonFileStore {
  path: PathBuf,
  lock: Mutex<()>,
}

impl JsonFileStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into(), lock: Mutex::new(()) }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// `path` with `suffix` appended to the file name.
  fn sibling(&self, suffix: &str) -> PathBuf {
    let mut name: OsString = self.path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
  }

  /// Missing file -> empty book. Malformed file -> copied to `<path>.bak`,
  /// empty book plus a warning for the player.
  fn load(&self) -> Result<(ProgressBook, Option<String>), StoreError> {
    let text = match std::fs::read_to_string(&self.path) {
      Ok(t) => t,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((ProgressBook::new(), None)),
      Err(source) => return Err(StoreError::Read { path: self.path.clone(), source }),
    };
    if text.trim().is_empty() {
      return Ok((ProgressBook::new(), None));
    }
    match serde_json::from_str::<ProgressBook>(&text) {
      Ok(book) => Ok((book, None)),
      Err(e) => {
        let backup = self.sibling(".bak");
        let kept = match std::fs::copy(&self.path, &backup) {
          Ok(_) => format!(" The unreadable file was kept as {}.", backup.display()),
          Err(copy_err) => {
            error!(target: "progress", path = %backup.display(), error = %copy_err, "Could not back up malformed progress file");
            String::new()
          }
        };
        warn!(target: "progress", path = %self.path.display(), backup = %backup.display(), error = %e, "Malformed progress file; starting with empty data");
        let warning = format!("Saved progress could not be read ({}); starting with empty progress.{}", e, kept);
        Ok((ProgressBook::new(), Some(warning)))
      }
    }
  }

  fn save(&self, book: &ProgressBook) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(book)?;
    let write_err = |source| StoreError::Write { path: self.path.clone(), source };
    if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
      std::fs::create_dir_all(dir).map_err(write_err)?;
    }
    let tmp = self.sibling(".tmp");
    std::fs::write(&tmp, json).map_err(write_err)?;
    std::fs::rename(&tmp, &self.path).map_err(write_err)?;
    debug!(target: "progress", path = %self.path.display(), users = book.len(), "Progress file written");
    Ok(())
  }

  /// Run `f` over the whole book under the lock; `mutate` writes it back.
  fn with_book<T>(
    &self,
    mutate: bool,
    f: impl FnOnce(&mut ProgressBook) -> T,
  ) -> Result<(T, Option<String>), StoreError> {
    let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
    let (mut book, warning) = self.load()?;
    let out = f(&mut book);
    if mutate {
      self.save(&book)?;
    }
    Ok((out, warning))
  }
}

impl ProgressStore for JsonFileStore {
  fn get(&self, user: &str, item_id: &str) -> Result<Option<Progress>, StoreError> {
    Ok(self.with_book(false, |b| b.get(user).and_then(|m| m.get(item_id)).copied())?.0)
  }

  #[instrument(level = "debug", skip(self, progress))]
  fn put(&self, user: &str, item_id: &str, progress: Progress) -> Result<(), StoreError> {
    self.with_book(true, |b| {
      b.entry(user.to_string()).or_default().insert(item_id.to_string(), progress);
    })?;
    Ok(())
  }

  fn user_progress(&self, user: &str) -> Result<UserSnapshot, StoreError> {
    let (entries, warning) = self.with_book(false, |b| snapshot_of(b, user))?;
    Ok(UserSnapshot { entries, warning })
  }

  #[instrument(level = "debug", skip(self, ids), fields(ids = ids.len()))]
  fn ensure_items(&self, user: &str, ids: &[&str]) -> Result<UserSnapshot, StoreError> {
    // Only rewrite the file when something was actually added.
    let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
    let (mut book, warning) = self.load()?;
    let (entries, created) = ensure_in(&mut book, user, ids);
    if created > 0 {
      self.save(&book)?;
      debug!(target: "progress", %user, created, "Initialized progress entries");
    }
    Ok(UserSnapshot { entries, warning })
  }

  #[instrument(level = "info", skip(self))]
  fn record_answer(&self, user: &str, item_id: &str, correct: bool) -> Result<Progress, StoreError> {
    Ok(self.with_book(true, |b| record_in(b, user, item_id, correct))?.0)
  }
}

/// In-memory store. Nothing survives the process (or the owning session).
#[derive(Default)]
pub struct MemoryStore {
  book: Mutex<ProgressBook>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn with_book<T>(&self, f: impl FnOnce(&mut ProgressBook) -> T) -> Result<T, StoreError> {
    let mut book = self.book.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(f(&mut book))
  }
}

impl ProgressStore for MemoryStore {
  fn get(&self, user: &str, item_id: &str) -> Result<Option<Progress>, StoreError> {
    self.with_book(|b| b.get(user).and_then(|m| m.get(item_id)).copied())
  }

  fn put(&self, user: &str, item_id: &str, progress: Progress) -> Result<(), StoreError> {
    self.with_book(|b| {
      b.entry(user.to_string()).or_default().insert(item_id.to_string(), progress);
    })
  }

  fn user_progress(&self, user: &str) -> Result<UserSnapshot, StoreError> {
    let entries = self.with_book(|b| snapshot_of(b, user))?;
    Ok(UserSnapshot { entries, warning: None })
  }

  fn ensure_items(&self, user: &str, ids: &[&str]) -> Result<UserSnapshot, StoreError> {
    let entries = self.with_book(|b| ensure_in(b, user, ids).0)?;
    Ok(UserSnapshot { entries, warning: None })
  }

  fn record_answer(&self, user: &str, item_id: &str, correct: bool) -> Result<Progress, StoreError> {
    self.with_book(|b| record_in(b, user, item_id, correct))
  }
}
