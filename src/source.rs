//! Loading quiz items from the spreadsheet feed (CSV over HTTP or a local file).
//!
//! Rows are validated here so the rest of the app works with typed
//! `QuizItem`s only:
//!   - required columns are located by header name (with the original
//!     sheet's German/legacy names as aliases)
//!   - rows with any required cell empty are dropped
//!   - duplicate ids keep the first row
//!
//! Fetched items are cached for a TTL; `refresh` bypasses the cache.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::USER_AGENT;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::domain::QuizItem;
use crate::error::SourceError;

const PROMPT_COLS: &[&str] = &["prompt", "quiz", "question"];
const WORD_COLS: &[&str] = &["word"];
const EXPLANATION_COLS: &[&str] = &["explanation", "answer"];
const LESSON_COLS: &[&str] = &["lesson", "lektion"];

/// Where the sheet lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceLocation {
  Url(String),
  File(PathBuf),
}

impl SourceLocation {
  pub fn parse(raw: &str) -> Self {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
      SourceLocation::Url(csv_export_url(raw))
    } else {
      SourceLocation::File(PathBuf::from(raw.strip_prefix("file://").unwrap_or(raw)))
    }
  }
}

/// Rewrite a Google Sheets share/edit link to its CSV export URL.
/// Any other URL is returned unchanged.
pub fn csv_export_url(url: &str) -> String {
  const MARKER: &str = "docs.google.com/spreadsheets/d/";
  let Some(pos) = url.find(MARKER) else {
    return url.to_string();
  };
  let rest = &url[pos + MARKER.len()..];
  let (sheet_id, tail) = match rest.find('/') {
    Some(i) => (&rest[..i], &rest[i..]),
    None => (rest, ""),
  };
  if tail.starts_with("/export") || sheet_id.is_empty() {
    return url.to_string();
  }
  format!("{}{}{}/export?format=csv", &url[..pos], MARKER, sheet_id)
}

fn find_column(headers: &csv::StringRecord, names: &[&str], canonical: &'static str) -> Result<usize, SourceError> {
  headers
    .iter()
    .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    .ok_or(SourceError::MissingColumn(canonical))
}

/// Parse CSV text into validated items.
pub fn parse_items(text: &str) -> Result<Vec<QuizItem>, SourceError> {
  let mut reader = csv::ReaderBuilder::new()
    .has_headers(true)
    .flexible(true)
    .trim(csv::Trim::All)
    .from_reader(text.as_bytes());

  let headers = reader.headers()?.clone();
  let prompt_ix = find_column(&headers, PROMPT_COLS, "prompt")?;
  let word_ix = find_column(&headers, WORD_COLS, "word")?;
  let explanation_ix = find_column(&headers, EXPLANATION_COLS, "explanation")?;
  let lesson_ix = find_column(&headers, LESSON_COLS, "lesson")?;

  let mut items = Vec::new();
  let mut seen = HashSet::new();
  let mut dropped = 0usize;

  for record in reader.records() {
    let record = record?;
    let cell = |ix: usize| record.get(ix).map(str::trim).filter(|s| !s.is_empty());
    match (cell(prompt_ix), cell(word_ix), cell(explanation_ix), cell(lesson_ix)) {
      (Some(prompt), Some(word), Some(explanation), Some(lesson)) => {
        let item = QuizItem::new(prompt, word, explanation, lesson);
        if seen.insert(item.id.clone()) {
          items.push(item);
        } else {
          debug!(target: "source", id = %item.id, "Duplicate row skipped");
        }
      }
      _ => dropped += 1,
    }
  }

  if dropped > 0 {
    debug!(target: "source", dropped, "Rows with empty required cells dropped");
  }
  Ok(items)
}

struct Cached {
  items: Arc<Vec<QuizItem>>,
  fetched_at: Instant,
}

/// The quiz sheet plus its TTL cache.
pub struct SheetSource {
  client: reqwest::Client,
  location: Option<SourceLocation>,
  ttl: Duration,
  cache: RwLock<Option<Cached>>,
}

impl SheetSource {
  pub fn new(location: Option<SourceLocation>, ttl: Duration) -> Self {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .unwrap_or_default();
    Self { client, location, ttl, cache: RwLock::new(None) }
  }

  /// Cached items if still fresh, otherwise a fresh load.
  #[instrument(level = "debug", skip(self))]
  pub async fn items(&self) -> Result<Arc<Vec<QuizItem>>, SourceError> {
    {
      let cache = self.cache.read().await;
      if let Some(c) = cache.as_ref().filter(|c| c.fetched_at.elapsed() < self.ttl) {
        return Ok(c.items.clone());
      }
    }
    self.refresh().await
  }

  /// Load from the source and replace the cache. On failure the cache is
  /// left untouched and the error is returned.
  #[instrument(level = "info", skip(self))]
  pub async fn refresh(&self) -> Result<Arc<Vec<QuizItem>>, SourceError> {
    let started = Instant::now();
    let text = match self.location.as_ref().ok_or(SourceError::NotConfigured)? {
      SourceLocation::Url(url) => self.fetch(url).await?,
      SourceLocation::File(path) => tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SourceError::Io { path: path.clone(), source })?,
    };

    let items = match parse_items(&text) {
      Ok(items) => Arc::new(items),
      Err(e) => {
        warn!(target: "source", error = %e, "Quiz sheet rejected");
        return Err(e);
      }
    };
    info!(target: "source", items = items.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Quiz sheet loaded");

    *self.cache.write().await = Some(Cached { items: items.clone(), fetched_at: Instant::now() });
    Ok(items)
  }

  async fn fetch(&self, url: &str) -> Result<String, SourceError> {
    let res = self.client.get(url)
      .header(USER_AGENT, "vocab-quiz-backend/0.1")
      .send().await?;
    if !res.status().is_success() {
      return Err(SourceError::HttpStatus(res.status()));
    }
    Ok(res.text().await?)
  }
}
