//! Error types for the quiz backend, one enum per concern plus the
//! aggregate `QuizError` returned by the quiz operations.

use std::path::PathBuf;

use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

/// Errors while loading the quiz sheet.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
  #[error("no quiz source configured (set SHEET_URL or sheet_url)")]
  NotConfigured,
  #[error("failed to fetch quiz sheet: {0}")]
  Http(#[from] reqwest::Error),
  #[error("quiz sheet request failed with status {0}")]
  HttpStatus(reqwest::StatusCode),
  #[error("failed to read quiz sheet {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("malformed quiz sheet: {0}")]
  Csv(#[from] csv::Error),
  #[error("quiz sheet is missing required column '{0}'")]
  MissingColumn(&'static str),
}

/// Errors surfaced by progress stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
  #[error("failed to write progress file {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to read progress file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to encode progress: {0}")]
  Encode(#[from] serde_json::Error),
  #[error("progress store lock poisoned")]
  Poisoned,
  #[error("progress task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

/// Login failures.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
  #[error("unknown user '{0}'")]
  UnknownUser(String),
  #[error("incorrect username or password")]
  BadCredentials,
}

/// Errors emitted by the quiz operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
  #[error(transparent)]
  Source(#[from] SourceError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Auth(#[from] AuthError),
  #[error("unknown or expired session")]
  UnknownSession,
  #[error("no questions match the current filters")]
  NoQuestions,
  #[error("no active question; request a new one first")]
  NoActiveQuestion,
  #[error("the current question was already answered")]
  AlreadyAnswered,
}

impl QuizError {
  pub fn status(&self) -> StatusCode {
    match self {
      QuizError::Source(_) => StatusCode::BAD_GATEWAY,
      QuizError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
      QuizError::Auth(_) | QuizError::UnknownSession => StatusCode::UNAUTHORIZED,
      QuizError::NoQuestions => StatusCode::NOT_FOUND,
      QuizError::NoActiveQuestion | QuizError::AlreadyAnswered => StatusCode::CONFLICT,
    }
  }
}

impl IntoResponse for QuizError {
  fn into_response(self) -> axum::response::Response {
    let body = crate::protocol::ErrorOut { error: self.to_string() };
    (self.status(), Json(body)).into_response()
  }
}
