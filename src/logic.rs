//! Quiz operations shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - login / logout
//!   - listing lessons
//!   - serving the next question for a session (merge, filter, pick)
//!   - recording an answer
//!   - the per-user progress summary

use std::collections::HashMap;

use tracing::{info, instrument, warn};

use crate::domain::{LessonFilter, Policy, Progress, ProgressStatus, Question, QuizItem};
use crate::error::QuizError;
use crate::progress::run_blocking;
use crate::protocol::{AnswerOut, QuestionOut, SessionOut, SummaryOut};
use crate::selector::{filter_and_sort, merge, pick_question};
use crate::session::{authenticate, Session};
use crate::state::AppState;

/// What `pick_for` hands back besides the question itself.
struct Picked {
  question: Question,
  fallback: bool,
  warning: Option<String>,
}

fn to_question_out(q: &Question, session: &Session, fallback: bool, warning: Option<String>) -> QuestionOut {
  let notice = fallback.then(|| {
    format!(
      "No missed questions found for lesson '{}'. Showing random questions.",
      session.lesson.label()
    )
  });
  QuestionOut {
    item_id: q.item_id.clone(),
    prompt: q.prompt.clone(),
    lesson: q.lesson.clone(),
    choices: q.choices.clone(),
    lesson_filter: session.lesson.label().to_string(),
    policy: session.policy,
    fallback,
    notice,
    warning,
  }
}

#[instrument(level = "info", skip(state, password), fields(%user))]
pub async fn login(state: &AppState, user: &str, password: &str) -> Result<SessionOut, QuizError> {
  let account = match authenticate(&state.config.accounts, user, password) {
    Ok(a) => a,
    Err(e) => {
      warn!(target: "quiz", %user, error = %e, "Login rejected");
      return Err(e.into());
    }
  };
  let session_id = state.sessions.open(account).await;
  Ok(SessionOut { session_id, user: account.name.clone(), persistent: account.persist })
}

pub async fn logout(state: &AppState, session_id: &str) -> bool {
  state.sessions.close(session_id).await
}

/// "All" followed by the sheet's distinct lessons.
pub async fn lessons(state: &AppState) -> Result<Vec<String>, QuizError> {
  let items = state.sheet.items().await?;
  Ok(crate::selector::lessons(&items))
}

/// Pick the next question for a session, optionally switching lesson filter
/// or policy first. Every sheet item gets a progress entry on the way.
#[instrument(level = "info", skip(state, session_id))]
pub async fn next_question(
  state: &AppState,
  session_id: &str,
  lesson: Option<String>,
  policy: Option<Policy>,
  refresh: bool,
) -> Result<QuestionOut, QuizError> {
  let session = state
    .sessions
    .update(session_id, |s| {
      if let Some(l) = lesson.as_deref() {
        s.lesson = LessonFilter::parse(Some(l));
      }
      if let Some(p) = policy {
        s.policy = p;
      }
      s.clone()
    })
    .await
    .ok_or(QuizError::UnknownSession)?;

  let picked = pick_for(state, &session, refresh).await;
  let Picked { question, fallback, warning } = match picked {
    Ok(p) => p,
    Err(e) => {
      state.sessions.update(session_id, |s| { s.current = None; s.answered = false; }).await;
      return Err(e);
    }
  };

  let out = to_question_out(&question, &session, fallback, warning);
  info!(target: "quiz", user = %session.user, persistent = session.persistent, id = %question.item_id, policy = ?session.policy, lesson = %session.lesson.label(), fallback, choices = question.choices.len(), "Question served");
  state
    .sessions
    .update(session_id, |s| { s.current = Some(question); s.answered = false; })
    .await
    .ok_or(QuizError::UnknownSession)?;
  Ok(out)
}

async fn pick_for(state: &AppState, session: &Session, refresh: bool) -> Result<Picked, QuizError> {
  let items = if refresh { state.sheet.refresh().await? } else { state.sheet.items().await? };

  let user = session.user.clone();
  let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
  let snapshot = run_blocking(session.store(&state.store), move |store| {
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    store.ensure_items(&user, &ids)
  })
  .await?;
  if let Some(w) = &snapshot.warning {
    warn!(target: "quiz", user = %session.user, warning = %w, "Progress reset reported to player");
  }

  let merged = merge(&items, &snapshot.entries);
  let selection = filter_and_sort(&merged, &session.lesson, session.policy);
  if selection.fallback {
    info!(target: "quiz", user = %session.user, lesson = %session.lesson.label(), "Nothing to review; falling back to lesson pool");
  }

  let question = {
    let mut rng = rand::thread_rng();
    pick_question(&selection.items, &items, &mut rng)?
  };
  Ok(Picked { question, fallback: selection.fallback, warning: snapshot.warning })
}

/// Check `choice` against the session's active question and record it.
#[instrument(level = "info", skip(state, session_id, choice))]
pub async fn submit_answer(state: &AppState, session_id: &str, choice: &str) -> Result<AnswerOut, QuizError> {
  let (user, question, store) = state
    .sessions
    .update(session_id, |s| {
      let q = s.current.clone().ok_or(QuizError::NoActiveQuestion)?;
      if s.answered {
        return Err(QuizError::AlreadyAnswered);
      }
      s.answered = true;
      Ok((s.user.clone(), q, s.store(&state.store)))
    })
    .await
    .ok_or(QuizError::UnknownSession)??;

  let correct = choice.trim() == question.correct_word;
  let recorded = {
    let (user, item_id) = (user.clone(), question.item_id.clone());
    run_blocking(store, move |s| s.record_answer(&user, &item_id, correct)).await
  };
  let progress = match recorded {
    Ok(p) => p,
    Err(e) => {
      // Let the player retry once the store is writable again.
      state.sessions.update(session_id, |s| s.answered = false).await;
      return Err(e.into());
    }
  };

  info!(target: "quiz", %user, id = %question.item_id, correct, correct_count = progress.correct_count, wrong_count = progress.wrong_count, "Answer recorded");
  Ok(AnswerOut {
    correct,
    expected: question.correct_word,
    explanation: question.explanation,
    correct_count: progress.correct_count,
    wrong_count: progress.wrong_count,
  })
}

/// Totals over the items currently in the sheet.
pub fn summarize(items: &[QuizItem], progress: &HashMap<String, Progress>) -> SummaryOut {
  let mut out = SummaryOut { total: items.len(), ..Default::default() };
  for p in items.iter().filter_map(|i| progress.get(&i.id)) {
    if p.status == ProgressStatus::Done {
      out.completed += 1;
    }
    out.total_correct += u64::from(p.correct_count);
    out.total_wrong += u64::from(p.wrong_count);
  }
  out.remaining = out.total - out.completed;
  out
}

#[instrument(level = "debug", skip(state, session_id))]
pub async fn summary(state: &AppState, session_id: &str) -> Result<SummaryOut, QuizError> {
  let session = state.sessions.get(session_id).await.ok_or(QuizError::UnknownSession)?;
  let items = state.sheet.items().await?;
  let user = session.user.clone();
  let snapshot = run_blocking(session.store(&state.store), move |store| store.user_progress(&user)).await?;
  Ok(SummaryOut { warning: snapshot.warning, ..summarize(&items, &snapshot.entries) })
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::Arc;
  use std::time::Duration;

  use tempfile::TempDir;

  use crate::config::QuizConfig;
  use crate::progress::{JsonFileStore, MemoryStore, ProgressStore};
  use crate::source::{SheetSource, SourceLocation};

  pub(crate) const SHEET: &str = "\
Quiz,Word,Answer,Lektion
A,run,A run,L1
B,eat,B eat,L1
C,go,C go,L2
D,see,D see,L2
";

  /// State over a CSV file in `dir` and the given shared store.
  pub(crate) fn test_state(dir: &TempDir, sheet: &str, store: Arc<dyn ProgressStore>) -> AppState {
    let path = dir.path().join("sheet.csv");
    std::fs::write(&path, sheet).unwrap();
    let source = SheetSource::new(Some(SourceLocation::File(path)), Duration::from_secs(600));
    AppState::from_parts(QuizConfig::default(), source, store)
  }

  #[tokio::test]
  async fn login_rejects_bad_secret() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, SHEET, Arc::new(MemoryStore::new()));
    let err = login(&state, "Faeng", "wrong").await.unwrap_err();
    assert!(matches!(err, QuizError::Auth(_)));
    let s = login(&state, "Faeng", "36912").await.unwrap();
    assert!(s.persistent);
  }

  #[tokio::test]
  async fn question_answer_round_persists_progress() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path().join("user_data.json")));
    let state = test_state(&dir, SHEET, store.clone());
    let s = login(&state, "Faeng", "36912").await.unwrap();

    let q = next_question(&state, &s.session_id, None, None, false).await.unwrap();
    assert_eq!(q.choices.len(), 4);
    assert!(!q.fallback);

    // Every sheet item now has an entry.
    let entries = store.user_progress("Faeng").unwrap().entries;
    assert_eq!(entries.len(), 4);
    assert!(entries.values().all(|p| *p == Progress::default()));

    let expected = q.item_id.split("::").nth(1).unwrap().to_string();
    let a = submit_answer(&state, &s.session_id, &expected).await.unwrap();
    assert!(a.correct);
    assert_eq!((a.correct_count, a.wrong_count), (1, 0));
    assert_eq!(a.expected, expected);

    let again = submit_answer(&state, &s.session_id, &expected).await.unwrap_err();
    assert!(matches!(again, QuizError::AlreadyAnswered));

    let reopened = JsonFileStore::new(dir.path().join("user_data.json"));
    let p = reopened.get("Faeng", &q.item_id).unwrap().unwrap();
    assert_eq!((p.correct_count, p.status), (1, ProgressStatus::Done));

    let sum = summary(&state, &s.session_id).await.unwrap();
    assert_eq!(sum, SummaryOut { total: 4, completed: 1, remaining: 3, total_correct: 1, total_wrong: 0, warning: None });
  }

  #[tokio::test]
  async fn wrong_answer_counts_and_wrong_only_targets_it() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, SHEET, Arc::new(MemoryStore::new()));
    let s = login(&state, "Faeng", "36912").await.unwrap();

    let q = next_question(&state, &s.session_id, None, Some(Policy::WrongOnly), false).await.unwrap();
    assert!(q.fallback);
    assert!(q.notice.is_some());

    let a = submit_answer(&state, &s.session_id, "definitely-not-a-word").await.unwrap();
    assert!(!a.correct);
    assert_eq!((a.correct_count, a.wrong_count), (0, 1));

    for _ in 0..10 {
      let next = next_question(&state, &s.session_id, None, None, false).await.unwrap();
      assert_eq!(next.item_id, q.item_id);
      assert_eq!(next.policy, Policy::WrongOnly);
      assert!(!next.fallback);
    }
  }

  #[tokio::test]
  async fn guest_progress_stays_in_session() {
    let dir = TempDir::new().unwrap();
    let shared = Arc::new(MemoryStore::new());
    let state = test_state(&dir, SHEET, shared.clone());
    let s = login(&state, "Guest", "").await.unwrap();
    assert!(!s.persistent);

    next_question(&state, &s.session_id, Some("L2".into()), None, false).await.unwrap();
    submit_answer(&state, &s.session_id, "go").await.unwrap();
    assert!(shared.user_progress("Guest").unwrap().entries.is_empty());

    let sum = summary(&state, &s.session_id).await.unwrap();
    assert_eq!(sum.completed, 1);

    assert!(logout(&state, &s.session_id).await);
    assert!(matches!(summary(&state, &s.session_id).await.unwrap_err(), QuizError::UnknownSession));
  }

  #[tokio::test]
  async fn lesson_filter_limits_questions_and_unknown_lesson_errors() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, SHEET, Arc::new(MemoryStore::new()));
    let s = login(&state, "Faeng", "36912").await.unwrap();

    for _ in 0..10 {
      let q = next_question(&state, &s.session_id, Some("L2".into()), None, false).await.unwrap();
      assert_eq!(q.lesson, "L2");
      assert_eq!(q.lesson_filter, "L2");
    }

    let err = next_question(&state, &s.session_id, Some("L9".into()), None, false).await.unwrap_err();
    assert!(matches!(err, QuizError::NoQuestions));
    let err = submit_answer(&state, &s.session_id, "go").await.unwrap_err();
    assert!(matches!(err, QuizError::NoActiveQuestion));
  }

  #[tokio::test]
  async fn lessons_lists_all_first() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, SHEET, Arc::new(MemoryStore::new()));
    assert_eq!(lessons(&state).await.unwrap(), vec!["All", "L1", "L2"]);
  }

  #[tokio::test]
  async fn loose_counters_in_saved_progress_survive_a_question() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user_data.json");
    std::fs::write(
      &path,
      r#"{"Faeng": {
        "A::run": {"Status": "done", "Richtig Count": 7, "False Count": 3},
        "B::eat": {"Status": "done", "Richtig Count": 1.0, "False Count": 0}
      }}"#,
    )
    .unwrap();
    let state = test_state(&dir, SHEET, Arc::new(JsonFileStore::new(&path)));
    let s = login(&state, "Faeng", "36912").await.unwrap();

    let q = next_question(&state, &s.session_id, None, None, false).await.unwrap();
    assert!(q.warning.is_none());
    let a = JsonFileStore::new(&path).get("Faeng", "A::run").unwrap().unwrap();
    assert_eq!((a.correct_count, a.wrong_count), (7, 3));
  }

  #[tokio::test]
  async fn unreadable_progress_is_reported_to_the_player() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user_data.json");
    std::fs::write(&path, "{\"Faeng\": [oops").unwrap();
    let state = test_state(&dir, SHEET, Arc::new(JsonFileStore::new(&path)));
    let s = login(&state, "Faeng", "36912").await.unwrap();

    let q = next_question(&state, &s.session_id, None, None, false).await.unwrap();
    let warning = q.warning.unwrap();
    assert!(warning.contains("user_data.json.bak"), "{}", warning);
    assert!(dir.path().join("user_data.json.bak").exists());

    // Reported once; the rewritten file reads cleanly.
    let q = next_question(&state, &s.session_id, None, None, false).await.unwrap();
    assert!(q.warning.is_none());
    assert!(summary(&state, &s.session_id).await.unwrap().warning.is_none());
  }

  #[tokio::test]
  async fn summary_reports_unreadable_progress() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user_data.json");
    std::fs::write(&path, "not json at all").unwrap();
    let state = test_state(&dir, SHEET, Arc::new(JsonFileStore::new(&path)));
    let s = login(&state, "Faeng", "36912").await.unwrap();

    let sum = summary(&state, &s.session_id).await.unwrap();
    assert_eq!((sum.total, sum.completed), (4, 0));
    assert!(sum.warning.is_some());
  }

  #[test]
  fn summarize_ignores_items_no_longer_in_sheet() {
    let items = vec![QuizItem::new("A", "run", "x", "L1"), QuizItem::new("B", "eat", "x", "L1")];
    let mut progress = HashMap::new();
    let mut done = Progress::default();
    done.record(false);
    done.record(true);
    progress.insert("A::run".to_string(), done);
    progress.insert("Z::gone".to_string(), done);

    let s = summarize(&items, &progress);
    assert_eq!(s, SummaryOut { total: 2, completed: 1, remaining: 1, total_correct: 1, total_wrong: 1, warning: None });
  }
}
