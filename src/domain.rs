//! Domain models: quiz items from the sheet, per-user progress, merged rows,
//! selection policies and the question handed to a session.

use serde::{de, Deserialize, Deserializer, Serialize};

/// Build the stable item id used as the progress key.
pub fn item_id(prompt: &str, word: &str) -> String {
  format!("{}::{}", prompt, word)
}

/// One row of the source sheet, validated at load time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuizItem {
  pub id: String,
  pub prompt: String,
  pub word: String,        // the correct answer
  pub explanation: String, // shown after answering
  pub lesson: String,
}

impl QuizItem {
  pub fn new(
    prompt: impl Into<String>,
    word: impl Into<String>,
    explanation: impl Into<String>,
    lesson: impl Into<String>,
  ) -> Self {
    let prompt = prompt.into();
    let word = word.into();
    Self {
      id: item_id(&prompt, &word),
      prompt,
      word,
      explanation: explanation.into(),
      lesson: lesson.into(),
    }
  }
}

/// Has the user ever answered this item?
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStatus {
  #[default]
  #[serde(rename = "not started yet", alias = "not_started")]
  NotStarted,
  #[serde(rename = "done")]
  Done,
}

/// Per (user, item) counters. Field names follow the progress file layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
  #[serde(rename = "Status", default)]
  pub status: ProgressStatus,
  #[serde(rename = "Richtig Count", default, deserialize_with = "lenient_count")]
  pub correct_count: u32,
  #[serde(rename = "False Count", default, deserialize_with = "lenient_count")]
  pub wrong_count: u32,
}

/// Accept counters written as integers, floats (`1.0`) or numeric strings
/// (`"1"`). Fractions truncate, negatives clamp to zero.
fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Int(i64),
    Float(f64),
    Text(String),
  }

  fn clamp(n: f64) -> Option<u32> {
    // `as` saturates; NaN maps to 0.
    n.is_finite().then(|| n.max(0.0) as u32)
  }

  let n = match Raw::deserialize(d)? {
    Raw::Int(n) => Some(u32::try_from(n.max(0)).unwrap_or(u32::MAX)),
    Raw::Float(f) => clamp(f),
    Raw::Text(s) => s.trim().parse::<f64>().ok().and_then(clamp),
  };
  n.ok_or_else(|| de::Error::custom("expected a numeric count"))
}

impl Progress {
  /// Apply one answer: bump exactly one counter, mark the item done.
  pub fn record(&mut self, correct: bool) {
    if correct {
      self.correct_count = self.correct_count.saturating_add(1);
    } else {
      self.wrong_count = self.wrong_count.saturating_add(1);
    }
    self.status = ProgressStatus::Done;
  }
}

/// A quiz item joined with its user's progress. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedItem {
  pub item: QuizItem,
  pub progress: Progress,
}

/// Which subset of items is eligible for the next question.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
  #[default]
  Random,
  #[serde(alias = "not_started_yet")]
  NotStarted,
  #[serde(alias = "false_count")]
  WrongOnly,
  ByLesson,
}

/// Exact-match lesson filter; "All" (or nothing) disables it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LessonFilter {
  #[default]
  All,
  Only(String),
}

impl LessonFilter {
  pub const ALL: &'static str = "All";

  pub fn parse(raw: Option<&str>) -> Self {
    match raw.map(str::trim) {
      None | Some("") => LessonFilter::All,
      Some(s) if s == Self::ALL => LessonFilter::All,
      Some(s) => LessonFilter::Only(s.to_string()),
    }
  }

  pub fn matches(&self, lesson: &str) -> bool {
    match self {
      LessonFilter::All => true,
      LessonFilter::Only(want) => want == lesson,
    }
  }

  pub fn label(&self) -> &str {
    match self {
      LessonFilter::All => Self::ALL,
      LessonFilter::Only(s) => s,
    }
  }
}

/// The active multiple-choice question of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
  pub item_id: String,
  pub prompt: String,
  pub correct_word: String,
  pub explanation: String,
  pub lesson: String,
  pub choices: Vec<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn item_id_joins_prompt_and_word() {
    let item = QuizItem::new("Ich ___ nach Hause.", "gehen", "Ich gehe nach Hause.", "L1");
    assert_eq!(item.id, "Ich ___ nach Hause.::gehen");
  }

  #[test]
  fn record_bumps_one_counter_and_marks_done() {
    let mut p = Progress::default();
    assert_eq!(p.status, ProgressStatus::NotStarted);

    p.record(false);
    assert_eq!((p.correct_count, p.wrong_count), (0, 1));
    assert_eq!(p.status, ProgressStatus::Done);

    p.record(true);
    assert_eq!((p.correct_count, p.wrong_count), (1, 1));
    assert_eq!(p.status, ProgressStatus::Done);
  }

  #[test]
  fn progress_uses_file_field_names() {
    let mut p = Progress::default();
    p.record(true);
    let json = serde_json::to_value(p).unwrap();
    assert_eq!(
      json,
      serde_json::json!({ "Status": "done", "Richtig Count": 1, "False Count": 0 })
    );

    let fresh: Progress = serde_json::from_str(r#"{"Status": "not started yet"}"#).unwrap();
    assert_eq!(fresh, Progress::default());
  }

  #[test]
  fn counts_accept_floats_and_numeric_strings() {
    let p: Progress = serde_json::from_str(
      r#"{"Status": "done", "Richtig Count": 1.0, "False Count": "3"}"#,
    )
    .unwrap();
    assert_eq!((p.correct_count, p.wrong_count), (1, 3));

    let p: Progress = serde_json::from_str(r#"{"Richtig Count": " 2 ", "False Count": -4}"#).unwrap();
    assert_eq!((p.correct_count, p.wrong_count), (2, 0));

    assert!(serde_json::from_str::<Progress>(r#"{"Richtig Count": "many"}"#).is_err());
  }

  #[test]
  fn lesson_filter_treats_all_and_blank_as_no_filter() {
    assert_eq!(LessonFilter::parse(None), LessonFilter::All);
    assert_eq!(LessonFilter::parse(Some("All")), LessonFilter::All);
    assert_eq!(LessonFilter::parse(Some("  ")), LessonFilter::All);
    let l3 = LessonFilter::parse(Some("Lektion 3"));
    assert!(l3.matches("Lektion 3"));
    assert!(!l3.matches("Lektion 4"));
    assert_eq!(l3.label(), "Lektion 3");
  }

  #[test]
  fn policy_accepts_snake_case_names() {
    let p: Policy = serde_json::from_str(r#""wrong_only""#).unwrap();
    assert_eq!(p, Policy::WrongOnly);
    let p: Policy = serde_json::from_str(r#""not_started_yet""#).unwrap();
    assert_eq!(p, Policy::NotStarted);
  }
}
