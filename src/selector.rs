//! Progress-aware question selection.
//!
//! Flow:
//! 1) `merge` joins sheet rows with a user's progress by item id.
//! 2) `filter_and_sort` applies the lesson filter and the chosen policy
//!    (with its fallback tiers).
//! 3) `pick_question` samples one item uniformly and builds up to four
//!    choices, drawing distractors from the full sheet.

use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::{LessonFilter, MergedItem, Policy, Progress, ProgressStatus, Question, QuizItem};
use crate::error::QuizError;

const DISTRACTORS: usize = 3;

/// Items eligible for the next question.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
  pub items: Vec<MergedItem>,
  /// Set when `WrongOnly` found nothing to review and fell back to the
  /// lesson-filtered set.
  pub fallback: bool,
}

impl Selection {
  fn exact(items: Vec<MergedItem>) -> Self {
    Self { items, fallback: false }
  }
}

/// Join items with progress; absent entries default to not-started/0/0.
pub fn merge(items: &[QuizItem], progress: &HashMap<String, Progress>) -> Vec<MergedItem> {
  items
    .iter()
    .map(|item| MergedItem {
      item: item.clone(),
      progress: progress.get(&item.id).copied().unwrap_or_default(),
    })
    .collect()
}

fn keep(items: &[MergedItem], pred: impl Fn(&MergedItem) -> bool) -> Vec<MergedItem> {
  items.iter().filter(|m| pred(m)).cloned().collect()
}

fn most_missed_first(mut items: Vec<MergedItem>) -> Vec<MergedItem> {
  items.sort_by(|a, b| b.progress.wrong_count.cmp(&a.progress.wrong_count));
  items
}

/// Apply the lesson filter, then the policy. The input is never mutated.
pub fn filter_and_sort(items: &[MergedItem], lesson: &LessonFilter, policy: Policy) -> Selection {
  let scoped = keep(items, |m| lesson.matches(&m.item.lesson));

  match policy {
    Policy::Random => Selection::exact(scoped),

    Policy::NotStarted => {
      let fresh = keep(&scoped, |m| m.progress.status == ProgressStatus::NotStarted);
      if !fresh.is_empty() {
        return Selection::exact(fresh);
      }
      let missed = keep(&scoped, |m| m.progress.wrong_count > 0);
      if !missed.is_empty() {
        return Selection::exact(most_missed_first(missed));
      }
      Selection::exact(scoped)
    }

    Policy::WrongOnly => {
      let never_right = keep(&scoped, |m| m.progress.wrong_count > 0 && m.progress.correct_count == 0);
      if !never_right.is_empty() {
        return Selection::exact(most_missed_first(never_right));
      }
      let missed = keep(&scoped, |m| m.progress.wrong_count > 0);
      if !missed.is_empty() {
        return Selection::exact(most_missed_first(missed));
      }
      Selection { items: scoped, fallback: true }
    }

    Policy::ByLesson => {
      let mut sorted = scoped;
      sorted.sort_by(|a, b| a.item.lesson.cmp(&b.item.lesson));
      Selection::exact(sorted)
    }
  }
}

/// Sample one question from `filtered`, with distractors from `pool`.
///
/// Fewer than three distinct other words in the pool yields fewer choices
/// rather than an error.
pub fn pick_question<R: Rng + ?Sized>(
  filtered: &[MergedItem],
  pool: &[QuizItem],
  rng: &mut R,
) -> Result<Question, QuizError> {
  let active = &filtered.choose(rng).ok_or(QuizError::NoQuestions)?.item;

  let mut seen = HashSet::new();
  let others: Vec<&str> = pool
    .iter()
    .map(|i| i.word.as_str())
    .filter(|w| *w != active.word && seen.insert(*w))
    .collect();

  let mut choices: Vec<String> = others
    .choose_multiple(rng, DISTRACTORS)
    .map(|w| w.to_string())
    .collect();
  choices.push(active.word.clone());
  choices.shuffle(rng);

  Ok(Question {
    item_id: active.id.clone(),
    prompt: active.prompt.clone(),
    correct_word: active.word.clone(),
    explanation: active.explanation.clone(),
    lesson: active.lesson.clone(),
    choices,
  })
}

/// Distinct lessons, sorted, behind the "All" entry.
pub fn lessons(items: &[QuizItem]) -> Vec<String> {
  let mut out: Vec<String> = items.iter().map(|i| i.lesson.clone()).collect();
  out.sort();
  out.dedup();
  out.insert(0, LessonFilter::ALL.to_string());
  out
}
