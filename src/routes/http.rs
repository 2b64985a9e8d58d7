//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; errors map to status codes via `QuizError`.

use std::sync::Arc;
use axum::{extract::{State, Query}, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::error::QuizError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_lessons(State(state): State<Arc<AppState>>) -> Result<Json<LessonsOut>, QuizError> {
  let lessons = logic::lessons(&state).await?;
  Ok(Json(LessonsOut { lessons }))
}

#[instrument(level = "info", skip(state, body), fields(user = %body.user))]
pub async fn http_post_login(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LoginIn>,
) -> Result<Json<SessionOut>, QuizError> {
  let session = logic::login(&state, &body.user, &body.password).await?;
  info!(target: "quiz", user = %session.user, "HTTP login");
  Ok(Json(session))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_logout(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> impl IntoResponse {
  let ok = logic::logout(&state, &body.session_id).await;
  Json(LogoutOut { ok })
}

#[instrument(level = "info", skip(state, body), fields(lesson = ?body.lesson, policy = ?body.policy, refresh = body.refresh))]
pub async fn http_post_question(
  State(state): State<Arc<AppState>>,
  Json(body): Json<QuestionIn>,
) -> Result<Json<QuestionOut>, QuizError> {
  let q = logic::next_question(&state, &body.session_id, body.lesson, body.policy, body.refresh).await?;
  Ok(Json(q))
}

#[instrument(level = "info", skip(state, body), fields(choice_len = body.choice.len()))]
pub async fn http_post_answer(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AnswerIn>,
) -> Result<Json<AnswerOut>, QuizError> {
  let result = logic::submit_answer(&state, &body.session_id, &body.choice).await?;
  info!(target: "quiz", correct = result.correct, "HTTP answer evaluated");
  Ok(Json(result))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_get_summary(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SessionIn>,
) -> Result<Json<SummaryOut>, QuizError> {
  Ok(Json(logic::summary(&state, &q.session_id).await?))
}
