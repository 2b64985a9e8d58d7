//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::QuizError;
use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "vocab_quiz", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "vocab_quiz", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "vocab_quiz", "WS received: {:?}", redact(&incoming));
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "vocab_quiz", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "vocab_quiz", "WebSocket disconnected");
}

// Keep passwords out of debug logs.
fn redact(msg: &ClientWsMessage) -> String {
  match msg {
    ClientWsMessage::Login { user, .. } => format!("Login {{ user: {:?} }}", user),
    other => format!("{:?}", other),
  }
}

fn or_error<T>(res: Result<T, QuizError>, ok: impl FnOnce(T) -> ServerWsMessage) -> ServerWsMessage {
  match res {
    Ok(v) => ok(v),
    Err(e) => ServerWsMessage::Error { message: e.to_string() },
  }
}

#[instrument(level = "info", skip(msg, state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Login { user, password } => {
      or_error(logic::login(state, &user, &password).await, |session| {
        info!(target: "quiz", user = %session.user, "WS login");
        ServerWsMessage::Session { session }
      })
    }

    ClientWsMessage::Logout { session_id } => {
      let ok = logic::logout(state, &session_id).await;
      ServerWsMessage::LoggedOut { ok }
    }

    ClientWsMessage::Lessons => {
      or_error(logic::lessons(state).await, |lessons| ServerWsMessage::Lessons { lessons })
    }

    ClientWsMessage::NextQuestion { session_id, lesson, policy, refresh } => {
      let res = logic::next_question(state, &session_id, lesson, policy, refresh).await;
      or_error(res, |question| ServerWsMessage::Question { question })
    }

    ClientWsMessage::SubmitAnswer { session_id, choice } => {
      let res = logic::submit_answer(state, &session_id, &choice).await;
      or_error(res, |result| {
        info!(target: "quiz", correct = result.correct, "WS answer evaluated");
        ServerWsMessage::AnswerResult { result }
      })
    }

    ClientWsMessage::Summary { session_id } => {
      or_error(logic::summary(state, &session_id).await, |summary| ServerWsMessage::Summary { summary })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::logic::tests::{test_state, SHEET};
  use crate::progress::MemoryStore;
  use tempfile::TempDir;

  #[tokio::test]
  async fn ws_messages_drive_a_quiz_round() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, SHEET, Arc::new(MemoryStore::new()));

    let login: ClientWsMessage = serde_json::from_str(r#"{"type":"login","user":"Guest"}"#).unwrap();
    let session = match handle_client_ws(login, &state).await {
      ServerWsMessage::Session { session } => session,
      other => panic!("unexpected reply: {:?}", other),
    };

    let next = serde_json::json!({ "type": "next_question", "sessionId": session.session_id, "policy": "by_lesson" });
    let next: ClientWsMessage = serde_json::from_value(next).unwrap();
    let question = match handle_client_ws(next, &state).await {
      ServerWsMessage::Question { question } => question,
      other => panic!("unexpected reply: {:?}", other),
    };
    assert_eq!(question.choices.len(), 4);

    let answer = ClientWsMessage::SubmitAnswer { session_id: session.session_id.clone(), choice: question.choices[0].clone() };
    assert!(matches!(handle_client_ws(answer, &state).await, ServerWsMessage::AnswerResult { .. }));

    let summary = ClientWsMessage::Summary { session_id: session.session_id.clone() };
    match handle_client_ws(summary, &state).await {
      ServerWsMessage::Summary { summary } => assert_eq!(summary.completed, 1),
      other => panic!("unexpected reply: {:?}", other),
    }
  }

  #[tokio::test]
  async fn ws_errors_become_error_frames() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, SHEET, Arc::new(MemoryStore::new()));
    let msg = ClientWsMessage::SubmitAnswer { session_id: "nope".into(), choice: "run".into() };
    match handle_client_ws(msg, &state).await {
      ServerWsMessage::Error { message } => assert_eq!(message, "unknown or expired session"),
      other => panic!("unexpected reply: {:?}", other),
    }
  }

  #[test]
  fn login_debug_output_hides_password() {
    let msg = ClientWsMessage::Login { user: "Faeng".into(), password: "36912".into() };
    assert!(!redact(&msg).contains("36912"));
  }
}
