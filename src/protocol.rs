//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::Policy;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Login {
        user: String,
        #[serde(default)]
        password: String,
    },
    Logout {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Lessons,
    NextQuestion {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(default)]
        lesson: Option<String>,
        #[serde(default)]
        policy: Option<Policy>,
        #[serde(default)]
        refresh: bool,
    },
    SubmitAnswer {
        #[serde(rename = "sessionId")]
        session_id: String,
        choice: String,
    },
    Summary {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: SessionOut,
    },
    LoggedOut {
        ok: bool,
    },
    Lessons {
        lessons: Vec<String>,
    },
    Question {
        question: QuestionOut,
    },
    AnswerResult {
        result: AnswerOut,
    },
    Summary {
        summary: SummaryOut,
    },
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs (also embedded in WS replies)
//

#[derive(Debug, Deserialize)]
pub struct LoginIn {
    pub user: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub session_id: String,
    pub user: String,
    pub persistent: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutOut {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct QuestionIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(default)]
    pub lesson: Option<String>,
    #[serde(default)]
    pub policy: Option<Policy>,
    /// Refetch the sheet instead of using the cached copy.
    #[serde(default)]
    pub refresh: bool,
}

/// A question as shown to the player; the answer stays on the server.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOut {
    pub item_id: String,
    pub prompt: String,
    pub lesson: String,
    pub choices: Vec<String>,
    pub lesson_filter: String,
    pub policy: Policy,
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    /// Set when saved progress could not be read and was reset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub choice: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOut {
    pub correct: bool,
    pub expected: String,
    pub explanation: String,
    pub correct_count: u32,
    pub wrong_count: u32,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryOut {
    pub total: usize,
    pub completed: usize,
    pub remaining: usize,
    pub total_correct: u64,
    pub total_wrong: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LessonsOut {
    pub lessons: Vec<String>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}
