//! Decoding of the backend's loosely-typed chat reply.
//!
//! The `/chat/` endpoint answers with optional fields and a free-form
//! `action` string. Everything the controller needs is mapped here into a
//! closed set of variants so no other module looks at raw JSON.

use serde_json::Value;
use tracing::warn;

use crate::models::JobResult;

/// Action tag asking the client to open the resume builder.
pub const OPEN_RESUME_FORM: &str = "open_resume_form";

#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    PlainText { text: String },
    WithJobResults { text: String, jobs: Vec<JobResult> },
    TriggersResumeForm { text: String },
    /// No usable response text.
    Malformed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionAssignment {
    pub session_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReply {
    pub reply: ChatReply,
    pub session: Option<SessionAssignment>,
}

pub fn decode_chat_response(raw: &Value) -> DecodedReply {
    // A bare string body is treated as the reply text itself
    if let Value::String(text) = raw {
        let reply = if text.trim().is_empty() {
            ChatReply::Malformed
        } else {
            ChatReply::PlainText { text: text.clone() }
        };
        return DecodedReply { reply, session: None };
    }

    let text = non_empty_str(raw.get("response"));

    let reply = match text {
        None => ChatReply::Malformed,
        Some(text) => {
            if let Some(Value::Array(entries)) = raw.get("job_results") {
                ChatReply::WithJobResults {
                    text,
                    jobs: decode_jobs(entries),
                }
            } else if raw.get("action").and_then(Value::as_str) == Some(OPEN_RESUME_FORM) {
                ChatReply::TriggersResumeForm { text }
            } else {
                ChatReply::PlainText { text }
            }
        }
    };

    let session = session_id(raw.get("session_id")).map(|session_id| SessionAssignment {
        session_id,
        title: non_empty_str(raw.get("title")),
    });

    DecodedReply { reply, session }
}

fn decode_jobs(entries: &[Value]) -> Vec<JobResult> {
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<JobResult>(entry.clone()) {
            Ok(job) => Some(job),
            Err(e) => {
                warn!(error = %e, "dropping malformed job result");
                None
            }
        })
        .collect()
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn session_id(value: Option<&Value>) -> Option<String> {
    match value {
        // Numeric session ids show up from some backends
        Some(Value::Number(n)) => Some(n.to_string()),
        other => non_empty_str(other),
    }
}
