//! The conversation state machine.
//!
//! One exchange is in flight at a time: `begin_send` appends the user message
//! optimistically and hands back a [`PendingExchange`]; the caller performs
//! the request and feeds the result to `complete_send`, which decodes it,
//! appends the bot side and drives the overlay. Splitting the two lets the
//! event loop keep running (and the user switch conversations) while the
//! request is outstanding.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{Backend, HistoryEntry};
use crate::error::ClientError;
use crate::models::{Message, OverlayKind, ResumeCompletion, ResumeMode};
use crate::overlay::OverlayManager;
use crate::protocol::{ChatReply, decode_chat_response};
use crate::session::{HistoryRequest, LoadPlan, LoadStatus, SessionStore, SessionTicket};

pub const INVALID_BOT_RESPONSE: &str = "⚠️ Bot did not return a valid response.";
pub const CHAT_FAILED: &str = "❌ There was an issue. Please try again later.";
pub const RESUME_PROCESSING_FAILED: &str =
    "⚠️ There was an issue processing your resume. Please try again.";

pub fn resume_ready_text(download_url: &str) -> String {
    format!(
        "Your resume is ready! Download it here: [Resume Download]({})",
        download_url
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExchange {
    ticket: SessionTicket,
    pub query: String,
    pub user_id: String,
}

/// Sent to the session list when the backend opens a new conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub session_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Applied { new_session: Option<NewSession> },
    /// The conversation changed while the request was out.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeEnrichment {
    ticket: SessionTicket,
    pub resume_id: i64,
}

#[derive(Debug, Default)]
pub struct ConversationController {
    store: SessionStore,
    input: String,
    awaiting_reply: bool,
}

impl ConversationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &SessionStore {
        &self.store
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    // --- Input buffer ---

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn push_input(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn pop_input(&mut self) {
        self.input.pop();
    }

    // --- Session lifecycle ---

    /// Switches conversation. Any exchange in flight for the previous one is
    /// orphaned and its reply will be discarded.
    pub fn load_session(&mut self, session_id: Option<&str>) -> LoadPlan {
        let plan = self.store.load_session(session_id);
        if plan != LoadPlan::Unchanged {
            self.awaiting_reply = false;
        }
        plan
    }

    pub fn finish_load(
        &mut self,
        request: &HistoryRequest,
        result: Result<Vec<HistoryEntry>, ClientError>,
    ) -> bool {
        self.store.finish_load(request, result)
    }

    /// Runs a full `load_session` against the backend.
    pub async fn load_session_from(&mut self, session_id: Option<&str>, backend: &dyn Backend) -> LoadPlan {
        let plan = self.load_session(session_id);
        if let LoadPlan::Fetch(request) = &plan {
            let result = backend.fetch_session_history(&request.session_id).await;
            self.finish_load(request, result);
        }
        plan
    }

    pub fn reset(&mut self) {
        self.store.reset();
        self.input.clear();
        self.awaiting_reply = false;
    }

    // --- Exchanges ---

    /// Starts an exchange. Returns `None` (and changes nothing) for blank
    /// text, while a reply is still pending or while history is loading.
    pub fn begin_send(&mut self, text: &str, user_id: &str) -> Option<PendingExchange> {
        if text.trim().is_empty() {
            return None;
        }
        if self.awaiting_reply {
            debug!("send rejected, reply still pending");
            return None;
        }
        if self.store.status() == LoadStatus::Loading {
            debug!("send rejected, history still loading");
            return None;
        }

        self.store.append_message(Message::user(text));
        self.input.clear();
        self.awaiting_reply = true;

        Some(PendingExchange {
            ticket: self.store.ticket(),
            query: text.to_string(),
            user_id: user_id.to_string(),
        })
    }

    pub fn complete_send(
        &mut self,
        pending: PendingExchange,
        result: Result<Value, ClientError>,
        overlays: &mut OverlayManager,
    ) -> ExchangeOutcome {
        if !self.store.is_current(pending.ticket) {
            debug!(query = %pending.query, "discarding reply for abandoned conversation");
            return ExchangeOutcome::Discarded;
        }

        let new_session = match result {
            Ok(raw) => self.apply_reply(&raw, &pending.query, overlays),
            Err(e) => {
                warn!(error = %e, "chat request failed");
                self.store.append_message(Message::bot(CHAT_FAILED));
                None
            }
        };

        self.awaiting_reply = false;
        ExchangeOutcome::Applied { new_session }
    }

    fn apply_reply(&mut self, raw: &Value, query: &str, overlays: &mut OverlayManager) -> Option<NewSession> {
        let decoded = decode_chat_response(raw);

        let message = match decoded.reply {
            ChatReply::WithJobResults { text, jobs } => {
                debug!(count = jobs.len(), "reply carries job results");
                Message::bot(text).with_jobs(jobs)
            }
            ChatReply::TriggersResumeForm { text } => {
                let kind = OverlayKind::ResumeBuilder(ResumeMode::Create);
                overlays.show(kind);
                Message::bot(text).with_overlay(kind)
            }
            ChatReply::PlainText { text } => Message::bot(text),
            ChatReply::Malformed => {
                warn!("chat reply had no usable response text");
                Message::bot(INVALID_BOT_RESPONSE)
            }
        };
        self.store.append_message(message);

        let assignment = decoded.session?;
        if !self.store.adopt_assigned_session_id(&assignment.session_id) {
            return None;
        }
        let title = assignment.title.unwrap_or_else(|| query.to_string());
        info!(session_id = %assignment.session_id, %title, "new session started");
        Some(NewSession {
            session_id: assignment.session_id,
            title,
        })
    }

    /// Runs a whole exchange against the backend; `None` if the send was rejected.
    pub async fn send_user_message(
        &mut self,
        text: &str,
        user_id: &str,
        backend: &dyn Backend,
        overlays: &mut OverlayManager,
    ) -> Option<ExchangeOutcome> {
        let pending = self.begin_send(text, user_id)?;
        let result = backend.send_chat(&pending.query, &pending.user_id).await;
        Some(self.complete_send(pending, result, overlays))
    }

    // --- Resume builder completion ---

    /// Posts the download link into the conversation `ticket` was taken from;
    /// if that conversation is gone the link is not posted. Closes the builder
    /// right away unless there is a resume id to enrich, in which case the
    /// caller fetches the detail and reports through `finish_resume_enrichment`.
    pub fn on_resume_complete(
        &mut self,
        ticket: SessionTicket,
        completion: &ResumeCompletion,
        overlays: &mut OverlayManager,
    ) -> Option<ResumeEnrichment> {
        if self.store.is_current(ticket) {
            self.store
                .append_message(Message::bot(resume_ready_text(&completion.download_url)));
        } else {
            debug!("conversation changed during resume submission, link not posted");
        }

        match completion.resume_id {
            Some(resume_id) => Some(ResumeEnrichment { ticket, resume_id }),
            None => {
                overlays.close_resume_builder();
                None
            }
        }
    }

    pub fn finish_resume_enrichment(
        &mut self,
        enrichment: &ResumeEnrichment,
        result: Result<Value, ClientError>,
        overlays: &mut OverlayManager,
    ) {
        match result {
            Ok(_) => debug!(resume_id = enrichment.resume_id, "resume detail fetched"),
            Err(e) => {
                warn!(resume_id = enrichment.resume_id, error = %e, "resume enrichment failed");
                if self.store.is_current(enrichment.ticket) {
                    self.store.append_message(Message::bot(RESUME_PROCESSING_FAILED));
                }
            }
        }
        overlays.close_resume_builder();
    }

    pub async fn complete_resume(
        &mut self,
        completion: &ResumeCompletion,
        backend: &dyn Backend,
        overlays: &mut OverlayManager,
    ) {
        let ticket = self.store.ticket();
        if let Some(enrichment) = self.on_resume_complete(ticket, completion, overlays) {
            let result = backend.fetch_resume(enrichment.resume_id).await;
            self.finish_resume_enrichment(&enrichment, result, overlays);
        }
    }
}
