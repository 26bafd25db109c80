//! The active conversation: its backend id and ordered message history.
//!
//! Every switch or reset bumps an epoch. Asynchronous work captures a
//! [`SessionTicket`] before suspending and is applied only if the ticket still
//! matches, which keeps replies for an abandoned conversation out of the new
//! one.

use tracing::{debug, warn};

use crate::api::HistoryEntry;
use crate::error::ClientError;
use crate::models::Message;

pub const SESSION_LOAD_FAILED: &str = "⚠️ Unable to load this chat session.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// New chat, nothing fetched.
    Fresh,
    Loading,
    Loaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub ticket: SessionTicket,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPlan {
    /// Already the current session; nothing to do.
    Unchanged,
    /// Switched to a fresh empty conversation.
    Cleared,
    /// History must be fetched and handed to [`SessionStore::finish_load`].
    Fetch(HistoryRequest),
}

#[derive(Debug)]
pub struct SessionStore {
    session_id: Option<String>,
    messages: Vec<Message>,
    status: LoadStatus,
    epoch: u64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            session_id: None,
            messages: Vec::new(),
            status: LoadStatus::Fresh,
            epoch: 0,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        !self.messages.is_empty() || self.status != LoadStatus::Fresh
    }

    pub fn ticket(&self) -> SessionTicket {
        SessionTicket { epoch: self.epoch }
    }

    pub fn is_current(&self, ticket: SessionTicket) -> bool {
        ticket.epoch == self.epoch
    }

    pub(crate) fn load_session(&mut self, session_id: Option<&str>) -> LoadPlan {
        match session_id {
            None => {
                self.reset();
                LoadPlan::Cleared
            }
            Some(id) if self.session_id.as_deref() == Some(id) => LoadPlan::Unchanged,
            Some(id) => {
                self.epoch += 1;
                self.session_id = Some(id.to_string());
                self.messages.clear();
                self.status = LoadStatus::Loading;
                debug!(session_id = id, "loading session history");
                LoadPlan::Fetch(HistoryRequest {
                    ticket: self.ticket(),
                    session_id: id.to_string(),
                })
            }
        }
    }

    /// Applies a history fetch. Returns `false` when the request is stale.
    pub(crate) fn finish_load(
        &mut self,
        request: &HistoryRequest,
        result: Result<Vec<HistoryEntry>, ClientError>,
    ) -> bool {
        if !self.is_current(request.ticket) {
            debug!(session_id = %request.session_id, "discarding stale history");
            return false;
        }
        self.messages = match result {
            Ok(entries) => entries
                .into_iter()
                .map(|entry| Message {
                    sender: entry.sender(),
                    text: entry.message,
                    job_results: None,
                    triggers_overlay: None,
                })
                .collect(),
            Err(e) => {
                warn!(session_id = %request.session_id, error = %e, "session history fetch failed");
                vec![Message::bot(SESSION_LOAD_FAILED)]
            }
        };
        self.status = LoadStatus::Loaded;
        true
    }

    pub(crate) fn append_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Records the id the backend assigned to a brand-new conversation.
    /// Returns `true` only the first time.
    pub(crate) fn adopt_assigned_session_id(&mut self, session_id: &str) -> bool {
        if self.session_id.is_some() {
            return false;
        }
        self.session_id = Some(session_id.to_string());
        self.status = LoadStatus::Loaded;
        true
    }

    pub(crate) fn reset(&mut self) {
        self.epoch += 1;
        self.session_id = None;
        self.messages.clear();
        self.status = LoadStatus::Fresh;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<HistoryEntry> {
        pairs
            .iter()
            .map(|(sender, message)| HistoryEntry {
                sender: sender.to_string(),
                message: message.to_string(),
            })
            .collect()
    }

    fn fetch_plan(plan: LoadPlan) -> HistoryRequest {
        match plan {
            LoadPlan::Fetch(request) => request,
            other => panic!("expected fetch, got {:?}", other),
        }
    }

    #[test]
    fn test_load_same_id_twice_is_noop() {
        let mut store = SessionStore::new();
        let request = fetch_plan(store.load_session(Some("s1")));
        assert_eq!(store.load_session(Some("s1")), LoadPlan::Unchanged);

        assert!(store.finish_load(&request, Ok(entries(&[("user", "hi"), ("bot", "hello")]))));
        assert_eq!(store.load_session(Some("s1")), LoadPlan::Unchanged);
        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.status(), LoadStatus::Loaded);
    }

    #[test]
    fn test_load_none_always_clears() {
        let mut store = SessionStore::new();
        let request = fetch_plan(store.load_session(Some("s1")));
        store.finish_load(&request, Ok(entries(&[("user", "hi")])));

        assert_eq!(store.load_session(None), LoadPlan::Cleared);
        assert!(store.messages().is_empty());
        assert_eq!(store.session_id(), None);
        assert_eq!(store.status(), LoadStatus::Fresh);
        assert_eq!(store.load_session(None), LoadPlan::Cleared);
        assert!(store.messages().is_empty());
    }

    #[test]
    fn test_failed_history_yields_notice_and_loaded() {
        let mut store = SessionStore::new();
        let request = fetch_plan(store.load_session(Some("s1")));
        assert!(store.finish_load(&request, Err(ClientError::status(500, "down"))));
        assert_eq!(store.messages(), &[Message::bot(SESSION_LOAD_FAILED)]);
        assert_eq!(store.status(), LoadStatus::Loaded);
        assert_eq!(store.session_id(), Some("s1"));
    }

    #[test]
    fn test_stale_history_is_discarded() {
        let mut store = SessionStore::new();
        let old = fetch_plan(store.load_session(Some("s1")));
        let new = fetch_plan(store.load_session(Some("s2")));

        assert!(!store.finish_load(&old, Ok(entries(&[("user", "from s1")]))));
        assert!(store.messages().is_empty());
        assert_eq!(store.status(), LoadStatus::Loading);

        assert!(store.finish_load(&new, Ok(entries(&[("user", "from s2")]))));
        assert_eq!(store.messages()[0].text, "from s2");
    }

    #[test]
    fn test_adopt_only_once() {
        let mut store = SessionStore::new();
        assert!(store.adopt_assigned_session_id("s1"));
        assert!(!store.adopt_assigned_session_id("s1"));
        assert!(!store.adopt_assigned_session_id("s2"));
        assert_eq!(store.session_id(), Some("s1"));
    }

    #[test]
    fn test_adopt_does_not_invalidate_tickets() {
        let mut store = SessionStore::new();
        let ticket = store.ticket();
        store.adopt_assigned_session_id("s1");
        assert!(store.is_current(ticket));
        store.reset();
        assert!(!store.is_current(ticket));
    }

    #[test]
    fn test_append_preserves_order() {
        let mut store = SessionStore::new();
        store.append_message(Message::user("one"));
        store.append_message(Message::bot("two"));
        store.append_message(Message::user("three"));
        let texts: Vec<&str> = store.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert!(store.is_active());
    }
}
