//! Root state owner.
//!
//! `App` holds every component and is the only place backend results are
//! applied. Requests run as spawned tasks that report back with an
//! [`AppEvent`]; the front-end feeds each event to [`App::handle_event`] on
//! the main task, so no two mutations ever interleave.

use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::api::{AuthUser, Backend, HistoryEntry, SaveJobRequest};
use crate::controller::{
    ConversationController, ExchangeOutcome, NewSession, PendingExchange, ResumeEnrichment, resume_ready_text,
};
use crate::dashboard::{Dashboard, RenameRequest};
use crate::error::ClientError;
use crate::identity::{AddressBar, IdentityResolver, Resolution, ScheduledTask};
use crate::models::{
    AuthMode, DashboardData, Identity, JobResult, ResumeCompletion, ResumeForm, ResumeMode, ResumeSubmission,
};
use crate::overlay::OverlayManager;
use crate::session::{HistoryRequest, LoadPlan, SessionTicket};
use crate::storage::IdentityStore;
use crate::voice::{SPEECH_UNSUPPORTED, SpeechRecognizer, VoiceEvent, VoiceInputAdapter, VoiceSink, VoiceToggle};

pub const LOGIN_REQUIRED: &str = "Please log in to continue.";
pub const AUTH_FIELDS_MISSING: &str = "Please fill in all fields.";
pub const AUTH_FAILED: &str = "Authentication failed";
pub const AUTH_UNREACHABLE: &str = "Something went wrong. Try again.";
pub const RESUME_SUBMIT_FAILED: &str = "Failed to generate resume. Please try again.";

#[derive(Debug)]
pub enum AppEvent {
    AuthPromptDue,
    AuthCompleted {
        email: String,
        result: Result<AuthUser, ClientError>,
    },
    HistoryLoaded {
        request: HistoryRequest,
        result: Result<Vec<HistoryEntry>, ClientError>,
    },
    ChatReplied {
        pending: PendingExchange,
        result: Result<Value, ClientError>,
    },
    ResumeSubmitted {
        ticket: SessionTicket,
        result: Result<ResumeSubmission, ClientError>,
    },
    ResumeEnriched {
        enrichment: ResumeEnrichment,
        result: Result<Value, ClientError>,
    },
    Voice {
        capture_id: u64,
        event: VoiceEvent,
    },
    DashboardLoaded {
        user_id: String,
        result: Result<DashboardData, ClientError>,
    },
    JobSaved {
        request: SaveJobRequest,
        result: Result<(), ClientError>,
    },
    SavedJobDeleted {
        job_id: i64,
        result: Result<(), ClientError>,
    },
    DocumentRenamed {
        request: RenameRequest,
        result: Result<(), ClientError>,
    },
    DocumentDeleted {
        document_id: i64,
        result: Result<(), ClientError>,
    },
}

pub struct App {
    backend: Arc<dyn Backend>,
    events: UnboundedSender<AppEvent>,
    identities: IdentityStore,
    conversation: ConversationController,
    overlays: OverlayManager,
    voice: VoiceInputAdapter,
    dashboard: Dashboard,
    /// Conversations started this run, newest first.
    sessions: Vec<NewSession>,
    notices: VecDeque<String>,
    auth_prompt: Option<ScheduledTask>,
    auth_prompt_delay: Duration,
    auth_in_flight: bool,
    resume_in_flight: bool,
}

impl App {
    pub fn new(
        backend: Arc<dyn Backend>,
        identities: IdentityStore,
        recognizer: Box<dyn SpeechRecognizer>,
        auth_prompt_delay: Duration,
    ) -> (Self, UnboundedReceiver<AppEvent>) {
        let (events, rx) = mpsc::unbounded_channel();

        let voice_events = events.clone();
        let sink: VoiceSink = Arc::new(move |capture_id, event| {
            let _ = voice_events.send(AppEvent::Voice { capture_id, event });
        });

        let app = Self {
            backend,
            events,
            identities,
            conversation: ConversationController::new(),
            overlays: OverlayManager::new(),
            voice: VoiceInputAdapter::new(recognizer, sink),
            dashboard: Dashboard::new(),
            sessions: Vec::new(),
            notices: VecDeque::new(),
            auth_prompt: None,
            auth_prompt_delay,
            auth_in_flight: false,
            resume_in_flight: false,
        };
        (app, rx)
    }

    // --- Accessors ---

    pub fn identity(&self) -> Option<&Identity> {
        self.identities.current()
    }

    pub fn identities(&self) -> &IdentityStore {
        &self.identities
    }

    pub fn conversation(&self) -> &ConversationController {
        &self.conversation
    }

    pub fn overlays(&self) -> &OverlayManager {
        &self.overlays
    }

    pub fn voice(&self) -> &VoiceInputAdapter {
        &self.voice
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn sessions(&self) -> &[NewSession] {
        &self.sessions
    }

    pub fn notices(&self) -> &VecDeque<String> {
        &self.notices
    }

    pub fn push_notice(&mut self, notice: impl Into<String>) {
        self.notices.push_back(notice.into());
    }

    pub fn dismiss_notice(&mut self) {
        self.notices.pop_front();
    }

    pub fn is_auth_prompt_pending(&self) -> bool {
        self.auth_prompt.as_ref().is_some_and(ScheduledTask::is_pending)
    }

    pub fn is_auth_in_flight(&self) -> bool {
        self.auth_in_flight
    }

    pub fn is_resume_in_flight(&self) -> bool {
        self.resume_in_flight
    }

    pub fn push_input(&mut self, c: char) {
        self.conversation.push_input(c);
    }

    pub fn pop_input(&mut self) {
        self.conversation.pop_input();
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.conversation.set_input(text);
    }

    // --- Boot ---

    /// Resolves identity once and schedules the login prompt when nobody is
    /// signed in.
    pub fn bootstrap(&mut self, address: &mut dyn AddressBar) -> Resolution {
        let resolution = IdentityResolver::resolve(address, &mut self.identities);
        if resolution.needs_auth_prompt() {
            self.schedule_auth_prompt();
        }
        resolution
    }

    fn schedule_auth_prompt(&mut self) {
        let events = self.events.clone();
        debug!(delay = ?self.auth_prompt_delay, "scheduling auth prompt");
        self.auth_prompt = Some(ScheduledTask::after(self.auth_prompt_delay, async move {
            let _ = events.send(AppEvent::AuthPromptDue);
        }));
    }

    fn cancel_auth_prompt(&mut self) {
        if let Some(mut task) = self.auth_prompt.take() {
            task.cancel();
        }
    }

    // --- Event application ---

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::AuthPromptDue => {
                self.auth_prompt = None;
                if self.identities.is_set() {
                    debug!("auth prompt skipped, already signed in");
                } else {
                    self.overlays.show_auth(AuthMode::Login);
                }
            }
            AppEvent::AuthCompleted { email, result } => self.finish_auth(&email, result),
            AppEvent::HistoryLoaded { request, result } => {
                self.conversation.finish_load(&request, result);
            }
            AppEvent::ChatReplied { pending, result } => {
                let outcome = self.conversation.complete_send(pending, result, &mut self.overlays);
                if let ExchangeOutcome::Applied {
                    new_session: Some(session),
                } = outcome
                {
                    self.record_session(session);
                }
            }
            AppEvent::ResumeSubmitted { ticket, result } => self.finish_resume_submit(ticket, result),
            AppEvent::ResumeEnriched { enrichment, result } => {
                self.conversation
                    .finish_resume_enrichment(&enrichment, result, &mut self.overlays);
            }
            AppEvent::Voice { capture_id, event } => {
                if let Some(transcript) = self.voice.handle_event(capture_id, event) {
                    self.conversation.set_input(transcript);
                }
            }
            AppEvent::DashboardLoaded { user_id, result } => {
                if self.user_id().as_deref() != Some(user_id.as_str()) {
                    debug!(%user_id, "dropping dashboard for signed-out user");
                    return;
                }
                let notice = self.dashboard.apply_refresh(result);
                self.notify(notice);
            }
            AppEvent::JobSaved { request, result } => {
                let saved = result.is_ok();
                let notice = self.dashboard.finish_save(&request, result);
                self.notify(notice);
                if saved && self.dashboard.data().is_some() {
                    self.refresh_dashboard();
                }
            }
            AppEvent::SavedJobDeleted { job_id, result } => {
                let notice = self.dashboard.finish_delete_saved_job(job_id, result);
                self.notify(notice);
            }
            AppEvent::DocumentRenamed { request, result } => {
                let notice = self.dashboard.finish_rename(&request, result);
                self.notify(notice);
            }
            AppEvent::DocumentDeleted { document_id, result } => {
                let notice = self.dashboard.finish_delete_document(document_id, result);
                self.notify(notice);
            }
        }
    }

    // --- Authentication ---

    pub fn show_auth(&mut self, mode: AuthMode) {
        self.overlays.show_auth(mode);
    }

    pub fn submit_auth(&mut self, mode: AuthMode, name: &str, email: &str) {
        let name = name.trim().to_string();
        let email = email.trim().to_string();
        if email.is_empty() || (mode == AuthMode::Signup && name.is_empty()) {
            self.notify(Some(AUTH_FIELDS_MISSING));
            return;
        }
        if self.auth_in_flight {
            return;
        }
        self.auth_in_flight = true;

        self.spawn(move |backend| async move {
            let result = match mode {
                AuthMode::Login => backend.login(&email).await,
                AuthMode::Signup => backend.signup(&name, &email).await,
            };
            AppEvent::AuthCompleted { email, result }
        });
    }

    fn finish_auth(&mut self, email: &str, result: Result<AuthUser, ClientError>) {
        if !self.auth_in_flight {
            debug!("dropping auth result nobody is waiting for");
            return;
        }
        self.auth_in_flight = false;

        match result {
            Ok(user) => {
                let identity = Identity::from_full_name(&user.user_id, &user.name, email);
                info!(user_id = %identity.user_id, "signed in");
                self.identities.set(identity);
                self.cancel_auth_prompt();
                self.overlays.close_auth();
            }
            Err(ClientError::Rejected(detail)) => {
                warn!(%detail, "authentication rejected");
                let detail = if detail.is_empty() { AUTH_FAILED.to_string() } else { detail };
                self.notices.push_back(detail);
            }
            Err(e) => {
                warn!(error = %e, "authentication request failed");
                self.notify(Some(AUTH_UNREACHABLE));
            }
        }
    }

    /// Clears identity everywhere and returns every component to its
    /// initial state.
    pub fn logout(&mut self) {
        info!("signing out");
        self.identities.clear();
        self.conversation.reset();
        self.overlays.reset();
        self.voice.shutdown();
        self.dashboard.clear();
        self.sessions.clear();
        self.cancel_auth_prompt();
        self.auth_in_flight = false;
        self.resume_in_flight = false;
    }

    // --- Conversation ---

    /// Sends the current input buffer.
    pub fn send_input(&mut self) -> bool {
        let text = self.conversation.input().to_string();
        self.send(&text)
    }

    pub fn send(&mut self, text: &str) -> bool {
        let Some(user_id) = self.require_identity() else {
            return false;
        };
        let Some(pending) = self.conversation.begin_send(text, &user_id) else {
            return false;
        };
        self.spawn(move |backend| async move {
            let result = backend.send_chat(&pending.query, &pending.user_id).await;
            AppEvent::ChatReplied { pending, result }
        });
        true
    }

    pub fn switch_session(&mut self, session_id: Option<&str>) {
        if self.require_identity().is_none() {
            return;
        }
        if let LoadPlan::Fetch(request) = self.conversation.load_session(session_id) {
            self.spawn(move |backend| async move {
                let result = backend.fetch_session_history(&request.session_id).await;
                AppEvent::HistoryLoaded { request, result }
            });
        }
    }

    pub fn new_chat(&mut self) {
        self.switch_session(None);
    }

    fn record_session(&mut self, session: NewSession) {
        if self.sessions.iter().any(|s| s.session_id == session.session_id) {
            return;
        }
        self.sessions.insert(0, session);
    }

    // --- Resume builder ---

    pub fn open_resume_builder(&mut self, mode: ResumeMode) {
        if self.require_identity().is_some() {
            self.overlays.show_resume_builder(mode);
        }
    }

    pub fn close_overlay(&mut self) {
        self.overlays.close_current();
    }

    pub fn submit_resume(&mut self, form: ResumeForm) {
        let Some(user_id) = self.require_identity() else {
            return;
        };
        if self.resume_in_flight {
            return;
        }
        self.resume_in_flight = true;
        let form = form.cleaned(&user_id);
        let ticket = self.conversation.session().ticket();
        self.spawn(move |backend| async move {
            let result = backend.submit_resume(&form).await;
            AppEvent::ResumeSubmitted { ticket, result }
        });
    }

    fn finish_resume_submit(&mut self, ticket: SessionTicket, result: Result<ResumeSubmission, ClientError>) {
        if !self.resume_in_flight {
            debug!("dropping resume result nobody is waiting for");
            return;
        }
        self.resume_in_flight = false;

        match result {
            Ok(submission) if submission.success => {
                let completion = ResumeCompletion {
                    download_url: submission.download_url,
                    resume_id: submission.resume_id,
                };
                if !self.conversation.session().is_current(ticket) {
                    // The chat it belongs to is gone, keep the link reachable
                    self.notices.push_back(resume_ready_text(&completion.download_url));
                }
                let enrichment = self
                    .conversation
                    .on_resume_complete(ticket, &completion, &mut self.overlays);
                if let Some(enrichment) = enrichment {
                    self.spawn(move |backend| async move {
                        let result = backend.fetch_resume(enrichment.resume_id).await;
                        AppEvent::ResumeEnriched { enrichment, result }
                    });
                }
            }
            Ok(submission) => {
                warn!(message = %submission.message, "resume generation unsuccessful");
                let message = if submission.message.is_empty() {
                    RESUME_SUBMIT_FAILED.to_string()
                } else {
                    submission.message
                };
                self.notices.push_back(message);
            }
            Err(e) => {
                warn!(error = %e, "resume submission failed");
                let message = e.user_detail().unwrap_or(RESUME_SUBMIT_FAILED).to_string();
                self.notices.push_back(message);
            }
        }
    }

    // --- Voice ---

    pub fn toggle_voice(&mut self) -> VoiceToggle {
        let toggle = self.voice.toggle();
        if toggle == VoiceToggle::Unavailable {
            self.notify(Some(SPEECH_UNSUPPORTED));
        }
        toggle
    }

    // --- Dashboard ---

    pub fn refresh_dashboard(&mut self) {
        let Some(user_id) = self.user_id() else {
            return;
        };
        self.spawn(move |backend| async move {
            let result = backend.fetch_dashboard(&user_id).await;
            AppEvent::DashboardLoaded { user_id, result }
        });
    }

    pub fn save_job(&mut self, job: &JobResult) {
        let Some(user_id) = self.require_identity() else {
            return;
        };
        let Some(request) = self.dashboard.begin_save(job) else {
            return;
        };
        self.spawn(move |backend| async move {
            let result = backend.save_job(&user_id, &request).await;
            AppEvent::JobSaved { request, result }
        });
    }

    pub fn delete_saved_job(&mut self, job_id: i64) {
        let Some(user_id) = self.require_identity() else {
            return;
        };
        self.spawn(move |backend| async move {
            let result = backend.delete_saved_job(&user_id, job_id).await;
            AppEvent::SavedJobDeleted { job_id, result }
        });
    }

    pub fn rename_document(&mut self, document_id: i64, new_name: &str) {
        let Some(user_id) = self.require_identity() else {
            return;
        };
        let Some(request) = self.dashboard.begin_rename(document_id, new_name) else {
            return;
        };
        self.spawn(move |backend| async move {
            let result = backend
                .rename_resume(&user_id, request.document_id, &request.new_name)
                .await;
            AppEvent::DocumentRenamed { request, result }
        });
    }

    pub fn delete_document(&mut self, document_id: i64) {
        let Some(user_id) = self.require_identity() else {
            return;
        };
        self.spawn(move |backend| async move {
            let result = backend.delete_resume(&user_id, document_id).await;
            AppEvent::DocumentDeleted { document_id, result }
        });
    }

    // --- Helpers ---

    fn user_id(&self) -> Option<String> {
        self.identities.current().map(|identity| identity.user_id.clone())
    }

    /// The signed-in user id, or `None` after asking the user to log in.
    fn require_identity(&mut self) -> Option<String> {
        let user_id = self.user_id();
        if user_id.is_none() {
            self.overlays.show_auth(AuthMode::Login);
            self.notify(Some(LOGIN_REQUIRED));
        }
        user_id
    }

    fn notify(&mut self, notice: Option<&str>) {
        if let Some(notice) = notice {
            self.notices.push_back(notice.to_string());
        }
    }

    fn spawn<F, Fut>(&self, request: F)
    where
        F: FnOnce(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = AppEvent> + Send + 'static,
    {
        let task = request(Arc::clone(&self.backend));
        let events = self.events.clone();
        tokio::spawn(async move {
            if events.send(task.await).is_err() {
                debug!("event loop closed, dropping result");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LaunchAddress;
    use crate::models::{PersonalInfo, Sender};
    use crate::overlay::OverlayState;
    use crate::storage::{IDENTITY_KEY, KeyValueStore, MemoryStore};
    use crate::test_support::FakeBackend;
    use crate::voice::UnavailableRecognizer;
    use reqwest::Url;
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;

    const DELAY: Duration = Duration::from_secs(8);

    /// Yields a fixed transcript as soon as capture starts.
    struct EchoRecognizer(&'static str);

    impl SpeechRecognizer for EchoRecognizer {
        fn is_available(&self) -> bool {
            true
        }

        fn start(&mut self, capture_id: u64, sink: VoiceSink) -> crate::error::Result<()> {
            sink(capture_id, VoiceEvent::Transcript(self.0.to_string()));
            Ok(())
        }

        fn stop(&mut self) {}
    }

    fn app_with(backend: &Arc<FakeBackend>, store: MemoryStore) -> (App, UnboundedReceiver<AppEvent>) {
        App::new(
            backend.clone(),
            IdentityStore::new(Box::new(store)),
            Box::new(UnavailableRecognizer),
            DELAY,
        )
    }

    fn signed_in(backend: &Arc<FakeBackend>) -> (App, UnboundedReceiver<AppEvent>) {
        let mut store = MemoryStore::new();
        store
            .set(IDENTITY_KEY, r#"{"userId":"u1","name":"Jane","email":"j@x.com"}"#)
            .unwrap();
        let (mut app, rx) = app_with(backend, store);
        let resolution = app.bootstrap(&mut address("http://localhost/"));
        assert!(matches!(resolution, Resolution::Stored(_)));
        (app, rx)
    }

    fn address(raw: &str) -> LaunchAddress {
        LaunchAddress::new(Url::parse(raw).unwrap())
    }

    async fn pump(app: &mut App, rx: &mut UnboundedReceiver<AppEvent>) {
        let event = rx.recv().await.unwrap();
        app.handle_event(event);
    }

    #[tokio::test(start_paused = true)]
    async fn test_anonymous_boot_prompts_after_delay() {
        let backend = Arc::new(FakeBackend::new());
        let (mut app, mut rx) = app_with(&backend, MemoryStore::new());
        let started = tokio::time::Instant::now();

        assert_eq!(app.bootstrap(&mut address("http://localhost/")), Resolution::Anonymous);
        assert!(app.is_auth_prompt_pending());
        assert_eq!(app.overlays().state(), OverlayState::None);

        pump(&mut app, &mut rx).await;
        assert!(started.elapsed() >= DELAY);
        assert_eq!(app.overlays().state(), OverlayState::Auth(AuthMode::Login));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_identity_never_prompts() {
        let backend = Arc::new(FakeBackend::new());
        let (app, mut rx) = signed_in(&backend);
        tokio::time::sleep(DELAY * 3).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(app.identity().unwrap().display_name, "Jane");
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_boot_persists_and_skips_prompt() {
        let backend = Arc::new(FakeBackend::new());
        let (mut app, mut rx) = app_with(&backend, MemoryStore::new());
        let mut bar = address("http://localhost/?user_id=u7&name=Asha%20Rao&email=a@x.com");

        let resolution = app.bootstrap(&mut bar);
        assert!(matches!(resolution, Resolution::Redirect(_)));
        assert_eq!(bar.current().query(), None);
        assert!(app.identities().load_persisted().is_some());

        tokio::time::sleep(DELAY * 2).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_during_delay_cancels_prompt() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_auth_user("u1", "Jane Doe");
        let (mut app, mut rx) = app_with(&backend, MemoryStore::new());
        app.bootstrap(&mut address("http://localhost/"));

        app.show_auth(AuthMode::Login);
        app.submit_auth(AuthMode::Login, "", "j@x.com");
        pump(&mut app, &mut rx).await;

        let identity = app.identity().unwrap();
        assert_eq!(identity.user_id, "u1");
        assert_eq!(identity.display_name, "Jane");
        assert_eq!(app.identities().load_persisted(), Some(identity.clone()));
        assert_eq!(app.overlays().state(), OverlayState::None);
        assert!(!app.is_auth_prompt_pending());

        tokio::time::sleep(DELAY * 2).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_rejected_login_keeps_overlay_open() {
        let backend = Arc::new(FakeBackend::new());
        let (mut app, mut rx) = app_with(&backend, MemoryStore::new());
        app.show_auth(AuthMode::Login);

        app.submit_auth(AuthMode::Login, "", "nobody@x.com");
        pump(&mut app, &mut rx).await;

        assert!(app.identity().is_none());
        assert_eq!(app.overlays().state(), OverlayState::Auth(AuthMode::Login));
        assert_eq!(app.notices().back().map(String::as_str), Some("User not found"));
    }

    #[tokio::test]
    async fn test_signup_requires_name() {
        let backend = Arc::new(FakeBackend::new());
        let (mut app, _rx) = app_with(&backend, MemoryStore::new());
        app.submit_auth(AuthMode::Signup, "  ", "j@x.com");
        assert_eq!(app.notices().back().map(String::as_str), Some(AUTH_FIELDS_MISSING));
        assert!(!app.is_auth_in_flight());
        assert_eq!(backend.calls_starting_with("signup:"), 0);
    }

    #[tokio::test]
    async fn test_chat_is_gated_on_identity() {
        let backend = Arc::new(FakeBackend::new());
        let (mut app, _rx) = app_with(&backend, MemoryStore::new());

        assert!(!app.send("hello"));
        assert!(app.conversation().messages().is_empty());
        assert_eq!(app.overlays().state(), OverlayState::Auth(AuthMode::Login));
        assert_eq!(app.notices().back().map(String::as_str), Some(LOGIN_REQUIRED));
        assert_eq!(backend.calls_starting_with("chat:"), 0);
    }

    #[tokio::test]
    async fn test_chat_round_trip_records_new_session() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_chat_reply(json!({"response": "Hi Jane", "session_id": "s1"}));
        let (mut app, mut rx) = signed_in(&backend);

        app.set_input("hello");
        assert!(app.send_input());
        assert!(app.conversation().is_awaiting_reply());
        assert_eq!(app.conversation().input(), "");
        pump(&mut app, &mut rx).await;

        let messages = app.conversation().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].sender, Sender::Bot);
        assert_eq!(
            app.sessions(),
            &[NewSession {
                session_id: "s1".into(),
                title: "hello".into()
            }]
        );
        assert_eq!(backend.calls_starting_with("chat:u1:hello"), 1);
    }

    #[tokio::test]
    async fn test_switch_discards_in_flight_reply() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_chat_reply(json!({"response": "late", "session_id": "s-old"}));
        backend.set_history("s2", Some(vec![("user", "earlier"), ("bot", "answer")]));
        let (mut app, mut rx) = signed_in(&backend);

        assert!(app.send("question"));
        app.switch_session(Some("s2"));
        pump(&mut app, &mut rx).await;
        pump(&mut app, &mut rx).await;

        let texts: Vec<&str> = app.conversation().messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["earlier", "answer"]);
        assert!(app.sessions().is_empty());
        assert!(!app.conversation().is_awaiting_reply());
    }

    #[tokio::test]
    async fn test_send_waits_for_history_load() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_history("s1", Some(vec![("bot", "old")]));
        backend.push_chat_reply(json!({"response": "answer"}));
        let (mut app, mut rx) = signed_in(&backend);

        app.switch_session(Some("s1"));
        app.set_input("my question");
        assert!(!app.send_input());
        assert_eq!(app.conversation().input(), "my question");

        pump(&mut app, &mut rx).await;
        assert!(app.send_input());
        pump(&mut app, &mut rx).await;

        let texts: Vec<&str> = app.conversation().messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["old", "my question", "answer"]);
    }

    #[tokio::test]
    async fn test_resume_link_after_switch_becomes_notice() {
        let backend = Arc::new(FakeBackend::new());
        *backend.resume_submission.lock().unwrap() = Some(ResumeSubmission {
            success: true,
            resume_id: None,
            download_url: "https://files.example/9.pdf".into(),
            template_used: None,
            message: "ok".into(),
        });
        backend.set_history("s2", Some(vec![("user", "earlier")]));
        let (mut app, mut rx) = signed_in(&backend);
        app.open_resume_builder(ResumeMode::Create);

        app.submit_resume(ResumeForm {
            user_id: String::new(),
            personal_info: PersonalInfo::default(),
            professional_summary: String::new(),
            skills: vec![],
            work_experience: vec![],
            education: vec![],
            projects: vec![],
            certifications: vec![],
            template: "professional".into(),
        });
        app.switch_session(Some("s2"));
        pump(&mut app, &mut rx).await;
        pump(&mut app, &mut rx).await;

        let texts: Vec<&str> = app.conversation().messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["earlier"]);
        let link = resume_ready_text("https://files.example/9.pdf");
        assert_eq!(app.notices().back(), Some(&link));
        assert_eq!(app.overlays().state(), OverlayState::None);
    }

    #[tokio::test]
    async fn test_logout_resets_everything() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_chat_reply(json!({"response": "Let's build it", "action": "open_resume_form", "session_id": "s1"}));
        let (mut app, mut rx) = signed_in(&backend);

        app.send("resume please");
        pump(&mut app, &mut rx).await;
        assert_eq!(app.overlays().state(), OverlayState::ResumeBuilder(ResumeMode::Create));

        app.logout();
        assert!(app.identity().is_none());
        assert_eq!(app.identities().storage().get(IDENTITY_KEY).unwrap(), None);
        assert!(app.conversation().messages().is_empty());
        assert_eq!(app.conversation().session().session_id(), None);
        assert_eq!(app.overlays().state(), OverlayState::None);
        assert!(app.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_resume_submission_posts_link_and_closes_builder() {
        let backend = Arc::new(FakeBackend::new());
        *backend.resume_submission.lock().unwrap() = Some(ResumeSubmission {
            success: true,
            resume_id: Some(3),
            download_url: "https://files.example/3.pdf".into(),
            template_used: None,
            message: "ok".into(),
        });
        let (mut app, mut rx) = signed_in(&backend);
        app.open_resume_builder(ResumeMode::Create);

        app.submit_resume(ResumeForm {
            user_id: String::new(),
            personal_info: PersonalInfo {
                name: "Jane Doe".into(),
                email: "j@x.com".into(),
                ..Default::default()
            },
            professional_summary: String::new(),
            skills: vec!["SQL".into()],
            work_experience: vec![],
            education: vec![],
            projects: vec![],
            certifications: vec![],
            template: "professional".into(),
        });
        pump(&mut app, &mut rx).await;
        pump(&mut app, &mut rx).await;

        assert_eq!(backend.calls_starting_with("submit_resume:u1"), 1);
        assert_eq!(backend.calls_starting_with("resume:3"), 1);
        assert_eq!(
            app.conversation().messages().last().unwrap().text,
            resume_ready_text("https://files.example/3.pdf")
        );
        assert_eq!(app.overlays().state(), OverlayState::None);
    }

    #[tokio::test]
    async fn test_failed_resume_submission_keeps_builder_open() {
        let backend = Arc::new(FakeBackend::new());
        let (mut app, mut rx) = signed_in(&backend);
        app.open_resume_builder(ResumeMode::Create);

        app.submit_resume(ResumeForm {
            user_id: String::new(),
            personal_info: PersonalInfo::default(),
            professional_summary: String::new(),
            skills: vec![],
            work_experience: vec![],
            education: vec![],
            projects: vec![],
            certifications: vec![],
            template: "professional".into(),
        });
        pump(&mut app, &mut rx).await;

        assert_eq!(app.overlays().state(), OverlayState::ResumeBuilder(ResumeMode::Create));
        assert_eq!(app.notices().back().map(String::as_str), Some("generation failed"));
        assert!(app.conversation().messages().is_empty());
    }

    #[tokio::test]
    async fn test_voice_transcript_fills_input() {
        let backend = Arc::new(FakeBackend::new());
        let (mut app, mut rx) = App::new(
            backend.clone(),
            IdentityStore::new(Box::new(MemoryStore::new())),
            Box::new(EchoRecognizer("remote data jobs")),
            DELAY,
        );

        assert_eq!(app.toggle_voice(), VoiceToggle::Started);
        pump(&mut app, &mut rx).await;
        assert_eq!(app.conversation().input(), "remote data jobs");
        assert!(!app.voice().is_listening());
    }

    #[tokio::test]
    async fn test_voice_unavailable_shows_notice() {
        let backend = Arc::new(FakeBackend::new());
        let (mut app, _rx) = app_with(&backend, MemoryStore::new());
        assert_eq!(app.toggle_voice(), VoiceToggle::Unavailable);
        assert_eq!(app.notices().back().map(String::as_str), Some(SPEECH_UNSUPPORTED));
    }

    #[tokio::test]
    async fn test_saved_job_refreshes_loaded_dashboard() {
        let backend = Arc::new(FakeBackend::new());
        *backend.dashboard.lock().unwrap() = Some(DashboardData::default());
        let (mut app, mut rx) = signed_in(&backend);

        app.refresh_dashboard();
        pump(&mut app, &mut rx).await;
        assert!(app.dashboard().data().is_some());

        let job: JobResult = serde_json::from_value(json!({
            "title": "Analyst", "company": "Acme", "apply_link": "https://jobs.example/1"
        }))
        .unwrap();
        app.save_job(&job);
        app.save_job(&job);
        pump(&mut app, &mut rx).await;
        pump(&mut app, &mut rx).await;

        assert_eq!(backend.calls_starting_with("save_job:"), 1);
        assert_eq!(backend.calls_starting_with("dashboard:u1"), 2);
        assert!(app.dashboard().is_saved("https://jobs.example/1"));
        assert!(app.notices().is_empty());
    }
}
