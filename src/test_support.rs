//! Scripted backend shared by the unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::api::{AuthUser, Backend, HistoryEntry, SaveJobRequest};
use crate::error::{ClientError, Result};
use crate::models::{DashboardData, ResumeForm, ResumeSubmission, UserProfile};

#[derive(Default)]
pub struct FakeBackend {
    pub calls: Mutex<Vec<String>>,
    pub chat_replies: Mutex<VecDeque<Option<Value>>>,
    /// Session id -> history; a `None` entry makes the fetch fail.
    pub histories: Mutex<HashMap<String, Option<Vec<HistoryEntry>>>>,
    pub auth_user: Mutex<Option<AuthUser>>,
    pub dashboard: Mutex<Option<DashboardData>>,
    pub resume_submission: Mutex<Option<ResumeSubmission>>,
    pub resume_detail_fails: Mutex<bool>,
    pub mutations_fail: Mutex<bool>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chat_reply(&self, reply: Value) {
        self.chat_replies.lock().unwrap().push_back(Some(reply));
    }

    pub fn push_chat_failure(&self) {
        self.chat_replies.lock().unwrap().push_back(None);
    }

    pub fn set_history(&self, session_id: &str, entries: Option<Vec<(&str, &str)>>) {
        let entries = entries.map(|pairs| {
            pairs
                .into_iter()
                .map(|(sender, message)| HistoryEntry {
                    sender: sender.to_string(),
                    message: message.to_string(),
                })
                .collect()
        });
        self.histories
            .lock()
            .unwrap()
            .insert(session_id.to_string(), entries);
    }

    pub fn set_auth_user(&self, user_id: &str, name: &str) {
        *self.auth_user.lock().unwrap() = Some(AuthUser {
            user_id: user_id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn mutation_result(&self) -> Result<()> {
        if *self.mutations_fail.lock().unwrap() {
            Err(ClientError::status(500, "mutation failed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn login(&self, email: &str) -> Result<AuthUser> {
        self.record(format!("login:{}", email));
        self.auth_user
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::Rejected("User not found".into()))
    }

    async fn signup(&self, name: &str, email: &str) -> Result<AuthUser> {
        self.record(format!("signup:{}:{}", name, email));
        self.auth_user
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::Rejected("Email already registered".into()))
    }

    async fn fetch_session_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        self.record(format!("history:{}", session_id));
        match self.histories.lock().unwrap().get(session_id) {
            Some(Some(entries)) => Ok(entries.clone()),
            Some(None) => Err(ClientError::status(500, "history unavailable")),
            None => Err(ClientError::status(404, "Session not found")),
        }
    }

    async fn send_chat(&self, query: &str, user_id: &str) -> Result<Value> {
        self.record(format!("chat:{}:{}", user_id, query));
        match self.chat_replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            _ => Err(ClientError::status(502, "chat unavailable")),
        }
    }

    async fn save_job(&self, user_id: &str, job: &SaveJobRequest) -> Result<()> {
        self.record(format!("save_job:{}:{}", user_id, job.apply_link));
        self.mutation_result()
    }

    async fn delete_saved_job(&self, user_id: &str, job_id: i64) -> Result<()> {
        self.record(format!("delete_job:{}:{}", user_id, job_id));
        self.mutation_result()
    }

    async fn fetch_dashboard(&self, user_id: &str) -> Result<DashboardData> {
        self.record(format!("dashboard:{}", user_id));
        self.dashboard
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::status(500, "dashboard unavailable"))
    }

    async fn submit_resume(&self, form: &ResumeForm) -> Result<ResumeSubmission> {
        self.record(format!("submit_resume:{}", form.user_id));
        self.resume_submission
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::status(500, "generation failed"))
    }

    async fn fetch_resume(&self, resume_id: i64) -> Result<Value> {
        self.record(format!("resume:{}", resume_id));
        if *self.resume_detail_fails.lock().unwrap() {
            Err(ClientError::status(404, "Resume not found"))
        } else {
            Ok(serde_json::json!({ "id": resume_id }))
        }
    }

    async fn rename_resume(&self, user_id: &str, resume_id: i64, new_name: &str) -> Result<()> {
        self.record(format!("rename_resume:{}:{}:{}", user_id, resume_id, new_name));
        self.mutation_result()
    }

    async fn delete_resume(&self, user_id: &str, resume_id: i64) -> Result<()> {
        self.record(format!("delete_resume:{}:{}", user_id, resume_id));
        self.mutation_result()
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile> {
        self.record(format!("profile:{}", user_id));
        Ok(UserProfile {
            name: "Jane Doe".into(),
            email: "j@x.com".into(),
            contact: None,
        })
    }
}
