use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::models::{DashboardData, ResumeForm, ResumeSubmission, Sender, UserProfile};

// --- Backend trait ---

/// Every backend endpoint the client consumes.
///
/// Implementations only move bytes; interpreting replies is the job of the
/// controller and the protocol decoder.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(&self, email: &str) -> Result<AuthUser>;
    async fn signup(&self, name: &str, email: &str) -> Result<AuthUser>;

    async fn fetch_session_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>>;
    /// Raw `/chat/` body, decoded later by `protocol::decode_chat_response`.
    async fn send_chat(&self, query: &str, user_id: &str) -> Result<Value>;

    async fn save_job(&self, user_id: &str, job: &SaveJobRequest) -> Result<()>;
    async fn delete_saved_job(&self, user_id: &str, job_id: i64) -> Result<()>;
    async fn fetch_dashboard(&self, user_id: &str) -> Result<DashboardData>;

    async fn submit_resume(&self, form: &ResumeForm) -> Result<ResumeSubmission>;
    async fn fetch_resume(&self, resume_id: i64) -> Result<Value>;
    async fn rename_resume(&self, user_id: &str, resume_id: i64, new_name: &str) -> Result<()>;
    async fn delete_resume(&self, user_id: &str, resume_id: i64) -> Result<()>;

    async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile>;
}

// --- Wire shapes ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEntry {
    pub sender: String,
    #[serde(default)]
    pub message: String,
}

impl HistoryEntry {
    pub fn sender(&self) -> Sender {
        if self.sender.eq_ignore_ascii_case("user") {
            Sender::User
        } else {
            Sender::Bot
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveJobRequest {
    pub job_title: String,
    pub company_name: String,
    pub apply_link: String,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct SignupRequest<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    query: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<Value>,
}

// --- HTTP implementation ---

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: Url) -> Self {
        let client = reqwest::Client::new();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Where the browser goes to start the Google OAuth round trip.
    pub fn google_login_url(&self) -> String {
        self.endpoint("/auth/google/login")
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::status(status, extract_detail(&body)))
    }

    async fn json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let response = Self::check(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn authenticate<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<AuthUser> {
        let response = self.client.post(self.endpoint(path)).json(body).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if status.is_success() {
            if let Ok(user) = serde_json::from_value::<AuthUser>(body.clone()) {
                if !user.user_id.is_empty() {
                    return Ok(user);
                }
            }
        }

        let detail = body
            .get("detail")
            .map(detail_text)
            .unwrap_or_else(|| "Authentication failed".to_string());
        Err(ClientError::Rejected(detail))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn login(&self, email: &str) -> Result<AuthUser> {
        self.authenticate("/auth/login_user", &LoginRequest { email }).await
    }

    async fn signup(&self, name: &str, email: &str) -> Result<AuthUser> {
        self.authenticate("/auth/signup_user", &SignupRequest { name, email })
            .await
    }

    async fn fetch_session_history(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        let url = self.endpoint(&format!("/chat/session/{}", session_id));
        debug!(%url, "fetching session history");
        let response = self.client.get(url).send().await?;
        let history: HistoryResponse = Self::json(response).await?;
        Ok(history.messages)
    }

    async fn send_chat(&self, query: &str, user_id: &str) -> Result<Value> {
        let response = self
            .client
            .post(self.endpoint("/chat/"))
            .json(&ChatRequest { query, user_id })
            .send()
            .await?;
        Self::json(response).await
    }

    async fn save_job(&self, user_id: &str, job: &SaveJobRequest) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&format!("/users/{}/jobs", user_id)))
            .json(job)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_saved_job(&self, user_id: &str, job_id: i64) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("/users/{}/jobs/{}", user_id, job_id)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_dashboard(&self, user_id: &str) -> Result<DashboardData> {
        let response = self
            .client
            .get(self.endpoint(&format!("/users/{}/dashboard", user_id)))
            .send()
            .await?;
        Self::json(response).await
    }

    async fn submit_resume(&self, form: &ResumeForm) -> Result<ResumeSubmission> {
        let response = self
            .client
            .post(self.endpoint("/resumes/"))
            .json(form)
            .send()
            .await?;
        Self::json(response).await
    }

    async fn fetch_resume(&self, resume_id: i64) -> Result<Value> {
        let response = self
            .client
            .get(self.endpoint(&format!("/resumes/{}", resume_id)))
            .send()
            .await?;
        Self::json(response).await
    }

    async fn rename_resume(&self, user_id: &str, resume_id: i64, new_name: &str) -> Result<()> {
        let response = self
            .client
            .patch(self.endpoint(&format!("/resumes/{}/rename", resume_id)))
            .query(&[("user_id", user_id)])
            .form(&[("new_name", new_name)])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_resume(&self, user_id: &str, resume_id: i64) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("/resumes/{}", resume_id)))
            .query(&[("user_id", user_id)])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile> {
        let response = self
            .client
            .get(self.endpoint(&format!("/user/profile/{}", user_id)))
            .send()
            .await?;
        Self::json(response).await
    }
}

/// Pulls a readable message out of an error body (`{"detail": ...}` or raw text).
fn extract_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { detail: Some(detail) }) => detail_text(&detail),
        _ => body.trim().to_string(),
    }
}

fn detail_text(detail: &Value) -> String {
    match detail {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
