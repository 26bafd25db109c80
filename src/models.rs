use serde::{Deserialize, Serialize};

/// Placeholder display name used whenever the backend or storage gives none.
pub const DISPLAY_NAME_FALLBACK: &str = "User";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
}

impl Identity {
    /// Builds an identity from a full name, keeping only the first name for
    /// display.
    pub fn from_full_name(user_id: &str, full_name: &str, email: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: first_name(full_name),
            email: email.trim().to_string(),
        }
    }
}

pub fn first_name(full_name: &str) -> String {
    full_name
        .split_whitespace()
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| DISPLAY_NAME_FALLBACK.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Signup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    Create,
    Update,
}

/// Which overlay a bot message asked the client to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Auth(AuthMode),
    ResumeBuilder(ResumeMode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub job_results: Option<Vec<JobResult>>,
    pub triggers_overlay: Option<OverlayKind>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            job_results: None,
            triggers_overlay: None,
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
            job_results: None,
            triggers_overlay: None,
        }
    }

    pub fn with_jobs(mut self, jobs: Vec<JobResult>) -> Self {
        self.job_results = Some(jobs);
        self
    }

    pub fn with_overlay(mut self, overlay: OverlayKind) -> Self {
        self.triggers_overlay = Some(overlay);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub description: String,
    pub salary_range: Option<String>,
    pub employment_type: Option<String>,
    pub posted_at: Option<String>,
    pub apply_link: String,
    pub employer_website: Option<String>,
    pub employer_logo: Option<String>,
}

// --- Dashboard ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedJob {
    pub id: i64,
    pub job_title: String,
    pub company_name: String,
    pub apply_link: Option<String>,
    pub saved_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub file_name: String,
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingEvent {
    pub id: i64,
    pub title: String,
    pub event_date: String,
    pub join_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareerTip {
    pub tip_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    #[serde(default)]
    pub saved_jobs: Vec<SavedJob>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub upcoming_events: Vec<UpcomingEvent>,
    pub career_tip: Option<CareerTip>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub contact: Option<String>,
}

// --- Resume builder payload ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub address: Option<String>,
    pub linkedin: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkExperience {
    pub job_title: String,
    pub company: String,
    pub location: Option<String>,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub degree: String,
    pub institution: String,
    pub location: Option<String>,
    #[serde(default)]
    pub graduation_year: String,
    pub gpa: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub technologies: Vec<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Certification {
    pub name: String,
    #[serde(default)]
    pub issuing_organization: String,
    #[serde(default)]
    pub date_obtained: String,
}

/// Full resume payload as the builder submits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeForm {
    #[serde(default)]
    pub user_id: String,
    pub personal_info: PersonalInfo,
    #[serde(default)]
    pub professional_summary: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub work_experience: Vec<WorkExperience>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub certifications: Vec<Certification>,
    #[serde(default = "default_template")]
    pub template: String,
}

fn default_template() -> String {
    "professional".to_string()
}

impl ResumeForm {
    /// Drops blank entries the way the builder does before submitting.
    pub fn cleaned(mut self, user_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self.skills.retain(|s| !s.trim().is_empty());
        self.work_experience
            .retain(|exp| !exp.job_title.is_empty() && !exp.company.is_empty());
        self.education
            .retain(|edu| !edu.degree.is_empty() && !edu.institution.is_empty());
        self.projects.retain(|proj| !proj.title.is_empty());
        self.certifications.retain(|cert| !cert.name.is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResumeSubmission {
    pub success: bool,
    pub resume_id: Option<i64>,
    #[serde(default)]
    pub download_url: String,
    pub template_used: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// What the resume builder hands back once generation succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeCompletion {
    pub download_url: String,
    pub resume_id: Option<i64>,
}
