//! Sidebar dashboard: saved jobs, generated documents, upcoming events.
//!
//! Mutations are pessimistic. Local data only changes once the backend has
//! confirmed, so a failed request leaves the view exactly as it was.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::api::{Backend, SaveJobRequest};
use crate::error::ClientError;
use crate::models::{DashboardData, JobResult};

pub const DASHBOARD_LOAD_FAILED: &str = "Could not load dashboard.";
pub const SAVE_JOB_FAILED: &str = "Failed to save job.";
pub const DELETE_JOB_FAILED: &str = "Failed to delete job.";
pub const RENAME_DOCUMENT_FAILED: &str = "Failed to rename resume. Please try again.";
pub const DELETE_DOCUMENT_FAILED: &str = "Failed to delete resume. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRequest {
    pub document_id: i64,
    pub new_name: String,
}

#[derive(Debug, Default)]
pub struct Dashboard {
    data: Option<DashboardData>,
    /// Apply links known to be saved, including saves made this run.
    saved_links: HashSet<String>,
    saving: HashSet<String>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> Option<&DashboardData> {
        self.data.as_ref()
    }

    pub fn is_saved(&self, apply_link: &str) -> bool {
        self.saved_links.contains(apply_link)
    }

    pub fn is_saving(&self, apply_link: &str) -> bool {
        self.saving.contains(apply_link)
    }

    pub fn clear(&mut self) {
        self.data = None;
        self.saved_links.clear();
        self.saving.clear();
    }

    // --- Refresh ---

    /// Returns the notice to show, if any.
    pub fn apply_refresh(&mut self, result: Result<DashboardData, ClientError>) -> Option<&'static str> {
        match result {
            Ok(data) => {
                debug!(
                    saved_jobs = data.saved_jobs.len(),
                    documents = data.documents.len(),
                    "dashboard loaded"
                );
                self.saved_links
                    .extend(data.saved_jobs.iter().filter_map(|job| job.apply_link.clone()));
                self.data = Some(data);
                None
            }
            Err(e) => {
                warn!(error = %e, "dashboard fetch failed");
                Some(DASHBOARD_LOAD_FAILED)
            }
        }
    }

    pub async fn refresh(&mut self, backend: &dyn Backend, user_id: &str) -> Option<&'static str> {
        let result = backend.fetch_dashboard(user_id).await;
        self.apply_refresh(result)
    }

    // --- Saving jobs ---

    /// Starts a save. `None` when the job is already saved or a save for it
    /// is in flight.
    pub fn begin_save(&mut self, job: &JobResult) -> Option<SaveJobRequest> {
        if self.is_saved(&job.apply_link) || self.is_saving(&job.apply_link) {
            debug!(apply_link = %job.apply_link, "save ignored, already saved or saving");
            return None;
        }
        self.saving.insert(job.apply_link.clone());
        Some(SaveJobRequest {
            job_title: job.title.clone(),
            company_name: job.company.clone(),
            apply_link: job.apply_link.clone(),
        })
    }

    pub fn finish_save(&mut self, request: &SaveJobRequest, result: Result<(), ClientError>) -> Option<&'static str> {
        self.saving.remove(&request.apply_link);
        match result {
            Ok(()) => {
                info!(job_title = %request.job_title, "job saved");
                self.saved_links.insert(request.apply_link.clone());
                None
            }
            Err(e) => {
                warn!(error = %e, apply_link = %request.apply_link, "job save failed");
                Some(SAVE_JOB_FAILED)
            }
        }
    }

    pub async fn save_job(&mut self, backend: &dyn Backend, user_id: &str, job: &JobResult) -> Option<&'static str> {
        let request = self.begin_save(job)?;
        let result = backend.save_job(user_id, &request).await;
        self.finish_save(&request, result)
    }

    // --- Saved job removal ---

    pub fn finish_delete_saved_job(&mut self, job_id: i64, result: Result<(), ClientError>) -> Option<&'static str> {
        if let Err(e) = result {
            warn!(error = %e, job_id, "saved job delete failed");
            return Some(DELETE_JOB_FAILED);
        }
        if let Some(data) = self.data.as_mut() {
            if let Some(pos) = data.saved_jobs.iter().position(|job| job.id == job_id) {
                let removed = data.saved_jobs.remove(pos);
                if let Some(link) = removed.apply_link {
                    self.saved_links.remove(&link);
                }
            }
        }
        None
    }

    pub async fn delete_saved_job(&mut self, backend: &dyn Backend, user_id: &str, job_id: i64) -> Option<&'static str> {
        let result = backend.delete_saved_job(user_id, job_id).await;
        self.finish_delete_saved_job(job_id, result)
    }

    // --- Documents ---

    /// `None` when the new name is blank or matches the current one.
    pub fn begin_rename(&self, document_id: i64, new_name: &str) -> Option<RenameRequest> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return None;
        }
        let unchanged = self
            .data
            .as_ref()
            .and_then(|data| data.documents.iter().find(|doc| doc.id == document_id))
            .is_some_and(|doc| doc.file_name == new_name);
        if unchanged {
            return None;
        }
        Some(RenameRequest {
            document_id,
            new_name: new_name.to_string(),
        })
    }

    pub fn finish_rename(&mut self, request: &RenameRequest, result: Result<(), ClientError>) -> Option<&'static str> {
        if let Err(e) = result {
            warn!(error = %e, document_id = request.document_id, "document rename failed");
            return Some(RENAME_DOCUMENT_FAILED);
        }
        if let Some(doc) = self
            .data
            .as_mut()
            .and_then(|data| data.documents.iter_mut().find(|doc| doc.id == request.document_id))
        {
            doc.file_name = request.new_name.clone();
        }
        None
    }

    pub async fn rename_document(
        &mut self,
        backend: &dyn Backend,
        user_id: &str,
        document_id: i64,
        new_name: &str,
    ) -> Option<&'static str> {
        let request = self.begin_rename(document_id, new_name)?;
        let result = backend
            .rename_resume(user_id, request.document_id, &request.new_name)
            .await;
        self.finish_rename(&request, result)
    }

    pub fn finish_delete_document(&mut self, document_id: i64, result: Result<(), ClientError>) -> Option<&'static str> {
        if let Err(e) = result {
            warn!(error = %e, document_id, "document delete failed");
            return Some(DELETE_DOCUMENT_FAILED);
        }
        if let Some(data) = self.data.as_mut() {
            data.documents.retain(|doc| doc.id != document_id);
        }
        None
    }

    pub async fn delete_document(&mut self, backend: &dyn Backend, user_id: &str, document_id: i64) -> Option<&'static str> {
        let result = backend.delete_resume(user_id, document_id).await;
        self.finish_delete_document(document_id, result)
    }
}
