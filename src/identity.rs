//! Startup identity resolution.
//!
//! At boot three sources compete, in strict order: the query parameters an
//! OAuth redirect lands with, the persisted identity record, and nothing at
//! all. The last case leaves identity unset and asks the caller to schedule
//! the delayed authentication prompt.

use reqwest::Url;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::Identity;
use crate::storage::IdentityStore;

const REDIRECT_PARAMS: [&str; 3] = ["user_id", "name", "email"];

/// The visible address of the client.
pub trait AddressBar {
    fn current(&self) -> Url;
    /// Replaces the visible address in place (history replace, no reload).
    fn replace(&mut self, url: Url);
}

/// Address bar backed by the launch URL the terminal client was given.
#[derive(Debug, Clone)]
pub struct LaunchAddress {
    url: Url,
}

impl LaunchAddress {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

impl AddressBar for LaunchAddress {
    fn current(&self) -> Url {
        self.url.clone()
    }

    fn replace(&mut self, url: Url) {
        debug!(%url, "address replaced");
        self.url = url;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Completed an OAuth redirect; identity was persisted.
    Redirect(Identity),
    /// Adopted a previously persisted identity.
    Stored(Identity),
    /// Nobody is signed in; the auth prompt should be scheduled.
    Anonymous,
}

impl Resolution {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Resolution::Redirect(identity) | Resolution::Stored(identity) => Some(identity),
            Resolution::Anonymous => None,
        }
    }

    pub fn needs_auth_prompt(&self) -> bool {
        matches!(self, Resolution::Anonymous)
    }
}

pub struct IdentityResolver;

impl IdentityResolver {
    pub fn resolve(address: &mut dyn AddressBar, identities: &mut IdentityStore) -> Resolution {
        let url = address.current();

        if let Some(identity) = identity_from_redirect(&url) {
            info!(user_id = %identity.user_id, "signed in via OAuth redirect");
            identities.set(identity.clone());
            address.replace(strip_redirect_params(&url));
            return Resolution::Redirect(identity);
        }

        if let Some(identity) = identities.load_persisted() {
            debug!(user_id = %identity.user_id, "restored persisted identity");
            identities.adopt(identity.clone());
            return Resolution::Stored(identity);
        }

        debug!("no identity available");
        Resolution::Anonymous
    }
}

/// All three redirect parameters must be present and non-empty.
pub fn identity_from_redirect(url: &Url) -> Option<Identity> {
    let mut user_id = None;
    let mut name = None;
    let mut email = None;
    for (key, value) in url.query_pairs() {
        let slot = match &*key {
            "user_id" => &mut user_id,
            "name" => &mut name,
            "email" => &mut email,
            _ => continue,
        };
        if !value.trim().is_empty() {
            *slot = Some(value.into_owned());
        }
    }
    let (user_id, name, email) = (user_id?, name?, email?);
    Some(Identity::from_full_name(&user_id, &name, &email))
}

/// Removes the redirect parameters, keeping anything else in the query.
pub fn strip_redirect_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !REDIRECT_PARAMS.contains(&&**key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut stripped = url.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}

// --- Delayed side effects ---

/// A one-shot task that runs after a delay unless cancelled first.
///
/// Dropping the handle cancels it, so an owner going away never leaves a
/// pending timer behind.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn after<F>(delay: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });
        Self {
            handle: Some(handle),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("scheduled task cancelled");
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
