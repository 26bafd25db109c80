use tracing::debug;

use crate::models::{AuthMode, OverlayKind, ResumeMode};

/// The single blocking overlay currently on screen, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayState {
    #[default]
    None,
    Auth(AuthMode),
    ResumeBuilder(ResumeMode),
}

/// Owns overlay visibility. Showing one overlay replaces whichever was
/// visible; there is never a stack.
#[derive(Debug, Default)]
pub struct OverlayManager {
    state: OverlayState,
}

impl OverlayManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != OverlayState::None
    }

    pub fn show_auth(&mut self, mode: AuthMode) {
        self.transition(OverlayState::Auth(mode));
    }

    pub fn show_resume_builder(&mut self, mode: ResumeMode) {
        self.transition(OverlayState::ResumeBuilder(mode));
    }

    pub fn show(&mut self, kind: OverlayKind) {
        match kind {
            OverlayKind::Auth(mode) => self.show_auth(mode),
            OverlayKind::ResumeBuilder(mode) => self.show_resume_builder(mode),
        }
    }

    pub fn close_current(&mut self) {
        self.transition(OverlayState::None);
    }

    /// Closes the resume builder only if it is the visible overlay.
    pub fn close_resume_builder(&mut self) {
        if matches!(self.state, OverlayState::ResumeBuilder(_)) {
            self.close_current();
        }
    }

    pub fn close_auth(&mut self) {
        if matches!(self.state, OverlayState::Auth(_)) {
            self.close_current();
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = OverlayState::None;
    }

    fn transition(&mut self, next: OverlayState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "overlay transition");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_replaces_instead_of_stacking() {
        let mut overlays = OverlayManager::new();
        overlays.show_auth(AuthMode::Login);
        overlays.show_resume_builder(ResumeMode::Create);
        assert_eq!(overlays.state(), OverlayState::ResumeBuilder(ResumeMode::Create));
        overlays.close_current();
        assert_eq!(overlays.state(), OverlayState::None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut overlays = OverlayManager::new();
        overlays.close_current();
        overlays.show_auth(AuthMode::Signup);
        overlays.close_current();
        overlays.close_current();
        assert!(!overlays.is_open());
    }

    #[test]
    fn test_targeted_close_leaves_other_overlay() {
        let mut overlays = OverlayManager::new();
        overlays.show_auth(AuthMode::Login);
        overlays.close_resume_builder();
        assert_eq!(overlays.state(), OverlayState::Auth(AuthMode::Login));

        overlays.show(OverlayKind::ResumeBuilder(ResumeMode::Update));
        overlays.close_auth();
        assert_eq!(overlays.state(), OverlayState::ResumeBuilder(ResumeMode::Update));
        overlays.close_resume_builder();
        assert_eq!(overlays.state(), OverlayState::None);
    }
}
