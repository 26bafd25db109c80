//! Voice input as a start/stop toggle feeding the chat input buffer.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

pub const SPEECH_UNSUPPORTED: &str = "Speech recognition not supported on this system.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    #[default]
    Idle,
    Listening,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// Final transcript of the capture.
    Transcript(String),
    Error(String),
    /// Capture finished (with or without a result).
    Ended,
}

/// Receives capture events tagged with the capture id they belong to.
pub type VoiceSink = Arc<dyn Fn(u64, VoiceEvent) + Send + Sync>;

/// Platform speech capability.
pub trait SpeechRecognizer: Send {
    fn is_available(&self) -> bool;
    fn start(&mut self, capture_id: u64, sink: VoiceSink) -> Result<()>;
    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceToggle {
    Started,
    Stopped,
    /// No capability; the caller shows [`SPEECH_UNSUPPORTED`] once.
    Unavailable,
    /// Capture could not start; already logged.
    Failed,
}

// --- Recognizers ---

#[derive(Debug, Default)]
pub struct UnavailableRecognizer;

impl SpeechRecognizer for UnavailableRecognizer {
    fn is_available(&self) -> bool {
        false
    }

    fn start(&mut self, _capture_id: u64, _sink: VoiceSink) -> Result<()> {
        Err(ClientError::Capture(SPEECH_UNSUPPORTED.to_string()))
    }

    fn stop(&mut self) {}
}

/// Runs an external transcription command (for example a script wrapping
/// `sox` and `whisper`) and takes its stdout as the transcript.
#[derive(Debug)]
pub struct CommandRecognizer {
    command: String,
    task: Option<JoinHandle<()>>,
}

impl CommandRecognizer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            task: None,
        }
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn is_available(&self) -> bool {
        !self.command.trim().is_empty()
    }

    fn start(&mut self, capture_id: u64, sink: VoiceSink) -> Result<()> {
        self.stop();
        let command = self.command.clone();
        debug!(%command, capture_id, "starting speech capture");

        let task = tokio::spawn(async move {
            let output = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&command)
                .kill_on_drop(true)
                .output()
                .await;

            match output {
                Ok(output) if output.status.success() => {
                    let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if transcript.is_empty() {
                        sink(capture_id, VoiceEvent::Error("empty transcript".to_string()));
                    } else {
                        sink(capture_id, VoiceEvent::Transcript(transcript));
                    }
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    sink(capture_id, VoiceEvent::Error(format!("{}: {}", output.status, stderr)));
                }
                Err(e) => sink(capture_id, VoiceEvent::Error(e.to_string())),
            }
            sink(capture_id, VoiceEvent::Ended);
        });
        self.task = Some(task);
        Ok(())
    }

    fn stop(&mut self) {
        // Aborting drops the child future, and kill_on_drop ends the process
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// --- Adapter ---

pub struct VoiceInputAdapter {
    recognizer: Box<dyn SpeechRecognizer>,
    sink: VoiceSink,
    state: VoiceState,
    capture_id: u64,
}

impl VoiceInputAdapter {
    pub fn new(recognizer: Box<dyn SpeechRecognizer>, sink: VoiceSink) -> Self {
        Self {
            recognizer,
            sink,
            state: VoiceState::Idle,
            capture_id: 0,
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == VoiceState::Listening
    }

    pub fn toggle(&mut self) -> VoiceToggle {
        match self.state {
            VoiceState::Listening => {
                self.stop_capture();
                VoiceToggle::Stopped
            }
            VoiceState::Idle => {
                if !self.recognizer.is_available() {
                    return VoiceToggle::Unavailable;
                }
                self.capture_id += 1;
                match self.recognizer.start(self.capture_id, self.sink.clone()) {
                    Ok(()) => {
                        self.state = VoiceState::Listening;
                        VoiceToggle::Started
                    }
                    Err(e) => {
                        warn!(error = %e, "speech capture failed to start");
                        VoiceToggle::Failed
                    }
                }
            }
        }
    }

    /// Applies a capture event. Returns the transcript to place in the input
    /// buffer, if this event carried one.
    pub fn handle_event(&mut self, capture_id: u64, event: VoiceEvent) -> Option<String> {
        if capture_id != self.capture_id || self.state != VoiceState::Listening {
            debug!(capture_id, "ignoring event from inactive capture");
            return None;
        }
        match event {
            VoiceEvent::Transcript(text) => {
                info!(chars = text.len(), "speech transcript received");
                self.stop_capture();
                Some(text)
            }
            VoiceEvent::Error(message) => {
                warn!(%message, "speech capture error");
                self.stop_capture();
                None
            }
            VoiceEvent::Ended => {
                self.state = VoiceState::Idle;
                None
            }
        }
    }

    /// Stops any active capture; safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.state == VoiceState::Listening {
            self.stop_capture();
        }
    }

    fn stop_capture(&mut self) {
        self.recognizer.stop();
        self.state = VoiceState::Idle;
    }
}

impl Drop for VoiceInputAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
