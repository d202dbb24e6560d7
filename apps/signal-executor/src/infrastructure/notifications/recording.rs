//! Notifier that keeps messages in memory.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::application::ports::{NotifierPort, NotifyError};

/// Records every message; optionally fails delivery.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered so far, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make delivery fail.
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }
}

#[async_trait]
impl NotifierPort for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        if *self.fail.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(NotifyError::Transport("recorder set to fail".to_string()));
        }
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
        Ok(())
    }
}
