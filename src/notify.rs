//! Submission state and user-facing notifications.
//!
//! `Notifier` tracks whether a submission is in flight and the single
//! notification currently shown. It is cheap to clone; clones share state.

use crate::coordinator::DeleteOutcome;
use crate::models::CleanupOutcome;
use crate::{Error, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
    /// Persistent notifications stay until dismissed.
    pub persistent: bool,
}

#[derive(Debug, Default)]
struct State {
    current: Option<Notification>,
    /// Bumped on every show so a pending dismiss timer can tell whether the
    /// notification it was started for is still the one displayed.
    generation: u64,
    submitting: bool,
}

#[derive(Clone)]
pub struct Notifier {
    state: Arc<Mutex<State>>,
    dismiss_after: Duration,
}

/// Clears `submitting` however the submission ends.
struct SubmittingGuard {
    state: Arc<Mutex<State>>,
}

impl Drop for SubmittingGuard {
    fn drop(&mut self) {
        lock(&self.state).submitting = false;
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Notifier {
    pub fn new(dismiss_after: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            dismiss_after,
        }
    }

    pub fn is_submitting(&self) -> bool {
        lock(&self.state).submitting
    }

    pub fn notification(&self) -> Option<Notification> {
        lock(&self.state).current.clone()
    }

    /// Run `operation` with `is_submitting` set, then show its outcome.
    ///
    /// A second submission while one is in flight is rejected without
    /// running its operation.
    pub async fn submit<T, F>(&self, success_message: &str, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.run(None, success_message, operation).await
    }

    /// Like [`Self::submit`], but shows `progress_message` as a persistent
    /// notification while the operation runs. The outcome replaces it.
    pub async fn submit_with_progress<T, F>(
        &self,
        progress_message: &str,
        success_message: &str,
        operation: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.run(Some(progress_message), success_message, operation).await
    }

    async fn run<T, F>(
        &self,
        progress_message: Option<&str>,
        success_message: &str,
        operation: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let guard = {
            let mut state = lock(&self.state);
            if state.submitting {
                return Err(Error::Generic(
                    "Another submission is already in progress".to_string(),
                ));
            }
            state.submitting = true;
            SubmittingGuard {
                state: Arc::clone(&self.state),
            }
        };

        if let Some(progress_message) = progress_message {
            self.show_persistent(progress_message, NotificationKind::Info);
        }

        let result = operation.await;
        drop(guard);

        match &result {
            Ok(_) => self.show(success_message, NotificationKind::Success),
            Err(e) => {
                let persistent = matches!(
                    e,
                    Error::LinkFailed {
                        cleanup: CleanupOutcome::Failed(_),
                        ..
                    }
                );
                self.set(Notification {
                    message: Self::describe_failure(e),
                    kind: NotificationKind::Error,
                    persistent,
                });
            }
        }
        result
    }

    /// Show a notification that dismisses itself after the configured delay.
    pub fn show(&self, message: impl Into<String>, kind: NotificationKind) {
        self.set(Notification {
            message: message.into(),
            kind,
            persistent: false,
        });
    }

    pub fn show_persistent(&self, message: impl Into<String>, kind: NotificationKind) {
        self.set(Notification {
            message: message.into(),
            kind,
            persistent: true,
        });
    }

    pub fn dismiss(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.current = None;
    }

    /// User-facing wording for a failed operation. Partial failures say what
    /// was and was not saved.
    pub fn describe_failure(err: &Error) -> String {
        match err {
            Error::LinkFailed {
                reason,
                filename,
                cleanup,
            } => {
                let prefix = format!(
                    "The file was uploaded but the record was not saved: {}.",
                    reason
                );
                match cleanup {
                    CleanupOutcome::Removed | CleanupOutcome::AlreadyGone => {
                        format!("{} The uploaded file was discarded.", prefix)
                    }
                    CleanupOutcome::Retained => format!(
                        "{} The file {} is still used by the existing record.",
                        prefix, filename
                    ),
                    CleanupOutcome::Failed(message) => format!(
                        "{} Removing the uploaded file {} also failed ({}); it is now unused.",
                        prefix, filename, message
                    ),
                }
            }
            Error::UploadFailed(reason) => {
                format!("The upload failed and nothing was saved: {}", reason)
            }
            Error::Validation(errors) => {
                let fields: Vec<String> = errors
                    .iter()
                    .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
                    .collect();
                format!("Please check the form. {}", fields.join("; "))
            }
            other => other.to_string(),
        }
    }

    /// Report a record deletion. Files that could not be removed turn the
    /// outcome into a warning; the record deletion itself stands.
    pub fn report_delete(&self, label: &str, outcome: &DeleteOutcome) {
        if !outcome.removed {
            self.show(
                format!("{} was already deleted", label),
                NotificationKind::Info,
            );
            return;
        }

        let failed: Vec<&str> = outcome
            .asset_failures()
            .map(|(filename, _)| filename.as_str())
            .collect();
        if failed.is_empty() {
            self.show(format!("{} deleted", label), NotificationKind::Success);
        } else {
            self.show(
                format!(
                    "{} deleted, but these files could not be removed: {}",
                    label,
                    failed.join(", ")
                ),
                NotificationKind::Warning,
            );
        }
    }

    fn set(&self, notification: Notification) {
        let persistent = notification.persistent;
        let generation = {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.current = Some(notification);
            state.generation
        };

        if !persistent {
            self.schedule_dismiss(generation);
        }
    }

    fn schedule_dismiss(&self, generation: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime for the dismiss timer; notification stays until dismissed");
            return;
        };

        let state = Arc::clone(&self.state);
        let delay = self.dismiss_after;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = lock(&state);
            if state.generation == generation {
                state.current = None;
            }
        });
    }
}
