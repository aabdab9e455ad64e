//! Interactive capture session for recording a new shortcut.
//!
//! Drives the edit/record/save/cancel flow: the session observes the live
//! held-key set through a [`KeyRecorder`], turns it into a draft shortcut,
//! and hands the draft to the [`Reconciler`] on save. Everything except save
//! is a pure in-memory transition.

use tracing::{debug, info, warn};

use crate::reconcile::Reconciler;
use crate::shortcut::{self, CapturedKeys};
use crate::store::HotkeyEventState;

/// Live key-recording facility driven by a capture session.
///
/// Implementations observe physical keys while recording is active; the host
/// forwards each snapshot of held keys to [`CaptureSession::keys_changed`].
#[cfg_attr(test, mockall::automock)]
pub trait KeyRecorder {
    /// Begin observing held keys.
    fn start(&mut self);
    /// Stop observing held keys.
    fn stop(&mut self);
    /// Forget any keys observed so far.
    fn reset(&mut self);
}

/// Phase of a capture session. Cycles back to `Idle`; there is no terminal
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    /// Not editing.
    Idle,
    /// Observing the live key set for a combination.
    Recording,
    /// A draft shortcut has been captured and awaits save or re-record.
    Captured,
    /// The draft is being committed through the reconciler.
    Saving,
}

/// Per-edit-session state machine.
pub struct CaptureSession<R: KeyRecorder> {
    recorder: R,
    phase: CapturePhase,
    draft: Option<String>,
    // Candidate from a modifiers-only hold; commits when the keys are
    // released with nothing else pressed.
    pending_standalone: Option<String>,
    error_message: Option<String>,
}

impl<R: KeyRecorder> CaptureSession<R> {
    /// Creates an idle session around a key recorder.
    pub fn new(recorder: R) -> Self {
        Self {
            recorder,
            phase: CapturePhase::Idle,
            draft: None,
            pending_standalone: None,
            error_message: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    /// The captured-but-uncommitted shortcut, if any.
    #[must_use]
    pub fn draft_shortcut(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    /// Message from the last failed save, cleared on the next save, cancel,
    /// or re-record.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// True in every phase except `Idle`.
    #[must_use]
    pub fn is_editing(&self) -> bool {
        self.phase != CapturePhase::Idle
    }

    /// True while the live key set is being observed.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.phase == CapturePhase::Recording
    }

    /// True while a save is in flight.
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.phase == CapturePhase::Saving
    }

    /// Starts (or restarts) recording, discarding any previous draft.
    ///
    /// Ignored while a save is in flight.
    pub fn begin_editing(&mut self) {
        if self.phase == CapturePhase::Saving {
            return;
        }

        debug!("capture session recording");
        self.phase = CapturePhase::Recording;
        self.draft = None;
        self.pending_standalone = None;
        self.error_message = None;
        self.recorder.reset();
        self.recorder.start();
    }

    /// Feeds the latest held-key snapshot into the session.
    ///
    /// A full combination captures immediately and stops observation. A
    /// modifiers-only hold is remembered as a standalone candidate but keeps
    /// recording, so a modifier tap can still grow into a real combination;
    /// the candidate only commits once the held set empties again. Ignored
    /// outside `Recording`.
    pub fn keys_changed(&mut self, held: &CapturedKeys) {
        if self.phase != CapturePhase::Recording {
            return;
        }

        if held.is_empty() {
            // A modifier tap is recognized on release, not on press.
            if let Some(candidate) = self.pending_standalone.take() {
                debug!(shortcut = %candidate, "standalone modifier committed on release");
                self.draft = Some(candidate);
                self.phase = CapturePhase::Captured;
                self.recorder.stop();
            }
            return;
        }

        if held.only_modifiers() {
            match shortcut::build_shortcut(held) {
                Some(candidate) if shortcut::is_standalone_modifier_shortcut(&candidate) => {
                    self.draft = Some(candidate.clone());
                    self.pending_standalone = Some(candidate);
                }
                _ => {
                    // Ambiguous multi-modifier chord; wait for a primary key.
                    self.draft = None;
                    self.pending_standalone = None;
                }
            }
            return;
        }

        let Some(captured) = shortcut::build_shortcut(held) else {
            return;
        };

        debug!(shortcut = %captured, "combination captured");
        self.pending_standalone = None;
        self.draft = Some(captured);
        self.phase = CapturePhase::Captured;
        self.recorder.stop();
    }

    /// Commits the draft through the reconciler.
    ///
    /// On success the session tears down to `Idle`. On failure it returns to
    /// `Captured` with the error surfaced via [`Self::error_message`]; the
    /// error never escapes silently. Ignored unless a draft is captured.
    pub async fn save(&mut self, reconciler: &Reconciler) {
        if self.phase != CapturePhase::Captured {
            return;
        }
        let Some(draft) = self.draft.clone() else {
            return;
        };

        self.phase = CapturePhase::Saving;
        self.error_message = None;

        match reconciler.set_shortcut(&draft).await {
            Ok(()) => {
                info!(shortcut = %draft, "shortcut saved");
                self.teardown();
            }
            Err(err) => {
                warn!(error = %err, "failed to save shortcut");
                self.error_message = Some(err.to_string());
                self.phase = CapturePhase::Captured;
            }
        }
    }

    /// Discards the session: draft and error cleared, observation stopped.
    pub fn cancel(&mut self) {
        debug!("capture session cancelled");
        self.teardown();
    }

    /// Reacts to a press/release signal from the currently registered
    /// shortcut. A press while still editing (recording or captured, not yet
    /// saving) auto-cancels the session so a stale edit never lingers after
    /// the old binding fires.
    pub fn hotkey_event(&mut self, state: HotkeyEventState) {
        let editing = matches!(
            self.phase,
            CapturePhase::Recording | CapturePhase::Captured
        );
        if editing && state == HotkeyEventState::Pressed {
            info!("registered shortcut fired during edit, auto-cancelling");
            self.teardown();
        }
    }

    fn teardown(&mut self) {
        self.phase = CapturePhase::Idle;
        self.draft = None;
        self.pending_standalone = None;
        self.error_message = None;
        self.recorder.stop();
        self.recorder.reset();
    }
}
