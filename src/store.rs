//! Process-wide shortcut state.
//!
//! One watch channel per state slice. Writers go through `send_if_modified`,
//! so a subscriber is only woken when the slice it watches actually changes,
//! never on unrelated store mutations.

use tokio::sync::watch;

use crate::shortcut;

/// Press/release signal republished from the registered hotkey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEventState {
    /// The shortcut combination was pressed.
    Pressed,
    /// The shortcut combination was released.
    Released,
}

/// State container for the single hold-to-talk shortcut binding.
///
/// Constructed once by the composition root and shared via `Arc`. Mutation
/// goes through the [`Reconciler`](crate::reconcile::Reconciler) and the
/// registered-hotkey event handler; consumers read snapshots or subscribe to
/// individual slices.
#[derive(Debug)]
pub struct ShortcutStore {
    selected: watch::Sender<String>,
    registered: watch::Sender<Option<String>>,
    event_state: watch::Sender<Option<HotkeyEventState>>,
    initialized: watch::Sender<bool>,
}

impl ShortcutStore {
    /// Creates a store seeded with the platform default shortcut, nothing
    /// registered, and initialization pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            selected: watch::Sender::new(shortcut::default_shortcut().to_owned()),
            registered: watch::Sender::new(None),
            event_state: watch::Sender::new(None),
            initialized: watch::Sender::new(false),
        }
    }

    /// Current selected shortcut.
    #[must_use]
    pub fn selected_shortcut(&self) -> String {
        self.selected.borrow().clone()
    }

    /// Shortcut currently registered with the OS, if any.
    #[must_use]
    pub fn registered_shortcut(&self) -> Option<String> {
        self.registered.borrow().clone()
    }

    /// Last observed press/release signal.
    #[must_use]
    pub fn event_state(&self) -> Option<HotkeyEventState> {
        *self.event_state.borrow()
    }

    /// Whether `initialize` has completed successfully.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        *self.initialized.borrow()
    }

    /// Subscribes to selected-shortcut changes.
    #[must_use]
    pub fn subscribe_selected(&self) -> watch::Receiver<String> {
        self.selected.subscribe()
    }

    /// Subscribes to registered-shortcut changes.
    #[must_use]
    pub fn subscribe_registered(&self) -> watch::Receiver<Option<String>> {
        self.registered.subscribe()
    }

    /// Subscribes to press/release signal changes. Drives the listening
    /// indicator: `Pressed` shows it, anything else hides it.
    #[must_use]
    pub fn subscribe_event_state(&self) -> watch::Receiver<Option<HotkeyEventState>> {
        self.event_state.subscribe()
    }

    /// Subscribes to initialization status changes.
    #[must_use]
    pub fn subscribe_initialized(&self) -> watch::Receiver<bool> {
        self.initialized.subscribe()
    }

    pub(crate) fn set_event_state(&self, state: Option<HotkeyEventState>) {
        self.event_state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Commits a reconciled selected/registered pair and clears the event
    /// signal. Only the reconciler calls this, after all side effects landed.
    pub(crate) fn commit(&self, selected: String, registered: Option<String>) {
        self.selected.send_if_modified(|current| {
            if *current == selected {
                false
            } else {
                *current = selected;
                true
            }
        });
        self.registered.send_if_modified(|current| {
            if *current == registered {
                false
            } else {
                *current = registered;
                true
            }
        });
        self.set_event_state(None);
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.send_if_modified(|current| {
            if *current {
                false
            } else {
                *current = true;
                true
            }
        });
    }
}

impl Default for ShortcutStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let store = ShortcutStore::new();
        assert_eq!(store.selected_shortcut(), shortcut::default_shortcut());
        assert_eq!(store.registered_shortcut(), None);
        assert_eq!(store.event_state(), None);
        assert!(!store.is_initialized());
    }

    #[test]
    fn test_commit_updates_slices_and_clears_event() {
        let store = ShortcutStore::new();
        store.set_event_state(Some(HotkeyEventState::Pressed));

        store.commit("Shift+A".to_owned(), Some("Shift+A".to_owned()));

        assert_eq!(store.selected_shortcut(), "Shift+A");
        assert_eq!(store.registered_shortcut(), Some("Shift+A".to_owned()));
        assert_eq!(store.event_state(), None);
    }

    #[tokio::test]
    async fn test_subscribers_wake_only_on_slice_change() {
        let store = ShortcutStore::new();
        let mut selected = store.subscribe_selected();
        let mut events = store.subscribe_event_state();
        selected.mark_unchanged();
        events.mark_unchanged();

        // Event signal changes must not wake selected-shortcut subscribers.
        store.set_event_state(Some(HotkeyEventState::Pressed));
        assert!(!selected.has_changed().unwrap());
        assert!(events.has_changed().unwrap());

        // Re-sending the same value is not a change.
        events.mark_unchanged();
        store.set_event_state(Some(HotkeyEventState::Pressed));
        assert!(!events.has_changed().unwrap());
    }

    #[test]
    fn test_commit_same_value_does_not_signal() {
        let store = ShortcutStore::new();
        let mut registered = store.subscribe_registered();
        registered.mark_unchanged();

        store.commit(store.selected_shortcut(), None);
        assert!(!registered.has_changed().unwrap());
    }

    #[test]
    fn test_mark_initialized_is_sticky() {
        let store = ShortcutStore::new();
        store.mark_initialized();
        store.mark_initialized();
        assert!(store.is_initialized());
    }
}
