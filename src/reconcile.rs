//! Registration reconciliation.
//!
//! Keeps three things in agreement after any change: the persisted shortcut
//! preference, the hotkey actually registered with the OS, and the in-memory
//! [`ShortcutStore`]. Standalone modifier shortcuts are never OS-registered;
//! they rely on raw press/release signaling instead.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::shortcut::is_standalone_modifier_shortcut;
use crate::storage::{PersistenceError, SettingsStore, ShortcutSettings};
use crate::store::{HotkeyEventState, ShortcutStore};

/// Callback invoked when the registered hotkey is pressed or released.
pub type HotkeyHandler = Box<dyn Fn(HotkeyEventState) + Send + Sync>;

/// Errors from the OS hotkey backend.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The combination is already registered, by us or by another process.
    #[error("shortcut is already registered: {0}")]
    AlreadyRegistered(String),
    /// The shortcut string could not be mapped to an OS-level hotkey.
    #[error("invalid shortcut: {0}")]
    InvalidShortcut(String),
    /// The OS refused the register or unregister call.
    #[error("hotkey backend error: {0}")]
    Backend(String),
}

/// Errors surfaced to the user when updating the shortcut binding.
#[derive(Debug, Error)]
pub enum ShortcutError {
    /// Registering or unregistering with the OS failed.
    #[error("failed to update hotkey registration: {0}")]
    Registration(#[from] RegistrationError),
    /// Persisting the new binding failed. Registration side effects already
    /// applied are not rolled back.
    #[error("failed to persist shortcut settings: {0}")]
    Persistence(#[from] PersistenceError),
}

/// OS-level global hotkey service.
///
/// `register` binds a handler that receives press/release transitions for the
/// combination. Registering an already-registered combination must surface
/// [`RegistrationError::AlreadyRegistered`], not a generic failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HotkeyService: Send + Sync {
    /// Whether the combination is currently registered.
    async fn is_registered(&self, shortcut: &str) -> Result<bool, RegistrationError>;
    /// Registers the combination and its event handler.
    async fn register(
        &self,
        shortcut: &str,
        handler: HotkeyHandler,
    ) -> Result<(), RegistrationError>;
    /// Unregisters the combination.
    async fn unregister(&self, shortcut: &str) -> Result<(), RegistrationError>;
}

/// Reconciles the selected shortcut against the OS registration and storage.
///
/// All mutations serialize on one per-binding mutex, so interleaved
/// register/unregister cycles cannot race. The store is only committed after
/// every side effect has landed.
pub struct Reconciler {
    store: Arc<ShortcutStore>,
    hotkeys: Arc<dyn HotkeyService>,
    settings: Arc<dyn SettingsStore>,
    binding: Mutex<()>,
}

impl Reconciler {
    /// Creates a reconciler over the store and its external services.
    #[must_use]
    pub fn new(
        store: Arc<ShortcutStore>,
        hotkeys: Arc<dyn HotkeyService>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            store,
            hotkeys,
            settings,
            binding: Mutex::new(()),
        }
    }

    /// Restores the persisted shortcut binding.
    ///
    /// Idempotent and single-flight: concurrent callers serialize on the
    /// binding mutex, and every caller after the first completion observes
    /// the initialized store and returns without re-registering.
    ///
    /// # Errors
    /// Returns an error if registration or persistence fails; the store then
    /// stays uninitialized and no retry is attempted here.
    pub async fn initialize(&self) -> Result<(), ShortcutError> {
        let _guard = self.binding.lock().await;

        if self.store.is_initialized() {
            debug!("shortcut binding already initialized");
            return Ok(());
        }

        let persisted = ShortcutSettings::read(self.settings.as_ref()).await?;
        info!(
            selected = %persisted.selected,
            registered = ?persisted.registered,
            "restoring persisted shortcut binding"
        );

        self.apply(&persisted.selected, persisted.registered.as_deref())
            .await?;
        self.store.mark_initialized();

        Ok(())
    }

    /// Switches the binding to `next`.
    ///
    /// Idempotent: when `next` matches both the committed selected shortcut
    /// and the committed registration, nothing is touched.
    ///
    /// # Errors
    /// Returns an error if registration or persistence fails. A failed call
    /// leaves the store at its previous committed state.
    pub async fn set_shortcut(&self, next: &str) -> Result<(), ShortcutError> {
        let _guard = self.binding.lock().await;

        let selected = self.store.selected_shortcut();
        let registered = self.store.registered_shortcut();
        let next_registered =
            (!is_standalone_modifier_shortcut(next)).then(|| next.to_owned());

        if next == selected && registered == next_registered {
            debug!(shortcut = %next, "shortcut unchanged, skipping reconcile");
            return Ok(());
        }

        self.apply(next, registered.as_deref()).await
    }

    /// Registers/unregisters as needed, persists, then commits to the store.
    ///
    /// Ordering matters: the commit happens strictly after registration
    /// succeeded and the settings flush completed, so the store never claims
    /// a registration the OS has not confirmed.
    async fn apply(
        &self,
        next: &str,
        previous_registered: Option<&str>,
    ) -> Result<(), ShortcutError> {
        let should_register = !is_standalone_modifier_shortcut(next);

        if should_register {
            self.register_if_missing(next).await?;
        }

        let next_registered = should_register.then(|| next.to_owned());

        if let Some(previous) = previous_registered {
            if next_registered.as_deref() != Some(previous) {
                self.unregister_if_registered(previous).await?;
            }
        }

        ShortcutSettings {
            selected: next.to_owned(),
            registered: next_registered.clone(),
        }
        .write(self.settings.as_ref())
        .await?;

        self.store.commit(next.to_owned(), next_registered);
        info!(shortcut = %next, registered = should_register, "shortcut binding committed");

        Ok(())
    }

    async fn register_if_missing(&self, shortcut: &str) -> Result<(), ShortcutError> {
        if self.hotkeys.is_registered(shortcut).await? {
            debug!(shortcut = %shortcut, "combination already registered, skipping");
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let handler: HotkeyHandler = Box::new(move |state| {
            store.set_event_state(Some(state));
        });

        match self.hotkeys.register(shortcut, handler).await {
            Ok(()) => {
                info!(shortcut = %shortcut, "registered hotkey");
                Ok(())
            }
            // Lost a duplicate-registration race; the binding is in place
            // either way.
            Err(RegistrationError::AlreadyRegistered(_)) => {
                warn!(shortcut = %shortcut, "hotkey was registered concurrently");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn unregister_if_registered(&self, shortcut: &str) -> Result<(), ShortcutError> {
        if !self.hotkeys.is_registered(shortcut).await? {
            return Ok(());
        }

        self.hotkeys.unregister(shortcut).await?;
        info!(shortcut = %shortcut, "unregistered previous hotkey");
        Ok(())
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("selected", &self.store.selected_shortcut())
            .field("registered", &self.store.registered_shortcut())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shortcut;
    use crate::storage::{MockSettingsStore, REGISTERED_KEY, SELECTED_KEY};
    use mockall::predicate::{always, eq};
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    fn string_value(s: &str) -> toml::Value {
        toml::Value::String(s.to_owned())
    }

    /// Settings mock that accepts any set/save traffic.
    fn permissive_settings() -> MockSettingsStore {
        let mut settings = MockSettingsStore::new();
        settings.expect_set().returning(|_, _| Ok(()));
        settings.expect_save().returning(|| Ok(()));
        settings
    }

    fn reconciler(
        hotkeys: MockHotkeyService,
        settings: MockSettingsStore,
    ) -> (Arc<ShortcutStore>, Reconciler) {
        let store = Arc::new(ShortcutStore::new());
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::new(hotkeys),
            Arc::new(settings),
        );
        (store, reconciler)
    }

    #[tokio::test]
    async fn test_initialize_registers_persisted_shortcut() {
        let mut settings = permissive_settings();
        settings
            .expect_get()
            .with(eq(SELECTED_KEY))
            .returning(|_| Ok(Some(string_value("Command+Space"))));
        settings
            .expect_get()
            .with(eq(REGISTERED_KEY))
            .returning(|_| Ok(None));

        let mut hotkeys = MockHotkeyService::new();
        hotkeys
            .expect_is_registered()
            .with(eq("Command+Space"))
            .returning(|_| Ok(false));
        hotkeys
            .expect_register()
            .with(eq("Command+Space"), always())
            .times(1)
            .returning(|_, _| Ok(()));

        let (store, reconciler) = reconciler(hotkeys, settings);
        reconciler.initialize().await.unwrap();

        assert!(store.is_initialized());
        assert_eq!(store.selected_shortcut(), "Command+Space");
        assert_eq!(store.registered_shortcut(), Some("Command+Space".to_owned()));
    }

    #[tokio::test]
    async fn test_initialize_falls_back_to_platform_default() {
        let mut settings = permissive_settings();
        settings.expect_get().returning(|_| Ok(None));

        let mut hotkeys = MockHotkeyService::new();
        hotkeys.expect_is_registered().returning(|_| Ok(false));
        hotkeys
            .expect_register()
            .with(eq(shortcut::default_shortcut()), always())
            .times(1)
            .returning(|_, _| Ok(()));

        let (store, reconciler) = reconciler(hotkeys, settings);
        reconciler.initialize().await.unwrap();

        assert_eq!(store.selected_shortcut(), shortcut::default_shortcut());
        assert_eq!(
            store.registered_shortcut(),
            Some(shortcut::default_shortcut().to_owned())
        );
    }

    #[tokio::test]
    async fn test_initialize_standalone_modifier_unregisters_stale_entry() {
        let mut settings = permissive_settings();
        settings
            .expect_get()
            .with(eq(SELECTED_KEY))
            .returning(|_| Ok(Some(string_value("Shift"))));
        settings
            .expect_get()
            .with(eq(REGISTERED_KEY))
            .returning(|_| Ok(Some(string_value("Control+Shift+Space"))));

        let mut hotkeys = MockHotkeyService::new();
        hotkeys
            .expect_is_registered()
            .with(eq("Control+Shift+Space"))
            .returning(|_| Ok(true));
        hotkeys
            .expect_unregister()
            .with(eq("Control+Shift+Space"))
            .times(1)
            .returning(|_| Ok(()));
        hotkeys.expect_register().times(0);

        let (store, reconciler) = reconciler(hotkeys, settings);
        reconciler.initialize().await.unwrap();

        assert_eq!(store.selected_shortcut(), "Shift");
        assert_eq!(store.registered_shortcut(), None);
        assert!(store.is_initialized());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let mut settings = permissive_settings();
        settings.expect_get().returning(|_| Ok(None));

        let mut hotkeys = MockHotkeyService::new();
        hotkeys.expect_is_registered().returning(|_| Ok(false));
        hotkeys
            .expect_register()
            .times(1)
            .returning(|_, _| Ok(()));

        let (store, reconciler) = reconciler(hotkeys, settings);
        reconciler.initialize().await.unwrap();
        reconciler.initialize().await.unwrap();

        assert!(store.is_initialized());
    }

    #[tokio::test]
    async fn test_concurrent_initialize_coalesces() {
        let mut settings = permissive_settings();
        settings.expect_get().returning(|_| Ok(None));

        let mut hotkeys = MockHotkeyService::new();
        hotkeys.expect_is_registered().returning(|_| Ok(false));
        hotkeys
            .expect_register()
            .times(1)
            .returning(|_, _| Ok(()));

        let (store, reconciler) = reconciler(hotkeys, settings);
        let reconciler = Arc::new(reconciler);

        let first = {
            let r = Arc::clone(&reconciler);
            tokio::spawn(async move { r.initialize().await })
        };
        let second = {
            let r = Arc::clone(&reconciler);
            tokio::spawn(async move { r.initialize().await })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert!(store.is_initialized());
    }

    #[tokio::test]
    async fn test_set_shortcut_registers_and_unregisters_previous() {
        let settings = permissive_settings();

        let mut hotkeys = MockHotkeyService::new();
        hotkeys
            .expect_is_registered()
            .with(eq("Control+Alt+P"))
            .returning(|_| Ok(false));
        hotkeys
            .expect_register()
            .with(eq("Control+Alt+P"), always())
            .times(1)
            .returning(|_, _| Ok(()));
        hotkeys
            .expect_is_registered()
            .with(eq("Command+Space"))
            .returning(|_| Ok(true));
        hotkeys
            .expect_unregister()
            .with(eq("Command+Space"))
            .times(1)
            .returning(|_| Ok(()));

        let (store, reconciler) = reconciler(hotkeys, settings);
        store.commit("Command+Space".to_owned(), Some("Command+Space".to_owned()));

        reconciler.set_shortcut("Control+Alt+P").await.unwrap();

        assert_eq!(store.selected_shortcut(), "Control+Alt+P");
        assert_eq!(store.registered_shortcut(), Some("Control+Alt+P".to_owned()));
    }

    #[tokio::test]
    async fn test_set_shortcut_is_idempotent() {
        let mut settings = MockSettingsStore::new();
        // Exactly one persistence cycle: two keys, one flush.
        settings.expect_set().times(2).returning(|_, _| Ok(()));
        settings.expect_save().times(1).returning(|| Ok(()));

        let mut hotkeys = MockHotkeyService::new();
        hotkeys.expect_is_registered().returning(|_| Ok(false));
        hotkeys
            .expect_register()
            .times(1)
            .returning(|_, _| Ok(()));

        let (store, reconciler) = reconciler(hotkeys, settings);
        reconciler.set_shortcut("Control+Alt+P").await.unwrap();
        reconciler.set_shortcut("Control+Alt+P").await.unwrap();

        assert_eq!(store.selected_shortcut(), "Control+Alt+P");
    }

    #[tokio::test]
    async fn test_set_shortcut_standalone_modifier_skips_registration() {
        let settings = permissive_settings();

        let mut hotkeys = MockHotkeyService::new();
        hotkeys.expect_register().times(0);
        hotkeys
            .expect_is_registered()
            .with(eq("Control+Shift+Space"))
            .returning(|_| Ok(true));
        hotkeys
            .expect_unregister()
            .with(eq("Control+Shift+Space"))
            .times(1)
            .returning(|_| Ok(()));

        let (store, reconciler) = reconciler(hotkeys, settings);
        store.commit(
            "Control+Shift+Space".to_owned(),
            Some("Control+Shift+Space".to_owned()),
        );

        reconciler.set_shortcut("Shift").await.unwrap();

        assert_eq!(store.selected_shortcut(), "Shift");
        assert_eq!(store.registered_shortcut(), None);
    }

    #[tokio::test]
    async fn test_registered_none_iff_standalone_invariant() {
        for next in ["Shift", "Command", "Shift+A", "Control+Shift+Space"] {
            let settings = permissive_settings();
            let mut hotkeys = MockHotkeyService::new();
            hotkeys.expect_is_registered().returning(|_| Ok(false));
            hotkeys.expect_register().returning(|_, _| Ok(()));
            hotkeys.expect_unregister().returning(|_| Ok(()));

            let (store, reconciler) = reconciler(hotkeys, settings);
            reconciler.set_shortcut(next).await.unwrap();

            assert_eq!(
                store.registered_shortcut().is_none(),
                is_standalone_modifier_shortcut(next),
                "invariant violated for {next}"
            );
        }
    }

    #[tokio::test]
    async fn test_already_registered_race_is_tolerated() {
        let settings = permissive_settings();

        let mut hotkeys = MockHotkeyService::new();
        hotkeys.expect_is_registered().returning(|_| Ok(false));
        hotkeys.expect_register().times(1).returning(|s, _| {
            Err(RegistrationError::AlreadyRegistered(s.to_owned()))
        });

        let (store, reconciler) = reconciler(hotkeys, settings);
        reconciler.set_shortcut("Control+Alt+P").await.unwrap();

        assert_eq!(store.registered_shortcut(), Some("Control+Alt+P".to_owned()));
    }

    #[tokio::test]
    async fn test_registration_failure_propagates_and_store_untouched() {
        let mut settings = MockSettingsStore::new();
        settings.expect_set().times(0);
        settings.expect_save().times(0);

        let mut hotkeys = MockHotkeyService::new();
        hotkeys.expect_is_registered().returning(|_| Ok(false));
        hotkeys.expect_register().returning(|s, _| {
            Err(RegistrationError::Backend(format!("refused: {s}")))
        });

        let (store, reconciler) = reconciler(hotkeys, settings);
        let before = store.selected_shortcut();

        let result = reconciler.set_shortcut("Control+Alt+P").await;
        assert!(matches!(result, Err(ShortcutError::Registration(_))));
        assert_eq!(store.selected_shortcut(), before);
        assert_eq!(store.registered_shortcut(), None);
    }

    #[tokio::test]
    async fn test_persistence_failure_propagates_and_store_untouched() {
        let mut settings = MockSettingsStore::new();
        settings.expect_set().returning(|_, _| Ok(()));
        settings.expect_save().returning(|| {
            Err(PersistenceError::Io(std::io::Error::other("disk full")))
        });

        let mut hotkeys = MockHotkeyService::new();
        hotkeys.expect_is_registered().returning(|_| Ok(false));
        hotkeys.expect_register().returning(|_, _| Ok(()));

        let (store, reconciler) = reconciler(hotkeys, settings);
        let result = reconciler.set_shortcut("Control+Alt+P").await;

        assert!(matches!(result, Err(ShortcutError::Persistence(_))));
        assert_eq!(store.registered_shortcut(), None);
    }

    #[tokio::test]
    async fn test_concurrent_set_shortcut_calls_serialize() {
        let settings = permissive_settings();

        // Live registrations as the OS would see them.
        let live: Arc<StdMutex<HashSet<String>>> = Arc::new(StdMutex::new(HashSet::new()));

        let mut hotkeys = MockHotkeyService::new();
        {
            let live = Arc::clone(&live);
            hotkeys
                .expect_is_registered()
                .returning(move |s| Ok(live.lock().unwrap().contains(s)));
        }
        {
            let live = Arc::clone(&live);
            hotkeys.expect_register().times(2).returning(move |s, _| {
                live.lock().unwrap().insert(s.to_owned());
                Ok(())
            });
        }
        {
            let live = Arc::clone(&live);
            hotkeys.expect_unregister().times(1).returning(move |s| {
                live.lock().unwrap().remove(s);
                Ok(())
            });
        }

        let (store, reconciler) = reconciler(hotkeys, settings);
        let reconciler = Arc::new(reconciler);

        let first = {
            let r = Arc::clone(&reconciler);
            tokio::spawn(async move { r.set_shortcut("Control+Alt+P").await })
        };
        let second = {
            let r = Arc::clone(&reconciler);
            tokio::spawn(async move { r.set_shortcut("Command+Space").await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        // Whichever call ran last won, and the loser's registration was torn
        // down: exactly two registers, one unregister, one live binding.
        let selected = store.selected_shortcut();
        assert!(selected == "Control+Alt+P" || selected == "Command+Space");
        assert_eq!(store.registered_shortcut(), Some(selected.clone()));
        let live = live.lock().unwrap();
        assert_eq!(live.iter().collect::<Vec<_>>(), vec![&selected]);
    }

    #[tokio::test]
    async fn test_failed_unregister_leaves_combination_registered_for_retry() {
        let settings = permissive_settings();

        let live: Arc<StdMutex<HashSet<String>>> = Arc::new(StdMutex::new(
            std::iter::once("Command+Space".to_owned()).collect(),
        ));
        let failed_once = Arc::new(StdMutex::new(false));

        let mut hotkeys = MockHotkeyService::new();
        {
            let live = Arc::clone(&live);
            hotkeys
                .expect_is_registered()
                .returning(move |s| Ok(live.lock().unwrap().contains(s)));
        }
        {
            let live = Arc::clone(&live);
            hotkeys.expect_register().returning(move |s, _| {
                live.lock().unwrap().insert(s.to_owned());
                Ok(())
            });
        }
        {
            let live = Arc::clone(&live);
            let failed_once = Arc::clone(&failed_once);
            hotkeys.expect_unregister().times(2).returning(move |s| {
                let mut failed = failed_once.lock().unwrap();
                if *failed {
                    live.lock().unwrap().remove(s);
                    Ok(())
                } else {
                    // Transient OS failure; the combination stays registered.
                    *failed = true;
                    Err(RegistrationError::Backend("transient".to_owned()))
                }
            });
        }

        let (store, reconciler) = reconciler(hotkeys, settings);
        store.commit("Command+Space".to_owned(), Some("Command+Space".to_owned()));

        let result = reconciler.set_shortcut("Control+Alt+P").await;
        assert!(matches!(result, Err(ShortcutError::Registration(_))));

        // The old combination still reads as registered, so the retry tears
        // it down instead of leaking it with no handler.
        reconciler.set_shortcut("Control+Alt+P").await.unwrap();
        assert_eq!(store.registered_shortcut(), Some("Control+Alt+P".to_owned()));
        assert!(!live.lock().unwrap().contains("Command+Space"));
    }

    #[tokio::test]
    async fn test_registered_handler_republishes_events() {
        let settings = permissive_settings();

        let captured: Arc<StdMutex<Option<HotkeyHandler>>> =
            Arc::new(StdMutex::new(None));
        let sink = Arc::clone(&captured);

        let mut hotkeys = MockHotkeyService::new();
        hotkeys.expect_is_registered().returning(|_| Ok(false));
        hotkeys.expect_register().returning(move |_, handler| {
            *sink.lock().unwrap() = Some(handler);
            Ok(())
        });

        let (store, reconciler) = reconciler(hotkeys, settings);
        reconciler.set_shortcut("Control+Alt+P").await.unwrap();

        let handler = captured.lock().unwrap().take().unwrap();
        handler(HotkeyEventState::Pressed);
        assert_eq!(store.event_state(), Some(HotkeyEventState::Pressed));

        handler(HotkeyEventState::Released);
        assert_eq!(store.event_state(), Some(HotkeyEventState::Released));
    }
}
