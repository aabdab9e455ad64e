//! `global-hotkey` backed implementation of [`HotkeyService`].
//!
//! Translates canonical shortcut strings into OS-level hotkey registrations
//! and dispatches press/release events to the handler bound at registration
//! time. The OS API has no registration query, so `is_registered` answers
//! from this service's own bookkeeping.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    Error as HotkeyError, GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
};
use tracing::{debug, warn};

use crate::reconcile::{HotkeyHandler, HotkeyService, RegistrationError};
use crate::shortcut::{tokenize_shortcut, MODIFIER_TOKENS};
use crate::store::HotkeyEventState;

struct Binding {
    hotkey: HotKey,
    handler: HotkeyHandler,
}

struct Inner {
    manager: GlobalHotKeyManager,
    bindings: HashMap<String, Binding>,
    ids: HashMap<u32, String>,
}

/// Global hotkey service over the OS registration API.
///
/// The hosting event loop must pump [`GlobalHotKeyEvent::receiver`] into
/// [`Self::handle_event`] for handlers to fire. Must be created on the main
/// thread on macOS.
pub struct GlobalHotkeyService {
    inner: Mutex<Inner>,
}

impl GlobalHotkeyService {
    /// Creates the underlying OS hotkey manager.
    ///
    /// # Errors
    /// Returns an error when the OS refuses to create the manager (e.g.
    /// missing display server or permissions).
    pub fn new() -> Result<Self, RegistrationError> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| RegistrationError::Backend(e.to_string()))?;

        Ok(Self {
            inner: Mutex::new(Inner {
                manager,
                bindings: HashMap::new(),
                ids: HashMap::new(),
            }),
        })
    }

    /// Routes a raw OS hotkey event to the handler bound to its combination.
    pub fn handle_event(&self, event: &GlobalHotKeyEvent) {
        let Ok(inner) = self.lock_inner() else {
            return;
        };

        let Some(shortcut) = inner.ids.get(&event.id) else {
            debug!(id = event.id, "event for unknown hotkey id");
            return;
        };

        if let Some(binding) = inner.bindings.get(shortcut) {
            let state = match event.state {
                HotKeyState::Pressed => HotkeyEventState::Pressed,
                HotKeyState::Released => HotkeyEventState::Released,
            };
            (binding.handler)(state);
        }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, Inner>, RegistrationError> {
        self.inner
            .lock()
            .map_err(|_| RegistrationError::Backend("hotkey state lock poisoned".to_owned()))
    }
}

#[async_trait]
impl HotkeyService for GlobalHotkeyService {
    async fn is_registered(&self, shortcut: &str) -> Result<bool, RegistrationError> {
        Ok(self.lock_inner()?.bindings.contains_key(shortcut))
    }

    async fn register(
        &self,
        shortcut: &str,
        handler: HotkeyHandler,
    ) -> Result<(), RegistrationError> {
        let hotkey = parse_hotkey(shortcut)?;

        let mut inner = self.lock_inner()?;
        if inner.bindings.contains_key(shortcut) {
            return Err(RegistrationError::AlreadyRegistered(shortcut.to_owned()));
        }

        inner.manager.register(hotkey).map_err(|e| match e {
            HotkeyError::AlreadyRegistered(_) => {
                RegistrationError::AlreadyRegistered(shortcut.to_owned())
            }
            other => RegistrationError::Backend(other.to_string()),
        })?;

        inner.ids.insert(hotkey.id(), shortcut.to_owned());
        inner
            .bindings
            .insert(shortcut.to_owned(), Binding { hotkey, handler });
        debug!(shortcut = %shortcut, id = hotkey.id(), "registered with OS");

        Ok(())
    }

    async fn unregister(&self, shortcut: &str) -> Result<(), RegistrationError> {
        let mut inner = self.lock_inner()?;

        // Unknown combinations are a no-op, not an error.
        let Some(binding) = inner.bindings.remove(shortcut) else {
            debug!(shortcut = %shortcut, "unregister for unknown combination");
            return Ok(());
        };

        // The bookkeeping must keep claiming the registration until the OS
        // call succeeds, so a failed unregister can be retried.
        if let Err(e) = inner.manager.unregister(binding.hotkey) {
            warn!(shortcut = %shortcut, error = %e, "OS unregister failed");
            inner.bindings.insert(shortcut.to_owned(), binding);
            return Err(RegistrationError::Backend(e.to_string()));
        }

        inner.ids.remove(&binding.hotkey.id());
        Ok(())
    }
}

/// Parses a canonical shortcut string into an OS hotkey.
///
/// Standalone modifier shortcuts have no OS representation and are rejected;
/// the reconciler never routes them here.
fn parse_hotkey(shortcut: &str) -> Result<HotKey, RegistrationError> {
    let tokens = tokenize_shortcut(shortcut);

    let Some((primary, modifier_tokens)) = tokens.split_last() else {
        return Err(RegistrationError::InvalidShortcut(shortcut.to_owned()));
    };

    if MODIFIER_TOKENS.contains(&primary.as_str()) {
        return Err(RegistrationError::InvalidShortcut(format!(
            "standalone modifier cannot be registered: {shortcut}"
        )));
    }

    let mut modifiers = Modifiers::empty();
    for token in modifier_tokens {
        match token.as_str() {
            "Control" => modifiers |= Modifiers::CONTROL,
            "Alt" => modifiers |= Modifiers::ALT,
            "Shift" => modifiers |= Modifiers::SHIFT,
            "Command" => modifiers |= Modifiers::SUPER,
            other => {
                return Err(RegistrationError::InvalidShortcut(format!(
                    "unknown modifier in {shortcut}: {other}"
                )))
            }
        }
    }

    let code = parse_code(primary).ok_or_else(|| {
        RegistrationError::InvalidShortcut(format!("unknown key in {shortcut}: {primary}"))
    })?;

    Ok(HotKey::new(
        (!modifiers.is_empty()).then_some(modifiers),
        code,
    ))
}

#[allow(clippy::too_many_lines)]
fn parse_code(token: &str) -> Option<Code> {
    let code = match token {
        "A" => Code::KeyA,
        "B" => Code::KeyB,
        "C" => Code::KeyC,
        "D" => Code::KeyD,
        "E" => Code::KeyE,
        "F" => Code::KeyF,
        "G" => Code::KeyG,
        "H" => Code::KeyH,
        "I" => Code::KeyI,
        "J" => Code::KeyJ,
        "K" => Code::KeyK,
        "L" => Code::KeyL,
        "M" => Code::KeyM,
        "N" => Code::KeyN,
        "O" => Code::KeyO,
        "P" => Code::KeyP,
        "Q" => Code::KeyQ,
        "R" => Code::KeyR,
        "S" => Code::KeyS,
        "T" => Code::KeyT,
        "U" => Code::KeyU,
        "V" => Code::KeyV,
        "W" => Code::KeyW,
        "X" => Code::KeyX,
        "Y" => Code::KeyY,
        "Z" => Code::KeyZ,
        "0" => Code::Digit0,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,
        "F1" => Code::F1,
        "F2" => Code::F2,
        "F3" => Code::F3,
        "F4" => Code::F4,
        "F5" => Code::F5,
        "F6" => Code::F6,
        "F7" => Code::F7,
        "F8" => Code::F8,
        "F9" => Code::F9,
        "F10" => Code::F10,
        "F11" => Code::F11,
        "F12" => Code::F12,
        "Escape" => Code::Escape,
        "Enter" => Code::Enter,
        "Tab" => Code::Tab,
        "Space" => Code::Space,
        "Backspace" => Code::Backspace,
        "Delete" => Code::Delete,
        "Home" => Code::Home,
        "End" => Code::End,
        "PageUp" => Code::PageUp,
        "PageDown" => Code::PageDown,
        "Insert" => Code::Insert,
        "ArrowUp" => Code::ArrowUp,
        "ArrowDown" => Code::ArrowDown,
        "ArrowLeft" => Code::ArrowLeft,
        "ArrowRight" => Code::ArrowRight,
        "Comma" => Code::Comma,
        "Period" => Code::Period,
        "Slash" => Code::Slash,
        "Semicolon" => Code::Semicolon,
        "Quote" => Code::Quote,
        "Minus" => Code::Minus,
        "Equal" => Code::Equal,
        "BracketLeft" => Code::BracketLeft,
        "BracketRight" => Code::BracketRight,
        "Backslash" => Code::Backslash,
        "Backquote" => Code::Backquote,
        _ => return None,
    };
    Some(code)
}
