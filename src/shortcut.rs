//! Shortcut parsing and formatting.
//!
//! A shortcut string is a `+`-joined sequence of modifier tokens in the fixed
//! order Control, Alt, Shift, Command followed by exactly one primary key, or
//! a single standalone modifier name. The string form is both the persisted
//! wire format and the registration format handed to the OS backend.

use crate::keys;

/// Canonical modifier tokens in display/registration order.
pub const MODIFIER_TOKENS: [&str; 4] = ["Control", "Alt", "Shift", "Command"];

/// Insertion-ordered set of lower-cased raw keys currently held down.
///
/// Press order is preserved so that "the first non-modifier held" is
/// well-defined when several primary keys are down at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedKeys {
    keys: Vec<String>,
}

impl CapturedKeys {
    /// Creates an empty held-key set.
    #[must_use]
    pub const fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Records a key press. Duplicate presses are ignored.
    pub fn press(&mut self, raw: &str) {
        let key = raw.trim().to_lowercase();
        if !key.is_empty() && !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    /// Records a key release.
    pub fn release(&mut self, raw: &str) {
        let key = raw.trim().to_lowercase();
        self.keys.retain(|held| held != &key);
    }

    /// Drops all held keys.
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Returns true when no keys are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of held keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Iterates held keys in press order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Returns true when at least one key is held and all of them are modifiers.
    #[must_use]
    pub fn only_modifiers(&self) -> bool {
        !self.keys.is_empty() && self.keys.iter().all(|k| keys::is_modifier_key(k))
    }

    fn holds(&self, key: &str) -> bool {
        self.keys.iter().any(|held| held == key)
    }
}

impl<S: Into<String>> FromIterator<S> for CapturedKeys {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut held = Self::new();
        for raw in iter {
            held.press(&raw.into());
        }
        held
    }
}

/// Builds a canonical shortcut string from the currently held keys.
///
/// Modifiers are collected in the fixed canonical order regardless of press
/// order; the first non-modifier key in press order becomes the primary key.
/// A modifiers-only set yields the sole modifier token when exactly one
/// modifier is held, otherwise `None` (a multi-modifier chord without a
/// primary key is not a valid shortcut). An unrecognized primary key also
/// yields `None`.
#[must_use]
pub fn build_shortcut(held: &CapturedKeys) -> Option<String> {
    let mut modifiers: Vec<&str> = Vec::new();

    if held.holds("ctrl") || held.holds("control") {
        modifiers.push("Control");
    }
    if held.holds("alt") {
        modifiers.push("Alt");
    }
    if held.holds("shift") {
        modifiers.push("Shift");
    }
    if held.holds("meta") {
        modifiers.push("Command");
    }

    let Some(primary) = held.iter().find(|key| !keys::is_modifier_key(key)) else {
        return match modifiers.as_slice() {
            [only] => Some((*only).to_owned()),
            _ => None,
        };
    };

    let primary = keys::normalize_primary_key(primary)?;

    let mut parts = modifiers;
    parts.push(&primary);
    Some(parts.join("+"))
}

/// Splits a shortcut string into display tokens.
///
/// Order is preserved; empty segments and surrounding whitespace are dropped.
#[must_use]
pub fn tokenize_shortcut(shortcut: &str) -> Vec<String> {
    shortcut
        .split('+')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Returns true for a shortcut consisting of exactly one modifier token.
///
/// Standalone modifiers cannot be registered as conventional hotkeys and rely
/// on raw press/release signaling instead.
#[must_use]
pub fn is_standalone_modifier_shortcut(shortcut: &str) -> bool {
    let tokens = tokenize_shortcut(shortcut);
    matches!(tokens.as_slice(), [only] if MODIFIER_TOKENS.contains(&only.as_str()))
}

/// Maps a shortcut token to its human-readable glyph.
///
/// Presentation only; never feeds back into shortcut equality.
#[must_use]
pub fn format_shortcut_token(token: &str) -> String {
    if let Some(glyph) = display_glyph(token) {
        return glyph.to_owned();
    }

    let mut chars = token.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return c.to_uppercase().collect();
    }

    token.to_owned()
}

fn display_glyph(token: &str) -> Option<&'static str> {
    let glyph = match token {
        "Command" => "\u{2318}",
        "CommandOrControl" | "CommandOrCtrl" | "CmdOrCtrl" => "\u{2318}/\u{2303}",
        "Control" | "Ctrl" => "\u{2303}",
        "Alt" => "\u{2325}",
        "Shift" => "\u{21e7}",
        "Super" => "Super",
        "Meta" => "Meta",
        "Space" => "Space",
        "Escape" => "\u{238b}",
        "Enter" => "\u{21a9}",
        "Backspace" => "\u{232b}",
        "Delete" => "\u{2326}",
        "Tab" => "\u{21e5}",
        "ArrowUp" => "\u{2191}",
        "ArrowDown" => "\u{2193}",
        "ArrowLeft" => "\u{2190}",
        "ArrowRight" => "\u{2192}",
        "PageUp" => "\u{21de}",
        "PageDown" => "\u{21df}",
        _ => return None,
    };
    Some(glyph)
}

/// Platform default hold-to-talk shortcut.
#[must_use]
pub const fn default_shortcut() -> &'static str {
    if cfg!(target_os = "macos") {
        "Command+Shift+Space"
    } else {
        "Control+Shift+Space"
    }
}
