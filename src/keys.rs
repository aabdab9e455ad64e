//! Canonical key tokens for shortcut capture.
//!
//! Raw key identifiers arrive from the key recorder already lower-cased and
//! deduplicated. This module maps them onto the canonical token vocabulary
//! used in shortcut strings and classifies modifier keys.

/// Raw identifiers treated as modifier keys during capture.
const MODIFIER_KEYS: [&str; 5] = ["meta", "ctrl", "control", "alt", "shift"];

/// Returns true if the raw key identifier is a modifier key.
///
/// Matching is case-insensitive and ignores surrounding whitespace.
#[must_use]
pub fn is_modifier_key(raw: &str) -> bool {
    let key = raw.trim();
    MODIFIER_KEYS.iter().any(|m| key.eq_ignore_ascii_case(m))
}

/// Normalizes a raw primary-key identifier to its canonical token.
///
/// Single letters become uppercase, single digits pass through, `f` followed
/// by one or two digits becomes an uppercased function key, and everything
/// else is looked up in the named-key table. Returns `None` for unrecognized
/// keys; callers treat that as "cannot form a shortcut", not as an error.
#[must_use]
pub fn normalize_primary_key(raw: &str) -> Option<String> {
    let key = raw.trim().to_lowercase();

    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_lowercase() {
            return Some(c.to_ascii_uppercase().to_string());
        }
        if c.is_ascii_digit() {
            return Some(key);
        }
    }

    if is_function_key(&key) {
        return Some(key.to_uppercase());
    }

    named_key(&key).map(str::to_owned)
}

/// `f` followed by one or two digits (`f1` through `f24`).
fn is_function_key(key: &str) -> bool {
    key.strip_prefix('f').is_some_and(|digits| {
        (1..=2).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
    })
}

fn named_key(key: &str) -> Option<&'static str> {
    let token = match key {
        "escape" => "Escape",
        "enter" => "Enter",
        "tab" => "Tab",
        "space" => "Space",
        "backspace" => "Backspace",
        "delete" => "Delete",
        "home" => "Home",
        "end" => "End",
        "pageup" => "PageUp",
        "pagedown" => "PageDown",
        "insert" => "Insert",
        "arrowup" => "ArrowUp",
        "arrowdown" => "ArrowDown",
        "arrowleft" => "ArrowLeft",
        "arrowright" => "ArrowRight",
        "comma" => "Comma",
        "period" => "Period",
        "slash" => "Slash",
        "semicolon" => "Semicolon",
        "quote" => "Quote",
        "minus" => "Minus",
        "equal" => "Equal",
        "bracketleft" => "BracketLeft",
        "bracketright" => "BracketRight",
        "backslash" => "Backslash",
        "backquote" => "Backquote",
        _ => return None,
    };
    Some(token)
}
