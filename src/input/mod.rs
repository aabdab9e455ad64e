//! OS-level input integration.

/// Global hotkey registration backend.
pub mod hotkey;

pub use hotkey::GlobalHotkeyService;
