//! PTT Hotkey - hold-to-talk shortcut capture and reconciliation engine.
//!
//! Keeps the user's chosen shortcut, the OS-registered hotkey, and the
//! press/release signal consumed by the rest of the app in agreement.

/// Interactive capture session for recording a new shortcut
pub mod capture;
/// OS-level input integration (global hotkey backend)
pub mod input;
/// Canonical key tokens and modifier classification
pub mod keys;
/// Registration reconciliation against the OS and storage
pub mod reconcile;
/// Shortcut parsing and formatting
pub mod shortcut;
/// Persisted shortcut settings
pub mod storage;
/// Process-wide shortcut state
pub mod store;
/// Logging setup
pub mod telemetry;
