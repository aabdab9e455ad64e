use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use global_hotkey::GlobalHotKeyEvent;

use ptt_hotkey::input::GlobalHotkeyService;
use ptt_hotkey::reconcile::{HotkeyService, Reconciler};
use ptt_hotkey::storage::{LoggingSettings, TomlSettings};
use ptt_hotkey::store::{HotkeyEventState, ShortcutStore};
use ptt_hotkey::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Arc::new(TomlSettings::load_default().context("failed to load settings")?);

    let logging = LoggingSettings::read(settings.as_ref())
        .await
        .context("failed to read logging settings")?;
    telemetry::init(logging.to_file, &logging.path)?;
    tracing::info!("ptt-hotkey starting");
    let store = Arc::new(ShortcutStore::new());
    let hotkeys =
        Arc::new(GlobalHotkeyService::new().context("failed to create hotkey manager")?);

    let reconciler = Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&hotkeys) as Arc<dyn HotkeyService>,
        settings,
    );

    reconciler
        .initialize()
        .await
        .context("failed to restore shortcut binding")?;
    tracing::info!(
        shortcut = %store.selected_shortcut(),
        registered = ?store.registered_shortcut(),
        "shortcut binding ready"
    );

    // Main event loop: pump OS hotkey events, drive the listening indicator
    // from press/release transitions.
    let mut events = store.subscribe_event_state();
    let receiver = GlobalHotKeyEvent::receiver();
    loop {
        if let Ok(event) = receiver.try_recv() {
            hotkeys.handle_event(&event);
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
            changed = events.changed() => {
                if changed.is_ok() {
                    match *events.borrow_and_update() {
                        Some(HotkeyEventState::Pressed) => {
                            tracing::info!("shortcut pressed, listening indicator shown");
                        }
                        _ => {
                            tracing::debug!("listening indicator hidden");
                        }
                    }
                }
            }
            () = tokio::time::sleep(Duration::from_millis(10)) => {
                // Poll interval to avoid busy-waiting on the hotkey channel
            }
        }
    }

    Ok(())
}
