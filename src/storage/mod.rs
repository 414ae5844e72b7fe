use crate::config::PanelSettings;
use crate::models::PanelOverlay;
use serde::{Deserialize, Serialize};

pub(crate) const SETTINGS_KEY: &str = "bookmark_panel_settings";
pub(crate) const OVERLAY_KEY: &str = "bookmark_panel_overlay";

fn local_storage() -> Option<web_sys::Storage> {
    web_sys::window().and_then(|w| w.local_storage().ok().flatten())
}

pub(crate) fn load_json_from_storage<T: for<'de> Deserialize<'de>>(key: &str) -> Option<T> {
    let json = local_storage()?.get_item(key).ok().flatten()?;
    serde_json::from_str(&json).ok()
}

pub(crate) fn save_json_to_storage<T: Serialize>(key: &str, value: &T) {
    let Ok(json) = serde_json::to_string(value) else {
        return;
    };
    if let Some(storage) = local_storage() {
        if storage.set_item(key, &json).is_err() {
            tracing::warn!(%key, "localStorage write failed");
        }
    }
}

/// Settings are read-only here; missing or unreadable values fall back to defaults.
pub(crate) fn load_settings() -> PanelSettings {
    local_storage()
        .and_then(|s| s.get_item(SETTINGS_KEY).ok().flatten())
        .and_then(|json| PanelSettings::from_json(&json))
        .unwrap_or_default()
}

pub(crate) fn load_overlay() -> PanelOverlay {
    load_json_from_storage(OVERLAY_KEY).unwrap_or_default()
}

pub(crate) fn save_overlay(overlay: &PanelOverlay) {
    save_json_to_storage(OVERLAY_KEY, overlay);
}
