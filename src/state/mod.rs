use crate::config::PanelSettings;
use crate::coordinator::MutationCoordinator;
use crate::dnd::{DropTarget, DropTargetResolver};
use crate::error::PanelError;
use crate::storage::load_settings;
use crate::store::{ChromeBookmarkStore, ChromeEventSubscription};
use leptos::prelude::*;

pub(crate) type Coordinator = MutationCoordinator<ChromeBookmarkStore>;

/// Reactive handles shared by every part of the panel. All fields are arena
/// handles, so the struct is `Copy` and can be moved into any closure.
#[derive(Clone, Copy)]
pub(crate) struct PanelState {
    /// Set once the snapshot has loaded. Lives on the UI thread only.
    pub coordinator: StoredValue<Option<Coordinator>, LocalStorage>,
    pub subscription: StoredValue<Option<ChromeEventSubscription>, LocalStorage>,

    /// Mirrors the coordinator revision; views track this to re-render.
    pub revision: RwSignal<u64>,
    pub loading: RwSignal<bool>,

    pub settings: RwSignal<PanelSettings>,
    pub search_query: RwSignal<String>,

    /// Session-fatal condition; the panel shows a reload prompt.
    pub fatal: RwSignal<Option<String>>,
    /// Validation message next to the row being edited: (node id, message).
    pub inline_error: RwSignal<Option<(String, String)>>,
    pub editing: RwSignal<Option<String>>,

    pub resolver: StoredValue<DropTargetResolver>,
    pub drop_target: RwSignal<Option<DropTarget>>,
}

impl PanelState {
    pub fn new() -> Self {
        let settings = load_settings();
        let resolver = DropTargetResolver::new(settings.drop_zones);

        Self {
            coordinator: StoredValue::new_local(None),
            subscription: StoredValue::new_local(None),
            revision: RwSignal::new(0),
            loading: RwSignal::new(true),
            settings: RwSignal::new(settings),
            search_query: RwSignal::new(String::new()),
            fatal: RwSignal::new(None),
            inline_error: RwSignal::new(None),
            editing: RwSignal::new(None),
            resolver: StoredValue::new(resolver),
            drop_target: RwSignal::new(None),
        }
    }

    pub fn coordinator(&self) -> Option<Coordinator> {
        self.coordinator.with_value(|c| c.clone())
    }

    /// Route an error to where the user should see it.
    pub fn report(&self, node_id: Option<&str>, err: PanelError) {
        if err.is_session_fatal() {
            tracing::error!(error = %err, "panel session ended");
            self.fatal.set(Some(err.to_string()));
        } else if err.is_validation() {
            let id = node_id.unwrap_or_default().to_string();
            self.inline_error.set(Some((id, err.to_string())));
        } else {
            // Rolled back (or never applied); the tree already shows the truth.
            tracing::debug!(error = %err, "mutation not applied");
        }
    }
}

impl Default for PanelState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
pub(crate) struct PanelContext(pub PanelState);
