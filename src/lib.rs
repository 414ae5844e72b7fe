//! Bookmark side panel for Chromium browsers.
//!
//! A local mirror of `chrome.bookmarks` that is edited optimistically, with
//! drag-and-drop placement and a filtered search view on top.

mod app;
mod components;
pub mod config;
pub mod coordinator;
pub mod dnd;
pub mod error;
pub mod models;
mod panel;
pub mod search;
mod state;
mod storage;
pub mod store;
pub mod tree;

pub use app::App;
pub use config::{BarPosition, DropZoneConfig, PanelSettings};
pub use coordinator::MutationCoordinator;
pub use error::{MutationKind, NameError, PanelError, PanelResult};
pub use models::{BookmarkNode, MoveTarget, NewBookmark};
pub use tree::{BookmarkTree, StoreEvent};

use leptos::prelude::*;

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    mount_to_body(App);
}
