use crate::panel::BookmarkPanel;
use crate::state::{PanelContext, PanelState};
use leptos::prelude::*;

#[component]
pub fn App() -> impl IntoView {
    provide_context(PanelContext(PanelState::new()));

    view! {
        <main class="h-screen w-full overflow-y-auto bg-background text-foreground">
            <BookmarkPanel />
        </main>
    }
}
