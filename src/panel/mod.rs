//! The side panel: bar and other-bookmarks lists, search box, drag and drop.
//!
//! Everything structural goes through the coordinator; this module only turns
//! tree snapshots into rows and DOM events into coordinator calls.

use crate::components::ui::{
    Alert, AlertDescription, Button, ButtonSize, ButtonVariant, Input, Spinner,
};
use crate::config::{BarPosition, PanelSettings};
use crate::coordinator::MutationCoordinator;
use crate::dnd::{Axis, DropCandidate, DropTarget, DropTargetResolver, Point, Rect};
use crate::models::{CustomIcon, NewBookmark};
use crate::search::{self, SearchNode, SearchOptions, SearchView};
use crate::state::{PanelContext, PanelState};
use crate::storage::{load_overlay, save_overlay};
use crate::store::{ChromeBookmarkStore, ChromeEventSubscription};
use crate::tree::BookmarkTree;
use icons::{ChevronRight, X};
use leptos::prelude::*;
use leptos::task::spawn_local;
use tw_merge::tw_merge;
use wasm_bindgen::JsCast;

const NEW_FOLDER_TITLE: &str = "New folder";

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Row {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub depth: usize,
    pub is_folder: bool,
    pub expanded: bool,
    /// Top-level folder: not draggable, renamable or removable.
    pub fixed: bool,
    pub icon: Option<CustomIcon>,
    /// Ancestor path, only shown for search results.
    pub path: Option<String>,
}

impl Row {
    fn from_entry(tree: &BookmarkTree, id: &str, depth: usize) -> Option<Self> {
        let e = tree.get(id)?;
        Some(Self {
            id: e.id.clone(),
            title: e.title.clone(),
            url: e.url.clone(),
            depth,
            is_folder: e.is_folder(),
            expanded: tree.is_expanded(id),
            fixed: tree.is_fixed(id),
            icon: tree.meta(id).custom_icon,
            path: None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Section {
    /// The top-level folder itself; accepts drops into it.
    pub header: Row,
    pub axis: Axis,
    pub items: Vec<Row>,
    /// Contents of expanded bar folders, listed under the bar.
    pub nested: Vec<Row>,
}

#[derive(Clone, Debug, PartialEq)]
enum Body {
    Loading,
    Tree(Vec<Section>),
    Search { rows: Vec<Row>, matches: usize },
}

/// Preorder rows below `folder_id`, descending only into expanded folders.
pub(crate) fn folder_rows(tree: &BookmarkTree, folder_id: &str, base_depth: usize) -> Vec<Row> {
    let mut out = Vec::new();
    let mut stack: Vec<(&str, usize)> = tree
        .children(folder_id)
        .iter()
        .rev()
        .map(|c| (c.as_str(), base_depth))
        .collect();
    while let Some((id, depth)) = stack.pop() {
        let Some(row) = Row::from_entry(tree, id, depth) else {
            continue;
        };
        if row.is_folder && row.expanded {
            stack.extend(tree.children(id).iter().rev().map(|c| (c.as_str(), depth + 1)));
        }
        out.push(row);
    }
    out
}

pub(crate) fn sections(tree: &BookmarkTree, bar_position: BarPosition) -> Vec<Section> {
    let bar = Row::from_entry(tree, tree.bar_id(), 0).map(|header| {
        let items: Vec<Row> = tree
            .children(tree.bar_id())
            .iter()
            .filter_map(|c| Row::from_entry(tree, c, 0))
            .collect();
        let mut nested = Vec::new();
        for folder in items.iter().filter(|r| r.is_folder && r.expanded) {
            nested.push(folder.clone());
            nested.extend(folder_rows(tree, &folder.id, 1));
        }
        Section {
            header,
            axis: Axis::Horizontal,
            items,
            nested,
        }
    });
    let other = Row::from_entry(tree, tree.other_id(), 0).map(|header| Section {
        header,
        axis: Axis::Vertical,
        items: folder_rows(tree, tree.other_id(), 0),
        nested: Vec::new(),
    });

    let ordered = match bar_position {
        BarPosition::Top => [bar, other],
        BarPosition::Bottom => [other, bar],
    };
    ordered.into_iter().flatten().collect()
}

pub(crate) fn search_rows(tree: &BookmarkTree, view: &SearchView) -> Vec<Row> {
    let mut out = Vec::new();
    let mut stack: Vec<(&SearchNode, usize)> = view.roots.iter().rev().map(|n| (n, 0)).collect();
    while let Some((n, depth)) = stack.pop() {
        out.push(Row {
            id: n.id.clone(),
            title: n.title.clone(),
            url: n.url.clone(),
            depth,
            is_folder: n.is_folder(),
            expanded: n.expanded,
            fixed: tree.is_fixed(&n.id),
            icon: tree.meta(&n.id).custom_icon,
            path: (!n.search_path.is_empty()).then(|| n.search_path.clone()),
        });
        stack.extend(n.children.iter().rev().map(|c| (c, depth + 1)));
    }
    out
}

fn build_body(tree: &BookmarkTree, query: &str, settings: &PanelSettings) -> Body {
    match search::filter(tree, query, &SearchOptions::from(settings)) {
        Some(view) => Body::Search {
            matches: view.match_count(),
            rows: search_rows(tree, &view),
        },
        None => Body::Tree(sections(tree, settings.bar_position)),
    }
}

/// Extension-served favicon for a page URL.
pub(crate) fn favicon_src(page_url: &str) -> String {
    format!(
        "/_favicon/?pageUrl={}&size=16",
        urlencoding::encode(page_url)
    )
}

async fn connect(state: PanelState) {
    let top_level = state.settings.with_untracked(|s| s.top_level.clone());
    match MutationCoordinator::connect(ChromeBookmarkStore, &top_level).await {
        Ok(c) => {
            c.apply_overlay(&load_overlay());
            let revision = state.revision;
            c.subscribe(move |rev| revision.set(rev));

            let events = c.clone();
            let sub = ChromeEventSubscription::listen(move |ev| {
                events.apply_external_event(ev);
            });
            state.coordinator.set_value(Some(c));
            state.subscription.set_value(Some(sub));
        }
        Err(e) => state.report(None, e),
    }
    state.loading.set(false);
}

fn toggle_folder(state: PanelState, id: &str) {
    if let Some(c) = state.coordinator() {
        if c.toggle_expanded(id) {
            save_overlay(&c.overlay());
        }
    }
}

fn commit_rename(state: PanelState, id: String, title: String) {
    let Some(c) = state.coordinator() else {
        return;
    };
    spawn_local(async move {
        match c.rename(&id, &title).await {
            Ok(()) => {
                state.inline_error.set(None);
                state.editing.set(None);
            }
            Err(e) if e.is_validation() => state.report(Some(&id), e),
            Err(e) => {
                state.editing.set(None);
                state.report(Some(&id), e);
            }
        }
    });
}

fn remove_node(state: PanelState, id: String) {
    let Some(c) = state.coordinator() else {
        return;
    };
    spawn_local(async move {
        if let Err(e) = c.remove(&id).await {
            state.report(Some(&id), e);
        }
    });
}

fn create_folder(state: PanelState, parent_id: String) {
    let Some(c) = state.coordinator() else {
        return;
    };
    spawn_local(async move {
        match c.create(&parent_id, NewBookmark::folder(NEW_FOLDER_TITLE)).await {
            Ok(id) => {
                if c.set_expanded(&parent_id, true) {
                    save_overlay(&c.overlay());
                }
                state.inline_error.set(None);
                state.editing.set(Some(id));
            }
            Err(e) => state.report(Some(&parent_id), e),
        }
    });
}

fn collect_candidates(container: &web_sys::Element) -> Vec<DropCandidate> {
    let Ok(nodes) = container.query_selector_all("[data-node-id]") else {
        return Vec::new();
    };
    (0..nodes.length())
        .filter_map(|i| nodes.item(i))
        .filter_map(|n| n.dyn_into::<web_sys::Element>().ok())
        .filter_map(|el| {
            let node_id = el.get_attribute("data-node-id")?;
            let axis = match el.get_attribute("data-axis").as_deref() {
                Some("horizontal") => Axis::Horizontal,
                _ => Axis::Vertical,
            };
            let r = el.get_bounding_client_rect();
            Some(DropCandidate {
                node_id,
                rect: Rect::new(r.left(), r.top(), r.width(), r.height()),
                axis,
            })
        })
        .collect()
}

fn on_drag_over(state: PanelState, ev: &web_sys::DragEvent) {
    if !state.resolver.with_value(DropTargetResolver::is_dragging) {
        return;
    }
    ev.prevent_default();
    if let Some(dt) = ev.data_transfer() {
        dt.set_drop_effect("move");
    }
    let Some(container) = ev
        .current_target()
        .and_then(|t| t.dyn_into::<web_sys::Element>().ok())
    else {
        return;
    };
    let candidates = collect_candidates(&container);
    let pointer = Point::new(f64::from(ev.client_x()), f64::from(ev.client_y()));

    let target = state.coordinator.with_value(|c| {
        c.as_ref()?.with_tree(|tree| {
            state
                .resolver
                .try_update_value(|r| r.hover(tree, pointer, &candidates).cloned())
                .flatten()
        })
    });
    if state.drop_target.get_untracked() != target {
        state.drop_target.set(target);
    }
}

fn on_drag_leave(state: PanelState, ev: &web_sys::DragEvent) {
    let container = ev
        .current_target()
        .and_then(|t| t.dyn_into::<web_sys::Node>().ok());
    let entered = ev
        .related_target()
        .and_then(|t| t.dyn_into::<web_sys::Node>().ok());
    let still_inside = match (container, entered) {
        (Some(c), Some(n)) => c.contains(Some(&n)),
        _ => false,
    };
    if !still_inside {
        state.resolver.update_value(DropTargetResolver::leave);
        state.drop_target.set(None);
    }
}

fn on_drop(state: PanelState, ev: &web_sys::DragEvent) {
    ev.prevent_default();
    state.drop_target.set(None);
    let Some((id, target)) = state
        .resolver
        .try_update_value(DropTargetResolver::take_drop)
        .flatten()
    else {
        return;
    };
    let Some(c) = state.coordinator() else {
        return;
    };
    spawn_local(async move {
        if let Err(e) = c.move_node(&id, target.into_move_target()).await {
            state.report(Some(&id), e);
        }
    });
}

#[component]
pub fn BookmarkPanel() -> impl IntoView {
    let state = expect_context::<PanelContext>().0;

    spawn_local(connect(state));
    on_cleanup(move || {
        // Dropping the subscription unregisters the chrome listeners.
        state.subscription.set_value(None);
        state.resolver.update_value(DropTargetResolver::cancel);
    });

    let body = Memo::new(move |_| {
        state.revision.track();
        if state.loading.get() {
            return Body::Loading;
        }
        let query = state.search_query.get();
        state.settings.with(|settings| {
            state.coordinator.with_value(|c| match c {
                Some(c) => c.with_tree(|tree| build_body(tree, &query, settings)),
                None => Body::Loading,
            })
        })
    });

    let on_reload = move |_: web_sys::MouseEvent| {
        if let Err(e) = window().location().reload() {
            tracing::warn!(error = ?e, "panel reload failed");
        }
    };

    view! {
        <div class="flex h-full flex-col gap-2 p-2 text-sm">
            <Show when=move || state.fatal.get().is_some() fallback=|| ().into_view()>
                <Alert class="border-destructive/30 flex flex-col gap-2">
                    <AlertDescription class="text-destructive text-xs">
                        {move || state.fatal.get().unwrap_or_default()}
                    </AlertDescription>
                    <Button size=ButtonSize::Sm variant=ButtonVariant::Outline on:click=on_reload>
                        "Reload panel"
                    </Button>
                </Alert>
            </Show>

            <Input bind_value=state.search_query placeholder="Search bookmarks" />

            {move || match body.get() {
                Body::Loading => {
                    if state.fatal.get().is_some() {
                        ().into_any()
                    } else {
                        view! {
                            <div class="flex justify-center py-6">
                                <Spinner />
                            </div>
                        }
                            .into_any()
                    }
                }
                Body::Search { rows, matches } => {
                    view! {
                        <div class="flex flex-col">
                            <div class="px-1 pb-1 text-xs text-muted-foreground">
                                {format!("{matches} match(es)")}
                            </div>
                            {rows
                                .into_iter()
                                .map(|row| view! { <RowItem row axis=Axis::Vertical /> })
                                .collect_view()}
                        </div>
                    }
                        .into_any()
                }
                Body::Tree(sections) => {
                    sections
                        .into_iter()
                        .map(|section| view! { <SectionView section /> })
                        .collect_view()
                        .into_any()
                }
            }}
        </div>
    }
}

#[component]
fn SectionView(section: Section) -> impl IntoView {
    let state = expect_context::<PanelContext>().0;
    let Section {
        header,
        axis,
        items,
        nested,
    } = section;

    let list_class = match axis {
        Axis::Horizontal => "flex flex-row flex-wrap gap-1",
        Axis::Vertical => "flex flex-col",
    };

    view! {
        <section
            class="flex flex-col gap-1"
            on:dragover=move |ev: web_sys::DragEvent| on_drag_over(state, &ev)
            on:dragleave=move |ev: web_sys::DragEvent| on_drag_leave(state, &ev)
            on:drop=move |ev: web_sys::DragEvent| on_drop(state, &ev)
        >
            <RowItem row=header axis=Axis::Vertical />
            <div class=list_class>
                {items.into_iter().map(|row| view! { <RowItem row axis /> }).collect_view()}
            </div>
            {(!nested.is_empty())
                .then(|| {
                    view! {
                        <div class="flex flex-col border-l pl-1">
                            {nested
                                .into_iter()
                                .map(|row| view! { <RowItem row axis=Axis::Vertical /> })
                                .collect_view()}
                        </div>
                    }
                })}
        </section>
    }
}

#[component]
fn RowItem(row: Row, axis: Axis) -> impl IntoView {
    let state = expect_context::<PanelContext>().0;
    let Row {
        id,
        title,
        url,
        depth,
        is_folder,
        expanded,
        fixed,
        icon,
        path,
    } = row;

    let id_sv = StoredValue::new(id.clone());
    let rename_value = RwSignal::new(title.clone());

    let is_editing = move || {
        state
            .editing
            .with(|e| e.as_deref() == Some(id_sv.get_value().as_str()))
    };
    let error_here = move || {
        state.inline_error.with(|e| {
            e.as_ref()
                .filter(|(eid, _)| *eid == id_sv.get_value())
                .map(|(_, msg)| msg.clone())
        })
    };
    let is_into_target = move || {
        state.drop_target.with(|t| {
            matches!(t, Some(DropTarget::IntoFolder { folder_id, .. }) if *folder_id == id_sv.get_value())
        })
    };

    let row_class = move || {
        let base = match axis {
            Axis::Horizontal => "group flex items-center gap-1 rounded-md px-2 py-1",
            Axis::Vertical => "group flex items-center gap-1 rounded-md px-1 py-0.5",
        };
        let state_class = if is_into_target() {
            "bg-primary/10 ring-1 ring-primary/30"
        } else {
            "hover:bg-accent"
        };
        tw_merge!(base, state_class)
    };
    let chevron_class = if expanded {
        "size-3 rotate-90 transition-transform"
    } else {
        "size-3 transition-transform"
    };
    let axis_attr = match axis {
        Axis::Horizontal => "horizontal",
        Axis::Vertical => "vertical",
    };
    let indent = format!("padding-left: {}px", depth * 12);

    let leading = match (&icon, &url) {
        (Some(CustomIcon { icon, color }), _) => view! {
            <span class="inline-flex size-4 items-center justify-center text-xs" style=format!("color: {color}")>
                {icon.chars().next().map(String::from).unwrap_or_default()}
            </span>
        }
            .into_any(),
        (None, Some(u)) => view! { <img class="size-4" src=favicon_src(u) alt="" /> }.into_any(),
        (None, None) => ().into_any(),
    };

    let title_sv = StoredValue::new(title);
    let url_sv = StoredValue::new(url.clone());
    let label = move || match url_sv.get_value() {
        Some(u) => view! {
            <a class="truncate" href=u target="_blank" rel="noreferrer" title=title_sv.get_value()>
                {title_sv.get_value()}
            </a>
        }
            .into_any(),
        None => {
            let label_class = if fixed { "truncate font-medium" } else { "truncate" };
            view! {
                <span class=label_class on:click=move |_| toggle_folder(state, &id_sv.get_value())>
                    {title_sv.get_value()}
                </span>
            }
                .into_any()
        }
    };

    view! {
        <div>
            <div
                class=row_class
                style=indent
                data-node-id=id.clone()
                data-axis=axis_attr
                draggable=if fixed { "false" } else { "true" }
                on:dragstart=move |ev: web_sys::DragEvent| {
                    let id = id_sv.get_value();
                    if let Some(dt) = ev.data_transfer() {
                        let _ = dt.set_data("text/plain", &id);
                        dt.set_effect_allowed("move");
                    }
                    state.resolver.update_value(|r| r.begin(&id));
                }
                on:dragend=move |_: web_sys::DragEvent| {
                    state.resolver.update_value(DropTargetResolver::end);
                    state.drop_target.set(None);
                }
            >
                {(is_folder && !fixed)
                    .then(|| {
                        view! {
                            <button
                                class="inline-flex size-4 items-center justify-center text-muted-foreground"
                                on:click=move |_| toggle_folder(state, &id_sv.get_value())
                            >
                                <ChevronRight class=chevron_class />
                            </button>
                        }
                    })}
                {leading}
                <Show when=is_editing fallback=label>
                    <Input
                        class="h-7"
                        bind_value=rename_value
                        autofocus=true
                        on:keydown=move |ev: web_sys::KeyboardEvent| {
                            match ev.key().as_str() {
                                "Enter" => {
                                    commit_rename(state, id_sv.get_value(), rename_value.get_untracked())
                                }
                                "Escape" => {
                                    state.inline_error.set(None);
                                    state.editing.set(None);
                                }
                                _ => {}
                            }
                        }
                    />
                </Show>
                {path.map(|p| view! { <span class="truncate text-xs text-muted-foreground">{p}</span> })}
                <div class="ml-auto hidden items-center gap-1 group-hover:flex">
                    {is_folder
                        .then(|| {
                            view! {
                                <Button
                                    variant=ButtonVariant::Ghost
                                    size=ButtonSize::Icon
                                    class="h-6 w-6"
                                    attr:title="New folder"
                                    on:click=move |ev: web_sys::MouseEvent| {
                                        ev.stop_propagation();
                                        create_folder(state, id_sv.get_value());
                                    }
                                >
                                    "+"
                                </Button>
                            }
                        })}
                    {(!fixed)
                        .then(|| {
                            view! {
                                <Button
                                    variant=ButtonVariant::Ghost
                                    size=ButtonSize::Icon
                                    class="h-6 w-6"
                                    attr:title="Rename"
                                    on:click=move |ev: web_sys::MouseEvent| {
                                        ev.stop_propagation();
                                        state.inline_error.set(None);
                                        state.editing.set(Some(id_sv.get_value()));
                                    }
                                >
                                    <svg
                                        xmlns="http://www.w3.org/2000/svg"
                                        width="14"
                                        height="14"
                                        viewBox="0 0 24 24"
                                        fill="none"
                                        stroke="currentColor"
                                        stroke-width="2"
                                        stroke-linecap="round"
                                        stroke-linejoin="round"
                                        aria-hidden="true"
                                    >
                                        <path d="M12 20h9" />
                                        <path d="M16.5 3.5a2.121 2.121 0 0 1 3 3L7 19l-4 1 1-4Z" />
                                    </svg>
                                </Button>
                                <Button
                                    variant=ButtonVariant::Ghost
                                    size=ButtonSize::Icon
                                    class="h-6 w-6 text-destructive"
                                    attr:title="Delete"
                                    on:click=move |ev: web_sys::MouseEvent| {
                                        ev.stop_propagation();
                                        remove_node(state, id_sv.get_value());
                                    }
                                >
                                    <X class="size-3" />
                                </Button>
                            }
                        })}
                </div>
            </div>
            {move || {
                error_here()
                    .map(|msg| {
                        view! { <div class="px-2 pb-1 text-xs text-destructive">{msg}</div> }
                    })
            }}
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::fixtures::sample_tree;
    use pretty_assertions::assert_eq;

    fn row_ids(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_folder_rows_follow_expansion() {
        let mut tree = sample_tree();
        assert_eq!(row_ids(&folder_rows(&tree, "2", 0)), vec!["folder-docs", "20", "21"]);

        tree.set_expanded("20", true);
        let rows = folder_rows(&tree, "2", 0);
        assert_eq!(row_ids(&rows), vec!["folder-docs", "20", "200", "201", "21"]);
        assert_eq!(rows[2].depth, 1);
        assert!(rows[1].expanded);
    }

    #[test]
    fn test_sections_follow_bar_position() {
        let mut tree = sample_tree();
        tree.set_expanded("11", true);

        let top = sections(&tree, BarPosition::Top);
        assert_eq!(top[0].header.id, "1");
        assert_eq!(top[0].axis, Axis::Horizontal);
        assert!(top[0].header.fixed);
        assert_eq!(row_ids(&top[0].items), vec!["10", "11"]);
        assert_eq!(row_ids(&top[0].nested), vec!["11", "110"]);

        let bottom = sections(&tree, BarPosition::Bottom);
        let headers: Vec<&str> = bottom.iter().map(|s| s.header.id.as_str()).collect();
        assert_eq!(headers, vec!["2", "1"]);
    }

    #[test]
    fn test_search_rows_carry_paths() {
        let tree = sample_tree();
        let view = search::filter(&tree, "lobsters", &SearchOptions::default()).expect("active");
        let rows = search_rows(&tree, &view);
        assert_eq!(row_ids(&rows), vec!["2", "20", "201"]);
        assert_eq!(rows[2].path.as_deref(), Some("Autres favoris / News"));
        assert_eq!(rows[0].path, None);
        assert!(rows[1].expanded);
    }

    #[test]
    fn test_search_body_replaces_tree_only_when_active() {
        let tree = sample_tree();
        let settings = PanelSettings::default();
        assert!(matches!(build_body(&tree, "  ", &settings), Body::Tree(_)));
        assert!(matches!(
            build_body(&tree, "rust", &settings),
            Body::Search { matches: 1, .. }
        ));
    }

    #[test]
    fn test_favicon_src_encodes_page_url() {
        assert_eq!(
            favicon_src("https://example.com/a b?x=1&y=2"),
            "/_favicon/?pageUrl=https%3A%2F%2Fexample.com%2Fa%20b%3Fx%3D1%26y%3D2&size=16"
        );
    }
}
