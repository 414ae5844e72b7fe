//! Single writer of the bookmark tree.
//!
//! Every structural change goes through [`MutationCoordinator`]: it validates the
//! request, applies it to the local tree right away, sends it to the store, and
//! reverts the affected subtree if the store says no. External change events are
//! funnelled through it as well so that echoes of our own requests are not
//! replayed over newer local state.

mod validate;

pub use validate::{validate_title, MAX_TITLE_CHARS};

use crate::config::TopLevelIds;
use crate::error::{MutationKind, PanelError, PanelResult};
use crate::models::{CustomIcon, MoveTarget, NewBookmark, PanelOverlay};
use crate::store::{BookmarkStore, CreateRequest, MoveRequest, StoreError, UpdateChanges};
use crate::tree::{BookmarkTree, StoreEvent};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Echoes we still expect but never received are dropped past this many.
const MAX_EXPECTED_ECHOES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OpId(u64);

#[derive(Clone, Debug)]
struct PendingOp {
    id: OpId,
    kind: MutationKind,
    /// Nodes this op owns until it settles.
    locks: Vec<String>,
    /// Ancestors of the locked nodes when the op started. A detached node
    /// can no longer be reached through parent links, so these are kept.
    ancestors: Vec<String>,
    /// Set when an external event touched a locked node; rollback is skipped.
    superseded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Echo {
    Moved {
        id: String,
        parent_id: String,
        index: usize,
    },
    Renamed {
        id: String,
        title: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EchoMatch {
    None,
    /// The event is our own request coming back unchanged.
    Exact,
    /// Our request, but the store settled somewhere else: apply it.
    Reconcile,
}

struct State {
    tree: BookmarkTree,
    revision: u64,
    next_op: u64,
    pending: Vec<PendingOp>,
    echoes: Vec<Echo>,
    session_lost: bool,
}

impl State {
    fn ensure_live(&self) -> PanelResult<()> {
        if self.session_lost {
            Err(PanelError::ConnectionInvalidated)
        } else {
            Ok(())
        }
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    fn ancestors_of(&self, id: &str) -> Vec<String> {
        self.tree.ancestors(id).into_iter().map(str::to_string).collect()
    }

    fn begin(&mut self, kind: MutationKind, locks: Vec<String>, ancestors: Vec<String>) -> OpId {
        self.next_op += 1;
        let id = OpId(self.next_op);
        tracing::debug!(op = id.0, %kind, ?locks, "mutation started");
        self.pending.push(PendingOp {
            id,
            kind,
            locks,
            ancestors,
            superseded: false,
        });
        id
    }

    fn finish(&mut self, op: OpId) -> Option<PendingOp> {
        let pos = self.pending.iter().position(|p| p.id == op)?;
        Some(self.pending.remove(pos))
    }

    /// `subject` may not be related to any locked node; `target_parent` may not
    /// sit inside a locked subtree.
    fn check_conflicts(&self, subject: Option<&str>, target_parent: Option<&str>) -> PanelResult<()> {
        for op in &self.pending {
            if let Some(s) = subject {
                if op.ancestors.iter().any(|a| a == s) {
                    return Err(PanelError::ConflictingMutation {
                        node_id: s.to_string(),
                    });
                }
            }
            for locked in &op.locks {
                if let Some(s) = subject {
                    if self.tree.is_same_or_descendant(s, locked)
                        || self.tree.is_same_or_descendant(locked, s)
                    {
                        return Err(PanelError::ConflictingMutation {
                            node_id: s.to_string(),
                        });
                    }
                }
                if let Some(p) = target_parent {
                    if self.tree.is_same_or_descendant(p, locked) {
                        return Err(PanelError::ConflictingMutation {
                            node_id: p.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn expect_echo(&mut self, echo: Echo) {
        if self.echoes.len() >= MAX_EXPECTED_ECHOES {
            self.echoes.remove(0);
        }
        self.echoes.push(echo);
    }

    fn forget_echo(&mut self, echo: &Echo) {
        if let Some(pos) = self.echoes.iter().position(|e| e == echo) {
            self.echoes.remove(pos);
        }
    }

    fn consume_echo(&mut self, event: &StoreEvent) -> EchoMatch {
        let found = self.echoes.iter().position(|echo| match (echo, event) {
            (Echo::Moved { id, .. }, StoreEvent::Moved { id: ev_id, .. }) => id == ev_id,
            (Echo::Renamed { id, .. }, StoreEvent::Changed { id: ev_id, patch }) => {
                id == ev_id && patch.title.is_some()
            }
            _ => false,
        });
        let Some(pos) = found else {
            return EchoMatch::None;
        };
        let echo = self.echoes.remove(pos);
        let exact = match (&echo, event) {
            (
                Echo::Moved {
                    parent_id, index, ..
                },
                StoreEvent::Moved {
                    parent_id: p,
                    index: i,
                    ..
                },
            ) => parent_id == p && index == i,
            (Echo::Renamed { id, title }, StoreEvent::Changed { patch, .. }) => {
                let same_url = match &patch.url {
                    None => true,
                    Some(u) => self.tree.get(id).and_then(|e| e.url.as_ref()) == Some(u),
                };
                patch.title.as_ref() == Some(title) && same_url
            }
            _ => false,
        };
        if exact {
            EchoMatch::Exact
        } else {
            EchoMatch::Reconcile
        }
    }

    fn supersede(&mut self, touched: &[String]) {
        for op in &mut self.pending {
            if op.locks.iter().any(|l| touched.contains(l)) {
                tracing::debug!(op = op.id.0, kind = %op.kind, "superseded by external change");
                op.superseded = true;
            }
        }
    }

    fn store_failure(&mut self, kind: MutationKind, e: StoreError) -> PanelError {
        match e {
            StoreError::ConnectionInvalidated => {
                if !self.session_lost {
                    tracing::error!(%kind, "bookmark store connection lost");
                }
                self.session_lost = true;
                PanelError::ConnectionInvalidated
            }
            StoreError::Rejected(message) => {
                tracing::warn!(%kind, %message, "store rejected mutation");
                PanelError::MutationFailed { kind, message }
            }
        }
    }
}

struct Inner<S> {
    store: S,
    state: RefCell<State>,
    listeners: RefCell<Vec<Rc<dyn Fn(u64)>>>,
    notified: Cell<u64>,
}

/// Cheap-clone handle; all clones share the same tree and store.
pub struct MutationCoordinator<S> {
    inner: Rc<Inner<S>>,
}

impl<S> Clone for MutationCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: BookmarkStore> MutationCoordinator<S> {
    /// Fetch the full snapshot and build the local mirror.
    pub async fn connect(store: S, top_level: &TopLevelIds) -> PanelResult<Self> {
        let root = store.get_tree().await.map_err(|e| {
            tracing::error!(error = %e, "bookmark snapshot unavailable");
            PanelError::StoreUnavailable(e.to_string())
        })?;
        let tree = BookmarkTree::from_snapshot(root, top_level)?;
        tracing::debug!(nodes = tree.len(), "bookmark tree loaded");
        Ok(Self::new(store, tree))
    }

    pub fn new(store: S, tree: BookmarkTree) -> Self {
        Self {
            inner: Rc::new(Inner {
                store,
                state: RefCell::new(State {
                    tree,
                    revision: 0,
                    next_op: 0,
                    pending: Vec::new(),
                    echoes: Vec::new(),
                    session_lost: false,
                }),
                listeners: RefCell::new(Vec::new()),
                notified: Cell::new(0),
            }),
        }
    }

    /// Read the current tree. `f` must not call back into the coordinator.
    pub fn with_tree<R>(&self, f: impl FnOnce(&BookmarkTree) -> R) -> R {
        f(&self.inner.state.borrow().tree)
    }

    pub fn revision(&self) -> u64 {
        self.inner.state.borrow().revision
    }

    pub fn is_session_lost(&self) -> bool {
        self.inner.state.borrow().session_lost
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    /// Called with the new revision after every change to the tree or overlay.
    pub fn subscribe(&self, listener: impl Fn(u64) + 'static) {
        self.inner.listeners.borrow_mut().push(Rc::new(listener));
    }

    fn notify(&self) {
        let revision = self.revision();
        if revision == self.inner.notified.get() {
            return;
        }
        self.inner.notified.set(revision);
        let listeners = self.inner.listeners.borrow().clone();
        for l in listeners {
            l(revision);
        }
    }

    /// Move `node_id` so that it ends up at `target.index` inside `target.parent_id`.
    pub async fn move_node(&self, node_id: &str, target: MoveTarget) -> PanelResult<()> {
        let (op, req, echo) = {
            let mut st = self.inner.state.borrow_mut();
            st.ensure_live()?;
            let tree = &st.tree;
            if !tree.contains(node_id) {
                return Err(PanelError::NodeNotFound(node_id.to_string()));
            }
            if tree.is_fixed(node_id) {
                return Err(PanelError::FixedFolder(node_id.to_string()));
            }
            if !tree.contains(&target.parent_id) {
                return Err(PanelError::NodeNotFound(target.parent_id.clone()));
            }
            if tree.is_same_or_descendant(&target.parent_id, node_id) {
                return Err(PanelError::InvalidMoveCycle {
                    node_id: node_id.to_string(),
                    parent_id: target.parent_id.clone(),
                });
            }
            if !tree.is_folder(&target.parent_id) {
                return Err(PanelError::NotAFolder(target.parent_id.clone()));
            }
            if target.parent_id == tree.root_id() {
                return Err(PanelError::FixedFolder(target.parent_id.clone()));
            }

            let from_parent_id = tree.parent_id(node_id).unwrap_or_default().to_string();
            let from_index = tree.index_of(node_id).unwrap_or_default();
            let same_parent = from_parent_id == target.parent_id;
            let len_after = tree.children(&target.parent_id).len() - usize::from(same_parent);
            if target.index > len_after {
                return Err(PanelError::IndexOutOfRange {
                    parent_id: target.parent_id.clone(),
                    index: target.index,
                    len: len_after,
                });
            }
            if same_parent && from_index == target.index {
                return Ok(());
            }
            st.check_conflicts(Some(node_id), Some(&target.parent_id))?;

            let ancestors = st.ancestors_of(node_id);
            st.tree.relocate(node_id, &target.parent_id, target.index)?;
            st.bump();
            let op = st.begin(MutationKind::Move, vec![node_id.to_string()], ancestors);
            let echo = Echo::Moved {
                id: node_id.to_string(),
                parent_id: target.parent_id.clone(),
                index: target.index,
            };
            st.expect_echo(echo.clone());
            let req = MoveRequest {
                id: node_id.to_string(),
                parent_id: target.parent_id,
                index: target.index,
                from_parent_id,
                from_index,
            };
            (op, req, echo)
        };
        self.notify();

        let result = self.inner.store.move_node(req.clone()).await;

        let outcome = {
            let mut st = self.inner.state.borrow_mut();
            let pending = st.finish(op);
            match result {
                Ok(()) => Ok(()),
                Err(e) => {
                    st.forget_echo(&echo);
                    let superseded = pending.is_some_and(|p| p.superseded);
                    if !superseded && st.tree.contains(&req.id) {
                        let len = st.tree.children(&req.from_parent_id).len();
                        let back = if st.tree.parent_id(&req.id) == Some(req.from_parent_id.as_str()) {
                            req.from_index.min(len.saturating_sub(1))
                        } else {
                            req.from_index.min(len)
                        };
                        match st.tree.relocate(&req.id, &req.from_parent_id, back) {
                            Ok(()) => st.bump(),
                            Err(err) => {
                                tracing::warn!(id = %req.id, error = %err, "move rollback skipped")
                            }
                        }
                    }
                    Err(st.store_failure(MutationKind::Move, e))
                }
            }
        };
        self.notify();
        outcome
    }

    /// Create a bookmark (or a folder when `url` is `None`) at the end of
    /// `parent_id`. Returns the store-assigned id.
    pub async fn create(&self, parent_id: &str, new: NewBookmark) -> PanelResult<String> {
        validate_title(&new.title, new.url.is_none())?;
        let op = {
            let mut st = self.inner.state.borrow_mut();
            st.ensure_live()?;
            if !st.tree.contains(parent_id) {
                return Err(PanelError::NodeNotFound(parent_id.to_string()));
            }
            if !st.tree.is_folder(parent_id) {
                return Err(PanelError::NotAFolder(parent_id.to_string()));
            }
            if parent_id == st.tree.root_id() {
                return Err(PanelError::FixedFolder(parent_id.to_string()));
            }
            st.check_conflicts(None, Some(parent_id))?;
            st.begin(MutationKind::Create, Vec::new(), Vec::new())
        };

        let req = CreateRequest {
            parent_id: parent_id.to_string(),
            title: new.title,
            url: new.url,
        };
        let result = self.inner.store.create(req).await;

        let outcome = {
            let mut st = self.inner.state.borrow_mut();
            st.finish(op);
            match result {
                Ok(node) => {
                    let id = node.id.clone();
                    if st.tree.contains(&id) {
                        tracing::trace!(%id, "created event arrived first");
                    } else if st.tree.is_folder(parent_id) {
                        match st.tree.insert(parent_id, None, node) {
                            Ok(_) => st.bump(),
                            Err(e) => tracing::warn!(%id, error = %e, "created node not inserted"),
                        }
                    } else {
                        tracing::warn!(%id, parent = %parent_id, "parent vanished before create settled");
                    }
                    Ok(id)
                }
                Err(e) => Err(st.store_failure(MutationKind::Create, e)),
            }
        };
        self.notify();
        outcome
    }

    /// Remove a bookmark, or a folder with everything below it.
    pub async fn remove(&self, node_id: &str) -> PanelResult<()> {
        let (op, subtree, is_folder) = {
            let mut st = self.inner.state.borrow_mut();
            st.ensure_live()?;
            if !st.tree.contains(node_id) {
                return Err(PanelError::NodeNotFound(node_id.to_string()));
            }
            if st.tree.is_fixed(node_id) {
                return Err(PanelError::FixedFolder(node_id.to_string()));
            }
            st.check_conflicts(Some(node_id), None)?;
            let is_folder = st.tree.is_folder(node_id);
            let ancestors = st.ancestors_of(node_id);
            let subtree = st.tree.detach(node_id)?;
            st.bump();
            let op = st.begin(MutationKind::Remove, vec![node_id.to_string()], ancestors);
            (op, subtree, is_folder)
        };
        self.notify();

        let result = self.inner.store.remove(node_id, is_folder).await;

        let outcome = {
            let mut st = self.inner.state.borrow_mut();
            let pending = st.finish(op);
            match result {
                Ok(()) => Ok(()),
                Err(e) => {
                    if !pending.is_some_and(|p| p.superseded) {
                        match st.tree.restore(subtree) {
                            Ok(_) => st.bump(),
                            Err(err) => {
                                tracing::warn!(id = %node_id, error = %err, "remove rollback skipped")
                            }
                        }
                    }
                    Err(st.store_failure(MutationKind::Remove, e))
                }
            }
        };
        self.notify();
        outcome
    }

    pub async fn rename(&self, node_id: &str, title: &str) -> PanelResult<()> {
        let (op, previous, echo) = {
            let mut st = self.inner.state.borrow_mut();
            let Some(entry) = st.tree.get(node_id) else {
                return Err(PanelError::NodeNotFound(node_id.to_string()));
            };
            validate_title(title, entry.is_folder())?;
            if entry.title == title {
                return Ok(());
            }
            st.ensure_live()?;
            if st.tree.is_fixed(node_id) {
                return Err(PanelError::FixedFolder(node_id.to_string()));
            }
            st.check_conflicts(Some(node_id), None)?;
            let ancestors = st.ancestors_of(node_id);
            let previous = st.tree.set_title(node_id, title)?;
            st.bump();
            let op = st.begin(MutationKind::Rename, vec![node_id.to_string()], ancestors);
            let echo = Echo::Renamed {
                id: node_id.to_string(),
                title: title.to_string(),
            };
            st.expect_echo(echo.clone());
            (op, previous, echo)
        };
        self.notify();

        let changes = UpdateChanges {
            title: Some(title.to_string()),
        };
        let result = self.inner.store.update(node_id, changes).await;

        let outcome = {
            let mut st = self.inner.state.borrow_mut();
            let pending = st.finish(op);
            match result {
                Ok(()) => Ok(()),
                Err(e) => {
                    st.forget_echo(&echo);
                    let superseded = pending.is_some_and(|p| p.superseded);
                    let untouched = st.tree.get(node_id).is_some_and(|e| e.title == title);
                    if !superseded && untouched && st.tree.set_title(node_id, &previous).is_ok() {
                        st.bump();
                    }
                    Err(st.store_failure(MutationKind::Rename, e))
                }
            }
        };
        self.notify();
        outcome
    }

    /// Apply a change event from the store. Echoes of our own requests are
    /// swallowed; anything else is applied idempotently. Returns whether the
    /// tree changed.
    pub fn apply_external_event(&self, event: StoreEvent) -> bool {
        let changed = {
            let mut st = self.inner.state.borrow_mut();
            let echo = st.consume_echo(&event);
            if echo == EchoMatch::Exact {
                tracing::trace!(id = event.subject_id(), "own echo skipped");
                return false;
            }
            if echo == EchoMatch::None {
                let touched = match &event {
                    StoreEvent::Removed { id } if st.tree.contains(id) => st.tree.subtree_ids(id),
                    StoreEvent::Removed { id }
                    | StoreEvent::Moved { id, .. }
                    | StoreEvent::Changed { id, .. } => vec![id.clone()],
                    StoreEvent::Created { .. } | StoreEvent::ChildrenReordered { .. } => Vec::new(),
                };
                st.supersede(&touched);
            }
            let changed = st.tree.apply_event(&event);
            if changed {
                st.bump();
            }
            changed
        };
        self.notify();
        changed
    }

    pub fn toggle_expanded(&self, id: &str) -> bool {
        self.update_overlay(|tree| tree.toggle_expanded(id))
    }

    pub fn set_expanded(&self, id: &str, expanded: bool) -> bool {
        self.update_overlay(|tree| tree.set_expanded(id, expanded))
    }

    pub fn set_custom_icon(&self, id: &str, icon: Option<CustomIcon>) -> bool {
        self.update_overlay(|tree| tree.set_custom_icon(id, icon))
    }

    pub fn apply_overlay(&self, overlay: &PanelOverlay) {
        self.update_overlay(|tree| {
            tree.apply_overlay(overlay);
            true
        });
    }

    pub fn overlay(&self) -> PanelOverlay {
        self.with_tree(BookmarkTree::overlay)
    }

    fn update_overlay(&self, f: impl FnOnce(&mut BookmarkTree) -> bool) -> bool {
        let changed = {
            let mut st = self.inner.state.borrow_mut();
            let changed = f(&mut st.tree);
            if changed {
                st.bump();
            }
            changed
        };
        self.notify();
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NameError;
    use crate::models::BookmarkNode;
    use crate::store::scripted::ScriptedStore;
    use crate::tree::fixtures::{ids, sample_root, sample_tree};
    use futures::executor::{block_on, LocalPool};
    use futures::task::LocalSpawnExt;
    use pretty_assertions::assert_eq;

    fn setup() -> (MutationCoordinator<ScriptedStore>, ScriptedStore) {
        let store = ScriptedStore::default();
        (MutationCoordinator::new(store.clone(), sample_tree()), store)
    }

    fn children(c: &MutationCoordinator<ScriptedStore>, id: &str) -> Vec<String> {
        c.with_tree(|t| t.children(id).to_vec())
    }

    fn title(c: &MutationCoordinator<ScriptedStore>, id: &str) -> Option<String> {
        c.with_tree(|t| t.get(id).map(|e| e.title.clone()))
    }

    #[test]
    fn test_connect_reports_store_unavailable() {
        let store = ScriptedStore::default();
        store.set_snapshot(Err(StoreError::ConnectionInvalidated));
        let err = block_on(MutationCoordinator::connect(store, &TopLevelIds::default()))
            .err()
            .expect("snapshot failed");
        assert_eq!(
            err,
            PanelError::StoreUnavailable("connection invalidated".to_string())
        );
    }

    #[test]
    fn test_connect_rejects_snapshot_without_other_folder() {
        let store = ScriptedStore::default();
        let mut root = sample_root();
        root.children.as_mut().expect("root children").remove(1);
        store.set_snapshot(Ok(root));
        let err = block_on(MutationCoordinator::connect(store, &TopLevelIds::default()))
            .err()
            .expect("other folder missing");
        assert!(matches!(err, PanelError::StructuralInvariantViolation(_)));
    }

    #[test]
    fn test_move_into_self_or_descendant_is_rejected_untouched() {
        let (c, store) = setup();
        let before = c.with_tree(|t| t.to_node("0"));
        for parent in ["folder-docs", "doc-link"] {
            let err = block_on(c.move_node("folder-docs", MoveTarget::new(parent, 0)))
                .expect_err("cycle");
            assert!(matches!(err, PanelError::InvalidMoveCycle { .. }));
        }
        let err = block_on(c.move_node("2", MoveTarget::new("folder-docs", 0))).expect_err("fixed");
        assert_eq!(err, PanelError::FixedFolder("2".to_string()));
        assert_eq!(c.with_tree(|t| t.to_node("0")), before);
        assert!(store.calls().is_empty());
        assert_eq!(c.revision(), 0);
    }

    #[test]
    fn test_move_into_descendant_leaf_is_a_cycle() {
        let (c, _) = setup();
        let err = block_on(c.move_node("20", MoveTarget::new("200", 0))).expect_err("cycle");
        assert_eq!(
            err,
            PanelError::InvalidMoveCycle {
                node_id: "20".to_string(),
                parent_id: "200".to_string()
            }
        );
    }

    #[test]
    fn test_move_places_node_at_final_index() {
        let (c, store) = setup();
        block_on(c.move_node("doc-link", MoveTarget::new("20", 1))).expect("move");
        assert_eq!(children(&c, "20"), vec!["200", "doc-link", "201"]);
        assert_eq!(children(&c, "folder-docs"), vec!["mdn"]);
        assert_eq!(store.calls(), vec!["move doc-link 20[1] from folder-docs[0]"]);

        // Down within the same parent.
        block_on(c.move_node("folder-docs", MoveTarget::new("2", 2))).expect("move down");
        assert_eq!(children(&c, "2"), vec!["20", "21", "folder-docs"]);
    }

    #[test]
    fn test_move_to_current_position_sends_nothing() {
        let (c, store) = setup();
        block_on(c.move_node("20", MoveTarget::new("2", 1))).expect("noop move");
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_move_out_of_range_index() {
        let (c, _) = setup();
        let err = block_on(c.move_node("20", MoveTarget::new("2", 3))).expect_err("range");
        assert_eq!(
            err,
            PanelError::IndexOutOfRange {
                parent_id: "2".to_string(),
                index: 3,
                len: 2
            }
        );
    }

    #[test]
    fn test_failed_move_rolls_back() {
        let (c, store) = setup();
        store.fail_next(StoreError::Rejected("Can't move".to_string()));
        let err = block_on(c.move_node("21", MoveTarget::new("1", 0))).expect_err("rejected");
        assert_eq!(
            err,
            PanelError::MutationFailed {
                kind: MutationKind::Move,
                message: "Can't move".to_string()
            }
        );
        assert_eq!(children(&c, "1"), vec!["10", "11"]);
        assert_eq!(children(&c, "2"), vec!["folder-docs", "20", "21"]);
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn test_failed_move_down_same_parent_rolls_back() {
        let (c, store) = setup();
        store.fail_next(StoreError::Rejected("nope".to_string()));
        let _ = block_on(c.move_node("folder-docs", MoveTarget::new("2", 2)));
        assert_eq!(children(&c, "2"), vec!["folder-docs", "20", "21"]);
    }

    #[test]
    fn test_create_then_remove_restores_children() {
        let (c, store) = setup();
        let before = children(&c, "20");
        let id = block_on(c.create("20", NewBookmark::bookmark("LWN", "https://lwn.net/")))
            .expect("create");
        assert_eq!(children(&c, "20").last(), Some(&id));
        block_on(c.remove(&id)).expect("remove");
        assert_eq!(children(&c, "20"), before);
        assert_eq!(
            store.calls(),
            vec!["create 20 LWN".to_string(), format!("remove {id}")]
        );
    }

    #[test]
    fn test_create_validates_before_network() {
        let (c, store) = setup();
        let err = block_on(c.create("20", NewBookmark::folder("a/b"))).expect_err("invalid");
        assert_eq!(err, PanelError::InvalidName(NameError::ForbiddenChar('/')));
        let err = block_on(c.create("21", NewBookmark::folder("Sub"))).expect_err("leaf parent");
        assert_eq!(err, PanelError::NotAFolder("21".to_string()));
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_created_folder_is_appended_as_empty_folder() {
        let (c, _) = setup();
        let id = block_on(c.create("2", NewBookmark::folder("Archive"))).expect("create");
        assert_eq!(children(&c, "2"), vec!["folder-docs", "20", "21", id.as_str()]);
        assert!(c.with_tree(|t| t.is_folder(&id) && t.children(&id).is_empty()));
    }

    #[test]
    fn test_failed_remove_restores_subtree_at_prior_index() {
        let (c, store) = setup();
        c.set_expanded("20", true);
        store.fail_next(StoreError::Rejected("busy".to_string()));
        let err = block_on(c.remove("20")).expect_err("rejected");
        assert!(matches!(err, PanelError::MutationFailed { kind: MutationKind::Remove, .. }));
        assert_eq!(children(&c, "2"), vec!["folder-docs", "20", "21"]);
        assert_eq!(children(&c, "20"), vec!["200", "201"]);
        assert!(c.with_tree(|t| t.is_expanded("20")));
        assert_eq!(store.calls(), vec!["removeTree 20"]);
    }

    #[test]
    fn test_rename_validation_and_rollback() {
        let (c, store) = setup();
        let err = block_on(c.rename("21", "x".repeat(101).as_str())).expect_err("too long");
        assert!(err.is_validation());
        assert!(store.calls().is_empty());

        store.fail_next(StoreError::Rejected("denied".to_string()));
        let _ = block_on(c.rename("21", "Météo"));
        assert_eq!(title(&c, "21").as_deref(), Some("Weather"));

        block_on(c.rename("21", "Météo")).expect("rename");
        assert_eq!(title(&c, "21").as_deref(), Some("Météo"));
        assert_eq!(store.calls().last().map(String::as_str), Some("update 21 Météo"));
    }

    #[test]
    fn test_overlapping_mutation_conflicts_while_pending() {
        let (c, store) = setup();
        let mut pool = LocalPool::new();
        let release = store.hold_next();

        let c2 = c.clone();
        pool.spawner()
            .spawn_local(async move {
                c2.move_node("folder-docs", MoveTarget::new("20", 0))
                    .await
                    .expect("move settles");
            })
            .expect("spawn");
        pool.run_until_stalled();
        assert_eq!(c.pending_count(), 1);

        let err = block_on(c.rename("doc-link", "Chrome docs")).expect_err("descendant locked");
        assert_eq!(
            err,
            PanelError::ConflictingMutation {
                node_id: "doc-link".to_string()
            }
        );
        let err = block_on(c.move_node("20", MoveTarget::new("1", 0))).expect_err("ancestor locked");
        assert!(matches!(err, PanelError::ConflictingMutation { .. }));
        let err = block_on(c.create("folder-docs", NewBookmark::folder("Inner")))
            .expect_err("target inside locked subtree");
        assert!(matches!(err, PanelError::ConflictingMutation { .. }));
        assert_eq!(title(&c, "doc-link").as_deref(), Some("Doc Chrome"));

        // Unrelated node is fine.
        block_on(c.rename("10", "Rust lang")).expect("unrelated rename");

        release.send(()).expect("release");
        pool.run_until_stalled();
        assert_eq!(c.pending_count(), 0);
        assert_eq!(children(&c, "20"), vec!["folder-docs", "200", "201"]);
    }

    #[test]
    fn test_pending_remove_locks_former_ancestors() {
        let (c, store) = setup();
        let mut pool = LocalPool::new();
        let release = store.hold_next();
        store.fail_next(StoreError::Rejected("busy".to_string()));
        let result = Rc::new(RefCell::new(None));

        let (c2, r2) = (c.clone(), result.clone());
        pool.spawner()
            .spawn_local(async move {
                *r2.borrow_mut() = Some(c2.remove("doc-link").await);
            })
            .expect("spawn");
        pool.run_until_stalled();
        assert_eq!(children(&c, "folder-docs"), vec!["mdn"]);

        let err = block_on(c.remove("folder-docs")).expect_err("ancestor of pending remove");
        assert_eq!(
            err,
            PanelError::ConflictingMutation {
                node_id: "folder-docs".to_string()
            }
        );
        let err = block_on(c.move_node("folder-docs", MoveTarget::new("1", 0)))
            .expect_err("ancestor of pending remove");
        assert!(matches!(err, PanelError::ConflictingMutation { .. }));
        assert_eq!(c.pending_count(), 1);
        assert_eq!(store.calls(), vec!["remove doc-link"]);

        release.send(()).expect("release");
        pool.run_until_stalled();
        assert!(result.borrow().as_ref().is_some_and(Result::is_err));
        assert_eq!(children(&c, "folder-docs"), vec!["doc-link", "mdn"]);
        assert_eq!(children(&c, "2"), vec!["folder-docs", "20", "21"]);
    }

    #[test]
    fn test_leaf_rename_echo_with_url_is_not_replayed() {
        let (c, _) = setup();
        block_on(c.rename("21", "Météo")).expect("rename");
        block_on(c.rename("21", "Forecast")).expect("rename");

        let rev = c.revision();
        assert!(!c.apply_external_event(StoreEvent::Changed {
            id: "21".to_string(),
            patch: crate::models::NodePatch {
                title: Some("Météo".to_string()),
                url: Some("https://weather.example/".to_string()),
            },
        }));
        assert_eq!(title(&c, "21").as_deref(), Some("Forecast"));
        assert_eq!(c.revision(), rev);
    }

    #[test]
    fn test_removed_event_during_move_is_not_resurrected() {
        for fail in [false, true] {
            let (c, store) = setup();
            let mut pool = LocalPool::new();
            let release = store.hold_next();
            if fail {
                store.fail_next(StoreError::Rejected("gone".to_string()));
            }
            let result = Rc::new(RefCell::new(None));

            let (c2, r2) = (c.clone(), result.clone());
            pool.spawner()
                .spawn_local(async move {
                    *r2.borrow_mut() = Some(c2.move_node("21", MoveTarget::new("1", 0)).await);
                })
                .expect("spawn");
            pool.run_until_stalled();
            assert_eq!(children(&c, "1"), vec!["21", "10", "11"]);

            assert!(c.apply_external_event(StoreEvent::Removed {
                id: "21".to_string()
            }));
            release.send(()).expect("release");
            pool.run_until_stalled();

            assert_eq!(result.borrow().as_ref().map(Result::is_ok), Some(!fail));
            assert!(!c.with_tree(|t| t.contains("21")));
            assert_eq!(children(&c, "1"), vec!["10", "11"]);
            assert_eq!(children(&c, "2"), vec!["folder-docs", "20"]);
        }
    }

    #[test]
    fn test_external_removal_supersedes_pending_remove_rollback() {
        let (c, store) = setup();
        let mut pool = LocalPool::new();
        let release = store.hold_next();
        store.fail_next(StoreError::Rejected("late failure".to_string()));

        let c2 = c.clone();
        pool.spawner()
            .spawn_local(async move {
                let _ = c2.remove("20").await;
            })
            .expect("spawn");
        pool.run_until_stalled();
        assert!(!c.apply_external_event(StoreEvent::Removed {
            id: "20".to_string()
        }));
        release.send(()).expect("release");
        pool.run_until_stalled();
        assert!(!c.with_tree(|t| t.contains("20")));
    }

    #[test]
    fn test_own_move_echo_is_not_replayed() {
        let (c, _) = setup();
        block_on(c.move_node("21", MoveTarget::new("2", 0))).expect("move");
        // Newer local state: another move lands before the echo of the first.
        block_on(c.move_node("20", MoveTarget::new("2", 0))).expect("move");
        assert_eq!(children(&c, "2"), vec!["20", "21", "folder-docs"]);

        let rev = c.revision();
        assert!(!c.apply_external_event(StoreEvent::Moved {
            id: "21".to_string(),
            parent_id: "2".to_string(),
            index: 0
        }));
        assert_eq!(children(&c, "2"), vec!["20", "21", "folder-docs"]);
        assert_eq!(c.revision(), rev);
    }

    #[test]
    fn test_move_echo_with_different_index_reconciles() {
        let (c, _) = setup();
        block_on(c.move_node("10", MoveTarget::new("2", 0))).expect("move");
        assert!(c.apply_external_event(StoreEvent::Moved {
            id: "10".to_string(),
            parent_id: "2".to_string(),
            index: 3
        }));
        assert_eq!(children(&c, "2"), vec!["folder-docs", "20", "21", "10"]);
    }

    #[test]
    fn test_late_rename_echo_does_not_revert_newer_title() {
        let (c, _) = setup();
        block_on(c.rename("20", "Actu")).expect("rename");
        block_on(c.rename("20", "Journaux")).expect("rename");
        c.apply_external_event(StoreEvent::Changed {
            id: "20".to_string(),
            patch: crate::models::NodePatch {
                title: Some("Actu".to_string()),
                url: None,
            },
        });
        assert_eq!(title(&c, "20").as_deref(), Some("Journaux"));
    }

    #[test]
    fn test_connection_loss_is_session_fatal() {
        let (c, store) = setup();
        store.fail_next(StoreError::ConnectionInvalidated);
        let err = block_on(c.rename("21", "Météo")).expect_err("lost");
        assert_eq!(err, PanelError::ConnectionInvalidated);
        assert!(c.is_session_lost());
        assert_eq!(title(&c, "21").as_deref(), Some("Weather"));

        let err = block_on(c.move_node("21", MoveTarget::new("1", 0))).expect_err("fatal");
        assert!(err.is_session_fatal());
        assert_eq!(store.calls().len(), 1);
    }

    #[test]
    fn test_external_events_apply_and_notify() {
        let (c, _) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s2 = seen.clone();
        c.subscribe(move |rev| s2.borrow_mut().push(rev));

        let created = StoreEvent::Created {
            parent_id: "11".to_string(),
            index: 0,
            node: BookmarkNode::bookmark("ext", "docs.rs", "https://docs.rs/"),
        };
        assert!(c.apply_external_event(created.clone()));
        assert!(!c.apply_external_event(created));
        assert!(c.toggle_expanded("11"));
        assert_eq!(ids(&children(&c, "11")), vec!["ext", "110"]);
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(c.overlay().expanded, vec!["11".to_string()]);
    }
}
