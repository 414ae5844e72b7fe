//! Local mirror of the browser's bookmark hierarchy.
//!
//! Nodes live in an id-keyed arena; each entry keeps its parent id and the ordered
//! ids of its children, so lookups are O(1) and ancestor walks are O(depth).
//! The UI-only overlay (expansion, custom icons) is kept next to the arena and
//! never leaves the panel.

pub(crate) mod events;

pub use events::{parse_listener_payload, ListenerKind, StoreEvent};

use crate::config::TopLevelIds;
use crate::error::{PanelError, PanelResult};
use crate::models::{BookmarkNode, CustomIcon, FolderType, NodeMeta, PanelOverlay};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub date_added: Option<u64>,
    parent: Option<String>,
    children: Vec<String>,
}

impl Entry {
    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }
}

/// A subtree spliced out of the tree, with enough context to put it back.
#[derive(Clone, Debug, PartialEq)]
pub struct DetachedSubtree {
    pub parent_id: String,
    pub index: usize,
    root_id: String,
    /// Preorder; the first entry is the subtree root.
    entries: Vec<Entry>,
    meta: Vec<(String, NodeMeta)>,
}

impl DetachedSubtree {
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct BookmarkTree {
    root_id: String,
    bar_id: String,
    other_id: String,
    entries: HashMap<String, Entry>,
    meta: HashMap<String, NodeMeta>,
}

impl BookmarkTree {
    /// Build the mirror from a full snapshot (the synthetic root node).
    ///
    /// The bar and other folders are located by folder type first, then by the
    /// reserved ids. A snapshot lacking either is rejected, never patched up.
    pub fn from_snapshot(root: BookmarkNode, ids: &TopLevelIds) -> PanelResult<Self> {
        if !root.is_folder() {
            return Err(PanelError::StructuralInvariantViolation(format!(
                "root {} is not a folder",
                root.id
            )));
        }

        let top_level: Vec<(String, Option<FolderType>, bool)> = root
            .children
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|n| (n.id.clone(), n.folder_type, n.is_folder()))
            .collect();

        let find = |kind: FolderType, reserved: &str, label: &str| -> PanelResult<String> {
            top_level
                .iter()
                .find(|(_, t, folder)| *folder && *t == Some(kind))
                .or_else(|| top_level.iter().find(|(id, _, folder)| *folder && id == reserved))
                .map(|(id, _, _)| id.clone())
                .ok_or_else(|| {
                    PanelError::StructuralInvariantViolation(format!("missing {label} folder"))
                })
        };
        let bar_id = find(FolderType::BookmarksBar, &ids.bar, "bookmarks bar")?;
        let other_id = find(FolderType::Other, &ids.other, "other bookmarks")?;

        let root_id = root.id.clone();
        let mut entries = HashMap::new();
        let mut stack = vec![(root, None::<String>)];
        while let Some((mut node, parent)) = stack.pop() {
            let kids = if node.is_folder() {
                node.children.take().unwrap_or_default()
            } else {
                Vec::new()
            };
            let entry = Entry {
                id: node.id.clone(),
                title: node.title,
                url: node.url,
                date_added: node.date_added,
                parent,
                children: kids.iter().map(|k| k.id.clone()).collect(),
            };
            if entries.insert(node.id.clone(), entry).is_some() {
                return Err(PanelError::StructuralInvariantViolation(format!(
                    "duplicate id {}",
                    node.id
                )));
            }
            for kid in kids.into_iter().rev() {
                stack.push((kid, Some(node.id.clone())));
            }
        }

        Ok(Self {
            root_id,
            bar_id,
            other_id,
            entries,
            meta: HashMap::new(),
        })
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn bar_id(&self) -> &str {
        &self.bar_id
    }

    pub fn other_id(&self) -> &str {
        &self.other_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_folder(&self, id: &str) -> bool {
        self.get(id).is_some_and(Entry::is_folder)
    }

    /// Root, bar and other: neither movable, renamable nor removable.
    pub fn is_fixed(&self, id: &str) -> bool {
        id == self.root_id || id == self.bar_id || id == self.other_id
    }

    pub fn is_top_level(&self, id: &str) -> bool {
        self.parent_id(id) == Some(self.root_id.as_str())
    }

    pub fn parent_id(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(Entry::parent_id)
    }

    pub fn children(&self, id: &str) -> &[String] {
        self.get(id).map(Entry::children).unwrap_or_default()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        let parent = self.parent_id(id)?;
        self.children(parent).iter().position(|c| c == id)
    }

    /// True when `id` is `ancestor` or lies somewhere below it.
    pub fn is_same_or_descendant(&self, id: &str, ancestor: &str) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.parent_id(c);
        }
        false
    }

    /// Ancestor ids, nearest first, excluding the node itself.
    pub fn ancestors(&self, id: &str) -> Vec<&str> {
        let mut out = Vec::new();
        let mut cur = self.parent_id(id);
        while let Some(c) = cur {
            out.push(c);
            cur = self.parent_id(c);
        }
        out
    }

    /// Titles from the top-level folder down to the node's parent. The synthetic
    /// root is skipped.
    pub fn path_titles(&self, id: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .ancestors(id)
            .into_iter()
            .filter(|a| *a != self.root_id)
            .filter_map(|a| self.get(a).map(|e| e.title.as_str()))
            .collect();
        out.reverse();
        out
    }

    /// Preorder ids of the subtree rooted at `id` (including `id`).
    pub fn subtree_ids(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id.to_string()];
        while let Some(cur) = stack.pop() {
            for kid in self.children(&cur).iter().rev() {
                stack.push(kid.clone());
            }
            out.push(cur);
        }
        out
    }

    /// Rebuild the nested wire shape for a node, with `parent_id`/`index` filled in.
    pub fn to_node(&self, id: &str) -> Option<BookmarkNode> {
        let e = self.get(id)?;
        let children = if e.is_folder() {
            Some(
                e.children
                    .iter()
                    .filter_map(|c| self.to_node(c))
                    .collect::<Vec<_>>(),
            )
        } else {
            None
        };
        let folder_type = if id == self.bar_id {
            Some(FolderType::BookmarksBar)
        } else if id == self.other_id {
            Some(FolderType::Other)
        } else {
            None
        };
        Some(BookmarkNode {
            id: e.id.clone(),
            parent_id: e.parent.clone(),
            index: self.index_of(id),
            title: e.title.clone(),
            url: e.url.clone(),
            folder_type,
            date_added: e.date_added,
            children,
        })
    }

    fn require_folder(&self, id: &str) -> PanelResult<&Entry> {
        let e = self
            .get(id)
            .ok_or_else(|| PanelError::NodeNotFound(id.to_string()))?;
        if !e.is_folder() {
            return Err(PanelError::NotAFolder(id.to_string()));
        }
        Ok(e)
    }

    /// Insert a node (and any nested children it carries) under `parent_id`.
    /// `None` appends. Returns the index the node landed at.
    pub(crate) fn insert(
        &mut self,
        parent_id: &str,
        index: Option<usize>,
        node: BookmarkNode,
    ) -> PanelResult<usize> {
        let len = self.require_folder(parent_id)?.children.len();
        let index = index.unwrap_or(len);
        if index > len {
            return Err(PanelError::IndexOutOfRange {
                parent_id: parent_id.to_string(),
                index,
                len,
            });
        }

        let mut staged = Vec::new();
        let mut stack = vec![(node, parent_id.to_string())];
        while let Some((mut n, parent)) = stack.pop() {
            if self.contains(&n.id) || staged.iter().any(|e: &Entry| e.id == n.id) {
                return Err(PanelError::StructuralInvariantViolation(format!(
                    "duplicate id {}",
                    n.id
                )));
            }
            let kids = if n.is_folder() {
                n.children.take().unwrap_or_default()
            } else {
                Vec::new()
            };
            staged.push(Entry {
                id: n.id.clone(),
                title: n.title,
                url: n.url,
                date_added: n.date_added,
                parent: Some(parent),
                children: kids.iter().map(|k| k.id.clone()).collect(),
            });
            for kid in kids.into_iter().rev() {
                stack.push((kid, n.id.clone()));
            }
        }

        let root_id = staged[0].id.clone();
        for e in staged {
            self.entries.insert(e.id.clone(), e);
        }
        if let Some(parent) = self.entries.get_mut(parent_id) {
            parent.children.insert(index, root_id);
        }
        Ok(index)
    }

    /// Splice a subtree out of the tree.
    pub(crate) fn detach(&mut self, id: &str) -> PanelResult<DetachedSubtree> {
        if self.is_fixed(id) {
            return Err(PanelError::FixedFolder(id.to_string()));
        }
        let parent_id = self
            .parent_id(id)
            .ok_or_else(|| PanelError::NodeNotFound(id.to_string()))?
            .to_string();
        let index = self
            .index_of(id)
            .ok_or_else(|| PanelError::NodeNotFound(id.to_string()))?;

        let ids = self.subtree_ids(id);
        let mut entries = Vec::with_capacity(ids.len());
        let mut meta = Vec::new();
        for sid in ids {
            if let Some(e) = self.entries.remove(&sid) {
                entries.push(e);
            }
            if let Some(m) = self.meta.remove(&sid) {
                meta.push((sid, m));
            }
        }
        if let Some(parent) = self.entries.get_mut(&parent_id) {
            parent.children.remove(index);
        }

        Ok(DetachedSubtree {
            parent_id,
            index,
            root_id: id.to_string(),
            entries,
            meta,
        })
    }

    /// Put a detached subtree back at its former position (clamped if the
    /// parent has fewer children now).
    pub(crate) fn restore(&mut self, subtree: DetachedSubtree) -> PanelResult<usize> {
        let len = self.require_folder(&subtree.parent_id)?.children.len();
        if let Some(dup) = subtree.entries.iter().find(|e| self.contains(&e.id)) {
            return Err(PanelError::StructuralInvariantViolation(format!(
                "duplicate id {}",
                dup.id
            )));
        }
        let index = subtree.index.min(len);
        for e in subtree.entries {
            self.entries.insert(e.id.clone(), e);
        }
        self.meta.extend(subtree.meta);
        if let Some(parent) = self.entries.get_mut(&subtree.parent_id) {
            parent.children.insert(index, subtree.root_id);
        }
        Ok(index)
    }

    /// Move `id` so that it ends up at `index` among `parent_id`'s children.
    pub(crate) fn relocate(&mut self, id: &str, parent_id: &str, index: usize) -> PanelResult<()> {
        if self.is_fixed(id) {
            return Err(PanelError::FixedFolder(id.to_string()));
        }
        let old_parent = self
            .parent_id(id)
            .ok_or_else(|| PanelError::NodeNotFound(id.to_string()))?
            .to_string();
        let dest = self.require_folder(parent_id)?;
        if self.is_same_or_descendant(parent_id, id) {
            return Err(PanelError::InvalidMoveCycle {
                node_id: id.to_string(),
                parent_id: parent_id.to_string(),
            });
        }
        let len_after = if old_parent == parent_id {
            dest.children.len() - 1
        } else {
            dest.children.len()
        };
        if index > len_after {
            return Err(PanelError::IndexOutOfRange {
                parent_id: parent_id.to_string(),
                index,
                len: len_after,
            });
        }

        if let Some(p) = self.entries.get_mut(&old_parent) {
            p.children.retain(|c| c != id);
        }
        if let Some(p) = self.entries.get_mut(parent_id) {
            p.children.insert(index, id.to_string());
        }
        if let Some(e) = self.entries.get_mut(id) {
            e.parent = Some(parent_id.to_string());
        }
        Ok(())
    }

    /// Returns the previous title.
    pub(crate) fn set_title(&mut self, id: &str, title: &str) -> PanelResult<String> {
        let e = self
            .entries
            .get_mut(id)
            .ok_or_else(|| PanelError::NodeNotFound(id.to_string()))?;
        Ok(std::mem::replace(&mut e.title, title.to_string()))
    }

    pub(crate) fn set_url(&mut self, id: &str, url: &str) -> PanelResult<Option<String>> {
        let e = self
            .entries
            .get_mut(id)
            .ok_or_else(|| PanelError::NodeNotFound(id.to_string()))?;
        if e.url.is_none() {
            return Err(PanelError::StructuralInvariantViolation(format!(
                "folder {id} cannot take a url"
            )));
        }
        Ok(e.url.replace(url.to_string()))
    }

    /// Replace a folder's child order. Only accepted when `child_ids` is a
    /// permutation of the current children.
    pub(crate) fn reorder_children(&mut self, parent_id: &str, child_ids: &[String]) -> bool {
        let Some(parent) = self.entries.get_mut(parent_id) else {
            return false;
        };
        if parent.children.as_slice() == child_ids {
            return false;
        }
        let mut current = parent.children.clone();
        let mut next = child_ids.to_vec();
        current.sort();
        next.sort();
        if current != next {
            return false;
        }
        parent.children = child_ids.to_vec();
        true
    }

    pub fn meta(&self, id: &str) -> NodeMeta {
        self.meta.get(id).cloned().unwrap_or_default()
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.meta.get(id).is_some_and(|m| m.expanded)
    }

    pub(crate) fn set_expanded(&mut self, id: &str, expanded: bool) -> bool {
        if !self.is_folder(id) || self.is_expanded(id) == expanded {
            return false;
        }
        self.meta.entry(id.to_string()).or_default().expanded = expanded;
        true
    }

    pub(crate) fn toggle_expanded(&mut self, id: &str) -> bool {
        let next = !self.is_expanded(id);
        self.set_expanded(id, next)
    }

    /// Expanded folders, sorted by id.
    pub fn expanded_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .meta
            .iter()
            .filter(|(id, m)| m.expanded && self.contains(id))
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn set_custom_icon(&mut self, id: &str, icon: Option<CustomIcon>) -> bool {
        if !self.contains(id) || self.meta(id).custom_icon == icon {
            return false;
        }
        self.meta.entry(id.to_string()).or_default().custom_icon = icon;
        true
    }

    /// Export the overlay for persistence, restricted to nodes still present.
    pub fn overlay(&self) -> PanelOverlay {
        let icons = self
            .meta
            .iter()
            .filter(|(id, _)| self.contains(id))
            .filter_map(|(id, m)| Some((id.clone(), m.custom_icon.clone()?)))
            .collect();
        PanelOverlay {
            expanded: self.expanded_ids().into_iter().map(String::from).collect(),
            icons,
        }
    }

    /// Import a persisted overlay; entries for unknown ids are dropped.
    pub(crate) fn apply_overlay(&mut self, overlay: &PanelOverlay) {
        for id in &overlay.expanded {
            self.set_expanded(id, true);
        }
        for (id, icon) in &overlay.icons {
            self.set_custom_icon(id, Some(icon.clone()));
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{ids, sample_root, sample_tree};
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_builds_parent_index() {
        let t = sample_tree();
        assert_eq!(t.len(), 13);
        assert_eq!(t.bar_id(), "1");
        assert_eq!(t.other_id(), "2");
        assert_eq!(t.parent_id("doc-link"), Some("folder-docs"));
        assert_eq!(t.index_of("mdn"), Some(1));
        assert_eq!(ids(t.children("2")), vec!["folder-docs", "20", "21"]);
        assert!(t.children("21").is_empty());
    }

    #[test]
    fn test_snapshot_prefers_folder_type_over_reserved_ids() {
        let mut root = sample_root();
        let kids = root.children.as_mut().expect("root children");
        kids[0].id = "toolbar_____".to_string();
        kids[0].folder_type = Some(FolderType::BookmarksBar);
        let t = BookmarkTree::from_snapshot(root, &TopLevelIds::default()).expect("tree");
        assert_eq!(t.bar_id(), "toolbar_____");
        assert_eq!(t.parent_id("10"), Some("toolbar_____"));
    }

    #[test]
    fn test_snapshot_missing_top_level_folder_is_rejected() {
        let mut root = sample_root();
        root.children.as_mut().expect("root children").remove(0);
        let err = BookmarkTree::from_snapshot(root, &TopLevelIds::default())
            .expect_err("bar folder is missing");
        assert_eq!(
            err,
            PanelError::StructuralInvariantViolation("missing bookmarks bar folder".to_string())
        );
    }

    #[test]
    fn test_snapshot_rejects_duplicate_ids() {
        let mut root = sample_root();
        let other = &mut root.children.as_mut().expect("root children")[1];
        other
            .children
            .as_mut()
            .expect("other children")
            .push(BookmarkNode::bookmark("10", "dup", "https://dup.example/"));
        let err = BookmarkTree::from_snapshot(root, &TopLevelIds::default())
            .expect_err("duplicate id");
        assert!(matches!(err, PanelError::StructuralInvariantViolation(_)));
    }

    #[test]
    fn test_descendant_walk_and_paths() {
        let t = sample_tree();
        assert!(t.is_same_or_descendant("doc-link", "2"));
        assert!(t.is_same_or_descendant("folder-docs", "folder-docs"));
        assert!(!t.is_same_or_descendant("2", "folder-docs"));
        assert_eq!(t.path_titles("doc-link"), vec!["Autres favoris", "Docs"]);
        assert!(t.path_titles("2").is_empty());
        assert_eq!(
            t.subtree_ids("20"),
            vec!["20".to_string(), "200".to_string(), "201".to_string()]
        );
    }

    #[test]
    fn test_relocate_within_same_parent_uses_final_index() {
        let mut t = sample_tree();
        t.relocate("folder-docs", "2", 2).expect("move down");
        assert_eq!(ids(t.children("2")), vec!["20", "21", "folder-docs"]);
        assert_eq!(
            t.relocate("20", "2", 3).err().map(|e| e.to_string()),
            Some("index 3 is out of range for 2 (2 children)".to_string())
        );
    }

    #[test]
    fn test_relocate_into_descendant_is_a_cycle() {
        let mut t = sample_tree();
        let err = t.relocate("folder-docs", "folder-docs", 0).expect_err("self");
        assert!(matches!(err, PanelError::InvalidMoveCycle { .. }));
        assert_eq!(ids(t.children("2")), vec!["folder-docs", "20", "21"]);
    }

    #[test]
    fn test_detach_then_restore_is_lossless() {
        let mut t = sample_tree();
        t.set_expanded("20", true);
        let before = t.to_node("0");
        let sub = t.detach("20").expect("detach");
        assert_eq!(sub.ids().collect::<Vec<_>>(), vec!["20", "200", "201"]);
        assert!(!t.contains("200"));
        assert!(!t.is_expanded("20"));
        t.restore(sub).expect("restore");
        assert_eq!(t.to_node("0"), before);
        assert!(t.is_expanded("20"));
    }

    #[test]
    fn test_fixed_folders_cannot_be_detached() {
        let mut t = sample_tree();
        assert_eq!(t.detach("1"), Err(PanelError::FixedFolder("1".to_string())));
    }

    #[test]
    fn test_insert_rejects_leaf_parent_and_duplicates() {
        let mut t = sample_tree();
        let n = BookmarkNode::bookmark("new", "New", "https://new.example/");
        assert_eq!(
            t.insert("21", None, n.clone()),
            Err(PanelError::NotAFolder("21".to_string()))
        );
        assert_eq!(t.insert("20", None, n), Ok(2));
        let dup = BookmarkNode::bookmark("new", "again", "https://again.example/");
        assert!(t.insert("20", None, dup).is_err());
    }

    #[test]
    fn test_overlay_roundtrip_drops_unknown_ids() {
        let mut t = sample_tree();
        let overlay = PanelOverlay {
            expanded: vec!["20".to_string(), "ghost".to_string(), "21".to_string()],
            icons: [(
                "21".to_string(),
                CustomIcon {
                    icon: "sun".to_string(),
                    color: "#f5a623".to_string(),
                },
            )]
            .into_iter()
            .collect(),
        };
        t.apply_overlay(&overlay);
        assert!(t.toggle_expanded("folder-docs"));
        assert_eq!(t.expanded_ids(), vec!["20", "folder-docs"]);
        assert!(t.toggle_expanded("folder-docs"));
        let out = t.overlay();
        // leaves never expand; unknown ids are dropped
        assert_eq!(out.expanded, vec!["20".to_string()]);
        assert_eq!(out.icons.len(), 1);
    }

    #[test]
    fn test_reorder_children_requires_permutation() {
        let mut t = sample_tree();
        let next = vec!["21".to_string(), "folder-docs".to_string(), "20".to_string()];
        assert!(t.reorder_children("2", &next));
        assert_eq!(ids(t.children("2")), vec!["21", "folder-docs", "20"]);
        assert!(!t.reorder_children("2", &["21".to_string()]));
    }
}
