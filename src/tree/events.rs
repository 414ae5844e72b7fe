use super::BookmarkTree;
use crate::models::{BookmarkNode, NodePatch};
use serde::Deserialize;

/// Change notification from the bookmark store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    Created {
        parent_id: String,
        index: usize,
        node: BookmarkNode,
    },
    Removed {
        id: String,
    },
    Moved {
        id: String,
        parent_id: String,
        index: usize,
    },
    Changed {
        id: String,
        patch: NodePatch,
    },
    ChildrenReordered {
        parent_id: String,
        child_ids: Vec<String>,
    },
}

impl StoreEvent {
    /// Id of the node the event is about (the parent for reorders).
    pub fn subject_id(&self) -> &str {
        match self {
            StoreEvent::Created { node, .. } => &node.id,
            StoreEvent::Removed { id } => id,
            StoreEvent::Moved { id, .. } => id,
            StoreEvent::Changed { id, .. } => id,
            StoreEvent::ChildrenReordered { parent_id, .. } => parent_id,
        }
    }
}

/// Which browser listener produced a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerKind {
    Created,
    Removed,
    Changed,
    Moved,
    ChildrenReordered,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
struct MoveInfo {
    parent_id: String,
    index: usize,
    #[allow(dead_code)]
    #[serde(default)]
    old_parent_id: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    old_index: Option<usize>,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
struct ReorderInfo {
    child_ids: Vec<String>,
}

/// Turn a listener's `(id, info)` arguments into a [`StoreEvent`].
///
/// `payload` is the JSON text of the second listener argument: the created
/// node for `onCreated`, the remove/change/move/reorder info otherwise.
pub fn parse_listener_payload(
    kind: ListenerKind,
    id: &str,
    payload: &str,
) -> Result<StoreEvent, serde_json::Error> {
    let id = id.to_string();
    Ok(match kind {
        ListenerKind::Created => {
            let node: BookmarkNode = serde_json::from_str(payload)?;
            StoreEvent::Created {
                parent_id: node.parent_id.clone().unwrap_or_default(),
                index: node.index.unwrap_or(usize::MAX),
                node,
            }
        }
        // removeInfo also carries parentId/index/node; the id is enough here.
        ListenerKind::Removed => StoreEvent::Removed { id },
        ListenerKind::Changed => StoreEvent::Changed {
            id,
            patch: serde_json::from_str(payload)?,
        },
        ListenerKind::Moved => {
            let info: MoveInfo = serde_json::from_str(payload)?;
            StoreEvent::Moved {
                id,
                parent_id: info.parent_id,
                index: info.index,
            }
        }
        ListenerKind::ChildrenReordered => {
            let info: ReorderInfo = serde_json::from_str(payload)?;
            StoreEvent::ChildrenReordered {
                parent_id: id,
                child_ids: info.child_ids,
            }
        }
    })
}

impl BookmarkTree {
    /// Apply a store event. Idempotent: an event describing state the tree
    /// already has (existing id, missing id, same position, same values) is a
    /// no-op. Returns whether anything changed.
    pub(crate) fn apply_event(&mut self, event: &StoreEvent) -> bool {
        match event {
            StoreEvent::Created {
                parent_id,
                index,
                node,
            } => {
                if self.contains(&node.id) {
                    return false;
                }
                if !self.is_folder(parent_id) {
                    tracing::warn!(id = %node.id, parent = %parent_id, "created under unknown folder; ignored");
                    return false;
                }
                let at = (*index).min(self.children(parent_id).len());
                match self.insert(parent_id, Some(at), node.clone()) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(id = %node.id, error = %e, "created event rejected");
                        false
                    }
                }
            }
            StoreEvent::Removed { id } => {
                if !self.contains(id) {
                    return false;
                }
                match self.detach(id) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(%id, error = %e, "removed event rejected");
                        false
                    }
                }
            }
            StoreEvent::Moved {
                id,
                parent_id,
                index,
            } => {
                if !self.contains(id) || !self.is_folder(parent_id) {
                    tracing::warn!(%id, parent = %parent_id, "move references unknown nodes; ignored");
                    return false;
                }
                if self.parent_id(id) == Some(parent_id.as_str())
                    && self.index_of(id) == Some(*index)
                {
                    return false;
                }
                let same_parent = self.parent_id(id) == Some(parent_id.as_str());
                let len_after = self.children(parent_id).len() - usize::from(same_parent);
                match self.relocate(id, parent_id, (*index).min(len_after)) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(%id, error = %e, "moved event rejected");
                        false
                    }
                }
            }
            StoreEvent::Changed { id, patch } => {
                let Some(entry) = self.get(id) else {
                    return false;
                };
                let title = patch.title.as_ref().filter(|t| **t != entry.title).cloned();
                let url = patch
                    .url
                    .as_ref()
                    .filter(|u| entry.url.is_some() && entry.url.as_ref() != Some(*u))
                    .cloned();
                let mut changed = false;
                if let Some(t) = title {
                    changed |= self.set_title(id, &t).is_ok();
                }
                if let Some(u) = url {
                    changed |= self.set_url(id, &u).is_ok();
                }
                changed
            }
            StoreEvent::ChildrenReordered {
                parent_id,
                child_ids,
            } => self.reorder_children(parent_id, child_ids),
        }
    }
}
