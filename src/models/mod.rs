use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A bookmark or folder as the browser bookmark API hands it out.
///
/// Presence of `url` marks a leaf bookmark; its absence marks a folder.
/// `parent_id` and `index` are only meaningful on wire payloads (events, create
/// responses); the in-memory tree derives both from its own id index.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkNode {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Tag on the fixed top-level folders (newer browsers only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_type: Option<FolderType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BookmarkNode>>,
}

impl BookmarkNode {
    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }

    pub fn folder(id: &str, title: &str, children: Vec<BookmarkNode>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            children: Some(children),
            ..Default::default()
        }
    }

    pub fn bookmark(id: &str, title: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            url: Some(url.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FolderType {
    BookmarksBar,
    Other,
    Mobile,
    Managed,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CustomIcon {
    pub icon: String,
    pub color: String,
}

/// Per-node UI state. Never sent to the bookmark store.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeMeta {
    pub expanded: bool,
    #[serde(default)]
    pub custom_icon: Option<CustomIcon>,
}

/// Persisted form of the UI overlay (folder expansion + custom icons).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PanelOverlay {
    #[serde(default)]
    pub expanded: Vec<String>,
    #[serde(default)]
    pub icons: BTreeMap<String, CustomIcon>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBookmark {
    pub title: String,
    /// `None` creates a folder.
    pub url: Option<String>,
}

impl NewBookmark {
    pub fn folder(title: &str) -> Self {
        Self {
            title: title.to_string(),
            url: None,
        }
    }

    pub fn bookmark(title: &str, url: &str) -> Self {
        Self {
            title: title.to_string(),
            url: Some(url.to_string()),
        }
    }
}

/// Insertion point: `index` is the node's final position among the children of
/// `parent_id` once the move has been applied.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoveTarget {
    pub parent_id: String,
    pub index: usize,
}

impl MoveTarget {
    pub fn new(parent_id: &str, index: usize) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            index,
        }
    }
}
