//! Filtered projection of the tree for the search box.

use crate::config::PanelSettings;
use crate::tree::BookmarkTree;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    /// Joins ancestor titles into a node's search path.
    pub separator: String,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            separator: " / ".to_string(),
        }
    }
}

impl From<&PanelSettings> for SearchOptions {
    fn from(s: &PanelSettings) -> Self {
        Self {
            case_sensitive: s.case_sensitive,
            separator: s.search_separator.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchNode {
    pub id: String,
    /// Parent in the real tree.
    pub parent_id: Option<String>,
    pub title: String,
    pub url: Option<String>,
    /// Ancestor titles from the top-level folder down to the parent.
    pub search_path: String,
    /// Forced open for every retained folder.
    pub expanded: bool,
    /// The node matched itself, rather than only through a descendant.
    pub matched: bool,
    pub children: Vec<SearchNode>,
}

impl SearchNode {
    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }
}

/// Result of an active search. Never written back to the tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchView {
    pub query: String,
    /// Retained top-level folders: other first, then bar, then the rest.
    pub roots: Vec<SearchNode>,
}

impl SearchView {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Retained ids in display order.
    pub fn ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack: Vec<&SearchNode> = self.roots.iter().rev().collect();
        while let Some(n) = stack.pop() {
            out.push(n.id.as_str());
            stack.extend(n.children.iter().rev());
        }
        out
    }

    pub fn match_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&SearchNode> = self.roots.iter().collect();
        while let Some(n) = stack.pop() {
            count += usize::from(n.matched);
            stack.extend(n.children.iter());
        }
        count
    }

    pub fn find(&self, id: &str) -> Option<&SearchNode> {
        let mut stack: Vec<&SearchNode> = self.roots.iter().collect();
        while let Some(n) = stack.pop() {
            if n.id == id {
                return Some(n);
            }
            stack.extend(n.children.iter());
        }
        None
    }
}

struct Matcher {
    query: String,
    case_sensitive: bool,
}

impl Matcher {
    fn new(query: &str, case_sensitive: bool) -> Self {
        let query = if case_sensitive {
            query.to_string()
        } else {
            query.to_lowercase()
        };
        Self {
            query,
            case_sensitive,
        }
    }

    fn matches(&self, text: &str) -> bool {
        if self.case_sensitive {
            text.contains(&self.query)
        } else {
            text.to_lowercase().contains(&self.query)
        }
    }
}

/// Filter the tree by `query`. A blank query means search is inactive and
/// yields `None`; a query nothing matches yields an empty view.
///
/// A node is kept when its title or its search path contains the query, or
/// when any descendant is kept. One depth-first pass over the tree.
pub fn filter(tree: &BookmarkTree, query: &str, opts: &SearchOptions) -> Option<SearchView> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    let m = Matcher::new(query, opts.case_sensitive);

    let mut order = vec![tree.other_id(), tree.bar_id()];
    order.extend(
        tree.children(tree.root_id())
            .iter()
            .map(String::as_str)
            .filter(|id| *id != tree.bar_id() && *id != tree.other_id()),
    );

    let roots = order
        .into_iter()
        .filter_map(|id| visit(tree, id, "", &m, &opts.separator))
        .collect();
    Some(SearchView {
        query: query.to_string(),
        roots,
    })
}

fn visit(tree: &BookmarkTree, id: &str, path: &str, m: &Matcher, sep: &str) -> Option<SearchNode> {
    let entry = tree.get(id)?;
    let matched = m.matches(&entry.title) || (!path.is_empty() && m.matches(path));

    let child_path = if path.is_empty() {
        entry.title.clone()
    } else {
        format!("{path}{sep}{}", entry.title)
    };
    let children: Vec<SearchNode> = entry
        .children()
        .iter()
        .filter_map(|c| visit(tree, c, &child_path, m, sep))
        .collect();

    if !matched && children.is_empty() {
        return None;
    }
    Some(SearchNode {
        id: entry.id.clone(),
        parent_id: entry.parent_id().map(str::to_string),
        title: entry.title.clone(),
        url: entry.url.clone(),
        search_path: path.to_string(),
        expanded: entry.is_folder(),
        matched,
        children,
    })
}
