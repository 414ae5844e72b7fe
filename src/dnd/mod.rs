//! Maps a pointer position over rendered rows to one insertion point.
//!
//! The resolver is pure state: the UI feeds it candidate rects gathered from the
//! DOM and reads back a [`DropTarget`]. Nothing here touches the tree; a drop is
//! committed by handing [`DropTarget::into_move_target`] to the coordinator.

use crate::config::DropZoneConfig;
use crate::models::MoveTarget;
use crate::tree::BookmarkTree;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Half-open: the right and bottom edges belong to the next row.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right() && p.y >= self.top && p.y < self.bottom()
    }

    pub fn inflate(&self, by: f64) -> Self {
        Self {
            left: self.left - by,
            top: self.top - by,
            width: self.width + 2.0 * by,
            height: self.height + 2.0 * by,
        }
    }
}

/// Direction rows are stacked in: the other-folder list is vertical, the bar
/// is horizontal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Axis {
    #[default]
    Vertical,
    Horizontal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DropCandidate {
    pub node_id: String,
    pub rect: Rect,
    pub axis: Axis,
}

/// Resolved insertion point. Indices are final positions: when the dragged node
/// already sits before the slot in the same folder, its own slot is accounted for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropTarget {
    BeforeSibling { parent_id: String, index: usize },
    AfterSibling { parent_id: String, index: usize },
    IntoFolder { folder_id: String, index: usize },
}

impl DropTarget {
    pub fn into_move_target(self) -> MoveTarget {
        match self {
            DropTarget::BeforeSibling { parent_id, index }
            | DropTarget::AfterSibling { parent_id, index }
            | DropTarget::IntoFolder {
                folder_id: parent_id,
                index,
            } => MoveTarget { parent_id, index },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DragState {
    pub dragged_node: Option<String>,
    pub drop_target: Option<DropTarget>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Band {
    Before,
    Into,
    After,
}

/// The band the pointer last resolved to; kept while the pointer stays near it.
#[derive(Clone, Debug, PartialEq)]
struct ActiveZone {
    node_id: String,
    band: Band,
    rect: Rect,
}

#[derive(Clone, Debug, Default)]
pub struct DropTargetResolver {
    config: DropZoneConfig,
    state: DragState,
    zone: Option<ActiveZone>,
}

impl DropTargetResolver {
    pub fn new(config: DropZoneConfig) -> Self {
        Self {
            config: config.sanitized(),
            ..Default::default()
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn drop_target(&self) -> Option<&DropTarget> {
        self.state.drop_target.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.state.dragged_node.is_some()
    }

    pub fn begin(&mut self, node_id: &str) {
        self.state = DragState {
            dragged_node: Some(node_id.to_string()),
            drop_target: None,
        };
        self.zone = None;
    }

    /// Re-resolve the target for a pointer position. Candidates are checked in
    /// order; the first whose rect holds the pointer wins.
    pub fn hover(
        &mut self,
        tree: &BookmarkTree,
        pointer: Point,
        candidates: &[DropCandidate],
    ) -> Option<&DropTarget> {
        let dragged = self.state.dragged_node.clone()?;

        // The zone sticks, but its index is recomputed: the tree may have
        // changed since it was resolved.
        let sticky = self.zone.as_ref().filter(|zone| {
            candidates.iter().any(|c| c.node_id == zone.node_id)
                && zone.rect.inflate(self.config.hysteresis_px).contains(pointer)
        });
        if let Some(target) = sticky.and_then(|zone| resolve(tree, &dragged, &zone.node_id, zone.band)) {
            self.state.drop_target = Some(target);
            return self.state.drop_target.as_ref();
        }

        let resolved = candidates
            .iter()
            .find(|c| c.rect.contains(pointer))
            .and_then(|c| {
                let (band, rect) = self.band_at(tree, c, pointer);
                let target = resolve(tree, &dragged, &c.node_id, band)?;
                Some((
                    ActiveZone {
                        node_id: c.node_id.clone(),
                        band,
                        rect,
                    },
                    target,
                ))
            });

        match resolved {
            Some((zone, target)) => {
                self.zone = Some(zone);
                self.state.drop_target = Some(target);
            }
            None => {
                self.zone = None;
                self.state.drop_target = None;
            }
        }
        self.state.drop_target.as_ref()
    }

    /// The pointer left every drop surface; the drag itself continues.
    pub fn leave(&mut self) {
        self.zone = None;
        self.state.drop_target = None;
    }

    /// Finish the drag. Returns the dragged node and its last resolved target,
    /// if any; the resolver is cleared either way.
    pub fn take_drop(&mut self) -> Option<(String, DropTarget)> {
        let state = std::mem::take(&mut self.state);
        self.zone = None;
        Some((state.dragged_node?, state.drop_target?))
    }

    pub fn cancel(&mut self) {
        self.state = DragState::default();
        self.zone = None;
    }

    pub fn end(&mut self) {
        self.cancel();
    }

    fn band_at(&self, tree: &BookmarkTree, c: &DropCandidate, p: Point) -> (Band, Rect) {
        let r = c.rect;
        if tree.is_top_level(&c.node_id) {
            return (Band::Into, r);
        }
        let (start, len, pos) = match c.axis {
            Axis::Vertical => (r.top, r.height, p.y),
            Axis::Horizontal => (r.left, r.width, p.x),
        };
        let t = if len > 0.0 { (pos - start) / len } else { 0.0 };

        let edge = if tree.is_folder(&c.node_id) {
            self.config.edge_fraction
        } else {
            0.5
        };
        let (band, from, to) = if t < edge {
            (Band::Before, 0.0, edge)
        } else if t >= 1.0 - edge {
            (Band::After, 1.0 - edge, 1.0)
        } else {
            (Band::Into, edge, 1.0 - edge)
        };

        let rect = match c.axis {
            Axis::Vertical => Rect::new(r.left, start + from * len, r.width, (to - from) * len),
            Axis::Horizontal => Rect::new(start + from * len, r.top, (to - from) * len, r.height),
        };
        (band, rect)
    }
}

fn resolve(tree: &BookmarkTree, dragged: &str, candidate: &str, band: Band) -> Option<DropTarget> {
    if !tree.contains(candidate) || tree.is_same_or_descendant(candidate, dragged) {
        return None;
    }
    let from_parent = tree.parent_id(dragged);

    if band == Band::Into {
        if !tree.is_folder(candidate) || candidate == tree.root_id() {
            return None;
        }
        let len = tree.children(candidate).len();
        let index = if from_parent == Some(candidate) {
            len.saturating_sub(1)
        } else {
            len
        };
        return Some(DropTarget::IntoFolder {
            folder_id: candidate.to_string(),
            index,
        });
    }

    let parent_id = tree.parent_id(candidate)?;
    if parent_id == tree.root_id() {
        return None;
    }
    let slot = tree.index_of(candidate)? + usize::from(band == Band::After);
    let index = match (from_parent, tree.index_of(dragged)) {
        (Some(p), Some(from)) if p == parent_id && from < slot => slot - 1,
        _ => slot,
    };
    let parent_id = parent_id.to_string();
    Some(match band {
        Band::Before => DropTarget::BeforeSibling { parent_id, index },
        _ => DropTarget::AfterSibling { parent_id, index },
    })
}
