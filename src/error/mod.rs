//! Error taxonomy shared by the tree model, the mutation coordinator and the panel.

use strum::{AsRefStr, Display};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum MutationKind {
    Move,
    Create,
    Remove,
    Rename,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("folder name cannot be empty")]
    Blank,
    #[error("name cannot contain '{0}'")]
    ForbiddenChar(char),
    #[error("name cannot contain control characters")]
    ControlChar,
    #[error("name is longer than {max} characters")]
    TooLong { max: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PanelError {
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),

    #[error("cannot move {node_id} into itself or one of its descendants")]
    InvalidMoveCycle { node_id: String, parent_id: String },

    #[error("another change touching {node_id} is still pending")]
    ConflictingMutation { node_id: String },

    #[error("{kind} failed: {message}")]
    MutationFailed { kind: MutationKind, message: String },

    #[error("bookmark store is unavailable: {0}")]
    StoreUnavailable(String),

    #[error("connection to the bookmark store was invalidated")]
    ConnectionInvalidated,

    #[error("bookmark tree is malformed: {0}")]
    StructuralInvariantViolation(String),

    #[error("bookmark {0} not found")]
    NodeNotFound(String),

    #[error("{0} is not a folder")]
    NotAFolder(String),

    #[error("{0} is a fixed folder and cannot be changed")]
    FixedFolder(String),

    #[error("index {index} is out of range for {parent_id} ({len} children)")]
    IndexOutOfRange {
        parent_id: String,
        index: usize,
        len: usize,
    },
}

impl PanelError {
    /// The session cannot continue; the panel must be reloaded.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            PanelError::StoreUnavailable(_)
                | PanelError::ConnectionInvalidated
                | PanelError::StructuralInvariantViolation(_)
        )
    }

    /// Rejected locally, surfaced next to the triggering input.
    pub fn is_validation(&self) -> bool {
        matches!(self, PanelError::InvalidName(_))
    }
}

pub type PanelResult<T> = Result<T, PanelError>;
