//! In-memory store for tests: records every call, can fail on demand and can
//! hold a reply back until the test releases it.

use super::{BookmarkStore, CreateRequest, MoveRequest, StoreError, StoreResult, UpdateChanges};
use crate::models::BookmarkNode;
use crate::tree::fixtures::sample_root;
use futures::channel::oneshot;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Default)]
struct Script {
    calls: RefCell<Vec<String>>,
    failures: RefCell<VecDeque<StoreError>>,
    gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
    next_id: Cell<u64>,
    snapshot: RefCell<Option<StoreResult<BookmarkNode>>>,
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedStore(Rc<Script>);

impl ScriptedStore {
    /// The next call that settles fails with `e`.
    pub(crate) fn fail_next(&self, e: StoreError) {
        self.0.failures.borrow_mut().push_back(e);
    }

    /// The next call waits until the returned sender fires.
    pub(crate) fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.0.gates.borrow_mut().push_back(rx);
        tx
    }

    pub(crate) fn set_snapshot(&self, snapshot: StoreResult<BookmarkNode>) {
        *self.0.snapshot.borrow_mut() = Some(snapshot);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.0.calls.borrow().clone()
    }

    async fn reply(&self, call: String) -> StoreResult<()> {
        self.0.calls.borrow_mut().push(call);
        let gate = self.0.gates.borrow_mut().pop_front();
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        match self.0.failures.borrow_mut().pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl BookmarkStore for ScriptedStore {
    async fn get_tree(&self) -> StoreResult<BookmarkNode> {
        self.0
            .snapshot
            .borrow_mut()
            .take()
            .unwrap_or_else(|| Ok(sample_root()))
    }

    async fn create(&self, req: CreateRequest) -> StoreResult<BookmarkNode> {
        self.reply(format!("create {} {}", req.parent_id, req.title))
            .await?;
        let n = self.0.next_id.get() + 1;
        self.0.next_id.set(n);
        Ok(BookmarkNode {
            id: format!("new-{n}"),
            parent_id: Some(req.parent_id),
            title: req.title,
            url: req.url,
            ..Default::default()
        })
    }

    async fn remove(&self, id: &str, is_folder: bool) -> StoreResult<()> {
        let verb = if is_folder { "removeTree" } else { "remove" };
        self.reply(format!("{verb} {id}")).await
    }

    async fn move_node(&self, req: MoveRequest) -> StoreResult<()> {
        self.reply(format!(
            "move {} {}[{}] from {}[{}]",
            req.id, req.parent_id, req.index, req.from_parent_id, req.from_index
        ))
        .await
    }

    async fn update(&self, id: &str, changes: UpdateChanges) -> StoreResult<()> {
        self.reply(format!("update {id} {}", changes.title.unwrap_or_default()))
            .await
    }
}
