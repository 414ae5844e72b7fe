use super::{BookmarkStore, CreateRequest, MoveRequest, StoreError, StoreResult, UpdateChanges};
use crate::models::BookmarkNode;
use crate::tree::{parse_listener_payload, ListenerKind, StoreEvent};
use js_sys::Promise;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks"], js_name = getTree)]
    fn bookmarks_get_tree() -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks"], js_name = create)]
    fn bookmarks_create(details: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks"], js_name = remove)]
    fn bookmarks_remove(id: &str) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks"], js_name = removeTree)]
    fn bookmarks_remove_tree(id: &str) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks"], js_name = "move")]
    fn bookmarks_move(id: &str, destination: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks"], js_name = update)]
    fn bookmarks_update(id: &str, changes: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks", "onCreated"], js_name = addListener)]
    fn on_created_add(cb: &Closure<dyn FnMut(String, JsValue)>) -> Result<(), JsValue>;
    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks", "onCreated"], js_name = removeListener)]
    fn on_created_remove(cb: &Closure<dyn FnMut(String, JsValue)>) -> Result<(), JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks", "onRemoved"], js_name = addListener)]
    fn on_removed_add(cb: &Closure<dyn FnMut(String, JsValue)>) -> Result<(), JsValue>;
    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks", "onRemoved"], js_name = removeListener)]
    fn on_removed_remove(cb: &Closure<dyn FnMut(String, JsValue)>) -> Result<(), JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks", "onChanged"], js_name = addListener)]
    fn on_changed_add(cb: &Closure<dyn FnMut(String, JsValue)>) -> Result<(), JsValue>;
    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks", "onChanged"], js_name = removeListener)]
    fn on_changed_remove(cb: &Closure<dyn FnMut(String, JsValue)>) -> Result<(), JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks", "onMoved"], js_name = addListener)]
    fn on_moved_add(cb: &Closure<dyn FnMut(String, JsValue)>) -> Result<(), JsValue>;
    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks", "onMoved"], js_name = removeListener)]
    fn on_moved_remove(cb: &Closure<dyn FnMut(String, JsValue)>) -> Result<(), JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks", "onChildrenReordered"], js_name = addListener)]
    fn on_reordered_add(cb: &Closure<dyn FnMut(String, JsValue)>) -> Result<(), JsValue>;
    #[wasm_bindgen(catch, js_namespace = ["chrome", "bookmarks", "onChildrenReordered"], js_name = removeListener)]
    fn on_reordered_remove(cb: &Closure<dyn FnMut(String, JsValue)>) -> Result<(), JsValue>;
}

fn js_error(e: JsValue) -> StoreError {
    let message = e
        .dyn_ref::<js_sys::Error>()
        .map(|err| String::from(err.message()))
        .or_else(|| e.as_string())
        .unwrap_or_else(|| format!("{e:?}"));
    StoreError::from_message(&message)
}

fn to_js<T: Serialize>(value: &T) -> StoreResult<JsValue> {
    let json = serde_json::to_string(value).map_err(|e| StoreError::Rejected(e.to_string()))?;
    js_sys::JSON::parse(&json).map_err(js_error)
}

fn from_js<T: DeserializeOwned>(value: &JsValue) -> StoreResult<T> {
    let json = String::from(js_sys::JSON::stringify(value).map_err(js_error)?);
    serde_json::from_str(&json).map_err(|e| StoreError::Rejected(e.to_string()))
}

async fn settle(call: Result<Promise, JsValue>) -> StoreResult<JsValue> {
    let promise = call.map_err(js_error)?;
    JsFuture::from(promise).await.map_err(js_error)
}

/// `chrome.bookmarks` (MV3, promise flavour).
#[derive(Clone, Copy, Debug, Default)]
pub struct ChromeBookmarkStore;

impl BookmarkStore for ChromeBookmarkStore {
    async fn get_tree(&self) -> StoreResult<BookmarkNode> {
        let value = settle(bookmarks_get_tree()).await?;
        let roots: Vec<BookmarkNode> = from_js(&value)?;
        roots
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Rejected("getTree returned no root".to_string()))
    }

    async fn create(&self, req: CreateRequest) -> StoreResult<BookmarkNode> {
        let value = settle(bookmarks_create(&to_js(&req)?)).await?;
        from_js(&value)
    }

    async fn remove(&self, id: &str, is_folder: bool) -> StoreResult<()> {
        let call = if is_folder {
            bookmarks_remove_tree(id)
        } else {
            bookmarks_remove(id)
        };
        settle(call).await.map(|_| ())
    }

    async fn move_node(&self, req: MoveRequest) -> StoreResult<()> {
        let destination = serde_json::json!({
            "parentId": req.parent_id,
            "index": req.index_before_removal(),
        });
        settle(bookmarks_move(&req.id, &to_js(&destination)?))
            .await
            .map(|_| ())
    }

    async fn update(&self, id: &str, changes: UpdateChanges) -> StoreResult<()> {
        settle(bookmarks_update(id, &to_js(&changes)?))
            .await
            .map(|_| ())
    }
}

type Listener = Closure<dyn FnMut(String, JsValue)>;

/// Live registration on the `chrome.bookmarks.on*` events. Dropping it removes
/// every listener.
pub struct ChromeEventSubscription {
    created: Listener,
    removed: Listener,
    changed: Listener,
    moved: Listener,
    reordered: Listener,
}

impl ChromeEventSubscription {
    pub fn listen(handler: impl Fn(StoreEvent) + 'static) -> Self {
        let handler: Rc<dyn Fn(StoreEvent)> = Rc::new(handler);
        let make = |kind: ListenerKind| -> Listener {
            let handler = handler.clone();
            Closure::wrap(Box::new(move |id: String, info: JsValue| {
                let payload = js_sys::JSON::stringify(&info)
                    .map(String::from)
                    .unwrap_or_default();
                match parse_listener_payload(kind, &id, &payload) {
                    Ok(event) => handler(event),
                    Err(e) => tracing::warn!(?kind, %id, error = %e, "unreadable bookmark event"),
                }
            }) as Box<dyn FnMut(String, JsValue)>)
        };

        let sub = Self {
            created: make(ListenerKind::Created),
            removed: make(ListenerKind::Removed),
            changed: make(ListenerKind::Changed),
            moved: make(ListenerKind::Moved),
            reordered: make(ListenerKind::ChildrenReordered),
        };

        let registered = on_created_add(&sub.created)
            .and_then(|_| on_removed_add(&sub.removed))
            .and_then(|_| on_changed_add(&sub.changed))
            .and_then(|_| on_moved_add(&sub.moved))
            .and_then(|_| on_reordered_add(&sub.reordered));
        if let Err(e) = registered {
            tracing::error!(error = %js_error(e), "bookmark events unavailable");
        }
        sub
    }
}

impl Drop for ChromeEventSubscription {
    fn drop(&mut self) {
        // The host may already be gone; nothing to do about failures here.
        let _ = on_created_remove(&self.created);
        let _ = on_removed_remove(&self.removed);
        let _ = on_changed_remove(&self.changed);
        let _ = on_moved_remove(&self.moved);
        let _ = on_reordered_remove(&self.reordered);
    }
}
