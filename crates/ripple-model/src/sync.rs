//! Persistence through a pluggable sync backend.
//!
//! Records never talk to storage directly. [`Model::fetch`],
//! [`Model::save`] and [`Model::destroy`] describe what they need as a
//! [`SyncMethod`] and hand the record to the kind's [`SyncBackend`]. A
//! successful round trip emits `"sync"`, a failed one emits `"error"`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use ripple_events::Events;

use crate::error::{ModelError, ModelResult, SyncError, SyncResult};
use crate::event::{DESTROY, ERROR, ModelEvent, SYNC};
use crate::model::Model;
use crate::options::{Attributes, Patch, SetOptions};

/// What a sync request asks the backend to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMethod {
    /// Store a new record.
    Create,
    /// Load a stored record.
    Read,
    /// Replace a stored record.
    Update,
    /// Change some attributes of a stored record.
    Patch,
    /// Remove a stored record.
    Delete,
}

impl fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncMethod::Create => "create",
            SyncMethod::Read => "read",
            SyncMethod::Update => "update",
            SyncMethod::Patch => "patch",
            SyncMethod::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Storage a record kind persists to.
///
/// The backend reads whatever it needs from `model`. For
/// [`SyncMethod::Patch`] the attributes to send are in `options.attrs`.
/// Returned attributes are the server's view of the record and get applied
/// to it.
pub trait SyncBackend {
    /// Serve one request.
    fn sync(
        &self,
        method: SyncMethod,
        model: &Model,
        options: &SetOptions,
    ) -> SyncResult<Option<Attributes>>;
}

impl<B: SyncBackend + ?Sized> SyncBackend for Rc<B> {
    fn sync(
        &self,
        method: SyncMethod,
        model: &Model,
        options: &SetOptions,
    ) -> SyncResult<Option<Attributes>> {
        (**self).sync(method, model, options)
    }
}

/// In-process backend keeping records in a map keyed by id.
///
/// Records created without an id are given a UUID.
#[derive(Default)]
pub struct MemoryBackend {
    records: RefCell<HashMap<String, Attributes>>,
    requests: RefCell<Vec<SyncMethod>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored attributes of the record with this id.
    pub fn record(&self, id: &str) -> Option<Attributes> {
        self.records.borrow().get(id).cloned()
    }

    /// Store a record directly, bypassing any model.
    pub fn insert(&self, id: impl Into<String>, attrs: Attributes) {
        self.records.borrow_mut().insert(id.into(), attrs);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Check if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Methods of every request served so far, in order.
    pub fn requests(&self) -> Vec<SyncMethod> {
        self.requests.borrow().clone()
    }

    fn key_of(model: &Model) -> SyncResult<String> {
        match model.get(&model.config().id_attribute) {
            None | Some(Value::Null) => Err(SyncError::InvalidRequest(format!(
                "record {} has no id",
                model.cid()
            ))),
            Some(value) => Ok(id_key(&value)),
        }
    }
}

impl SyncBackend for MemoryBackend {
    fn sync(
        &self,
        method: SyncMethod,
        model: &Model,
        options: &SetOptions,
    ) -> SyncResult<Option<Attributes>> {
        self.requests.borrow_mut().push(method);
        let mut records = self.records.borrow_mut();

        match method {
            SyncMethod::Create => {
                let id_attribute = &model.config().id_attribute;
                let mut attrs = model.to_json();
                let id = match attrs.get(id_attribute) {
                    Some(value) if !value.is_null() => value.clone(),
                    _ => Value::String(Uuid::new_v4().to_string()),
                };
                attrs.insert(id_attribute.clone(), id.clone());
                records.insert(id_key(&id), attrs);

                let mut response = Attributes::new();
                response.insert(id_attribute.clone(), id);
                Ok(Some(response))
            }
            SyncMethod::Read => {
                let key = Self::key_of(model)?;
                records
                    .get(&key)
                    .cloned()
                    .map(Some)
                    .ok_or(SyncError::NotFound(key))
            }
            SyncMethod::Update => {
                let key = Self::key_of(model)?;
                records.insert(key, model.to_json());
                Ok(None)
            }
            SyncMethod::Patch => {
                let key = Self::key_of(model)?;
                let record = records
                    .get_mut(&key)
                    .ok_or_else(|| SyncError::NotFound(key.clone()))?;
                for (name, value) in options.attrs.iter().flatten() {
                    record.insert(name.clone(), value.clone());
                }
                Ok(None)
            }
            SyncMethod::Delete => {
                let key = Self::key_of(model)?;
                records
                    .remove(&key)
                    .map(|_| None)
                    .ok_or(SyncError::NotFound(key))
            }
        }
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("records", &self.records.borrow().len())
            .field("requests", &self.requests.borrow().len())
            .finish()
    }
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Model {
    /// Reload the record from the backend and apply what it returns.
    ///
    /// Fails with [`ModelError::NotPersisted`] for a new record.
    pub fn fetch(&self, options: SetOptions) -> ModelResult<&Self> {
        if self.is_new() {
            return Err(ModelError::NotPersisted(self.cid().to_string()));
        }

        let response = self
            .send(SyncMethod::Read, &options)
            .map_err(|error| self.sync_failed(SyncMethod::Read, error, &options))?;

        if let Some(attrs) = response.clone() {
            self.mutate(attrs, options.clone())?;
        }
        self.synced(response, options);
        Ok(self)
    }

    /// Apply `patch` and persist the record.
    ///
    /// The candidate state is always validated. A new record is created,
    /// otherwise it is updated, or patched with only `patch` when
    /// `options.patch` is set. With `options.wait`, `patch` is only applied
    /// once the backend accepted it; until then the backend alone sees it.
    pub fn save(&self, patch: impl Into<Patch>, options: SetOptions) -> ModelResult<&Self> {
        let mut options = options.with_validate(true);
        let attrs = patch.into().into_attributes();

        match &attrs {
            Some(attrs) if !options.wait => {
                self.mutate(attrs.clone(), options.clone())?;
            }
            _ => {
                let pending = attrs.clone().unwrap_or_default();
                self.check(&pending, &options)?;
            }
        }

        let restore = match &attrs {
            Some(attrs) if options.wait => {
                let mut overlay = self.to_json();
                overlay.extend(attrs.clone());
                Some(self.replace_attributes(overlay))
            }
            _ => None,
        };

        let method = if self.is_new() {
            SyncMethod::Create
        } else if options.patch {
            SyncMethod::Patch
        } else {
            SyncMethod::Update
        };
        if method == SyncMethod::Patch && options.attrs.is_none() {
            options.attrs = attrs.clone();
        }

        let result = self.send(method, &options);
        if let Some(saved) = restore {
            self.replace_attributes(saved);
        }
        let response = result.map_err(|error| self.sync_failed(method, error, &options))?;

        let server = if options.wait {
            let mut merged = attrs.unwrap_or_default();
            merged.extend(response.clone().unwrap_or_default());
            Some(merged)
        } else {
            response.clone()
        };
        if let Some(server) = server {
            self.mutate(server, options.clone())?;
        }

        self.synced(response, options);
        Ok(self)
    }

    /// Destroy the record.
    ///
    /// Emits `"destroy"`, then drops every listener on the record and every
    /// subscription it made elsewhere. A persisted record is deleted from
    /// the backend first. If the backend fails, the error is returned and,
    /// with `options.wait`, the record is left intact.
    pub fn destroy(&self, options: SetOptions) -> ModelResult<()> {
        if self.is_new() || self.config().backend.is_none() {
            self.teardown(&options);
            return Ok(());
        }

        match self.send(SyncMethod::Delete, &options) {
            Ok(response) => {
                self.synced(response, options.clone());
                self.teardown(&options);
                Ok(())
            }
            Err(error) => {
                let error = self.sync_failed(SyncMethod::Delete, error, &options);
                if !options.wait {
                    self.teardown(&options);
                }
                Err(error)
            }
        }
    }

    fn teardown(&self, options: &SetOptions) {
        self.stop_listening();
        self.hub().emit(
            DESTROY,
            &ModelEvent::Destroy {
                model: self.clone(),
                options: options.clone(),
            },
        );
        self.off(None, None, None);
        debug!(cid = %self.cid(), "Destroyed model");
    }

    fn send(&self, method: SyncMethod, options: &SetOptions) -> SyncResult<Option<Attributes>> {
        let backend = self
            .config()
            .backend
            .clone()
            .ok_or(SyncError::Unavailable)?;
        debug!(cid = %self.cid(), method = %method, "Syncing model");
        backend.sync(method, self, options)
    }

    fn synced(&self, response: Option<Attributes>, options: SetOptions) {
        self.hub().emit(
            SYNC,
            &ModelEvent::Sync {
                model: self.clone(),
                response,
                options,
            },
        );
    }

    fn sync_failed(&self, method: SyncMethod, error: SyncError, options: &SetOptions) -> ModelError {
        warn!(cid = %self.cid(), method = %method, error = %error, "Sync failed");
        self.hub().emit(
            ERROR,
            &ModelEvent::Error {
                model: self.clone(),
                error: error.to_string(),
                options: options.clone(),
            },
        );
        ModelError::Sync(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::validator::RequiredKeys;
    use ripple_events::{ALL, Callback, Event};
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn kind(backend: &Rc<MemoryBackend>) -> Rc<ModelConfig> {
        Rc::new(
            ModelConfig::new()
                .with_backend(Rc::clone(backend))
                .with_validator(RequiredKeys::new(["title"])),
        )
    }

    fn names(model: &Model) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        model.on(
            ALL,
            &Callback::new(move |event: &Event<'_, ModelEvent>| {
                sink.borrow_mut().push(event.name.to_string())
            }),
        );
        log
    }

    #[test]
    fn test_save_creates_then_updates() {
        let backend = Rc::new(MemoryBackend::new());
        let model = Model::with_config(kind(&backend), json!({"title": "a"}));
        assert!(model.is_new());

        model.save(Patch::none(), SetOptions::default()).unwrap();
        assert!(!model.is_new());
        let id = model.id().and_then(|id| id.as_str().map(str::to_string)).unwrap();
        assert_eq!(backend.record(&id).unwrap().get("title"), Some(&json!("a")));

        model.save(json!({"title": "b"}), SetOptions::default()).unwrap();
        assert_eq!(backend.record(&id).unwrap().get("title"), Some(&json!("b")));
        assert_eq!(backend.requests(), vec![SyncMethod::Create, SyncMethod::Update]);
    }

    #[test]
    fn test_save_emits_change_then_sync() {
        let backend = Rc::new(MemoryBackend::new());
        let model = Model::with_config(kind(&backend), json!({"id": 1, "title": "a"}));
        backend.insert("1", model.to_json());
        let log = names(&model);

        model.save(json!({"title": "b"}), SetOptions::default()).unwrap();

        assert_eq!(*log.borrow(), vec!["change:title", "change", "sync"]);
    }

    #[test]
    fn test_save_always_validates() {
        let backend = Rc::new(MemoryBackend::new());
        let model = Model::with_config(kind(&backend), json!({"title": "a"}));
        let log = names(&model);

        let err = model.save(json!({"title": null}), SetOptions::default()).unwrap_err();

        assert!(matches!(err, ModelError::Invalid(_)));
        assert_eq!(*log.borrow(), vec!["invalid"]);
        assert!(backend.requests().is_empty());
        assert_eq!(model.get("title"), Some(json!("a")));
    }

    #[test]
    fn test_save_with_wait_applies_after_success() {
        let backend = Rc::new(MemoryBackend::new());
        let model = Model::with_config(kind(&backend), json!({"id": 7, "title": "a"}));
        backend.insert("7", model.to_json());

        model
            .save(json!({"title": "b"}), SetOptions::new().with_wait(true))
            .unwrap();

        assert_eq!(model.get("title"), Some(json!("b")));
        assert_eq!(backend.record("7").unwrap().get("title"), Some(&json!("b")));
    }

    #[test]
    fn test_save_with_wait_leaves_state_on_failure() {
        let backend = Rc::new(MemoryBackend::new());
        let model = Model::with_config(kind(&backend), json!({"id": 7, "title": "a"}));
        let log = names(&model);

        // Nothing is stored under id 7, so the patch is rejected.
        let err = model
            .save(
                json!({"title": "b"}),
                SetOptions::new().with_wait(true).with_patch(true),
            )
            .unwrap_err();

        assert!(matches!(err, ModelError::Sync(SyncError::NotFound(_))));
        assert_eq!(model.get("title"), Some(json!("a")));
        assert_eq!(*log.borrow(), vec!["error"]);
    }

    #[test]
    fn test_save_patch_sends_only_given_attributes() {
        let backend = Rc::new(MemoryBackend::new());
        backend.insert("9", attrs(json!({"id": 9, "title": "stored", "body": "x"})));
        let model = Model::with_config(kind(&backend), json!({"id": 9, "title": "a", "body": "local"}));

        model
            .save(json!({"title": "b"}), SetOptions::new().with_patch(true))
            .unwrap();

        let stored = backend.record("9").unwrap();
        assert_eq!(stored.get("title"), Some(&json!("b")));
        assert_eq!(stored.get("body"), Some(&json!("x")));
        assert_eq!(backend.requests(), vec![SyncMethod::Patch]);
    }

    #[test]
    fn test_fetch_applies_server_state() {
        let backend = Rc::new(MemoryBackend::new());
        backend.insert("3", attrs(json!({"id": 3, "title": "server"})));
        let model = Model::with_config(kind(&backend), json!({"id": 3, "title": "local"}));
        let log = names(&model);

        model.fetch(SetOptions::default()).unwrap();

        assert_eq!(model.get("title"), Some(json!("server")));
        assert_eq!(*log.borrow(), vec!["change:title", "change", "sync"]);
    }

    #[test]
    fn test_fetch_new_record_is_rejected() {
        let backend = Rc::new(MemoryBackend::new());
        let model = Model::with_config(kind(&backend), json!({"title": "a"}));
        assert!(matches!(
            model.fetch(SetOptions::default()),
            Err(ModelError::NotPersisted(_))
        ));
    }

    #[test]
    fn test_fetch_without_backend_emits_error() {
        let model = Model::new(json!({"id": 1}));
        let log = names(&model);

        let err = model.fetch(SetOptions::default()).unwrap_err();

        assert!(matches!(err, ModelError::Sync(SyncError::Unavailable)));
        assert_eq!(*log.borrow(), vec!["error"]);
    }

    #[test]
    fn test_destroy_new_record_tears_down_locally() {
        let model = Model::new(json!({"title": "a"}));
        let other = Model::new(Patch::none());
        let log = names(&model);
        model.listen_to(
            &other,
            "change",
            &Callback::new(|_event: &Event<'_, ModelEvent>| {}),
        );

        model.destroy(SetOptions::default()).unwrap();

        assert_eq!(*log.borrow(), vec!["destroy"]);
        assert!(model.hub().is_empty());
        assert!(other.hub().is_empty());
    }

    #[test]
    fn test_destroy_persisted_record() {
        let backend = Rc::new(MemoryBackend::new());
        let model = Model::with_config(kind(&backend), json!({"title": "a"}));
        model.save(Patch::none(), SetOptions::default()).unwrap();
        let log = names(&model);

        model.destroy(SetOptions::default()).unwrap();

        assert_eq!(*log.borrow(), vec!["sync", "destroy"]);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_destroy_failure_with_wait_keeps_record() {
        let backend = Rc::new(MemoryBackend::new());
        let model = Model::with_config(kind(&backend), json!({"id": "gone", "title": "a"}));
        let log = names(&model);

        assert!(model.destroy(SetOptions::new().with_wait(true)).is_err());
        assert_eq!(*log.borrow(), vec!["error"]);
        assert!(!model.hub().is_empty());

        assert!(model.destroy(SetOptions::default()).is_err());
        assert_eq!(*log.borrow(), vec!["error", "error", "destroy"]);
        assert!(model.hub().is_empty());
    }

    #[test]
    fn test_sync_method_serde() {
        assert_eq!(serde_json::to_value(SyncMethod::Patch).unwrap(), json!("patch"));
        assert_eq!(SyncMethod::Delete.to_string(), "delete");
    }
}
