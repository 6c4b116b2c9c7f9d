//! Endpoint identity and singleton registries
//!
//! Endpoints are held weakly by model id so that a registry entry never keeps
//! an endpoint alive. Singleton classes additionally map their class name to
//! the model id of the one live instance.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Weak;

use super::endpoint::{Endpoint, EndpointInner};

#[derive(Default)]
struct Tables {
    endpoints: HashMap<String, Weak<EndpointInner>>,
    singletons: HashMap<String, String>,
}

/// Process-wide endpoint registry
pub struct EndpointRegistry {
    tables: Mutex<Tables>,
}

static REGISTRY: Lazy<EndpointRegistry> = Lazy::new(|| EndpointRegistry {
    tables: Mutex::new(Tables::default()),
});

/// Slot an endpoint is requested for
pub(crate) struct Slot<'a> {
    pub model_id: Option<&'a str>,
    pub singleton_class: Option<&'a str>,
}

impl EndpointRegistry {
    /// Access the global registry.
    pub fn global() -> &'static Self {
        &REGISTRY
    }

    /// Live endpoint for `model_id`.
    pub fn get(&self, model_id: &str) -> Option<Endpoint> {
        let inner = self.tables.lock().endpoints.get(model_id).and_then(Weak::upgrade);
        inner.map(Endpoint::from_inner)
    }

    /// Live singleton instance of `class_name`.
    pub fn singleton(&self, class_name: &str) -> Option<Endpoint> {
        let inner = {
            let tables = self.tables.lock();
            tables
                .singletons
                .get(class_name)
                .and_then(|model_id| tables.endpoints.get(model_id))
                .and_then(Weak::upgrade)
        };
        inner.map(Endpoint::from_inner)
    }

    /// Model ids of all live endpoints, sorted.
    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tables
            .lock()
            .endpoints
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of live endpoints.
    pub fn len(&self) -> usize {
        self.model_ids().len()
    }

    /// Whether no endpoint is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the live endpoint for `slot` or register the one built by `create`.
    ///
    /// The singleton slot is consulted before the model id. The boolean is
    /// `true` when `create` ran.
    pub(crate) fn get_or_create(
        &self,
        slot: Slot<'_>,
        create: impl FnOnce() -> Endpoint,
    ) -> (Endpoint, bool) {
        let mut tables = self.tables.lock();

        let existing = slot
            .singleton_class
            .and_then(|class| tables.singletons.get(class))
            .and_then(|model_id| tables.endpoints.get(model_id))
            .and_then(Weak::upgrade)
            .or_else(|| {
                slot.model_id
                    .and_then(|model_id| tables.endpoints.get(model_id))
                    .and_then(Weak::upgrade)
            });
        if let Some(inner) = existing {
            drop(tables);
            return (Endpoint::from_inner(inner), false);
        }

        let endpoint = create();
        let model_id = endpoint.model_id().to_string();
        tables.endpoints.insert(model_id.clone(), endpoint.weak_inner());
        if let Some(class) = slot.singleton_class {
            tables.singletons.insert(class.to_string(), model_id);
        }
        (endpoint, true)
    }

    /// Remove `model_id` if it still refers to the given instance.
    pub(crate) fn unregister(&self, model_id: &str, target: *const EndpointInner) {
        let mut tables = self.tables.lock();
        if tables
            .endpoints
            .get(model_id)
            .is_some_and(|weak| weak.as_ptr() == target)
        {
            tables.endpoints.remove(model_id);
            tables.singletons.retain(|_, id| id != model_id);
        }
    }

    /// Drop `model_id` if its endpoint is gone.
    pub(crate) fn purge(&self, model_id: &str) {
        let mut tables = self.tables.lock();
        if tables
            .endpoints
            .get(model_id)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            tables.endpoints.remove(model_id);
            tables.singletons.retain(|_, id| id != model_id);
        }
    }
}
