//! Local, eventually consistent index of watched objects.
//!
//! Readers (the reconciler) get point lookups and cheap persistent snapshots;
//! only informers write. Each kind carries a `synced` flag that flips once
//! its initial listing has been ingested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use app_core::{Kind, Object, ObjectKey};
use app_events::WatchEvent;
use itertools::Itertools;
use tracing::trace;

/// A change as observed by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    Added(Object),
    Updated { old: Object, new: Object },
    Deleted(Object),
}

impl ResourceEvent {
    /// Kind of the changed object.
    pub const fn kind(&self) -> Kind {
        self.object().kind()
    }

    /// Latest known state of the changed object.
    pub const fn object(&self) -> &Object {
        match self {
            Self::Added(o) | Self::Deleted(o) | Self::Updated { new: o, .. } => o,
        }
    }
}

#[derive(Debug, Default)]
struct KindStore {
    objects: RwLock<im::HashMap<ObjectKey, Object>>,
    synced: AtomicBool,
}

impl KindStore {
    fn snapshot(&self) -> im::HashMap<ObjectKey, Object> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self, f: impl FnOnce(&mut im::HashMap<ObjectKey, Object>) -> Option<ResourceEvent>) -> Option<ResourceEvent> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut objects)
    }
}

/// Per-kind object cache.
#[derive(Debug, Default)]
pub struct Cache {
    apps: KindStore,
    deployments: KindStore,
    services: KindStore,
    ingresses: KindStore,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    const fn store(&self, kind: Kind) -> &KindStore {
        match kind {
            Kind::App => &self.apps,
            Kind::Deployment => &self.deployments,
            Kind::Service => &self.services,
            Kind::Ingress => &self.ingresses,
        }
    }

    /// Look up an object by kind, namespace and name.
    pub fn get(&self, kind: Kind, namespace: &str, name: &str) -> Option<Object> {
        self.get_by_key(kind, &ObjectKey::new(namespace, name))
    }

    /// Look up an object by kind and key.
    pub fn get_by_key(&self, kind: Kind, key: &ObjectKey) -> Option<Object> {
        self.store(kind)
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Every cached object of a kind, ordered by key.
    pub fn list(&self, kind: Kind) -> Vec<Object> {
        self.snapshot(kind)
            .into_iter()
            .map(|(_, object)| object)
            .sorted_by_key(Object::key)
            .collect()
    }

    /// Point-in-time view of one kind. Later writes do not affect it.
    pub fn snapshot(&self, kind: Kind) -> im::HashMap<ObjectKey, Object> {
        self.store(kind).snapshot()
    }

    /// Number of cached objects of a kind.
    pub fn len(&self, kind: Kind) -> usize {
        self.store(kind)
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self, kind: Kind) -> bool {
        self.len(kind) == 0
    }

    /// Whether the initial listing of `kind` has been ingested.
    pub fn synced(&self, kind: Kind) -> bool {
        self.store(kind).synced.load(Ordering::Acquire)
    }

    /// Whether every kind has synced.
    pub fn all_synced(&self) -> bool {
        Kind::ALL.into_iter().all(|kind| self.synced(kind))
    }

    /// Kinds that have not synced yet.
    pub fn unsynced_kinds(&self) -> Vec<Kind> {
        Kind::ALL
            .into_iter()
            .filter(|kind| !self.synced(*kind))
            .collect()
    }

    /// Apply one watch event.
    ///
    /// Returns `None` for stale events: an add or modify whose resource
    /// version is not newer than the cached copy, a delete that predates the
    /// cached copy, or a delete of something not cached.
    pub(crate) fn apply(&self, event: &WatchEvent) -> Option<ResourceEvent> {
        let object = event.object();
        let key = object.key();
        let store = self.store(object.kind());

        let change = store.write(|objects| match event {
            WatchEvent::Added(new) | WatchEvent::Modified(new) => match objects.get(&key) {
                Some(old) if old.resource_version() >= new.resource_version() => None,
                Some(old) => {
                    let old = old.clone();
                    objects.insert(key.clone(), new.clone());
                    Some(ResourceEvent::Updated {
                        old,
                        new: new.clone(),
                    })
                }
                None => {
                    objects.insert(key.clone(), new.clone());
                    Some(ResourceEvent::Added(new.clone()))
                }
            },
            WatchEvent::Deleted(last) => match objects.get(&key) {
                Some(cached) if cached.resource_version() > last.resource_version() => None,
                Some(_) => {
                    objects.remove(&key);
                    Some(ResourceEvent::Deleted(last.clone()))
                }
                None => None,
            },
        });

        if change.is_none() {
            trace!(
                kind = %object.kind(),
                key = %key,
                resource_version = object.resource_version(),
                "Dropping stale watch event"
            );
        }
        change
    }

    /// Replace the contents of one kind with a fresh listing and mark it
    /// synced. Returns the difference to the previous contents.
    pub(crate) fn replace(&self, kind: Kind, listed: Vec<Object>) -> Vec<ResourceEvent> {
        let store = self.store(kind);
        let fresh: im::HashMap<ObjectKey, Object> = listed
            .into_iter()
            .filter(|object| object.kind() == kind)
            .map(|object| (object.key(), object))
            .collect();

        let previous = {
            let mut objects = store.objects.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *objects, fresh.clone())
        };
        store.synced.store(true, Ordering::Release);

        let changed = fresh.iter().filter_map(|(key, new)| match previous.get(key) {
            None => Some(ResourceEvent::Added(new.clone())),
            Some(old) if old != new => Some(ResourceEvent::Updated {
                old: old.clone(),
                new: new.clone(),
            }),
            Some(_) => None,
        });
        let removed = previous
            .iter()
            .filter(|(key, _)| !fresh.contains_key(*key))
            .map(|(_, old)| ResourceEvent::Deleted(old.clone()));

        changed
            .chain(removed)
            .sorted_by_key(|event| event.object().key())
            .collect()
    }
}
