//! Object store contract and implementations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use app_core::{Kind, Object, ObjectKey};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::bus::{WatchBus, WatchStream};
use crate::error::{Error, Result};
use crate::event::WatchEvent;

/// CRUD + watch access to the remote object store.
///
/// Every call is scoped by kind and namespace. Writes assign store-owned
/// metadata (uid, resource version) and are visible to watchers of the kind.
#[async_trait]
pub trait ObjectApi: Send + Sync {
    /// Fetch one object.
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Object>;

    /// List objects of a kind, optionally restricted to one namespace.
    async fn list(&self, kind: Kind, namespace: Option<&str>) -> Result<Vec<Object>>;

    /// Create an object. Its owner references are stored as given.
    async fn create(&self, object: Object) -> Result<Object>;

    /// Replace an object. A non-zero resource version must match the stored one.
    async fn update(&self, object: Object) -> Result<Object>;

    /// Delete an object.
    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()>;

    /// Subscribe to changes of a kind.
    fn watch(&self, kind: Kind) -> WatchStream;
}

/// Store operation, used for call accounting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory object store.
///
/// Keeps a single global revision counter; every write bumps it and stamps
/// the written object. Supports injected failures so retry paths can be
/// exercised without a real backend.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<(Kind, ObjectKey), Object>>,
    revision: AtomicU64,
    bus: WatchBus,
    faults: Mutex<HashMap<(Kind, Operation), u32>>,
    calls: Mutex<HashMap<(Kind, Operation), usize>>,
}

impl InMemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_bus(WatchBus::new())
    }

    /// Create an empty store publishing to the given bus.
    pub fn with_bus(bus: WatchBus) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            revision: AtomicU64::new(0),
            bus,
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Create an empty store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make the next `times` calls of `operation` on `kind` fail as unavailable.
    pub async fn fail_next(&self, kind: Kind, operation: Operation, times: u32) {
        self.faults.lock().await.insert((kind, operation), times);
    }

    /// Number of `operation` calls made on `kind` so far, failed ones included.
    pub async fn call_count(&self, kind: Kind, operation: Operation) -> usize {
        self.calls
            .lock()
            .await
            .get(&(kind, operation))
            .copied()
            .unwrap_or_default()
    }

    /// Total create, update and delete calls on `kind`.
    pub async fn write_count(&self, kind: Kind) -> usize {
        let calls = self.calls.lock().await;
        [Operation::Create, Operation::Update, Operation::Delete]
            .iter()
            .filter_map(|op| calls.get(&(kind, *op)))
            .sum()
    }

    /// Number of stored objects of a kind.
    pub async fn len(&self, kind: Kind) -> usize {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Whether the store holds no objects of a kind.
    pub async fn is_empty(&self, kind: Kind) -> bool {
        self.len(kind).await == 0
    }

    /// Account for a call and consume an injected fault, if any.
    async fn admit(&self, kind: Kind, operation: Operation) -> Result<()> {
        {
            let mut calls = self.calls.lock().await;
            let count = calls.entry((kind, operation)).or_default();
            *count = count.saturating_add(1);
        }

        let mut faults = self.faults.lock().await;
        match faults.get_mut(&(kind, operation)) {
            Some(remaining) if *remaining > 0 => {
                *remaining = remaining.saturating_sub(1);
                Err(Error::unavailable(
                    format!("{operation} {kind}"),
                    "injected failure",
                ))
            }
            _ => Ok(()),
        }
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectApi for InMemoryObjectStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Object> {
        self.admit(kind, Operation::Get).await?;
        self.objects
            .read()
            .await
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| Error::not_found(kind, key.clone()))
    }

    async fn list(&self, kind: Kind, namespace: Option<&str>) -> Result<Vec<Object>> {
        self.admit(kind, Operation::List).await?;
        let objects = self.objects.read().await;
        let mut listed: Vec<Object> = objects
            .iter()
            .filter(|((k, key), _)| {
                *k == kind && namespace.is_none_or(|ns| key.namespace == ns)
            })
            .map(|(_, object)| object.clone())
            .collect();
        listed.sort_by_key(Object::key);
        Ok(listed)
    }

    async fn create(&self, mut object: Object) -> Result<Object> {
        let kind = object.kind();
        self.admit(kind, Operation::Create).await?;

        let key = object.key();
        if key.name.is_empty() {
            return Err(Error::invalid(format!("{kind} name must not be empty")));
        }

        let mut objects = self.objects.write().await;
        if objects.contains_key(&(kind, key.clone())) {
            return Err(Error::already_exists(kind, key));
        }

        let meta = object.meta_mut();
        meta.uid = Some(Uuid::new_v4());
        meta.creation_timestamp = Some(Utc::now());
        meta.resource_version = self.next_revision();

        objects.insert((kind, key), object.clone());
        self.bus.publish(WatchEvent::Added(object.clone()));
        Ok(object)
    }

    async fn update(&self, mut object: Object) -> Result<Object> {
        let kind = object.kind();
        self.admit(kind, Operation::Update).await?;

        let key = object.key();
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(&(kind, key.clone()))
            .ok_or_else(|| Error::not_found(kind, key.clone()))?;

        let expected = object.resource_version();
        let actual = stored.resource_version();
        if expected != 0 && expected != actual {
            return Err(Error::Conflict {
                kind,
                key,
                expected,
                actual,
            });
        }

        let stored_meta = stored.meta().clone();
        let meta = object.meta_mut();
        meta.uid = stored_meta.uid;
        meta.creation_timestamp = stored_meta.creation_timestamp;
        meta.resource_version = self.next_revision();

        objects.insert((kind, key), object.clone());
        self.bus.publish(WatchEvent::Modified(object.clone()));
        Ok(object)
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()> {
        self.admit(kind, Operation::Delete).await?;

        let mut objects = self.objects.write().await;
        let mut removed = objects
            .remove(&(kind, key.clone()))
            .ok_or_else(|| Error::not_found(kind, key.clone()))?;

        removed.meta_mut().resource_version = self.next_revision();
        self.bus.publish(WatchEvent::Deleted(removed));
        Ok(())
    }

    fn watch(&self, kind: Kind) -> WatchStream {
        self.bus.subscribe(kind)
    }
}

/// A wrapper that adds tracing to an object store.
pub struct TracingObjectApi<A: ObjectApi> {
    inner: A,
}

impl<A: ObjectApi> TracingObjectApi<A> {
    /// Create a new tracing object store.
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: ObjectApi> ObjectApi for TracingObjectApi<A> {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Object> {
        tracing::trace!(kind = %kind, key = %key, "Getting object");
        self.inner.get(kind, key).await
    }

    async fn list(&self, kind: Kind, namespace: Option<&str>) -> Result<Vec<Object>> {
        tracing::debug!(kind = %kind, namespace = ?namespace, "Listing objects");
        let result = self.inner.list(kind, namespace).await;
        if let Ok(ref objects) = result {
            tracing::trace!(kind = %kind, count = objects.len(), "Objects listed");
        }
        result
    }

    async fn create(&self, object: Object) -> Result<Object> {
        tracing::debug!(kind = %object.kind(), key = %object.key(), "Creating object");
        let result = self.inner.create(object).await;
        if let Err(ref e) = result {
            tracing::debug!(error = %e, "Create failed");
        }
        result
    }

    async fn update(&self, object: Object) -> Result<Object> {
        tracing::debug!(
            kind = %object.kind(),
            key = %object.key(),
            resource_version = object.resource_version(),
            "Updating object"
        );
        let result = self.inner.update(object).await;
        if let Err(ref e) = result {
            tracing::debug!(error = %e, "Update failed");
        }
        result
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()> {
        tracing::debug!(kind = %kind, key = %key, "Deleting object");
        let result = self.inner.delete(kind, key).await;
        if let Err(ref e) = result {
            tracing::debug!(error = %e, "Delete failed");
        }
        result
    }

    fn watch(&self, kind: Kind) -> WatchStream {
        tracing::debug!(kind = %kind, "Opening watch");
        self.inner.watch(kind)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use app_core::{ObjectMeta, Protocol, Service, ServicePort, ServiceSpec};

    fn service(name: &str) -> Object {
        Object::from(Service {
            metadata: ObjectMeta::new("default", name),
            spec: ServiceSpec {
                selector: Default::default(),
                ports: vec![ServicePort {
                    protocol: Protocol::Tcp,
                    port: 80,
                    target_port: 80,
                }],
            },
        })
    }

    #[tokio::test]
    async fn test_create_assigns_store_metadata() -> Result<()> {
        let store = InMemoryObjectStore::new();
        let created = store.create(service("web")).await?;

        assert!(created.meta().uid.is_some());
        assert!(created.meta().creation_timestamp.is_some());
        assert_eq!(created.resource_version(), 1);

        let fetched = store.get(Kind::Service, &created.key()).await?;
        assert_eq!(fetched, created);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_existing_key_fails() -> Result<()> {
        let store = InMemoryObjectStore::new();
        store.create(service("web")).await?;

        let err = store.create(service("web")).await;
        assert!(matches!(err, Err(Error::AlreadyExists { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() -> Result<()> {
        let store = InMemoryObjectStore::new();
        let created = store.create(service("web")).await?;
        store.update(created.clone()).await?;

        let err = store.update(created).await;
        assert!(matches!(
            err,
            Err(Error::Conflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_preserves_uid() -> Result<()> {
        let store = InMemoryObjectStore::new();
        let created = store.create(service("web")).await?;

        let mut changed = created.clone();
        changed.meta_mut().uid = None;
        let updated = store.update(changed).await?;

        assert_eq!(updated.meta().uid, created.meta().uid);
        assert!(updated.resource_version() > created.resource_version());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store
            .delete(Kind::Service, &ObjectKey::new("default", "web"))
            .await;
        assert!(err.is_err_and(|e| e.is_not_found()));
    }

    #[tokio::test]
    async fn test_writes_are_published_to_watchers() -> Result<()> {
        let store = InMemoryObjectStore::new();
        let mut watch = store.watch(Kind::Service);

        let created = store.create(service("web")).await?;
        store.delete(Kind::Service, &created.key()).await?;

        assert!(matches!(watch.recv().await?, WatchEvent::Added(_)));
        let deleted = watch.recv().await?;
        assert!(matches!(deleted, WatchEvent::Deleted(_)));
        assert!(deleted.object().resource_version() > created.resource_version());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace() -> Result<()> {
        let store = InMemoryObjectStore::new();
        store.create(service("b")).await?;
        store.create(service("a")).await?;
        let mut other = service("c");
        other.meta_mut().namespace = "prod".to_string();
        store.create(other).await?;

        let all = store.list(Kind::Service, None).await?;
        assert_eq!(all.len(), 3);

        let default: Vec<String> = store
            .list(Kind::Service, Some("default"))
            .await?
            .iter()
            .map(|o| o.meta().name.clone())
            .collect();
        assert_eq!(default, vec!["a".to_string(), "b".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() -> Result<()> {
        let store = InMemoryObjectStore::new();
        store.fail_next(Kind::Service, Operation::Create, 1).await;

        let first = store.create(service("web")).await;
        assert!(matches!(first, Err(Error::Unavailable { .. })));
        assert!(store.is_empty(Kind::Service).await);

        store.create(service("web")).await?;
        assert_eq!(store.call_count(Kind::Service, Operation::Create).await, 2);
        assert_eq!(store.write_count(Kind::Service).await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_tracing_wrapper_delegates() -> Result<()> {
        let store = TracingObjectApi::new(InMemoryObjectStore::new());
        let created = store.create(service("web")).await?;
        let fetched = store.get(Kind::Service, &created.key()).await?;
        assert_eq!(fetched, created);
        assert_eq!(store.inner().len(Kind::Service).await, 1);
        Ok(())
    }
}
