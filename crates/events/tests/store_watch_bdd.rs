//! BDD tests: object store writes and the watch feed.
//!
//! **Scenario:** GIVEN a watcher on a kind WHEN objects of that kind are
//! written THEN the watcher sees every write, in order, with increasing
//! resource versions.

use std::time::Duration;

use app_core::{
    Deployment, DeploymentSpec, Kind, Object, ObjectKey, ObjectMeta, PodTemplate, Service,
    ServiceSpec,
};
use app_events::{
    Error, InMemoryObjectStore, ObjectApi, Operation, TracingObjectApi, WatchEvent, WatchStream,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn deployment(name: &str, replicas: i32) -> Object {
    Object::from(Deployment {
        metadata: ObjectMeta::new("default", name),
        spec: DeploymentSpec {
            replicas,
            selector: Default::default(),
            template: PodTemplate {
                labels: Default::default(),
                containers: Vec::new(),
            },
        },
    })
}

async fn next(stream: &mut WatchStream) -> Result<WatchEvent, Box<dyn std::error::Error>> {
    Ok(tokio::time::timeout(Duration::from_secs(1), stream.recv()).await??)
}

#[tokio::test]
async fn given_watcher_when_object_lifecycle_runs_then_events_arrive_in_order() -> TestResult {
    // Given: a watcher on Deployments
    let store = InMemoryObjectStore::new();
    let mut stream = store.watch(Kind::Deployment);

    // When: a Deployment is created, scaled and deleted
    let created = store.create(deployment("web", 1)).await?;
    let mut scaled = created.clone();
    if let Object::Deployment(d) = &mut scaled {
        d.spec.replicas = 3;
    }
    let updated = store.update(scaled).await?;
    store.delete(Kind::Deployment, &created.key()).await?;

    // Then: Added, Modified, Deleted with increasing versions
    let added = next(&mut stream).await?;
    let modified = next(&mut stream).await?;
    let deleted = next(&mut stream).await?;

    assert_eq!(added, WatchEvent::Added(created.clone()));
    assert_eq!(modified, WatchEvent::Modified(updated.clone()));
    assert!(matches!(deleted, WatchEvent::Deleted(_)));
    assert!(created.resource_version() < updated.resource_version());
    assert!(updated.resource_version() < deleted.object().resource_version());
    assert_eq!(updated.meta().uid, created.meta().uid);
    Ok(())
}

#[tokio::test]
async fn given_watcher_on_one_kind_when_other_kind_written_then_nothing_is_delivered()
-> TestResult {
    // Given: a watcher on Services
    let store = InMemoryObjectStore::new();
    let mut stream = store.watch(Kind::Service);

    // When: only a Deployment and then a Service are written
    store.create(deployment("web", 1)).await?;
    store
        .create(Object::from(Service {
            metadata: ObjectMeta::new("default", "web-svc"),
            spec: ServiceSpec {
                selector: Default::default(),
                ports: Vec::new(),
            },
        }))
        .await?;

    // Then: the first event seen is the Service
    let event = next(&mut stream).await?;
    assert_eq!(event.kind(), Kind::Service);
    Ok(())
}

#[tokio::test]
async fn given_stale_copy_when_updated_then_conflict_and_no_event() -> TestResult {
    // Given: an object that was modified after it was read
    let store = InMemoryObjectStore::new();
    let stale = store.create(deployment("web", 1)).await?;
    store.update(deployment_with_version(&stale, 2)).await?;
    let mut stream = store.watch(Kind::Deployment);

    // When: writing the stale copy back
    let result = store.update(deployment_with_version(&stale, 5)).await;

    // Then: the write is refused and nobody is told about it
    assert!(matches!(result, Err(Error::Conflict { .. })));
    let waited = tokio::time::timeout(Duration::from_millis(50), stream.recv()).await;
    assert!(waited.is_err());
    Ok(())
}

#[tokio::test]
async fn given_injected_failure_when_listing_then_unavailable_once() -> TestResult {
    // Given: one injected list failure
    let store = InMemoryObjectStore::new();
    store.create(deployment("web", 1)).await?;
    store.fail_next(Kind::Deployment, Operation::List, 1).await;

    // When: listing twice
    let first = store.list(Kind::Deployment, None).await;
    let second = store.list(Kind::Deployment, Some("default")).await?;

    // Then: the first call fails, the second sees the object
    assert!(matches!(first, Err(Error::Unavailable { .. })));
    assert_eq!(second.len(), 1);
    assert_eq!(store.call_count(Kind::Deployment, Operation::List).await, 2);
    Ok(())
}

#[tokio::test]
async fn given_tracing_wrapper_when_writing_then_inner_store_and_watchers_see_it() -> TestResult {
    // Given: a traced store
    let store = TracingObjectApi::new(InMemoryObjectStore::new());
    let mut stream = store.watch(Kind::Deployment);

    // When: creating through the wrapper
    let created = store.create(deployment("web", 2)).await?;

    // Then: the inner store holds it and the feed reports it
    assert_eq!(store.inner().len(Kind::Deployment).await, 1);
    assert_eq!(
        store
            .get(Kind::Deployment, &ObjectKey::new("default", "web"))
            .await?,
        created
    );
    assert_eq!(next(&mut stream).await?, WatchEvent::Added(created));
    Ok(())
}

fn deployment_with_version(base: &Object, replicas: i32) -> Object {
    let mut object = deployment("web", replicas);
    object.meta_mut().resource_version = base.resource_version();
    object
}
