//! Turns observed changes into work queue keys.

use std::sync::Arc;

use app_core::{Kind, Object, ObjectKey};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::cache::ResourceEvent;
use crate::queue::WorkQueue;

/// Decide which App, if any, has to be reconciled because of `event`.
///
/// - App added: that App.
/// - App updated: that App, if its spec or labels changed. Status-only
///   writes (including the controller's own) are not enqueued.
/// - App deleted: nothing, dependents are collected by their owner
///   references.
/// - Dependent deleted: the App named by its controller reference, if that
///   reference is to an App.
/// - Dependent added or updated: nothing.
pub fn route(event: &ResourceEvent) -> Option<ObjectKey> {
    match (event.kind(), event) {
        (Kind::App, ResourceEvent::Added(app)) => Some(app.key()),
        (Kind::App, ResourceEvent::Updated { old, new }) => {
            declaration_changed(old, new).then(|| new.key())
        }
        (Kind::App, ResourceEvent::Deleted(_)) => None,
        (_, ResourceEvent::Deleted(dependent)) => {
            let meta = dependent.meta();
            meta.controller_ref()
                .filter(|owner| owner.kind == Kind::App.as_str())
                .map(|owner| ObjectKey::new(meta.namespace.clone(), owner.name.clone()))
        }
        (_, ResourceEvent::Added(_) | ResourceEvent::Updated { .. }) => None,
    }
}

fn declaration_changed(old: &Object, new: &Object) -> bool {
    match (old.as_app(), new.as_app()) {
        (Some(old), Some(new)) => {
            old.spec != new.spec || old.metadata.labels != new.metadata.labels
        }
        _ => true,
    }
}

/// Consumes informer output and feeds the work queue.
pub struct EventRouter {
    queue: Arc<WorkQueue<String>>,
}

impl EventRouter {
    pub fn new(queue: Arc<WorkQueue<String>>) -> Self {
        Self { queue }
    }

    /// Route one event, returning the enqueued key.
    pub fn handle(&self, event: &ResourceEvent) -> Option<String> {
        let Some(key) = route(event) else {
            trace!(
                kind = %event.kind(),
                key = %event.object().key(),
                "Ignoring event"
            );
            return None;
        };

        let key = key.to_queue_key();
        debug!(kind = %event.kind(), key = %key, "Enqueueing");
        self.queue.add(key.clone());
        Some(key)
    }

    /// Route events until every sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<ResourceEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(&event);
        }
        debug!("Event router finished");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use app_core::{
        App, AppSpec, Deployment, DeploymentSpec, DeploymentTemplate, IngressTemplate, Object,
        ObjectMeta, OwnerReference, PodTemplate, ServiceTemplate,
    };
    use uuid::Uuid;

    use super::*;
    use crate::rate_limit::ExponentialFailureRateLimiter;

    fn app(image: &str) -> Object {
        Object::from(App {
            metadata: ObjectMeta::new("default", "shop"),
            spec: AppSpec {
                deployment: DeploymentTemplate {
                    name: "shop".to_string(),
                    image: image.to_string(),
                    replicas: 1,
                },
                service: ServiceTemplate {
                    name: "shop".to_string(),
                    enabled: true,
                },
                ingress: IngressTemplate {
                    name: "shop".to_string(),
                    enabled: false,
                },
            },
            status: Default::default(),
        })
    }

    fn deployment(owner_kind: Option<&str>) -> Object {
        let mut metadata = ObjectMeta::new("default", "shop-web");
        if let Some(kind) = owner_kind {
            metadata.owner_references.push(OwnerReference {
                api_version: "appcontroller.k8s.io/v1alpha1".to_string(),
                kind: kind.to_string(),
                name: "shop".to_string(),
                uid: Uuid::new_v4(),
                controller: true,
                block_owner_deletion: true,
            });
        }
        Object::from(Deployment {
            metadata,
            spec: DeploymentSpec {
                replicas: 1,
                selector: Default::default(),
                template: PodTemplate {
                    labels: Default::default(),
                    containers: Vec::new(),
                },
            },
        })
    }

    fn shop_key() -> Option<ObjectKey> {
        Some(ObjectKey::new("default", "shop"))
    }

    #[test]
    fn test_app_add_is_enqueued() {
        assert_eq!(route(&ResourceEvent::Added(app("nginx"))), shop_key());
    }

    #[test]
    fn test_identical_app_update_is_ignored() {
        let event = ResourceEvent::Updated {
            old: app("nginx"),
            new: app("nginx"),
        };
        assert_eq!(route(&event), None);
    }

    #[test]
    fn test_resource_version_bump_alone_is_ignored() {
        let mut new = app("nginx");
        new.meta_mut().resource_version = 7;
        let event = ResourceEvent::Updated {
            old: app("nginx"),
            new,
        };
        assert_eq!(route(&event), None);
    }

    #[test]
    fn test_changed_app_update_is_enqueued() {
        let event = ResourceEvent::Updated {
            old: app("nginx:1"),
            new: app("nginx:2"),
        };
        assert_eq!(route(&event), shop_key());
    }

    #[test]
    fn test_status_only_app_update_is_ignored() {
        let mut new = app("nginx");
        new.meta_mut().resource_version = 9;
        if let Object::App(a) = &mut new {
            a.status.deployment_name = Some("shop".to_string());
        }
        let event = ResourceEvent::Updated {
            old: app("nginx"),
            new,
        };
        assert_eq!(route(&event), None);
    }

    #[test]
    fn test_label_change_is_enqueued() {
        let mut new = app("nginx");
        new.meta_mut()
            .labels
            .insert("tier".to_string(), "web".to_string());
        let event = ResourceEvent::Updated {
            old: app("nginx"),
            new,
        };
        assert_eq!(route(&event), shop_key());
    }

    #[test]
    fn test_app_delete_is_ignored() {
        assert_eq!(route(&ResourceEvent::Deleted(app("nginx"))), None);
    }

    #[test]
    fn test_owned_dependent_delete_enqueues_owner() {
        assert_eq!(route(&ResourceEvent::Deleted(deployment(Some("App")))), shop_key());
    }

    #[test]
    fn test_foreign_or_unowned_dependent_delete_is_ignored() {
        assert_eq!(route(&ResourceEvent::Deleted(deployment(Some("ReplicaSet")))), None);
        assert_eq!(route(&ResourceEvent::Deleted(deployment(None))), None);
    }

    #[test]
    fn test_dependent_add_and_update_are_ignored() {
        assert_eq!(route(&ResourceEvent::Added(deployment(Some("App")))), None);
        let event = ResourceEvent::Updated {
            old: deployment(Some("App")),
            new: deployment(None),
        };
        assert_eq!(route(&event), None);
    }

    #[tokio::test]
    async fn test_run_feeds_queue_until_senders_close() {
        let queue = WorkQueue::new_arc(
            "test",
            ExponentialFailureRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1)),
        );
        let (tx, rx) = mpsc::channel(8);
        let router = tokio::spawn(EventRouter::new(Arc::clone(&queue)).run(rx));

        for _ in 0..3 {
            let _ = tx.send(ResourceEvent::Added(app("nginx"))).await;
        }
        drop(tx);
        let _ = router.await;

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some("default/shop".to_string()));
    }
}
