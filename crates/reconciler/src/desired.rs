//! Desired dependents of an App.
//!
//! Pure and deterministic: the same App always yields the same objects, so
//! comparing them against what exists is enough to detect drift.

use app_core::{
    App, Container, Deployment, DeploymentSpec, Ingress, IngressBackend, IngressPath,
    IngressRule, IngressSpec, Kind, Labels, Object, ObjectMeta, OwnerReference, PathType,
    PodTemplate, Protocol, Scheme, Service, ServicePort, ServiceSpec,
};

use crate::error::Result;

/// Port the service exposes and the ingress routes to.
pub const SERVICE_PORT: u16 = 80;

/// One desired dependent and whether the App currently asks for it.
///
/// The object is built even when not required: its name is what the
/// reconciler looks up to find a dependent that has to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredDependent {
    pub required: bool,
    pub object: Object,
}

impl DesiredDependent {
    pub const fn kind(&self) -> Kind {
        self.object.kind()
    }

    pub fn name(&self) -> &str {
        &self.object.meta().name
    }
}

/// Labels binding the workload's pods to the service.
pub fn selector_labels(app: &App) -> Labels {
    Labels::from([
        ("app".to_string(), "app-deployment".to_string()),
        ("controller".to_string(), app.metadata.name.clone()),
    ])
}

fn dependent_meta(app: &App, name: &str, owner: &OwnerReference) -> ObjectMeta {
    ObjectMeta {
        labels: selector_labels(app),
        owner_references: vec![owner.clone()],
        ..ObjectMeta::new(app.metadata.namespace.clone(), name)
    }
}

pub fn desired_deployment(app: &App, owner: &OwnerReference) -> Deployment {
    let template = &app.spec.deployment;
    let labels = selector_labels(app);
    Deployment {
        metadata: dependent_meta(app, &template.name, owner),
        spec: DeploymentSpec {
            replicas: template.replicas,
            selector: labels.clone(),
            template: PodTemplate {
                labels,
                containers: vec![Container {
                    name: template.name.clone(),
                    image: template.image.clone(),
                }],
            },
        },
    }
}

pub fn desired_service(app: &App, owner: &OwnerReference) -> Service {
    Service {
        metadata: dependent_meta(app, &app.spec.service.name, owner),
        spec: ServiceSpec {
            selector: selector_labels(app),
            ports: vec![ServicePort {
                protocol: Protocol::Tcp,
                port: SERVICE_PORT,
                target_port: SERVICE_PORT,
            }],
        },
    }
}

pub fn desired_ingress(app: &App, owner: &OwnerReference) -> Ingress {
    Ingress {
        metadata: dependent_meta(app, &app.spec.ingress.name, owner),
        spec: IngressSpec {
            rules: vec![IngressRule {
                host: None,
                paths: vec![IngressPath {
                    path: "/".to_string(),
                    path_type: PathType::Prefix,
                    backend: IngressBackend {
                        service_name: app.spec.service.name.clone(),
                        service_port: SERVICE_PORT,
                    },
                }],
            }],
        },
    }
}

/// Every dependent of `app`, in reconcile order: Deployment, Service,
/// Ingress.
///
/// # Errors
///
/// Fails if the App kind is not registered in `scheme` or the App has no uid.
pub fn desired_dependents(app: &App, scheme: &Scheme) -> Result<Vec<DesiredDependent>> {
    let owner = scheme.controller_ref(&Object::App(app.clone()))?;

    Ok(vec![
        DesiredDependent {
            required: true,
            object: desired_deployment(app, &owner).into(),
        },
        DesiredDependent {
            required: app.spec.service.enabled,
            object: desired_service(app, &owner).into(),
        },
        DesiredDependent {
            required: app.spec.ingress.enabled,
            object: desired_ingress(app, &owner).into(),
        },
    ])
}
