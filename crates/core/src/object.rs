//! The closed sum type over every watched kind.

use serde::{Deserialize, Serialize};

use crate::key::ObjectKey;
use crate::kind::Kind;
use crate::meta::{ObjectMeta, ObjectReference};
use crate::resources::{App, Deployment, Ingress, Service};

/// A stored object of one of the watched kinds.
///
/// Serialized with the kind as an internal `kind` tag, matching the manifest
/// layout (`kind: App`, `metadata: ...`, `spec: ...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Object {
    App(App),
    Deployment(Deployment),
    Service(Service),
    Ingress(Ingress),
}

impl Object {
    /// Kind of this object.
    pub const fn kind(&self) -> Kind {
        match self {
            Self::App(_) => Kind::App,
            Self::Deployment(_) => Kind::Deployment,
            Self::Service(_) => Kind::Service,
            Self::Ingress(_) => Kind::Ingress,
        }
    }

    /// Object metadata.
    pub const fn meta(&self) -> &ObjectMeta {
        match self {
            Self::App(o) => &o.metadata,
            Self::Deployment(o) => &o.metadata,
            Self::Service(o) => &o.metadata,
            Self::Ingress(o) => &o.metadata,
        }
    }

    /// Mutable object metadata.
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::App(o) => &mut o.metadata,
            Self::Deployment(o) => &mut o.metadata,
            Self::Service(o) => &mut o.metadata,
            Self::Ingress(o) => &mut o.metadata,
        }
    }

    /// Identity key of this object within its kind.
    pub fn key(&self) -> ObjectKey {
        self.meta().key()
    }

    /// Value reference to this object.
    pub fn reference(&self) -> ObjectReference {
        ObjectReference::from_meta(self.kind(), self.meta())
    }

    /// Resource version assigned by the store.
    pub const fn resource_version(&self) -> u64 {
        self.meta().resource_version
    }

    /// Borrow as an App.
    pub const fn as_app(&self) -> Option<&App> {
        match self {
            Self::App(app) => Some(app),
            _ => None,
        }
    }

    /// Borrow as a Deployment.
    pub const fn as_deployment(&self) -> Option<&Deployment> {
        match self {
            Self::Deployment(d) => Some(d),
            _ => None,
        }
    }

    /// Borrow as a Service.
    pub const fn as_service(&self) -> Option<&Service> {
        match self {
            Self::Service(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as an Ingress.
    pub const fn as_ingress(&self) -> Option<&Ingress> {
        match self {
            Self::Ingress(i) => Some(i),
            _ => None,
        }
    }
}

impl From<App> for Object {
    fn from(app: App) -> Self {
        Self::App(app)
    }
}

impl From<Deployment> for Object {
    fn from(deployment: Deployment) -> Self {
        Self::Deployment(deployment)
    }
}

impl From<Service> for Object {
    fn from(service: Service) -> Self {
        Self::Service(service)
    }
}

impl From<Ingress> for Object {
    fn from(ingress: Ingress) -> Self {
        Self::Ingress(ingress)
    }
}
