//! Resource model for the App controller.
//!
//! - **Kinds**: the closed set of watched kinds (`App` plus its dependents)
//! - **Objects**: one strongly typed variant per kind, dispatched by `match`
//! - **Ownership**: owner references are value identities, never live pointers
//! - **Scheme**: an explicit kind registry passed to whoever needs it
//!
//! # Example
//!
//! ```ignore
//! use app_core::{Kind, ObjectKey, Scheme};
//!
//! let scheme = Scheme::with_defaults();
//! let objects = scheme.decode_yaml(&std::fs::read_to_string("apps.yaml")?)?;
//! let key = ObjectKey::parse("default/web")?;
//! assert_eq!(scheme.api_version(Kind::App)?, "appcontroller.k8s.io/v1alpha1");
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod key;
pub mod kind;
pub mod meta;
pub mod object;
pub mod resources;
pub mod scheme;

pub use error::{Error, Result};
pub use key::ObjectKey;
pub use kind::Kind;
pub use meta::{Labels, ObjectMeta, ObjectReference, OwnerReference};
pub use object::Object;
pub use resources::{
    App, AppSpec, AppStatus, Container, Deployment, DeploymentSpec, DeploymentTemplate, Ingress,
    IngressBackend, IngressPath, IngressRule, IngressSpec, IngressTemplate, PathType, PodTemplate,
    Protocol, Service, ServicePort, ServiceSpec, ServiceTemplate,
};
pub use scheme::{GroupVersion, Scheme};
