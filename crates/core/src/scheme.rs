//! Explicit kind registry.
//!
//! A [`Scheme`] maps each [`Kind`] to the group/version it is served under. It
//! is built once at startup and handed to whatever needs to stamp owner
//! references or decode manifests.

use std::collections::BTreeMap;

use serde::Deserialize as _;
use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::kind::Kind;
use crate::meta::OwnerReference;
use crate::object::Object;

/// API group and version of a kind. The core group is the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupVersion {
    pub group: String,
    pub version: String,
}

impl GroupVersion {
    pub fn new(group: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
        }
    }

    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Registry of served kinds.
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    kinds: BTreeMap<Kind, GroupVersion>,
}

impl Scheme {
    /// Create an empty scheme.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheme with the App group and the built-in dependent kinds registered.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Kind::App, GroupVersion::new("appcontroller.k8s.io", "v1alpha1"))
            .register(Kind::Deployment, GroupVersion::new("apps", "v1"))
            .register(Kind::Service, GroupVersion::new("", "v1"))
            .register(Kind::Ingress, GroupVersion::new("networking.k8s.io", "v1"))
    }

    /// Register (or replace) the group/version serving `kind`.
    #[must_use]
    pub fn register(mut self, kind: Kind, group_version: GroupVersion) -> Self {
        self.kinds.insert(kind, group_version);
        self
    }

    /// `apiVersion` string for a kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownKind`] if the kind was never registered.
    pub fn api_version(&self, kind: Kind) -> Result<String> {
        self.kinds
            .get(&kind)
            .map(GroupVersion::api_version)
            .ok_or_else(|| Error::unknown_kind(kind.as_str()))
    }

    /// Controller owner reference pointing at `owner`.
    ///
    /// # Errors
    ///
    /// Fails if the owner's kind is unregistered or the owner has no uid yet.
    pub fn controller_ref(&self, owner: &Object) -> Result<OwnerReference> {
        let meta = owner.meta();
        let uid = meta
            .uid
            .ok_or_else(|| Error::missing_uid(owner.kind().as_str(), meta.name.clone()))?;

        Ok(OwnerReference {
            api_version: self.api_version(owner.kind())?,
            kind: owner.kind().as_str().to_string(),
            name: meta.name.clone(),
            uid,
            controller: true,
            block_owner_deletion: true,
        })
    }

    /// Decode a multi-document YAML manifest.
    ///
    /// Every document must carry an `apiVersion` and `kind` this scheme
    /// serves. Empty documents are skipped.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed YAML, [`Error::UnknownKind`] or
    /// [`Error::ApiVersionMismatch`] for documents the scheme does not serve.
    pub fn decode_yaml(&self, input: &str) -> Result<Vec<Object>> {
        let mut objects = Vec::new();
        for document in serde_yaml::Deserializer::from_str(input) {
            let value = Value::deserialize(document)
                .map_err(|e| Error::yaml_parse_failed(e.to_string()))?;
            if value.is_null() {
                continue;
            }
            objects.push(self.decode_value(value)?);
        }
        Ok(objects)
    }

    fn decode_value(&self, mut value: Value) -> Result<Object> {
        let mapping = value
            .as_mapping_mut()
            .ok_or_else(|| Error::invalid_manifest("document is not a mapping"))?;

        let kind: Kind = mapping
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_manifest("missing 'kind'"))?
            .parse()?;

        let api_version = mapping
            .remove("apiVersion")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| Error::invalid_manifest("missing 'apiVersion'"))?;

        let expected = self.api_version(kind)?;
        if api_version != expected {
            return Err(Error::ApiVersionMismatch {
                api_version,
                kind: kind.as_str().to_string(),
                expected,
            });
        }

        serde_yaml::from_value(value).map_err(|e| Error::yaml_parse_failed(e.to_string()))
    }

    /// Encode an object as a manifest value with its `apiVersion` restored.
    ///
    /// # Errors
    ///
    /// Fails if the kind is unregistered or serialization fails.
    pub fn encode(&self, object: &Object) -> Result<serde_json::Value> {
        let mut value =
            serde_json::to_value(object).map_err(|e| Error::json_parse_failed(e.to_string()))?;
        let api_version = self.api_version(object.kind())?;
        if let Some(map) = value.as_object_mut() {
            map.insert("apiVersion".to_string(), serde_json::Value::String(api_version));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const MANIFEST: &str = r"
apiVersion: appcontroller.k8s.io/v1alpha1
kind: App
metadata:
  name: web
  namespace: default
spec:
  deployment:
    name: web
    image: nginx:1.27
    replicas: 3
  service:
    name: web-svc
  ingress:
    name: web-ing
    enabled: true
---
";

    #[test]
    fn test_api_version_for_core_group() {
        let scheme = Scheme::with_defaults();
        assert_eq!(scheme.api_version(Kind::Service), Ok("v1".to_string()));
        assert_eq!(scheme.api_version(Kind::Deployment), Ok("apps/v1".to_string()));
    }

    #[test]
    fn test_unregistered_kind_is_an_error() {
        let scheme = Scheme::new();
        assert!(matches!(
            scheme.api_version(Kind::App),
            Err(Error::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_decode_yaml_manifest() -> Result<()> {
        let objects = Scheme::with_defaults().decode_yaml(MANIFEST)?;
        assert_eq!(objects.len(), 1);

        let app = objects.first().and_then(Object::as_app);
        assert_eq!(app.map(|a| a.spec.deployment.replicas), Some(3));
        assert_eq!(app.map(|a| a.spec.ingress.enabled), Some(true));
        Ok(())
    }

    #[test]
    fn test_decode_rejects_wrong_api_version() {
        let manifest = MANIFEST.replace("appcontroller.k8s.io/v1alpha1", "apps/v1");
        let result = Scheme::with_defaults().decode_yaml(&manifest);
        assert!(matches!(result, Err(Error::ApiVersionMismatch { .. })));
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let manifest = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\n";
        let result = Scheme::with_defaults().decode_yaml(manifest);
        assert!(matches!(result, Err(Error::UnknownKind { .. })));
    }

    #[test]
    fn test_controller_ref_requires_uid() -> Result<()> {
        let scheme = Scheme::with_defaults();
        let mut objects = scheme.decode_yaml(MANIFEST)?;
        let mut app = objects.pop().ok_or_else(|| Error::invalid_manifest("empty"))?;

        assert!(matches!(
            scheme.controller_ref(&app),
            Err(Error::MissingUid { .. })
        ));

        let uid = Uuid::new_v4();
        app.meta_mut().uid = Some(uid);
        let owner_ref = scheme.controller_ref(&app)?;
        assert_eq!(owner_ref.api_version, "appcontroller.k8s.io/v1alpha1");
        assert_eq!(owner_ref.kind, "App");
        assert_eq!(owner_ref.uid, uid);
        assert!(owner_ref.controller);
        Ok(())
    }

    #[test]
    fn test_encode_restores_api_version() -> Result<()> {
        let scheme = Scheme::with_defaults();
        let objects = scheme.decode_yaml(MANIFEST)?;
        let app = objects.first().ok_or_else(|| Error::invalid_manifest("empty"))?;
        let value = scheme.encode(app)?;
        assert_eq!(
            value.get("apiVersion").and_then(serde_json::Value::as_str),
            Some("appcontroller.k8s.io/v1alpha1")
        );
        Ok(())
    }
}
