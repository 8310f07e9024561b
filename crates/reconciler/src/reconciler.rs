//! Core reconciler: drives the dependents of one App toward its spec.
//!
//! Level triggered: every pass recomputes the full desired state from the
//! cached App, so passes are safe to repeat and to coalesce.

use std::sync::Arc;

use app_core::{
    App, AppStatus, Kind, Object, ObjectKey, ObjectMeta, ObjectReference, Scheme,
};
use app_events::{EventRecorder, EventType, ObjectApi};
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::desired::{DesiredDependent, desired_dependents};
use crate::error::{Error, Result};

/// Reason recorded after a successful pass.
pub const REASON_SYNCED: &str = "Synced";
/// Message recorded after a successful pass.
pub const MESSAGE_SYNCED: &str = "App synced successfully";
/// Reason recorded when a dependent name is taken by a foreign object.
pub const REASON_RESOURCE_EXISTS: &str = "ErrResourceExists";
/// Reason recorded when a dependent is created.
pub const REASON_CREATED: &str = "Created";
/// Reason recorded when a drifted dependent is brought back in line.
pub const REASON_UPDATED: &str = "Updated";
/// Reason recorded when a disabled dependent is removed.
pub const REASON_DELETED: &str = "Deleted";

/// What one successful pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: Vec<Kind>,
    pub updated: Vec<Kind>,
    pub deleted: Vec<Kind>,
    pub status_updated: bool,
}

impl SyncSummary {
    /// Number of dependent writes issued.
    pub fn mutations(&self) -> usize {
        [&self.created, &self.updated, &self.deleted]
            .into_iter()
            .map(Vec::len)
            .sum()
    }

    /// Whether the pass found everything already converged.
    pub fn is_noop(&self) -> bool {
        self.mutations() == 0 && !self.status_updated
    }
}

/// Result of reconciling one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The App is not in the cache; there is nothing to do.
    AppGone,
    /// Every dependent matches the App spec.
    Synced(SyncSummary),
}

/// The reconciler.
pub struct Reconciler {
    api: Arc<dyn ObjectApi>,
    cache: Arc<Cache>,
    recorder: Arc<dyn EventRecorder>,
    scheme: Scheme,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        api: Arc<dyn ObjectApi>,
        cache: Arc<Cache>,
        recorder: Arc<dyn EventRecorder>,
        scheme: Scheme,
    ) -> Self {
        Self {
            api,
            cache,
            recorder,
            scheme,
        }
    }

    /// Converge the dependents of the App identified by `key`.
    ///
    /// Dependents are handled in order (Deployment, Service, Ingress) and the
    /// first failure aborts the pass.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidKey`] if `key` is malformed (never worth a retry)
    /// - [`Error::Conflict`] if a required dependent exists but is controlled
    ///   by something else; the object is left untouched
    /// - [`Error::Api`] if a remote call fails
    pub async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome> {
        let key = ObjectKey::parse(key).map_err(Error::InvalidKey)?;

        let Some(app) = self.cached_app(&key) else {
            debug!(key = %key, "App no longer exists, nothing to do");
            return Ok(ReconcileOutcome::AppGone);
        };

        let subject = ObjectReference::from_meta(Kind::App, &app.metadata);
        let mut summary = SyncSummary::default();
        let mut status = AppStatus::default();

        for dependent in desired_dependents(&app, &self.scheme)? {
            let present = self.converge(&subject, &dependent, &mut summary).await?;
            let name = present.then(|| dependent.name().to_string());
            match dependent.kind() {
                Kind::Deployment => status.deployment_name = name,
                Kind::Service => status.service_name = name,
                Kind::Ingress => status.ingress_name = name,
                Kind::App => {}
            }
        }

        summary.status_updated = self.write_status(&app, status).await?;

        self.record(&subject, EventType::Normal, REASON_SYNCED, MESSAGE_SYNCED)
            .await;
        info!(
            key = %key,
            created = summary.created.len(),
            updated = summary.updated.len(),
            deleted = summary.deleted.len(),
            status_updated = summary.status_updated,
            "Successfully synced"
        );
        Ok(ReconcileOutcome::Synced(summary))
    }

    fn cached_app(&self, key: &ObjectKey) -> Option<App> {
        match self.cache.get_by_key(Kind::App, key)? {
            Object::App(app) => Some(app),
            _ => None,
        }
    }

    /// Bring one dependent in line. Returns whether it exists, controlled by
    /// this App, once done.
    async fn converge(
        &self,
        subject: &ObjectReference,
        dependent: &DesiredDependent,
        summary: &mut SyncSummary,
    ) -> Result<bool> {
        match self.cache.get_by_key(dependent.kind(), &dependent.object.key()) {
            None if dependent.required => self.create(subject, dependent, summary).await,
            None => Ok(false),
            Some(existing) => {
                self.converge_existing(subject, dependent, existing, summary)
                    .await
            }
        }
    }

    /// Create a missing dependent. If the name is already taken the cache is
    /// behind the store: the live object is read and handled as if cached.
    async fn create(
        &self,
        subject: &ObjectReference,
        dependent: &DesiredDependent,
        summary: &mut SyncSummary,
    ) -> Result<bool> {
        let kind = dependent.kind();
        let key = dependent.object.key();

        match self.api.create(dependent.object.clone()).await {
            Ok(_) => {
                self.record(
                    subject,
                    EventType::Normal,
                    REASON_CREATED,
                    &format!("Created {kind} \"{}\"", key.name),
                )
                .await;
                summary.created.push(kind);
                Ok(true)
            }
            Err(e) if e.is_already_exists() => {
                debug!(kind = %kind, key = %key, "Cache behind store, reading live object");
                let live = self.api.get(kind, &key).await?;
                self.converge_existing(subject, dependent, live, summary)
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn converge_existing(
        &self,
        subject: &ObjectReference,
        dependent: &DesiredDependent,
        existing: Object,
        summary: &mut SyncSummary,
    ) -> Result<bool> {
        let kind = dependent.kind();
        let key = dependent.object.key();

        if !existing.meta().is_controlled_by(subject) {
            if dependent.required {
                let err = Error::conflict(kind, key.name.clone());
                self.record(
                    subject,
                    EventType::Warning,
                    REASON_RESOURCE_EXISTS,
                    &err.to_string(),
                )
                .await;
                return Err(err);
            }
            debug!(
                kind = %kind,
                key = %key,
                "Disabled dependent is not ours, leaving it alone"
            );
            return Ok(false);
        }

        if dependent.required {
            if let Some(updated) = with_desired_state(&existing, &dependent.object) {
                self.api.update(updated).await?;
                self.record(
                    subject,
                    EventType::Normal,
                    REASON_UPDATED,
                    &format!("Updated {kind} \"{}\"", key.name),
                )
                .await;
                summary.updated.push(kind);
            }
            return Ok(true);
        }

        match self.api.delete(kind, &key).await {
            Ok(()) => {
                self.record(
                    subject,
                    EventType::Normal,
                    REASON_DELETED,
                    &format!("Deleted {kind} \"{}\"", key.name),
                )
                .await;
                summary.deleted.push(kind);
            }
            Err(e) if e.is_not_found() => {
                debug!(kind = %kind, key = %key, "Already deleted");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(false)
    }

    /// Write `status` back if it differs from what the App carries.
    async fn write_status(&self, app: &App, status: AppStatus) -> Result<bool> {
        if app.status == status {
            return Ok(false);
        }

        let mut updated = app.clone();
        updated.status = status;
        self.api.update(Object::App(updated)).await?;
        Ok(true)
    }

    async fn record(
        &self,
        subject: &ObjectReference,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) {
        if let Err(e) = self
            .recorder
            .record(subject, event_type, reason, message)
            .await
        {
            warn!(reason, error = %e, "Failed to record event");
        }
    }
}

/// Copy spec and labels from `desired` onto `existing` if they differ.
///
/// The rest of the existing metadata (uid, resource version, owner
/// references) is kept, so the update is checked against the version the
/// decision was based on.
fn with_desired_state(existing: &Object, desired: &Object) -> Option<Object> {
    let mut updated = existing.clone();
    let changed = match (&mut updated, desired) {
        (Object::Deployment(e), Object::Deployment(d)) => {
            adopt(&mut e.metadata, &mut e.spec, &d.metadata, &d.spec)
        }
        (Object::Service(e), Object::Service(d)) => {
            adopt(&mut e.metadata, &mut e.spec, &d.metadata, &d.spec)
        }
        (Object::Ingress(e), Object::Ingress(d)) => {
            adopt(&mut e.metadata, &mut e.spec, &d.metadata, &d.spec)
        }
        _ => false,
    };
    changed.then_some(updated)
}

fn adopt<S: Clone + PartialEq>(
    meta: &mut ObjectMeta,
    spec: &mut S,
    desired_meta: &ObjectMeta,
    desired_spec: &S,
) -> bool {
    if *spec == *desired_spec && meta.labels == desired_meta.labels {
        return false;
    }
    spec.clone_from(desired_spec);
    meta.labels.clone_from(&desired_meta.labels);
    true
}
