//! Watch notifications emitted by the object store.

use app_core::{Kind, Object};

/// One change to a stored object, carrying the object's state after the
/// change (for `Deleted`, its last known state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(Object),
    Modified(Object),
    Deleted(Object),
}

impl WatchEvent {
    /// The object carried by this event.
    pub const fn object(&self) -> &Object {
        match self {
            Self::Added(o) | Self::Modified(o) | Self::Deleted(o) => o,
        }
    }

    /// Kind of the object carried by this event.
    pub const fn kind(&self) -> Kind {
        self.object().kind()
    }

    /// Event type name for logging.
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
        }
    }
}
