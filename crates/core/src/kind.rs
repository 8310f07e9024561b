//! The closed set of kinds the controller watches.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Watched kinds. `App` is the primary; the rest are its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    App,
    Deployment,
    Service,
    Ingress,
}

impl Kind {
    /// Every watched kind, primary first.
    pub const ALL: [Self; 4] = [Self::App, Self::Deployment, Self::Service, Self::Ingress];

    /// Dependent kinds in reconcile order.
    pub const DEPENDENTS: [Self; 3] = [Self::Deployment, Self::Service, Self::Ingress];

    /// Wire name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::App => "App",
            Self::Deployment => "Deployment",
            Self::Service => "Service",
            Self::Ingress => "Ingress",
        }
    }

    /// Whether this is the primary kind.
    pub const fn is_primary(self) -> bool {
        matches!(self, Self::App)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::unknown_kind(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in Kind::ALL {
            assert_eq!(kind.as_str().parse::<Kind>(), Ok(kind));
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(matches!(
            "ConfigMap".parse::<Kind>(),
            Err(Error::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_only_app_is_primary() {
        assert!(Kind::App.is_primary());
        assert!(Kind::DEPENDENTS.iter().all(|k| !k.is_primary()));
    }
}
