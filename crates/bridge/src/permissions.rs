// Permission state tracking for the radio and location capabilities
// Each tracker mirrors one OS authorization subsystem and guards its prompt

use crate::platform::{LocationBackend, RadioBackend, RadioScanner};
use crate::{AuthorizationStatus, Capability, LocationStatus, OsVersion, RadioStatus};
use tracing::{debug, info};

/// First OS version exposing the current radio authorization query
pub const RADIO_QUERY_SINCE: OsVersion = OsVersion::new(13, 1);

/// First OS version exposing the current location authorization query
pub const LOCATION_QUERY_SINCE: OsVersion = OsVersion::new(14, 0);

/// Which OS query a tracker reads status through, chosen once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPath {
    Current,
    Legacy,
}

impl QueryPath {
    pub fn select(os: OsVersion, current_since: OsVersion) -> Self {
        if os >= current_since {
            QueryPath::Current
        } else {
            QueryPath::Legacy
        }
    }

    pub fn radio(&self, backend: &dyn RadioBackend) -> RadioStatus {
        match self {
            QueryPath::Current => backend.authorization(),
            QueryPath::Legacy => backend.legacy_authorization(),
        }
    }

    pub fn location(&self, backend: &dyn LocationBackend) -> LocationStatus {
        match self {
            QueryPath::Current => backend.authorization(),
            QueryPath::Legacy => backend.legacy_authorization(),
        }
    }
}

/// Last-known status of one capability plus its prompt guard
#[derive(Debug, Clone)]
pub struct PermissionTracker<S> {
    capability: Capability,
    last_known: S,
    query: QueryPath,
    prompt_requested: bool,
}

impl<S: AuthorizationStatus> PermissionTracker<S> {
    pub fn new(capability: Capability, initial: S, query: QueryPath) -> Self {
        debug!(%capability, ?initial, ?query, "Permission tracker created");
        Self {
            capability,
            last_known: initial,
            query,
            prompt_requested: false,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn status(&self) -> S {
        self.last_known
    }

    pub fn query_path(&self) -> QueryPath {
        self.query
    }

    /// Record a status reported by the OS. Returns `true` when it differs
    /// from the last-known value. Changing to a determined status releases
    /// the prompt guard; re-reading an unchanged status never does.
    pub fn observe(&mut self, status: S) -> bool {
        if status == self.last_known {
            return false;
        }

        info!(
            capability = %self.capability,
            from = self.last_known.as_str(),
            to = status.as_str(),
            "Permission status changed"
        );
        self.last_known = status;

        if status.is_determined() && self.prompt_requested {
            debug!(capability = %self.capability, "Status determined, releasing prompt guard");
            self.prompt_requested = false;
        }
        true
    }

    pub fn prompt_requested(&self) -> bool {
        self.prompt_requested
    }

    pub fn mark_prompt_requested(&mut self) {
        self.prompt_requested = true;
    }

    pub fn clear_prompt(&mut self) {
        self.prompt_requested = false;
    }
}

pub type RadioTracker = PermissionTracker<RadioStatus>;
pub type LocationTracker = PermissionTracker<LocationStatus>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbePhase {
    AwaitingPower,
    Scanning,
    TearingDown,
}

/// The transient scan controller of one radio prompt provocation
pub(crate) struct RadioProbe {
    pub id: u64,
    pub phase: ProbePhase,
    pub scanner: Box<dyn RadioScanner>,
}

impl RadioProbe {
    pub fn new(id: u64, scanner: Box<dyn RadioScanner>) -> Self {
        Self {
            id,
            phase: ProbePhase::AwaitingPower,
            scanner,
        }
    }
}
