use serde::{Deserialize, Serialize};

pub use shared::config::is_valid_service_type;

/// Identifier of a remote peer, as reported by the session collaborator
pub type PeerId = String;

/// Discovery role of a session handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Advertiser,
    Browser,
    /// Short-lived advertiser used only to provoke the local network prompt
    Transient,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Advertiser => write!(f, "advertiser"),
            Role::Browser => write!(f, "browser"),
            Role::Transient => write!(f, "transient"),
        }
    }
}

/// Connection state of a remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeerState {
    /// Browser saw the peer advertising
    Found,
    /// Browser lost sight of the peer
    Lost,
    Connecting,
    Connected,
    NotConnected,
}

impl PeerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerState::Found => "found",
            PeerState::Lost => "lost",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::NotConnected => "notConnected",
        }
    }
}

/// Gated capability tracked by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Radio,
    Location,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Radio => write!(f, "radio"),
            Capability::Location => write!(f, "location"),
        }
    }
}

/// Common surface of the capability-native status enums
pub trait AuthorizationStatus: Copy + Eq + std::fmt::Debug + Send + 'static {
    /// Stable wire string, identical on every OS version
    fn as_str(&self) -> &'static str;

    /// Whether the user (or policy) has already answered the prompt
    fn is_determined(&self) -> bool;
}

/// Short-range radio authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RadioStatus {
    NotDetermined,
    Restricted,
    Denied,
    AllowedAlways,
    /// The OS exposes no authorization query for the radio
    Unavailable,
}

impl AuthorizationStatus for RadioStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RadioStatus::NotDetermined => "notDetermined",
            RadioStatus::Restricted => "restricted",
            RadioStatus::Denied => "denied",
            RadioStatus::AllowedAlways => "allowedAlways",
            RadioStatus::Unavailable => "unavailable",
        }
    }

    fn is_determined(&self) -> bool {
        !matches!(self, RadioStatus::NotDetermined)
    }
}

/// Location authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedAlways,
    AuthorizedWhenInUse,
    Unavailable,
}

impl AuthorizationStatus for LocationStatus {
    fn as_str(&self) -> &'static str {
        match self {
            LocationStatus::NotDetermined => "notDetermined",
            LocationStatus::Restricted => "restricted",
            LocationStatus::Denied => "denied",
            LocationStatus::AuthorizedAlways => "authorizedAlways",
            LocationStatus::AuthorizedWhenInUse => "authorizedWhenInUse",
            LocationStatus::Unavailable => "unavailable",
        }
    }

    fn is_determined(&self) -> bool {
        !matches!(self, LocationStatus::NotDetermined)
    }
}

/// Power state reported by a transient radio-scan controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl PowerState {
    /// States after which the controller will never reach `PoweredOn` on its own
    pub fn is_dead_end(&self) -> bool {
        matches!(
            self,
            PowerState::Unsupported | PowerState::Unauthorized | PowerState::PoweredOff
        )
    }
}

/// Major/minor OS version, used once at startup to pick status query paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
}

impl OsVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for OsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Parameters a session collaborator is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    pub role: Role,
    pub display_name: String,
    pub service_type: String,
}

/// Current permission and service-advertisement state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionSnapshot {
    pub bluetooth: RadioStatus,
    pub location: LocationStatus,
    pub bonjour: Vec<String>,
}

/// DNS-SD service types implied by a session service identifier
pub fn bonjour_services(service_type: &str) -> Vec<String> {
    vec![
        format!("_{}._tcp", service_type),
        format!("_{}._udp", service_type),
    ]
}
