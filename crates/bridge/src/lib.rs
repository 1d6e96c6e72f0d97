pub mod types;
pub mod command;
pub mod event;
pub mod error;
pub mod permissions;
pub mod session;
pub mod scheduler;
pub mod platform;
pub mod orchestrator;

pub use types::*;
pub use error::{BridgeError, Result, ErrorContext, ErrorCategory};
pub use command::{Ack, ArgValue, Arguments, Command, StartOptions};
pub use event::{Event, EventStream, PermissionChange};
pub use permissions::{PermissionTracker, QueryPath};
pub use session::{HandleId, SessionHandle};
pub use platform::{
    loopback_platform, DeviceInfo, LocationBackend, LocationListener, PeerSession,
    PeerSessionFactory, Platform, RadioBackend, RadioListener, RadioScanner, SessionListener,
};
pub use orchestrator::Orchestrator;
pub use shared::config::BridgeConfig;
