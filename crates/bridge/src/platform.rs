// Platform abstraction layer for the bridge
// Collaborator traits the orchestrator drives, the listener handles they
// report back through, and an in-process loopback implementation

use crate::orchestrator::{Input, SessionSignal};
use crate::session::HandleId;
use crate::{
    BridgeError, LocationStatus, OsVersion, PeerId, PeerState, PowerState, RadioStatus, Result,
    SessionSpec,
};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::mpsc::WeakUnboundedSender;

/// One peer-connectivity session (advertiser or browser) owned by a handle
#[async_trait]
pub trait PeerSession: Send + Sync + Debug {
    /// Begin advertising or browsing, depending on the role it was created with
    async fn start(&mut self) -> Result<()>;

    /// Stop discovery and disconnect; safe to call more than once
    async fn stop(&mut self) -> Result<()>;

    /// Send bytes to every connected peer; a no-op when none are connected
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Invite a discovered peer into the session
    async fn invite(&mut self, peer_id: &PeerId) -> Result<()>;
}

/// Creates session collaborators
pub trait PeerSessionFactory: Send + Sync {
    fn create_session(
        &self,
        spec: SessionSpec,
        listener: SessionListener,
    ) -> Result<Box<dyn PeerSession>>;

    fn platform_name(&self) -> &str;
}

/// Transient radio-scan controller. Dropping it tears the controller down.
pub trait RadioScanner: Send {
    /// Start a filterless scan
    fn start_scan(&mut self) -> Result<()>;

    fn stop_scan(&mut self);
}

/// OS radio authorization subsystem
pub trait RadioBackend: Send + Sync {
    /// Authorization query available on current OS versions
    fn authorization(&self) -> RadioStatus;

    /// Fallback query for OS versions that predate `authorization`
    fn legacy_authorization(&self) -> RadioStatus {
        RadioStatus::Unavailable
    }

    /// Create a scan controller; it reports power and authorization
    /// changes through `listener`
    fn create_scanner(&self, listener: RadioListener) -> Result<Box<dyn RadioScanner>>;
}

/// OS location authorization subsystem
pub trait LocationBackend: Send + Sync {
    fn authorization(&self) -> LocationStatus;

    fn legacy_authorization(&self) -> LocationStatus {
        LocationStatus::Unavailable
    }

    /// Show the when-in-use prompt; the OS ignores it once a status is determined
    fn request_when_in_use(&self);

    /// Register the listener the OS pushes every authorization change to
    fn register(&self, listener: LocationListener);
}

pub trait DeviceInfo: Send + Sync {
    /// Human-readable device name, used as the default display name
    fn device_name(&self) -> String;

    fn os_version(&self) -> OsVersion;
}

/// Every collaborator the orchestrator is constructed with
#[derive(Clone)]
pub struct Platform {
    pub sessions: Arc<dyn PeerSessionFactory>,
    pub radio: Arc<dyn RadioBackend>,
    pub location: Arc<dyn LocationBackend>,
    pub device: Arc<dyn DeviceInfo>,
}

/// Callback handle given to one session collaborator. Every report is
/// tagged with the owning handle so callbacks from discarded handles
/// can be told apart and dropped.
#[derive(Debug, Clone)]
pub struct SessionListener {
    handle: HandleId,
    tx: WeakUnboundedSender<Input>,
}

impl SessionListener {
    pub(crate) fn new(handle: HandleId, tx: WeakUnboundedSender<Input>) -> Self {
        Self { handle, tx }
    }

    pub fn handle_id(&self) -> HandleId {
        self.handle
    }

    pub fn peer_state_changed(&self, peer_id: impl Into<PeerId>, state: PeerState) {
        self.signal(SessionSignal::PeerState {
            peer_id: peer_id.into(),
            state,
        });
    }

    pub fn data_received(&self, peer_id: impl Into<PeerId>, bytes: Vec<u8>) {
        self.signal(SessionSignal::Data {
            peer_id: peer_id.into(),
            bytes,
        });
    }

    fn signal(&self, signal: SessionSignal) {
        deliver(
            &self.tx,
            Input::Session {
                handle: self.handle,
                signal,
            },
        );
    }
}

/// Orchestrator gone: nobody left to tell
fn deliver(tx: &WeakUnboundedSender<Input>, input: Input) {
    if let Some(tx) = tx.upgrade() {
        let _ = tx.send(input);
    }
}

/// Callback handle given to one radio-scan controller
#[derive(Debug, Clone)]
pub struct RadioListener {
    probe: u64,
    tx: WeakUnboundedSender<Input>,
}

impl RadioListener {
    pub(crate) fn new(probe: u64, tx: WeakUnboundedSender<Input>) -> Self {
        Self { probe, tx }
    }

    pub fn power_state_changed(&self, state: PowerState) {
        deliver(
            &self.tx,
            Input::RadioPower {
                probe: self.probe,
                state,
            },
        );
    }

    pub fn authorization_changed(&self, status: RadioStatus) {
        deliver(&self.tx, Input::RadioAuthorization { status });
    }
}

/// Callback handle registered with the location subsystem
#[derive(Debug, Clone)]
pub struct LocationListener {
    tx: WeakUnboundedSender<Input>,
}

impl LocationListener {
    pub(crate) fn new(tx: WeakUnboundedSender<Input>) -> Self {
        Self { tx }
    }

    pub fn authorization_changed(&self, status: LocationStatus) {
        deliver(&self.tx, Input::LocationAuthorization { status });
    }
}

/// In-process collaborators that behave like a cooperative OS and a
/// single echoing peer. Used by the host binary when no radio stack is wired in.
pub mod loopback {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::{Mutex, RwLock};
    use tracing::{debug, info};

    /// Name of the synthetic peer a loopback browser discovers
    pub const LOOPBACK_PEER: &str = "loopback-peer";

    #[derive(Debug)]
    pub struct LoopbackSession {
        spec: SessionSpec,
        listener: SessionListener,
        connected: BTreeSet<PeerId>,
        running: bool,
    }

    impl LoopbackSession {
        pub fn new(spec: SessionSpec, listener: SessionListener) -> Self {
            Self {
                spec,
                listener,
                connected: BTreeSet::new(),
                running: false,
            }
        }
    }

    #[async_trait]
    impl PeerSession for LoopbackSession {
        async fn start(&mut self) -> Result<()> {
            info!(
                role = %self.spec.role,
                display_name = %self.spec.display_name,
                service_type = %self.spec.service_type,
                "Loopback session started"
            );
            self.running = true;
            if self.spec.role == crate::Role::Browser {
                self.listener
                    .peer_state_changed(LOOPBACK_PEER, PeerState::Found);
            }
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            if !self.running {
                return Ok(());
            }
            self.running = false;
            for peer in std::mem::take(&mut self.connected) {
                self.listener
                    .peer_state_changed(peer, PeerState::NotConnected);
            }
            debug!("Loopback session stopped");
            Ok(())
        }

        async fn send(&mut self, bytes: &[u8]) -> Result<()> {
            // Each connected peer echoes the payload back
            for peer in &self.connected {
                self.listener.data_received(peer.clone(), bytes.to_vec());
            }
            Ok(())
        }

        async fn invite(&mut self, peer_id: &PeerId) -> Result<()> {
            if !self.running || self.connected.contains(peer_id) {
                return Ok(());
            }
            self.listener
                .peer_state_changed(peer_id.clone(), PeerState::Connecting);
            self.connected.insert(peer_id.clone());
            self.listener
                .peer_state_changed(peer_id.clone(), PeerState::Connected);
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    pub struct LoopbackSessionFactory;

    impl LoopbackSessionFactory {
        pub fn new() -> Self {
            Self
        }
    }

    impl PeerSessionFactory for LoopbackSessionFactory {
        fn create_session(
            &self,
            spec: SessionSpec,
            listener: SessionListener,
        ) -> Result<Box<dyn PeerSession>> {
            Ok(Box::new(LoopbackSession::new(spec, listener)))
        }

        fn platform_name(&self) -> &str {
            "Loopback"
        }
    }

    /// Radio that grants access the first time a scan starts
    #[derive(Debug)]
    pub struct LoopbackRadio {
        status: Arc<RwLock<RadioStatus>>,
    }

    impl LoopbackRadio {
        pub fn new() -> Self {
            Self {
                status: Arc::new(RwLock::new(RadioStatus::NotDetermined)),
            }
        }
    }

    impl Default for LoopbackRadio {
        fn default() -> Self {
            Self::new()
        }
    }

    impl RadioBackend for LoopbackRadio {
        fn authorization(&self) -> RadioStatus {
            *self.status.read().unwrap_or_else(|e| e.into_inner())
        }

        fn create_scanner(&self, listener: RadioListener) -> Result<Box<dyn RadioScanner>> {
            listener.power_state_changed(PowerState::PoweredOn);
            Ok(Box::new(LoopbackScanner {
                status: Arc::clone(&self.status),
                listener,
                scanning: false,
            }))
        }
    }

    struct LoopbackScanner {
        status: Arc<RwLock<RadioStatus>>,
        listener: RadioListener,
        scanning: bool,
    }

    impl RadioScanner for LoopbackScanner {
        fn start_scan(&mut self) -> Result<()> {
            if self.scanning {
                return Err(BridgeError::Radio("scan already running".to_string()));
            }
            self.scanning = true;
            let mut status = self.status.write().unwrap_or_else(|e| e.into_inner());
            if *status == RadioStatus::NotDetermined {
                *status = RadioStatus::AllowedAlways;
                self.listener.authorization_changed(*status);
            }
            Ok(())
        }

        fn stop_scan(&mut self) {
            self.scanning = false;
        }
    }

    /// Location subsystem that grants when-in-use access on request
    #[derive(Default)]
    pub struct LoopbackLocation {
        status: RwLock<Option<LocationStatus>>,
        listeners: Mutex<Vec<LocationListener>>,
    }

    impl LoopbackLocation {
        pub fn new() -> Self {
            Self::default()
        }

        fn current(&self) -> LocationStatus {
            self.status
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .unwrap_or(LocationStatus::NotDetermined)
        }
    }

    impl LocationBackend for LoopbackLocation {
        fn authorization(&self) -> LocationStatus {
            self.current()
        }

        fn request_when_in_use(&self) {
            if self.current() != LocationStatus::NotDetermined {
                return;
            }
            *self.status.write().unwrap_or_else(|e| e.into_inner()) =
                Some(LocationStatus::AuthorizedWhenInUse);
            for listener in self.listeners.lock().unwrap_or_else(|e| e.into_inner()).iter() {
                listener.authorization_changed(LocationStatus::AuthorizedWhenInUse);
            }
        }

        fn register(&self, listener: LocationListener) {
            self.listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(listener);
        }
    }

    #[derive(Debug, Clone)]
    pub struct LoopbackDevice {
        name: String,
        os_version: OsVersion,
    }

    impl LoopbackDevice {
        pub fn new(name: impl Into<String>, os_version: OsVersion) -> Self {
            Self {
                name: name.into(),
                os_version,
            }
        }
    }

    impl DeviceInfo for LoopbackDevice {
        fn device_name(&self) -> String {
            self.name.clone()
        }

        fn os_version(&self) -> OsVersion {
            self.os_version
        }
    }
}

/// Loopback collaborators for every capability
pub fn loopback_platform(device_name: impl Into<String>, os_version: OsVersion) -> Platform {
    Platform {
        sessions: Arc::new(loopback::LoopbackSessionFactory::new()),
        radio: Arc::new(loopback::LoopbackRadio::new()),
        location: Arc::new(loopback::LoopbackLocation::new()),
        device: Arc::new(loopback::LoopbackDevice::new(device_name, os_version)),
    }
}
