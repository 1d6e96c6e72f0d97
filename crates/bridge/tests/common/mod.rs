// Recording collaborators shared by the orchestrator integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use peer_bridge::{
    BridgeConfig, BridgeError, DeviceInfo, Event, EventStream, HandleId, LocationBackend,
    LocationListener, LocationStatus, OsVersion, PeerId, PeerSession, PeerSessionFactory,
    Platform, PowerState, RadioBackend, RadioListener, RadioScanner, RadioStatus, Result, Role,
    SessionListener, SessionSpec,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEVICE_NAME: &str = "Test Device";

/// Session factory that logs every collaborator call as `session-N:op`
#[derive(Default)]
pub struct FakeSessions {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub specs: Mutex<Vec<SessionSpec>>,
    pub listeners: Mutex<Vec<SessionListener>>,
    /// Handles that were started and not yet stopped
    pub active: Arc<Mutex<Vec<(HandleId, Role)>>>,
    pub fail_start: Arc<AtomicBool>,
}

impl FakeSessions {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn listener(&self, index: usize) -> SessionListener {
        self.listeners.lock().unwrap()[index].clone()
    }

    pub fn spec(&self, index: usize) -> SessionSpec {
        self.specs.lock().unwrap()[index].clone()
    }

    pub fn active(&self) -> Vec<(HandleId, Role)> {
        self.active.lock().unwrap().clone()
    }
}

impl PeerSessionFactory for FakeSessions {
    fn create_session(
        &self,
        spec: SessionSpec,
        listener: SessionListener,
    ) -> Result<Box<dyn PeerSession>> {
        self.specs.lock().unwrap().push(spec.clone());
        self.listeners.lock().unwrap().push(listener.clone());
        Ok(Box::new(FakeSession {
            handle: listener.handle_id(),
            role: spec.role,
            calls: Arc::clone(&self.calls),
            active: Arc::clone(&self.active),
            fail_start: Arc::clone(&self.fail_start),
        }))
    }

    fn platform_name(&self) -> &str {
        "Fake"
    }
}

#[derive(Debug)]
struct FakeSession {
    handle: HandleId,
    role: Role,
    calls: Arc<Mutex<Vec<String>>>,
    active: Arc<Mutex<Vec<(HandleId, Role)>>>,
    fail_start: Arc<AtomicBool>,
}

impl FakeSession {
    fn record(&self, op: String) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.handle, op));
    }
}

#[async_trait]
impl PeerSession for FakeSession {
    async fn start(&mut self) -> Result<()> {
        self.record("start".to_string());
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(BridgeError::Collaborator("radio busy".to_string()));
        }
        self.active.lock().unwrap().push((self.handle, self.role));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.record("stop".to_string());
        self.active.lock().unwrap().retain(|(id, _)| *id != self.handle);
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.record(format!("send:{}", bytes.len()));
        Ok(())
    }

    async fn invite(&mut self, peer_id: &PeerId) -> Result<()> {
        self.record(format!("invite:{}", peer_id));
        Ok(())
    }
}

/// Radio subsystem whose statuses and power reports are driven by the test
pub struct FakeRadio {
    pub status: Arc<Mutex<RadioStatus>>,
    pub legacy_status: Mutex<RadioStatus>,
    /// Status the OS settles on once a scan starts, pushed to the listener
    pub grant_on_scan: Mutex<Option<RadioStatus>>,
    pub listeners: Mutex<Vec<RadioListener>>,
    pub scanners_created: AtomicUsize,
    pub scans_started: Arc<AtomicUsize>,
    pub scans_stopped: Arc<AtomicUsize>,
    pub scanners_released: Arc<AtomicUsize>,
}

impl FakeRadio {
    pub fn new(status: RadioStatus) -> Self {
        Self {
            status: Arc::new(Mutex::new(status)),
            legacy_status: Mutex::new(RadioStatus::Unavailable),
            grant_on_scan: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            scanners_created: AtomicUsize::new(0),
            scans_started: Arc::new(AtomicUsize::new(0)),
            scans_stopped: Arc::new(AtomicUsize::new(0)),
            scanners_released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Change the status without telling anyone
    pub fn set_status(&self, status: RadioStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Report a power state through the most recent scanner's listener
    pub fn power(&self, state: PowerState) {
        let listener = self.listeners.lock().unwrap().last().cloned();
        if let Some(listener) = listener {
            listener.power_state_changed(state);
        }
    }

    pub fn created(&self) -> usize {
        self.scanners_created.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.scans_started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.scans_stopped.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.scanners_released.load(Ordering::SeqCst)
    }
}

impl RadioBackend for FakeRadio {
    fn authorization(&self) -> RadioStatus {
        *self.status.lock().unwrap()
    }

    fn legacy_authorization(&self) -> RadioStatus {
        *self.legacy_status.lock().unwrap()
    }

    fn create_scanner(&self, listener: RadioListener) -> Result<Box<dyn RadioScanner>> {
        self.scanners_created.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push(listener.clone());
        Ok(Box::new(FakeScanner {
            listener,
            status: Arc::clone(&self.status),
            grant: *self.grant_on_scan.lock().unwrap(),
            started: Arc::clone(&self.scans_started),
            stopped: Arc::clone(&self.scans_stopped),
            released: Arc::clone(&self.scanners_released),
        }))
    }
}

struct FakeScanner {
    listener: RadioListener,
    status: Arc<Mutex<RadioStatus>>,
    grant: Option<RadioStatus>,
    started: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl RadioScanner for FakeScanner {
    fn start_scan(&mut self) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(grant) = self.grant {
            *self.status.lock().unwrap() = grant;
            self.listener.authorization_changed(grant);
        }
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeScanner {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeLocation {
    pub status: Mutex<LocationStatus>,
    pub legacy_status: Mutex<LocationStatus>,
    pub requests: AtomicUsize,
    pub listeners: Mutex<Vec<LocationListener>>,
}

impl FakeLocation {
    pub fn new(status: LocationStatus) -> Self {
        Self {
            status: Mutex::new(status),
            legacy_status: Mutex::new(LocationStatus::Unavailable),
            requests: AtomicUsize::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn set_status(&self, status: LocationStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Change the status and push it to every registered listener, as the OS does
    pub fn push(&self, status: LocationStatus) {
        self.set_status(status);
        for listener in self.listeners.lock().unwrap().iter() {
            listener.authorization_changed(status);
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl LocationBackend for FakeLocation {
    fn authorization(&self) -> LocationStatus {
        *self.status.lock().unwrap()
    }

    fn legacy_authorization(&self) -> LocationStatus {
        *self.legacy_status.lock().unwrap()
    }

    fn request_when_in_use(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn register(&self, listener: LocationListener) {
        self.listeners.lock().unwrap().push(listener);
    }
}

pub struct FakeDevice {
    pub os_version: OsVersion,
}

impl DeviceInfo for FakeDevice {
    fn device_name(&self) -> String {
        DEVICE_NAME.to_string()
    }

    fn os_version(&self) -> OsVersion {
        self.os_version
    }
}

/// Handles onto every fake behind a platform
pub struct Fakes {
    pub sessions: Arc<FakeSessions>,
    pub radio: Arc<FakeRadio>,
    pub location: Arc<FakeLocation>,
}

pub fn platform_on(os_version: OsVersion) -> (Platform, Fakes) {
    let sessions = Arc::new(FakeSessions::default());
    let radio = Arc::new(FakeRadio::new(RadioStatus::NotDetermined));
    let location = Arc::new(FakeLocation::new(LocationStatus::NotDetermined));
    let platform = Platform {
        sessions: sessions.clone(),
        radio: radio.clone(),
        location: location.clone(),
        device: Arc::new(FakeDevice { os_version }),
    };
    (
        platform,
        Fakes {
            sessions,
            radio,
            location,
        },
    )
}

pub fn platform() -> (Platform, Fakes) {
    platform_on(OsVersion::new(17, 0))
}

pub fn config() -> BridgeConfig {
    BridgeConfig::default()
}

/// Next event, or `None` when nothing arrives within 100ms
pub async fn next_event(stream: &mut EventStream) -> Option<Event> {
    tokio::time::timeout(Duration::from_millis(100), stream.recv())
        .await
        .ok()
        .flatten()
}

/// Every event delivered until the stream has been quiet for 100ms
pub async fn drain(stream: &mut EventStream) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = next_event(stream).await {
        events.push(event);
    }
    events
}

pub fn permission_changes(events: &[Event]) -> Vec<Event> {
    events
        .iter()
        .filter(|e| matches!(e, Event::PermissionChanged(_)))
        .cloned()
        .collect()
}
