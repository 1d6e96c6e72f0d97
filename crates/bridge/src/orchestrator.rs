//! Capability & Session Orchestrator.
//!
//! All mutable state (the session slot, the transient slot, both permission
//! trackers, the radio probe and the timer arena) lives in a single task.
//! Commands, collaborator callbacks, OS pushes and expired timers are all
//! inputs to that task and are handled one at a time, in arrival order.

use crate::command::{Ack, Arguments, Command, StartOptions};
use crate::error::ErrorContext;
use crate::event::{Event, EventMultiplexer, EventStream, PermissionChange};
use crate::permissions::{
    LocationTracker, ProbePhase, QueryPath, RadioProbe, RadioTracker, LOCATION_QUERY_SINCE,
    RADIO_QUERY_SINCE,
};
use crate::platform::{LocationListener, Platform, RadioListener, SessionListener};
use crate::scheduler::{Scheduler, Timer, TimerOwner};
use crate::session::{HandleId, SessionHandle};
use crate::{
    bonjour_services, is_valid_service_type, BridgeError, Capability, LocationStatus, PeerId,
    PeerState, PermissionSnapshot, PowerState, RadioStatus, Result, Role, SessionSpec,
};
use shared::config::BridgeConfig;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Report from a session collaborator
#[derive(Debug)]
pub(crate) enum SessionSignal {
    PeerState { peer_id: PeerId, state: PeerState },
    Data { peer_id: PeerId, bytes: Vec<u8> },
}

/// Everything the orchestrator task reacts to
#[derive(Debug)]
pub(crate) enum Input {
    Command {
        command: Command,
        reply: oneshot::Sender<Result<Ack>>,
    },
    Subscribe {
        reply: oneshot::Sender<EventStream>,
    },
    Unsubscribe {
        reply: oneshot::Sender<bool>,
    },
    Session {
        handle: HandleId,
        signal: SessionSignal,
    },
    RadioPower {
        probe: u64,
        state: PowerState,
    },
    RadioAuthorization {
        status: RadioStatus,
    },
    LocationAuthorization {
        status: LocationStatus,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable front door to the orchestrator task
#[derive(Clone)]
pub struct Orchestrator {
    tx: mpsc::UnboundedSender<Input>,
}

impl Orchestrator {
    /// Build the orchestrator state and spawn its task on the current tokio runtime
    pub fn spawn(config: BridgeConfig, platform: Platform) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = OrchestratorState::new(config, platform, tx.downgrade());
        tokio::spawn(state.run(rx));
        Self { tx }
    }

    /// Handle one typed command. Resolves once the command has been applied;
    /// asynchronous consequences arrive later as events.
    pub async fn dispatch(&self, command: Command) -> Result<Ack> {
        self.request(|reply| Input::Command { command, reply }).await?
    }

    /// Parse and handle a `{verb, arguments}` request from the string transport
    pub async fn invoke(&self, verb: &str, args: &Arguments) -> Result<Ack> {
        let command = Command::parse(verb, args)?;
        self.dispatch(command).await
    }

    /// Attach the event subscriber, replacing any previous one. The returned
    /// stream starts with a permission snapshot.
    pub async fn subscribe(&self) -> Result<EventStream> {
        self.request(|reply| Input::Subscribe { reply }).await
    }

    /// Detach the event subscriber. Returns whether one was attached.
    pub async fn unsubscribe(&self) -> Result<bool> {
        self.request(|reply| Input::Unsubscribe { reply }).await
    }

    /// Stop every session, cancel every timer and end the task.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.tx.send(Input::Shutdown { reply }).is_ok() {
            let _ = done.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Input) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| BridgeError::OrchestratorClosed)?;
        response.await.map_err(|_| BridgeError::OrchestratorClosed)
    }
}

struct OrchestratorState {
    config: BridgeConfig,
    platform: Platform,
    /// Weak so that collaborator-held listeners never keep the task alive
    tx: mpsc::WeakUnboundedSender<Input>,
    session: Option<SessionHandle>,
    transient: Option<SessionHandle>,
    next_handle: u64,
    radio: RadioTracker,
    location: LocationTracker,
    probe: Option<RadioProbe>,
    next_probe: u64,
    scheduler: Scheduler,
    events: EventMultiplexer,
}

enum Step {
    Input(Option<Input>),
    Timer(Timer),
}

impl OrchestratorState {
    fn new(config: BridgeConfig, platform: Platform, tx: mpsc::WeakUnboundedSender<Input>) -> Self {
        let os = platform.device.os_version();
        let radio_query = QueryPath::select(os, RADIO_QUERY_SINCE);
        let location_query = QueryPath::select(os, LOCATION_QUERY_SINCE);
        info!(%os, ?radio_query, ?location_query, "Selected permission query paths");

        let radio = RadioTracker::new(
            Capability::Radio,
            radio_query.radio(platform.radio.as_ref()),
            radio_query,
        );
        let location = LocationTracker::new(
            Capability::Location,
            location_query.location(platform.location.as_ref()),
            location_query,
        );
        platform
            .location
            .register(LocationListener::new(tx.clone()));

        Self {
            config,
            platform,
            tx,
            session: None,
            transient: None,
            next_handle: 0,
            radio,
            location,
            probe: None,
            next_probe: 0,
            scheduler: Scheduler::new(),
            events: EventMultiplexer::new(),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        info!("Orchestrator started");
        loop {
            let step = tokio::select! {
                input = rx.recv() => Step::Input(input),
                Some(timer) = self.scheduler.next_expired() => Step::Timer(timer),
            };

            match step {
                Step::Input(Some(Input::Shutdown { reply })) => {
                    self.teardown().await;
                    let _ = reply.send(());
                    break;
                }
                Step::Input(Some(input)) => self.handle(input).await,
                Step::Input(None) => {
                    self.teardown().await;
                    break;
                }
                Step::Timer(timer) => self.on_timer(timer).await,
            }
        }
        info!(
            delivered = self.events.delivered(),
            dropped = self.events.dropped(),
            "Orchestrator stopped"
        );
    }

    async fn handle(&mut self, input: Input) {
        match input {
            Input::Command { command, reply } => {
                let verb = command.verb();
                debug!(verb, "Handling command");
                let result = self.execute(command).await;
                if reply.send(result).is_err() {
                    trace!(verb, "Caller went away before the acknowledgement");
                }
            }
            Input::Subscribe { reply } => {
                self.refresh_permissions();
                let snapshot = self.snapshot();
                let stream = self.events.attach(snapshot);
                info!(subscriber = stream.subscriber_id(), "Event subscriber attached");
                let _ = reply.send(stream);
            }
            Input::Unsubscribe { reply } => {
                let _ = reply.send(self.events.detach());
            }
            Input::Session { handle, signal } => self.on_session_signal(handle, signal),
            Input::RadioPower { probe, state } => self.on_radio_power(probe, state),
            Input::RadioAuthorization { status } => self.observe_radio(status),
            Input::LocationAuthorization { status } => self.observe_location(status),
            // Intercepted by the run loop
            Input::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn execute(&mut self, command: Command) -> Result<Ack> {
        match command {
            Command::StartAdvertising(options) => {
                self.start_primary(Role::Advertiser, options).await;
                Ok(Ack::Done)
            }
            Command::StartBrowsing(options) => {
                self.start_primary(Role::Browser, options).await;
                Ok(Ack::Done)
            }
            Command::Stop => {
                if !self.stop_primary().await {
                    debug!("Stop with no active session");
                }
                Ok(Ack::Done)
            }
            Command::SendData { bytes } => {
                match self.session.as_mut() {
                    Some(session) => {
                        if let Err(e) = session.send(&bytes).await {
                            e.log_with_context(
                                &ErrorContext::new()
                                    .with_session_id(session.id().get())
                                    .with_verb("sendData"),
                            );
                        }
                    }
                    None => debug!(len = bytes.len(), "sendData with no active session"),
                }
                Ok(Ack::Done)
            }
            Command::InvitePeer { peer_id } => {
                match self.session.as_mut() {
                    Some(session) => {
                        if let Err(e) = session.invite(&peer_id).await {
                            e.log_with_context(
                                &ErrorContext::new()
                                    .with_session_id(session.id().get())
                                    .with_peer_id(peer_id)
                                    .with_verb("invitePeer"),
                            );
                        }
                    }
                    None => debug!(%peer_id, "invitePeer with no active session"),
                }
                Ok(Ack::Done)
            }
            Command::RequestRadioPermission => {
                self.request_radio_prompt();
                Ok(Ack::Done)
            }
            Command::RequestLocationPermission => {
                info!("Requesting location authorization");
                self.platform.location.request_when_in_use();
                Ok(Ack::Done)
            }
            Command::TriggerTransientAdvertise => {
                self.start_transient().await;
                Ok(Ack::Done)
            }
            Command::GetPermissionSnapshot => {
                self.refresh_permissions();
                Ok(Ack::Snapshot(self.snapshot()))
            }
        }
    }

    fn device_name(&self) -> String {
        self.config
            .device_name
            .clone()
            .unwrap_or_else(|| self.platform.device.device_name())
    }

    fn resolve_service_type(&self, requested: Option<String>) -> String {
        match requested {
            Some(service) if is_valid_service_type(&service) => service,
            Some(service) => {
                warn!(
                    requested = %service,
                    fallback = %self.config.default_service_type,
                    "Invalid service type, using fallback"
                );
                self.config.default_service_type.clone()
            }
            None => self.config.default_service_type.clone(),
        }
    }

    fn open_session(&mut self, spec: SessionSpec) -> Result<SessionHandle> {
        self.next_handle += 1;
        let id = HandleId(self.next_handle);
        let listener = SessionListener::new(id, self.tx.clone());
        let collaborator = self
            .platform
            .sessions
            .create_session(spec.clone(), listener)?;
        Ok(SessionHandle::new(id, spec, collaborator))
    }

    async fn start_primary(&mut self, role: Role, options: StartOptions) {
        let spec = SessionSpec {
            role,
            display_name: options
                .display_name
                .unwrap_or_else(|| self.device_name()),
            service_type: self.resolve_service_type(options.service_type),
        };

        // Replace, never stack
        self.stop_primary().await;

        let mut handle = match self.open_session(spec) {
            Ok(handle) => handle,
            Err(e) => {
                e.log_with_context(
                    &ErrorContext::new()
                        .with_verb(role_verb(role))
                        .with_info("session creation failed"),
                );
                return;
            }
        };

        if let Err(e) = handle.start().await {
            e.log_with_context(
                &ErrorContext::new()
                    .with_session_id(handle.id().get())
                    .with_verb(role_verb(role)),
            );
        }
        self.session = Some(handle);
    }

    /// Stop and discard the primary session. Returns whether one was active.
    async fn stop_primary(&mut self) -> bool {
        let Some(handle) = self.session.take() else {
            return false;
        };
        self.discard(handle).await;
        true
    }

    async fn discard(&mut self, mut handle: SessionHandle) {
        let cancelled = self
            .scheduler
            .cancel_owned_by(TimerOwner::Handle(handle.id()));
        if cancelled > 0 {
            debug!(session = %handle.id(), cancelled, "Cancelled session timers");
        }
        if let Err(e) = handle.stop().await {
            e.log_with_context(
                &ErrorContext::new()
                    .with_session_id(handle.id().get())
                    .with_verb("stop"),
            );
        }
    }

    async fn start_transient(&mut self) {
        if let Some(previous) = self.transient.take() {
            debug!(session = %previous.id(), "Replacing transient session");
            self.discard(previous).await;
        }

        let spec = SessionSpec {
            role: Role::Transient,
            display_name: self.device_name(),
            service_type: self.config.default_service_type.clone(),
        };
        let mut handle = match self.open_session(spec) {
            Ok(handle) => handle,
            Err(e) => {
                e.log_with_context(
                    &ErrorContext::new()
                        .with_verb("triggerTransientAdvertise")
                        .with_info("session creation failed"),
                );
                return;
            }
        };

        if let Err(e) = handle.start().await {
            e.log_with_context(
                &ErrorContext::new()
                    .with_session_id(handle.id().get())
                    .with_verb("triggerTransientAdvertise"),
            );
        }
        self.scheduler.schedule(
            self.config.transient_advertise_duration,
            Timer::TransientStop {
                handle: handle.id(),
            },
        );
        self.transient = Some(handle);
    }

    fn on_session_signal(&mut self, handle: HandleId, signal: SessionSignal) {
        let live = self.session.as_ref().map(SessionHandle::id) == Some(handle);
        if !live {
            debug!(session = %handle, ?signal, "Dropping callback from inactive session");
            return;
        }

        let event = match signal {
            SessionSignal::PeerState { peer_id, state } => {
                info!(session = %handle, %peer_id, state = state.as_str(), "Peer state changed");
                Event::PeerStateChanged { peer_id, state }
            }
            SessionSignal::Data { peer_id, bytes } => {
                debug!(session = %handle, %peer_id, len = bytes.len(), "Data received");
                Event::DataReceived { peer_id, bytes }
            }
        };
        self.events.emit(event);
    }

    fn request_radio_prompt(&mut self) {
        // The guard can be released by a mid-scan grant; the live probe still blocks
        if self.radio.prompt_requested() || self.probe.is_some() {
            debug!(
                capability = %self.radio.capability(),
                probe = ?self.probe.as_ref().map(|p| p.id),
                "Radio prompt already outstanding"
            );
            return;
        }
        self.radio.mark_prompt_requested();

        self.next_probe += 1;
        let probe_id = self.next_probe;
        let listener = RadioListener::new(probe_id, self.tx.clone());
        match self.platform.radio.create_scanner(listener) {
            Ok(scanner) => {
                info!(probe = probe_id, "Radio probe armed");
                self.probe = Some(RadioProbe::new(probe_id, scanner));
                self.scheduler.schedule(
                    self.config.radio_probe_timeout,
                    Timer::RadioWatchdog { probe: probe_id },
                );
            }
            Err(e) => {
                e.log_with_context(
                    &ErrorContext::new()
                        .with_verb("requestRadioPermission")
                        .with_info("scan controller creation failed"),
                );
                self.radio.clear_prompt();
            }
        }
    }

    fn on_radio_power(&mut self, probe: u64, state: PowerState) {
        let status = self.radio.query_path().radio(self.platform.radio.as_ref());
        self.observe_radio(status);

        let scan_window = self.config.radio_scan_window;
        let teardown_delay = self.config.radio_teardown_delay;
        let Some(current) = self.probe.as_mut().filter(|p| p.id == probe) else {
            debug!(probe, ?state, "Power update from released probe");
            return;
        };

        match (current.phase, state) {
            (ProbePhase::AwaitingPower, PowerState::PoweredOn) => {
                match current.scanner.start_scan() {
                    Ok(()) => {
                        info!(probe, "Radio powered on, scanning");
                        current.phase = ProbePhase::Scanning;
                        self.scheduler
                            .schedule(scan_window, Timer::RadioScanStop { probe });
                    }
                    Err(e) => {
                        warn!(probe, error = %e, "Radio scan failed to start");
                        current.phase = ProbePhase::TearingDown;
                        self.scheduler
                            .schedule(teardown_delay, Timer::RadioTeardown { probe });
                    }
                }
            }
            (ProbePhase::AwaitingPower, state) if state.is_dead_end() => {
                info!(probe, ?state, "Radio cannot scan, tearing probe down");
                current.phase = ProbePhase::TearingDown;
                self.scheduler
                    .schedule(teardown_delay, Timer::RadioTeardown { probe });
            }
            (phase, state) => trace!(probe, ?phase, ?state, "Ignoring power update"),
        }
    }

    async fn on_timer(&mut self, timer: Timer) {
        debug!(?timer, "Timer fired");
        match timer {
            Timer::RadioScanStop { probe } => {
                let teardown_delay = self.config.radio_teardown_delay;
                if let Some(current) = self.probe.as_mut().filter(|p| p.id == probe) {
                    current.scanner.stop_scan();
                    current.phase = ProbePhase::TearingDown;
                    self.scheduler
                        .schedule(teardown_delay, Timer::RadioTeardown { probe });
                }
            }
            Timer::RadioTeardown { probe } | Timer::RadioWatchdog { probe } => {
                if self.probe.as_ref().map(|p| p.id) != Some(probe) {
                    return;
                }
                if let Some(current) = self.probe.take() {
                    if matches!(timer, Timer::RadioWatchdog { .. }) {
                        warn!(probe, phase = ?current.phase, "Radio probe timed out");
                    }
                    self.release_probe(current);
                }
                self.radio.clear_prompt();

                let status = self.radio.query_path().radio(self.platform.radio.as_ref());
                self.observe_radio(status);
            }
            Timer::TransientStop { handle } => {
                if self.transient.as_ref().map(SessionHandle::id) == Some(handle) {
                    if let Some(transient) = self.transient.take() {
                        self.discard(transient).await;
                    }
                }
            }
        }
    }

    fn release_probe(&mut self, mut probe: RadioProbe) {
        self.scheduler.cancel_owned_by(TimerOwner::Probe(probe.id));
        if probe.phase == ProbePhase::Scanning {
            probe.scanner.stop_scan();
        }
        debug!(probe = probe.id, "Radio probe released");
    }

    fn observe_radio(&mut self, status: RadioStatus) {
        if self.radio.observe(status) {
            self.publish(PermissionChange::Radio(status));
        }
    }

    fn observe_location(&mut self, status: LocationStatus) {
        if self.location.observe(status) {
            self.publish(PermissionChange::Location(status));
        }
    }

    fn publish(&mut self, change: PermissionChange) {
        let delivered = self.events.emit(Event::PermissionChanged(change));
        debug!(
            capability = %change.capability(),
            status = change.status_str(),
            delivered,
            "Permission change published"
        );
    }

    /// Re-read both OS statuses so pull and push paths never diverge
    fn refresh_permissions(&mut self) {
        let radio = self.radio.query_path().radio(self.platform.radio.as_ref());
        self.observe_radio(radio);
        let location = self
            .location
            .query_path()
            .location(self.platform.location.as_ref());
        self.observe_location(location);
    }

    fn snapshot(&self) -> PermissionSnapshot {
        let service = self
            .session
            .as_ref()
            .map(|s| s.spec().service_type.as_str())
            .unwrap_or(&self.config.default_service_type);
        PermissionSnapshot {
            bluetooth: self.radio.status(),
            location: self.location.status(),
            bonjour: bonjour_services(service),
        }
    }

    async fn teardown(&mut self) {
        info!("Tearing down orchestrator");
        self.stop_primary().await;
        if let Some(transient) = self.transient.take() {
            self.discard(transient).await;
        }
        if let Some(probe) = self.probe.take() {
            self.release_probe(probe);
        }
        self.radio.clear_prompt();
        self.scheduler.cancel_all();
        self.events.detach();
    }
}

fn role_verb(role: Role) -> &'static str {
    match role {
        Role::Advertiser => "startAdvertising",
        Role::Browser => "startBrowsing",
        Role::Transient => "triggerTransientAdvertise",
    }
}
