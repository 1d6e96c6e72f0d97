//! Subscriber-facing events and the single-subscriber multiplexer.

use crate::{
    AuthorizationStatus, Capability, LocationStatus, PeerId, PeerState, PermissionSnapshot,
    RadioStatus,
};
use serde::{Serialize, Serializer};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A permission status transition observed by one of the trackers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionChange {
    Radio(RadioStatus),
    Location(LocationStatus),
}

impl PermissionChange {
    pub fn capability(&self) -> Capability {
        match self {
            PermissionChange::Radio(_) => Capability::Radio,
            PermissionChange::Location(_) => Capability::Location,
        }
    }

    pub fn status_str(&self) -> &'static str {
        match self {
            PermissionChange::Radio(status) => status.as_str(),
            PermissionChange::Location(status) => status.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PeerStateChanged { peer_id: PeerId, state: PeerState },
    DataReceived { peer_id: PeerId, bytes: Vec<u8> },
    PermissionChanged(PermissionChange),
    PermissionSnapshot(PermissionSnapshot),
}

impl Event {
    /// Wire name of the event record
    pub fn name(&self) -> &'static str {
        match self {
            Event::PeerStateChanged { .. } => "peerStateChanged",
            Event::DataReceived { .. } => "dataReceived",
            Event::PermissionChanged(PermissionChange::Radio(_)) => "nativeBluetoothChanged",
            Event::PermissionChanged(PermissionChange::Location(_)) => "nativeLocationChanged",
            Event::PermissionSnapshot(_) => "nativeSnapshot",
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "event")]
enum WireEvent<'a> {
    #[serde(rename = "peerStateChanged")]
    PeerStateChanged {
        #[serde(rename = "peerId")]
        peer_id: &'a str,
        state: PeerState,
    },
    #[serde(rename = "dataReceived")]
    DataReceived {
        #[serde(rename = "peerId")]
        peer_id: &'a str,
        bytes: &'a [u8],
    },
    #[serde(rename = "nativeBluetoothChanged")]
    BluetoothChanged { status: RadioStatus },
    #[serde(rename = "nativeLocationChanged")]
    LocationChanged { status: LocationStatus },
    #[serde(rename = "nativeSnapshot")]
    Snapshot {
        bluetooth: RadioStatus,
        location: LocationStatus,
        bonjour: &'a [String],
    },
}

impl<'a> From<&'a Event> for WireEvent<'a> {
    fn from(event: &'a Event) -> Self {
        match event {
            Event::PeerStateChanged { peer_id, state } => WireEvent::PeerStateChanged {
                peer_id,
                state: *state,
            },
            Event::DataReceived { peer_id, bytes } => WireEvent::DataReceived { peer_id, bytes },
            Event::PermissionChanged(PermissionChange::Radio(status)) => {
                WireEvent::BluetoothChanged { status: *status }
            }
            Event::PermissionChanged(PermissionChange::Location(status)) => {
                WireEvent::LocationChanged { status: *status }
            }
            Event::PermissionSnapshot(snapshot) => WireEvent::Snapshot {
                bluetooth: snapshot.bluetooth,
                location: snapshot.location,
                bonjour: &snapshot.bonjour,
            },
        }
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        WireEvent::from(self).serialize(serializer)
    }
}

/// Receiving end handed to the subscriber.
///
/// The stream ends (`recv` returns `None`) once the subscriber is detached,
/// replaced by a newer subscriber, or the orchestrator shuts down.
#[derive(Debug)]
pub struct EventStream {
    subscriber_id: u64,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    pub fn subscriber_id(&self) -> u64 {
        self.subscriber_id
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Next already-delivered event, without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Event>,
}

/// Fan-in point for every event source. At most one subscriber; events
/// raised while nobody is attached are dropped.
#[derive(Default)]
pub(crate) struct EventMultiplexer {
    subscriber: Option<Subscriber>,
    next_subscriber_id: u64,
    delivered: u64,
    dropped: u64,
}

impl EventMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new subscriber, replacing any previous one. The snapshot is
    /// queued before the stream is returned so it is always the first event.
    pub fn attach(&mut self, snapshot: PermissionSnapshot) -> EventStream {
        self.next_subscriber_id += 1;
        let id = self.next_subscriber_id;
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(previous) = self.subscriber.take() {
            debug!(previous = previous.id, next = id, "Replacing event subscriber");
        }

        // The receiver is alive, so this send cannot fail
        let _ = tx.send(Event::PermissionSnapshot(snapshot));
        self.delivered += 1;
        self.subscriber = Some(Subscriber { id, tx });

        EventStream {
            subscriber_id: id,
            rx,
        }
    }

    /// Drop the current subscriber. Returns whether one was attached.
    pub fn detach(&mut self) -> bool {
        match self.subscriber.take() {
            Some(subscriber) => {
                debug!(subscriber = subscriber.id, "Event subscriber detached");
                true
            }
            None => false,
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber.is_some()
    }

    /// Deliver one event. Returns whether it reached a subscriber.
    pub fn emit(&mut self, event: Event) -> bool {
        let Some(subscriber) = &self.subscriber else {
            trace!(event = event.name(), "No subscriber, dropping event");
            self.dropped += 1;
            return false;
        };

        if subscriber.tx.send(event).is_err() {
            debug!(subscriber = subscriber.id, "Subscriber stream closed, detaching");
            self.subscriber = None;
            self.dropped += 1;
            return false;
        }

        self.delivered += 1;
        true
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> PermissionSnapshot {
        PermissionSnapshot {
            bluetooth: RadioStatus::NotDetermined,
            location: LocationStatus::Denied,
            bonjour: vec!["_mpconn._tcp".to_string(), "_mpconn._udp".to_string()],
        }
    }

    #[test]
    fn test_events_dropped_without_subscriber() {
        let mut mux = EventMultiplexer::new();
        assert!(!mux.emit(Event::PermissionChanged(PermissionChange::Radio(
            RadioStatus::Denied
        ))));
        assert_eq!(mux.dropped(), 1);
        assert_eq!(mux.delivered(), 0);
    }

    #[test]
    fn test_attach_delivers_snapshot_first() {
        let mut mux = EventMultiplexer::new();
        let mut stream = mux.attach(snapshot());
        mux.emit(Event::PeerStateChanged {
            peer_id: "p1".to_string(),
            state: PeerState::Connected,
        });

        assert_eq!(stream.try_recv(), Some(Event::PermissionSnapshot(snapshot())));
        assert!(matches!(
            stream.try_recv(),
            Some(Event::PeerStateChanged { .. })
        ));
        assert_eq!(stream.try_recv(), None);
    }

    #[test]
    fn test_replacing_subscriber_closes_previous_stream() {
        let mut mux = EventMultiplexer::new();
        let mut first = mux.attach(snapshot());
        let mut second = mux.attach(snapshot());
        assert_ne!(first.subscriber_id(), second.subscriber_id());

        mux.emit(Event::DataReceived {
            peer_id: "p1".to_string(),
            bytes: vec![9],
        });

        assert!(matches!(first.try_recv(), Some(Event::PermissionSnapshot(_))));
        assert_eq!(first.try_recv(), None);
        assert!(matches!(second.try_recv(), Some(Event::PermissionSnapshot(_))));
        assert!(matches!(second.try_recv(), Some(Event::DataReceived { .. })));
    }

    #[test]
    fn test_closed_stream_detaches() {
        let mut mux = EventMultiplexer::new();
        let stream = mux.attach(snapshot());
        drop(stream);

        assert!(!mux.emit(Event::PermissionChanged(PermissionChange::Location(
            LocationStatus::AuthorizedAlways
        ))));
        assert!(!mux.has_subscriber());
    }

    #[test]
    fn test_wire_format() {
        let peer = Event::PeerStateChanged {
            peer_id: "p1".to_string(),
            state: PeerState::NotConnected,
        };
        assert_eq!(
            serde_json::to_value(&peer).unwrap(),
            json!({"event": "peerStateChanged", "peerId": "p1", "state": "notConnected"})
        );

        let data = Event::DataReceived {
            peer_id: "p1".to_string(),
            bytes: vec![1, 2],
        };
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({"event": "dataReceived", "peerId": "p1", "bytes": [1, 2]})
        );

        let location = Event::PermissionChanged(PermissionChange::Location(
            LocationStatus::AuthorizedWhenInUse,
        ));
        assert_eq!(
            serde_json::to_value(&location).unwrap(),
            json!({"event": "nativeLocationChanged", "status": "authorizedWhenInUse"})
        );

        assert_eq!(
            serde_json::to_value(Event::PermissionSnapshot(snapshot())).unwrap(),
            json!({
                "event": "nativeSnapshot",
                "bluetooth": "notDetermined",
                "location": "denied",
                "bonjour": ["_mpconn._tcp", "_mpconn._udp"]
            })
        );
    }
}
