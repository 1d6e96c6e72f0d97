//! JSON-lines front end for the orchestrator.
//!
//! Each input line is a request `{"id":n,"verb":"...","arguments":{...}}`.
//! Each output line is either a response (`{"id":n,"ok":...}` or
//! `{"id":n,"error":{"code":"...","message":"..."}}`) or an event record
//! tagged with `"event"`. The `listen` and `cancel` verbs attach and detach
//! the event subscriber.

use peer_bridge::{Ack, Arguments, BridgeError, Event, EventStream, Orchestrator};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

pub const LISTEN_VERB: &str = "listen";
pub const CANCEL_VERB: &str = "cancel";

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Option<u64>,
    pub verb: String,
    #[serde(default)]
    pub arguments: Arguments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireError {
    pub code: &'static str,
    pub message: String,
}

impl From<&BridgeError> for WireError {
    fn from(error: &BridgeError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok { id: Option<u64>, ok: Ack },
    Error { id: Option<u64>, error: WireError },
}

impl Response {
    pub fn from_result(id: Option<u64>, result: peer_bridge::Result<Ack>) -> Self {
        match result {
            Ok(ok) => Response::Ok { id, ok },
            Err(e) => Response::Error {
                id,
                error: WireError::from(&e),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}

/// Request handling state of one connection
pub struct Transport {
    orchestrator: Orchestrator,
    events: Option<EventStream>,
}

impl Transport {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            events: None,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.events.is_some()
    }

    pub async fn handle_line(&mut self, line: &str) -> Response {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed request");
                let error = BridgeError::InvalidArgument(format!("malformed request: {}", e));
                return Response::from_result(None, Err(error));
            }
        };

        debug!(id = ?request.id, verb = %request.verb, "Request received");
        let result = match request.verb.as_str() {
            LISTEN_VERB => self.listen().await,
            CANCEL_VERB => self.cancel().await,
            verb => self.orchestrator.invoke(verb, &request.arguments).await,
        };
        if let Err(e) = &result {
            debug!(id = ?request.id, verb = %request.verb, code = e.code(), "Request failed");
        }
        Response::from_result(request.id, result)
    }

    async fn listen(&mut self) -> peer_bridge::Result<Ack> {
        let stream = self.orchestrator.subscribe().await?;
        info!(subscriber = stream.subscriber_id(), "Event channel opened");
        self.events = Some(stream);
        Ok(Ack::Done)
    }

    async fn cancel(&mut self) -> peer_bridge::Result<Ack> {
        self.events = None;
        self.orchestrator.unsubscribe().await?;
        info!("Event channel closed");
        Ok(Ack::Done)
    }

    /// Wait for the next event. Returns `None` at once when not listening.
    pub async fn next_event(&mut self) -> Option<Event> {
        let stream = self.events.as_mut()?;
        let event = stream.recv().await;
        if event.is_none() {
            self.events = None;
        }
        event
    }

    /// Events already delivered but not yet written
    pub fn pending_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        if let Some(stream) = self.events.as_mut() {
            while let Some(event) = stream.try_recv() {
                events.push(event);
            }
        }
        events
    }
}

enum Step {
    Line(Option<String>),
    Event(Event),
}

/// Serve requests from `reader` until end of input, writing responses and
/// events to `writer`. Shuts the orchestrator down before returning.
pub async fn serve<R, W>(orchestrator: Orchestrator, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut transport = Transport::new(orchestrator.clone());
    let mut lines = reader.lines();

    loop {
        let step = tokio::select! {
            line = lines.next_line() => Step::Line(line?),
            Some(event) = transport.next_event() => Step::Event(event),
        };

        match step {
            Step::Line(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response = transport.handle_line(&line).await;
                write_record(&mut writer, &response).await?;
                for event in transport.pending_events() {
                    write_record(&mut writer, &event).await?;
                }
            }
            Step::Line(None) => break,
            Step::Event(event) => write_record(&mut writer, &event).await?,
        }
    }

    info!("Input closed, shutting down");
    orchestrator.shutdown().await;
    for event in transport.pending_events() {
        write_record(&mut writer, &event).await?;
    }
    writer.flush().await?;
    Ok(())
}

async fn write_record<W, T>(writer: &mut W, record: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
