// Session Handle - one discovery/connection lifetime over a collaborator

use crate::platform::PeerSession;
use crate::{PeerId, Result, Role, SessionSpec};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Identity of a session handle; callbacks carry it so that reports from
/// discarded handles can be recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

impl HandleId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

pub struct SessionHandle {
    id: HandleId,
    spec: SessionSpec,
    collaborator: Box<dyn PeerSession>,
    started_at: Option<DateTime<Utc>>,
    stopped: bool,
}

impl SessionHandle {
    pub(crate) fn new(id: HandleId, spec: SessionSpec, collaborator: Box<dyn PeerSession>) -> Self {
        Self {
            id,
            spec,
            collaborator,
            started_at: None,
            stopped: false,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.spec.role
    }

    pub fn spec(&self) -> &SessionSpec {
        &self.spec
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Begin advertising or browsing
    pub async fn start(&mut self) -> Result<()> {
        info!(
            session = %self.id,
            role = %self.spec.role,
            display_name = %self.spec.display_name,
            service_type = %self.spec.service_type,
            "Starting session"
        );
        self.started_at = Some(Utc::now());
        self.collaborator.start().await
    }

    /// Stop the collaborator. Calling it on a stopped handle does nothing.
    pub async fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let uptime = self
            .started_at
            .map(|at| (Utc::now() - at).num_milliseconds());
        info!(session = %self.id, role = %self.spec.role, uptime_ms = ?uptime, "Stopping session");

        self.collaborator.stop().await
    }

    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        debug!(session = %self.id, len = bytes.len(), "Forwarding data");
        self.collaborator.send(bytes).await
    }

    pub async fn invite(&mut self, peer_id: &PeerId) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        debug!(session = %self.id, peer_id = %peer_id, "Forwarding invitation");
        self.collaborator.invite(peer_id).await
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("started_at", &self.started_at)
            .field("stopped", &self.stopped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    type Calls = Mutex<Vec<String>>;

    #[derive(Debug)]
    struct Recording(Arc<Calls>);

    #[async_trait]
    impl PeerSession for Recording {
        async fn start(&mut self) -> Result<()> {
            self.0.lock().unwrap().push("start".to_string());
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.0.lock().unwrap().push("stop".to_string());
            Ok(())
        }

        async fn send(&mut self, bytes: &[u8]) -> Result<()> {
            self.0.lock().unwrap().push(format!("send:{}", bytes.len()));
            Ok(())
        }

        async fn invite(&mut self, peer_id: &PeerId) -> Result<()> {
            self.0.lock().unwrap().push(format!("invite:{}", peer_id));
            Ok(())
        }
    }

    fn handle(calls: &Arc<Calls>) -> SessionHandle {
        SessionHandle::new(
            HandleId(1),
            SessionSpec {
                role: Role::Browser,
                display_name: "A".to_string(),
                service_type: "svc".to_string(),
            },
            Box::new(Recording(Arc::clone(calls))),
        )
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let calls = Arc::new(Calls::default());
        let mut session = handle(&calls);

        session.start().await.unwrap();
        assert!(session.started_at().is_some());
        session.stop().await.unwrap();
        session.stop().await.unwrap();

        assert!(session.is_stopped());
        assert_eq!(*calls.lock().unwrap(), vec!["start", "stop"]);
    }

    #[tokio::test]
    async fn test_stopped_handle_ignores_send_and_invite() {
        let calls = Arc::new(Calls::default());
        let mut session = handle(&calls);

        session.start().await.unwrap();
        session.send(&[1, 2, 3]).await.unwrap();
        session.invite(&"bob".to_string()).await.unwrap();
        session.stop().await.unwrap();
        session.send(&[4]).await.unwrap();
        session.invite(&"eve".to_string()).await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["start", "send:3", "invite:bob", "stop"]
        );
        assert_eq!(session.id().to_string(), "session-1");
        assert_eq!(session.role(), Role::Browser);
    }
}
