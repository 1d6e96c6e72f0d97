//! Cancellable timers polled by the orchestrator loop.
//!
//! Timers never run code on their own: an expired timer is handed back to
//! the orchestrator, which handles it in order with commands and callbacks.

use crate::session::HandleId;
use std::collections::HashMap;
use std::future::poll_fn;
use std::time::Duration;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timer {
    /// End of the radio probe's scan window
    RadioScanStop { probe: u64 },
    /// Release the radio probe's scan controller
    RadioTeardown { probe: u64 },
    /// Release a radio probe that never reached a terminal power state
    RadioWatchdog { probe: u64 },
    /// End of a transient advertise session
    TransientStop { handle: HandleId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerOwner {
    Probe(u64),
    Handle(HandleId),
}

impl Timer {
    pub fn owner(&self) -> TimerOwner {
        match *self {
            Timer::RadioScanStop { probe }
            | Timer::RadioTeardown { probe }
            | Timer::RadioWatchdog { probe } => TimerOwner::Probe(probe),
            Timer::TransientStop { handle } => TimerOwner::Handle(handle),
        }
    }
}

pub(crate) struct Scheduler {
    queue: DelayQueue<(TimerId, Timer)>,
    keys: HashMap<TimerId, (delay_queue::Key, Timer)>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            queue: DelayQueue::new(),
            keys: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let key = self.queue.insert((id, timer), delay);
        self.keys.insert(id, (key, timer));
        trace!(?id, ?timer, ?delay, "Timer scheduled");
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.keys.remove(&id) {
            Some((key, timer)) => {
                self.queue.remove(&key);
                trace!(?id, ?timer, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer belonging to `owner`
    pub fn cancel_owned_by(&mut self, owner: TimerOwner) -> usize {
        let ids: Vec<TimerId> = self
            .keys
            .iter()
            .filter(|(_, (_, timer))| timer.owner() == owner)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    pub fn cancel_all(&mut self) {
        self.queue.clear();
        self.keys.clear();
    }

    pub fn pending(&self) -> usize {
        self.keys.len()
    }

    /// Wait for the next timer to expire. Resolves to `None` immediately
    /// when nothing is scheduled.
    pub async fn next_expired(&mut self) -> Option<Timer> {
        let expired = poll_fn(|cx| self.queue.poll_expired(cx)).await?;
        let (id, timer) = expired.into_inner();
        self.keys.remove(&id);
        Some(timer)
    }
}
