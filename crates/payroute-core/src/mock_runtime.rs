//! Recording runtime for testing
//!
//! Captures everything an engine sends, schedules and cancels, with a
//! manually advanced clock. Lets discovery and payment logic be driven one
//! handler at a time without a simulator.
//!
//! ```rust,ignore
//! let mut rt = RecordingRuntime::new();
//! engine.initiate(dst, 10, &mut rt)?;
//! assert_eq!(rt.broadcasts().len(), 1);
//! rt.advance(Duration::from_secs(1));
//! ```

use std::collections::HashSet;
use std::time::Duration;

use crate::identity::PeerIdentity;
use crate::message::{Destination, Message};
use crate::runtime::{Runtime, TaskHandle, Timer};
use crate::time::SimTime;

/// A timer armed through a [`RecordingRuntime`]
#[derive(Debug, Clone)]
pub struct ScheduledTimer<I: PeerIdentity> {
    pub id: u64,
    pub fires_at: SimTime,
    pub timer: Timer<I>,
}

pub struct RecordingRuntime<I: PeerIdentity> {
    now: SimTime,
    next_id: u64,
    /// Every message handed to the transport, in order
    pub sent: Vec<(Destination<I>, Message<I>)>,
    /// Every timer armed, in order (including cancelled ones)
    pub scheduled: Vec<ScheduledTimer<I>>,
    cancelled: HashSet<u64>,
}

impl<I: PeerIdentity> RecordingRuntime<I> {
    pub fn new() -> Self {
        Self::at(SimTime::ZERO)
    }

    /// Start the clock at `now`
    pub fn at(now: SimTime) -> Self {
        Self {
            now,
            next_id: 1,
            sent: Vec::new(),
            scheduled: Vec::new(),
            cancelled: HashSet::new(),
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    pub fn set_now(&mut self, now: SimTime) {
        self.now = now;
    }

    /// Drain recorded sends
    pub fn take_sent(&mut self) -> Vec<(Destination<I>, Message<I>)> {
        std::mem::take(&mut self.sent)
    }

    /// Messages sent to `peer`
    pub fn sent_to(&self, peer: &I) -> Vec<&Message<I>> {
        self.sent
            .iter()
            .filter(|(dest, _)| matches!(dest, Destination::Unicast(p) if p == peer))
            .map(|(_, msg)| msg)
            .collect()
    }

    pub fn broadcasts(&self) -> Vec<&Message<I>> {
        self.sent
            .iter()
            .filter(|(dest, _)| matches!(dest, Destination::Broadcast))
            .map(|(_, msg)| msg)
            .collect()
    }

    /// Timers that are armed and not cancelled
    pub fn active_timers(&self) -> Vec<&ScheduledTimer<I>> {
        self.scheduled
            .iter()
            .filter(|t| !self.cancelled.contains(&t.id))
            .collect()
    }

    pub fn is_cancelled(&self, id: u64) -> bool {
        self.cancelled.contains(&id)
    }
}

impl<I: PeerIdentity> Default for RecordingRuntime<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: PeerIdentity> Runtime<I> for RecordingRuntime<I> {
    fn now(&self) -> SimTime {
        self.now
    }

    fn send(&mut self, destination: Destination<I>, message: Message<I>) {
        self.sent.push((destination, message));
    }

    fn schedule(&mut self, delay: Duration, timer: Timer<I>) -> TaskHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.scheduled.push(ScheduledTimer {
            id,
            fires_at: self.now + delay,
            timer,
        });
        TaskHandle::new(id)
    }

    fn cancel(&mut self, handle: TaskHandle) {
        self.cancelled.insert(handle.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SimulationIdentity;

    #[test]
    fn test_cancelled_timers_are_inactive() {
        let mut rt = RecordingRuntime::<SimulationIdentity>::new();
        let first = rt.schedule(Duration::from_secs(1), Timer::Hello);
        let _second = rt.schedule(Duration::from_secs(2), Timer::Purge);
        rt.cancel(first);

        let active = rt.active_timers();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].timer, Timer::Purge);
        assert_eq!(active[0].fires_at, SimTime::from_secs(2));
    }

    #[test]
    fn test_sent_to_filters_unicast() {
        let mut rt = RecordingRuntime::<SimulationIdentity>::new();
        rt.send(
            Destination::Unicast(SimulationIdentity('B')),
            Message::RouteReplyAck,
        );
        rt.send(Destination::Broadcast, Message::RouteReplyAck);

        assert_eq!(rt.sent_to(&SimulationIdentity('B')).len(), 1);
        assert_eq!(rt.broadcasts().len(), 1);
        assert!(rt.sent_to(&SimulationIdentity('C')).is_empty());
    }
}
