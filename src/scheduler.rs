/// Deterministic event scheduler.
///
/// A `BinaryHeap` with reversed `Ord` on `Event` acts as a min-heap keyed
/// by `(scheduled_at, event_id)`. Event IDs are strictly increasing, so two
/// runs that schedule the same events in the same order dispatch them in
/// the same order.
use std::collections::BinaryHeap;

use crate::event::{Event, EventId, EventIdGen, EventType};
use crate::time::VirtualTime;

/// Owns the event queue and the ID generator.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Event>,
    id_gen: EventIdGen,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            id_gen: EventIdGen::new(),
        }
    }

    /// Schedule a new event at the given virtual time.
    pub fn schedule(&mut self, at: VirtualTime, payload: EventType) -> EventId {
        let id = self.id_gen.next_id();
        self.queue.push(Event::new(id, at, payload));
        id
    }

    /// Pop the next event (earliest time, lowest ID).
    pub fn pop_next(&mut self) -> Option<Event> {
        self.queue.pop()
    }

    pub fn peek_next(&self) -> Option<&Event> {
        self.queue.peek()
    }

    /// Time of the next pending event, if any.
    pub fn next_time(&self) -> Option<VirtualTime> {
        self.queue.peek().map(|e| e.scheduled_at)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// The ID the next `schedule` call will assign.
    pub fn next_event_id(&self) -> EventId {
        self.id_gen.peek()
    }

    /// Discard every pending event. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// Drain all events in dispatch order.
    pub fn drain_ordered(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(e) = self.queue.pop() {
            events.push(e);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppId;

    fn start(app: u32) -> EventType {
        EventType::AppStart { app: AppId::new(app) }
    }

    #[test]
    fn test_fifo_at_same_time() {
        let mut sched = Scheduler::new();
        let at = VirtualTime::from_secs(1);

        sched.schedule(at, start(0));
        sched.schedule(at, start(1));
        sched.schedule(at, start(2));

        let order: Vec<EventType> = sched.drain_ordered().into_iter().map(|e| e.payload).collect();
        assert_eq!(order, vec![start(0), start(1), start(2)]);
    }

    #[test]
    fn test_time_ordering() {
        let mut sched = Scheduler::new();

        sched.schedule(VirtualTime::from_secs(10), EventType::Stop);
        sched.schedule(VirtualTime::from_secs(1), start(0));
        sched.schedule(VirtualTime::from_secs(2), start(1));

        assert_eq!(sched.next_time(), Some(VirtualTime::from_secs(1)));
        let times: Vec<VirtualTime> = sched.drain_ordered().iter().map(|e| e.scheduled_at).collect();
        assert_eq!(
            times,
            vec![
                VirtualTime::from_secs(1),
                VirtualTime::from_secs(2),
                VirtualTime::from_secs(10)
            ]
        );
    }

    #[test]
    fn test_interleaved_times_sorted_by_time_then_id() {
        let mut sched = Scheduler::new();
        for (i, ms) in [50u64, 10, 10, 30, 10].iter().enumerate() {
            sched.schedule(VirtualTime::from_millis(*ms), start(i as u32));
        }
        let events = sched.drain_ordered();
        for pair in events.windows(2) {
            assert!((pair[0].scheduled_at, pair[0].id) <= (pair[1].scheduled_at, pair[1].id));
        }
    }

    #[test]
    fn test_clear_discards_pending() {
        let mut sched = Scheduler::new();
        sched.schedule(VirtualTime::from_secs(1), start(0));
        sched.schedule(VirtualTime::from_secs(2), EventType::Stop);
        assert_eq!(sched.clear(), 2);
        assert!(sched.is_empty());
        assert!(sched.pop_next().is_none());
        // IDs keep increasing after a clear.
        assert_eq!(sched.next_event_id().raw(), 2);
    }
}
