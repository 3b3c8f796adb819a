/// Simulation execution loop and lifecycle.
///
/// Drives the scheduler: pops events, advances virtual time, dispatches
/// to a handler. The loop is synchronous and single-threaded.
///
/// A `Simulation` moves through `Configured → Running → Destroyed` and
/// never back. Events may be scheduled while configured or running;
/// only a configured simulation may be run.
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{SimError, SimResult};
use crate::event::{Event, EventId, EventType};
use crate::scheduler::Scheduler;
use crate::time::VirtualTime;

// ── Handler trait ─────────────────────────────────────────────────────

/// Reacts to dispatched events.
///
/// The handler receives a `SimulationContext` so it can schedule
/// follow-up events.
pub trait EventHandler {
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event);
}

/// A handler backed by a closure, for tests and one-off drivers.
impl<F> EventHandler for F
where
    F: FnMut(&mut SimulationContext, &Event),
{
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) {
        (self)(ctx, event);
    }
}

// ── Simulation Context ───────────────────────────────────────────────

/// Mutable context passed to the handler on every dispatch.
///
/// Borrows the scheduler mutably, so a handler can only affect dispatch
/// order through the schedule API.
pub struct SimulationContext<'a> {
    pub(crate) scheduler: &'a mut Scheduler,
    pub(crate) now: VirtualTime,
}

impl<'a> SimulationContext<'a> {
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Schedule an event at an absolute virtual time.
    ///
    /// # Panics
    /// Panics if `at` is before the current time.
    pub fn schedule_at(&mut self, at: VirtualTime, payload: EventType) -> EventId {
        assert!(
            at >= self.now,
            "Cannot schedule event in the past: now={}, at={}",
            self.now,
            at
        );
        self.scheduler.schedule(at, payload)
    }

    /// Schedule an event `delay` nanoseconds after now.
    pub fn schedule_after(&mut self, delay: u64, payload: EventType) -> EventId {
        let at = self.now.saturating_advance(delay);
        self.scheduler.schedule(at, payload)
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lifecycle {
    /// Accepting configuration and scheduled events.
    Configured,
    /// The run loop has been entered. Cannot be run again.
    Running,
    /// Resources released. Nothing further may be scheduled.
    Destroyed,
}

// ── Simulation ────────────────────────────────────────────────────────

/// Top-level simulation driver.
#[derive(Debug, Clone)]
pub struct Simulation {
    scheduler: Scheduler,
    current_time: VirtualTime,
    events_processed: u64,
    stop_time: Option<VirtualTime>,
    state: Lifecycle,
}

impl Simulation {
    pub fn new() -> Self {
        Simulation {
            scheduler: Scheduler::new(),
            current_time: VirtualTime::ZERO,
            events_processed: 0,
            stop_time: None,
            state: Lifecycle::Configured,
        }
    }

    pub fn current_time(&self) -> VirtualTime {
        self.current_time
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn stop_time(&self) -> Option<VirtualTime> {
        self.stop_time
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.len()
    }

    /// Schedule an event from outside the run loop.
    pub fn schedule(&mut self, at: VirtualTime, payload: EventType) -> SimResult<EventId> {
        if self.state == Lifecycle::Destroyed {
            return Err(SimError::InvalidLifecycle {
                state: self.state,
                operation: "schedule",
            });
        }
        if at.is_before(self.current_time) {
            return Err(SimError::NonCausalEvent {
                requested: at,
                current: self.current_time,
            });
        }
        Ok(self.scheduler.schedule(at, payload))
    }

    /// Set the absolute stop time.
    ///
    /// Events scheduled at exactly `at` before this call still run; the
    /// stop takes effect once they are done.
    pub fn stop_at(&mut self, at: VirtualTime) -> SimResult<EventId> {
        let id = self.schedule(at, EventType::Stop)?;
        self.stop_time = Some(at);
        Ok(id)
    }

    /// Pop one event, advance time, dispatch.
    ///
    /// Returns `None` when the queue is empty.
    pub fn step(&mut self, handler: &mut dyn EventHandler) -> Option<Event> {
        let event = self.scheduler.pop_next()?;

        assert!(
            event.scheduled_at >= self.current_time,
            "Time went backward! current={}, event={}",
            self.current_time,
            event.scheduled_at
        );
        self.current_time = event.scheduled_at;
        self.events_processed += 1;
        trace!(id = %event.id, at = %event.scheduled_at, event = %event.payload, "dispatch");

        let mut ctx = SimulationContext {
            scheduler: &mut self.scheduler,
            now: self.current_time,
        };
        handler.handle(&mut ctx, &event);

        Some(event)
    }

    /// Run until the `Stop` event is dispatched or the queue drains.
    ///
    /// Returns the number of events processed.
    pub fn run(&mut self, handler: &mut dyn EventHandler) -> SimResult<u64> {
        if self.state != Lifecycle::Configured {
            return Err(SimError::InvalidLifecycle {
                state: self.state,
                operation: "run",
            });
        }
        self.state = Lifecycle::Running;
        debug!(stop = ?self.stop_time, pending = self.scheduler.len(), "run loop entered");

        let start = self.events_processed;
        while let Some(event) = self.step(handler) {
            if event.payload == EventType::Stop {
                break;
            }
        }
        let processed = self.events_processed - start;
        debug!(processed, now = %self.current_time, "run loop left");
        Ok(processed)
    }

    /// Release the event queue. Returns the number of discarded events.
    pub fn destroy(&mut self) -> usize {
        let discarded = self.scheduler.clear();
        self.state = Lifecycle::Destroyed;
        debug!(discarded, "simulation destroyed");
        discarded
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_empty()
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}
