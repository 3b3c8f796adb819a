//! Applications: UDP endpoints driven by start/stop windows and timers.
//!
//! Applications never touch the world directly. They react to
//! [`AppEvent`]s and act through the [`SimulationContext`] extensions in
//! this module, which turn sends and timers into scheduled events.

pub mod echo;

pub use echo::{UdpEchoClient, UdpEchoClientHelper, UdpEchoServer, UdpEchoServerHelper};

use std::any::Any;
use std::net::SocketAddrV6;

use serde::Serialize;

use crate::error::{SimError, SimResult};
use crate::event::{EventId, EventType};
use crate::node::NodeId;
use crate::simulation::{Simulation, SimulationContext};
use crate::time::VirtualTime;
use crate::world::World;

/// Index of an application in the [`World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AppId(u32);

impl AppId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        AppId(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// What an application is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Start,
    Stop,
    Timer { timer_id: u64 },
    /// A UDP datagram arrived on the application's port.
    Datagram { from: SocketAddrV6, payload: Vec<u8> },
}

/// Trait implemented by every application.
///
/// # Contract
/// - All side effects go through `ctx`.
/// - `on_event` is deterministic given the same inputs.
pub trait Application: std::fmt::Debug {
    /// Short name for logs and reports (`"echo-server"`).
    fn kind(&self) -> &'static str;

    /// Port to bind at install. `None` takes an ephemeral port.
    fn requested_port(&self) -> Option<u16>;

    /// Called once by [`World::install_app`] with the assigned identity.
    fn on_install(&mut self, id: AppId, node: NodeId, port: u16);

    fn on_event(&mut self, ctx: &mut SimulationContext, event: AppEvent);

    /// Downcast support for test inspection.
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ── SimulationContext application extensions ──────────────────────────

impl SimulationContext<'_> {
    /// Hand a datagram to `node`'s IPv6 stack.
    ///
    /// Schedules a `DatagramSend` at the current time; the world routes it
    /// when that event is dispatched.
    pub fn send_datagram(
        &mut self,
        node: NodeId,
        src_port: u16,
        dst: SocketAddrV6,
        payload: Vec<u8>,
    ) -> EventId {
        self.schedule_after(
            0,
            EventType::DatagramSend {
                node,
                src_port,
                dst,
                payload,
            },
        )
    }

    /// Arm a timer for `app` after `delay` nanoseconds.
    ///
    /// Returns the timer id delivered back in [`AppEvent::Timer`].
    pub fn schedule_app_timer(&mut self, app: AppId, delay: u64) -> u64 {
        let timer_id = self.scheduler.next_event_id().raw();
        self.schedule_after(delay, EventType::AppTimer { app, timer_id });
        timer_id
    }
}

// ── Application Container ─────────────────────────────────────────────

/// Applications installed by one helper call, started and stopped together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationContainer {
    apps: Vec<AppId>,
    start: Option<VirtualTime>,
    stop: Option<VirtualTime>,
}

impl ApplicationContainer {
    pub fn new() -> Self {
        ApplicationContainer::default()
    }

    pub fn push(&mut self, app: AppId) {
        self.apps.push(app);
    }

    pub fn get(&self, index: usize) -> SimResult<AppId> {
        self.apps.get(index).copied().ok_or(SimError::IndexOutOfRange {
            collection: "application",
            index,
            len: self.apps.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AppId> + '_ {
        self.apps.iter().copied()
    }

    pub fn start_time(&self) -> Option<VirtualTime> {
        self.start
    }

    pub fn stop_time(&self) -> Option<VirtualTime> {
        self.stop
    }

    /// Schedule `AppStart` for every application at `at`.
    pub fn start(&mut self, sim: &mut Simulation, world: &mut World, at: VirtualTime) -> SimResult<()> {
        if let Some(stop) = self.stop {
            check_window(at, stop)?;
        }
        for app in &self.apps {
            world.app_slot_mut(*app)?.start = Some(at);
            sim.schedule(at, EventType::AppStart { app: *app })?;
        }
        self.start = Some(at);
        Ok(())
    }

    /// Schedule `AppStop` for every application at `at`.
    pub fn stop(&mut self, sim: &mut Simulation, world: &mut World, at: VirtualTime) -> SimResult<()> {
        if let Some(start) = self.start {
            check_window(start, at)?;
        }
        for app in &self.apps {
            world.app_slot_mut(*app)?.stop = Some(at);
            sim.schedule(at, EventType::AppStop { app: *app })?;
        }
        self.stop = Some(at);
        Ok(())
    }
}

fn check_window(start: VirtualTime, stop: VirtualTime) -> SimResult<()> {
    if stop < start {
        return Err(SimError::InvalidScenario(format!(
            "application stop {} is before start {}",
            stop, start
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internet::InternetStackHelper;
    use crate::node::NodeContainer;

    fn world_with_stack() -> (World, NodeContainer) {
        let mut world = World::new();
        let nodes = NodeContainer::create(&mut world, 1).unwrap();
        let mut internet = InternetStackHelper::new();
        internet.set_ipv4_stack_install(false);
        internet.install(&mut world, &nodes).unwrap();
        (world, nodes)
    }

    #[test]
    fn test_stop_before_start_rejected() {
        let (mut world, nodes) = world_with_stack();
        let mut sim = Simulation::new();
        let mut apps = UdpEchoServerHelper::new(9)
            .install(&mut world, nodes.get(0).unwrap())
            .unwrap();
        apps.start(&mut sim, &mut world, VirtualTime::from_secs(5)).unwrap();
        let err = apps
            .stop(&mut sim, &mut world, VirtualTime::from_secs(4))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidScenario(_)));
    }

    #[test]
    fn test_start_and_stop_are_scheduled() {
        let (mut world, nodes) = world_with_stack();
        let mut sim = Simulation::new();
        let mut apps = UdpEchoServerHelper::new(9)
            .install(&mut world, nodes.get(0).unwrap())
            .unwrap();
        apps.start(&mut sim, &mut world, VirtualTime::from_secs(1)).unwrap();
        apps.stop(&mut sim, &mut world, VirtualTime::from_secs(10)).unwrap();
        assert_eq!(sim.pending_events(), 2);

        let slot = world.app_slot(apps.get(0).unwrap()).unwrap();
        assert_eq!(slot.start, Some(VirtualTime::from_secs(1)));
        assert_eq!(slot.stop, Some(VirtualTime::from_secs(10)));
    }

    #[test]
    fn test_app_timer_id_matches_event() {
        let mut sim = Simulation::new();
        let app = AppId::new(3);
        let mut armed = None;
        let mut fired = None;
        sim.schedule(VirtualTime::ZERO, EventType::AppStart { app }).unwrap();
        sim.stop_at(VirtualTime::from_secs(1)).unwrap();
        sim.run(&mut |ctx: &mut SimulationContext, event: &crate::event::Event| match &event.payload {
            EventType::AppStart { app } => armed = Some(ctx.schedule_app_timer(*app, 10)),
            EventType::AppTimer { timer_id, .. } => fired = Some(*timer_id),
            _ => {}
        })
        .unwrap();
        assert!(armed.is_some());
        assert_eq!(armed, fired);
    }
}
