//! # amisim — Deterministic IPv6 / 6LoWPAN Echo Scenarios
//!
//! A discrete-event kernel plus just enough of a network model to run a
//! UDP echo exchange over either a wired CSMA segment or an IEEE 802.15.4
//! (LR-WPAN) PAN, with 6LoWPAN fragmentation and optional mesh-under
//! forwarding. No async, no threads, no wall-clock time: every run is a
//! pure function of its [`ScenarioConfig`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────┐
//! │            Scenario             │ ← build phases + run controller
//! │  ┌───────────────────────────┐  │
//! │  │          World            │  │ ← EventHandler: nodes, devices,
//! │  │  ┌─────────┐ ┌─────────┐  │  │   stacks, apps, captures
//! │  │  │ Ipv6    │ │ Echo    │  │  │
//! │  │  │ Stack   │ │ Apps    │  │  │
//! │  │  └─────────┘ └─────────┘  │  │
//! │  │  ┌─────────┐ ┌─────────┐  │  │
//! │  │  │ 6LoWPAN │ │ Channel │  │  │ ← shim per device, shared medium
//! │  │  └─────────┘ └─────────┘  │  │
//! │  └───────────────────────────┘  │
//! │  ┌───────────────────────────┐  │
//! │  │        Simulation         │  │ ← execution loop
//! │  │  Scheduler · Events · VT  │  │ ← deterministic min-heap
//! │  └───────────────────────────┘  │
//! └─────────────────────────────────┘
//! ```

pub mod app;
pub mod capture;
pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod internet;
pub mod mobility;
pub mod node;
pub mod packet;
pub mod report;
pub mod scenario;
pub mod scheduler;
pub mod simulation;
pub mod time;
pub mod trace;
pub mod world;

// Re-exports for convenience.
pub use app::{AppId, Application, ApplicationContainer, UdpEchoClientHelper, UdpEchoServerHelper};
pub use config::{LinkVariant, ScenarioConfig};
pub use error::{SimError, SimResult};
pub use event::{Event, EventId, EventType};
pub use node::{NodeContainer, NodeId};
pub use report::ScenarioReport;
pub use scenario::Scenario;
pub use scheduler::Scheduler;
pub use simulation::{EventHandler, Simulation, SimulationContext};
pub use time::VirtualTime;
pub use world::World;
